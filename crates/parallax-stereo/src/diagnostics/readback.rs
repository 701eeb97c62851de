use std::sync::mpsc;

enum ReadbackState {
    Idle,
    /// A copy into the staging buffer was recorded but not yet submitted.
    Copied,
    Mapping(mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>),
}

/// Non-blocking GPU → CPU copy of a small buffer.
///
/// One copy is in flight at a time: [`record_copy`](Self::record_copy) is a
/// no-op until the previous value has been read, so results lag a frame or two
/// behind and frames in between are skipped.
pub struct Readback {
    label: &'static str,
    staging: wgpu::Buffer,
    state: ReadbackState,
}

impl Readback {
    pub fn new(device: &wgpu::Device, label: &'static str, size: u64) -> Self {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.max(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            label,
            staging,
            state: ReadbackState::Idle,
        }
    }

    pub fn size(&self) -> u64 {
        self.staging.size()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ReadbackState::Idle)
    }

    /// Copies `source` into the staging buffer if no read is pending.
    pub fn record_copy(&mut self, encoder: &mut wgpu::CommandEncoder, source: &wgpu::Buffer) -> bool {
        if !self.is_idle() {
            return false;
        }
        let size = self.staging.size().min(source.size());
        encoder.copy_buffer_to_buffer(source, 0, &self.staging, 0, size);
        self.state = ReadbackState::Copied;
        true
    }

    /// Starts mapping a copy recorded before the last submit.
    pub fn after_submit(&mut self) {
        if !matches!(self.state, ReadbackState::Copied) {
            return;
        }
        let (sender, receiver) = mpsc::channel();
        self.staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        self.state = ReadbackState::Mapping(receiver);
    }

    /// Returns the copied bytes once mapping has completed.
    pub fn try_read(&mut self, device: &wgpu::Device) -> Option<Vec<u8>> {
        let ReadbackState::Mapping(receiver) = &self.state else {
            return None;
        };
        let _ = device.poll(wgpu::PollType::Poll);
        match receiver.try_recv() {
            Ok(Ok(())) => {
                let bytes = self.staging.slice(..).get_mapped_range().to_vec();
                self.staging.unmap();
                self.state = ReadbackState::Idle;
                Some(bytes)
            }
            Ok(Err(err)) => {
                log::warn!("{} readback failed: {err}", self.label);
                self.state = ReadbackState::Idle;
                None
            }
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.state = ReadbackState::Idle;
                None
            }
        }
    }
}
