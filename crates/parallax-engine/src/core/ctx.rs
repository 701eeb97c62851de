use winit::window::{Window, WindowId};

use crate::device::{Acquired, Gpu};
use crate::input::{InputFrame, InputState};
use crate::render::RenderCtx;
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// The window being drawn.
pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

impl WindowCtx<'_> {
    /// Inner size in physical pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

/// Everything an [`App`](super::App) sees during one redraw.
///
/// `'a` spans the callback; `'w` is the window borrow held by the surface.
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub gpu: &'a mut Gpu<'w>,
    pub input: &'a InputState,
    pub input_frame: &'a InputFrame,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl<'a, 'w> FrameCtx<'a, 'w> {
    /// Device access outside of [`present`](Self::present), for resizes and uploads.
    pub fn render_ctx(&self) -> RenderCtx<'_> {
        self.gpu.render_ctx()
    }

    /// Records `draw` into the next surface texture, then submits and presents it.
    ///
    /// A lost or outdated surface skips the frame; only an unrecoverable surface
    /// returns `AppControl::Exit`.
    pub fn present<F>(&mut self, draw: F) -> AppControl
    where
        F: FnOnce(&RenderCtx<'_>, &mut wgpu::CommandEncoder, &wgpu::TextureView),
    {
        let mut frame = match self.gpu.acquire() {
            Acquired::Frame(frame) => frame,
            Acquired::Skip => return AppControl::Continue,
            Acquired::Fatal(err) => {
                log::error!("surface lost for good: {err}");
                return AppControl::Exit;
            }
        };

        {
            let rctx = self.gpu.render_ctx();
            draw(&rctx, &mut frame.encoder, &frame.view);
        }

        self.window.window.pre_present_notify();
        self.gpu.present(frame);

        AppControl::Continue
    }
}
