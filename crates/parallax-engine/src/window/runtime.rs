use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App, AppControl, FrameCtx, WindowCtx};
use crate::device::{Gpu, GpuInit};
use crate::input::platform::translate;
use crate::input::{InputFrame, InputState};
use crate::time::FrameClock;

/// Window and device settings for [`Runtime::run`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    /// Inner size in logical pixels.
    pub size: LogicalSize<f64>,
    pub gpu: GpuInit,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "parallax".to_string(),
            size: LogicalSize::new(1600.0, 600.0),
            gpu: GpuInit::default(),
        }
    }
}

/// Requests an app makes during a frame, applied once the frame is done.
#[derive(Debug, Default)]
pub struct RuntimeCtx {
    title: Option<String>,
    exit: bool,
}

impl RuntimeCtx {
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn exit(&mut self) {
        self.exit = true;
    }
}

/// Single-window event loop redrawing continuously.
pub struct Runtime;

impl Runtime {
    /// Opens the window, binds a device to it and calls `app` every frame until
    /// the window closes or the app asks to exit.
    pub fn run<A: App + 'static>(config: RuntimeConfig, app: A) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;
        let mut host = Host {
            config,
            app,
            surface: None,
            input: InputState::default(),
            input_frame: InputFrame::default(),
            clock: FrameClock::default(),
            error: None,
        };
        event_loop
            .run_app(&mut host)
            .context("event loop terminated with error")?;
        host.error.map_or(Ok(()), Err)
    }
}

#[self_referencing]
struct WindowSurface {
    window: Window,
    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct Host<A> {
    config: RuntimeConfig,
    app: A,
    surface: Option<WindowSurface>,
    input: InputState,
    input_frame: InputFrame,
    clock: FrameClock,
    error: Option<anyhow::Error>,
}

impl<A: App> Host<A> {
    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.size);
        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let init = self.config.gpu.clone();
        let surface = WindowSurfaceTryBuilder {
            window,
            gpu_builder: |window| pollster::block_on(Gpu::new(window, init)),
        }
        .try_build()
        .context("GPU initialization failed")?;

        surface.with_window(|w| w.request_redraw());
        self.surface = Some(surface);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop, error: Option<anyhow::Error>) {
        if let Some(err) = error {
            log::error!("{err:#}");
            self.error = Some(err);
        }
        self.surface = None;
        event_loop.exit();
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        surface.with_gpu_mut(|gpu| gpu.resize(size));
        self.clock.reset();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop, id: WindowId) {
        let Self {
            app,
            surface,
            input,
            input_frame,
            clock,
            ..
        } = &mut *self;
        let Some(surface) = surface.as_mut() else {
            return;
        };

        let mut runtime = RuntimeCtx::default();
        let control = surface.with_mut(|fields| {
            let size = fields.gpu.size();
            if size.width == 0 || size.height == 0 {
                return AppControl::Continue;
            }
            let mut ctx = FrameCtx {
                window: WindowCtx {
                    id,
                    window: fields.window,
                },
                gpu: fields.gpu,
                input: &*input,
                input_frame: &*input_frame,
                time: clock.tick(),
                runtime: &mut runtime,
            };
            app.on_frame(&mut ctx)
        });
        input_frame.clear();

        if let Some(title) = runtime.title.take() {
            surface.with_window(|w| w.set_title(&title));
        }
        if control == AppControl::Exit || runtime.exit {
            self.shutdown(event_loop, None);
        }
    }
}

impl<A: App> ApplicationHandler for Host<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.is_some() {
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Err(err) = self.open(event_loop) {
            self.shutdown(event_loop, Some(err));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(surface) = &self.surface {
            surface.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let Some(surface) = &self.surface else {
            return;
        };
        let scale = surface.with_window(|w| w.scale_factor());
        if let Some(ev) = translate(&event, scale) {
            self.input.apply(&mut self.input_frame, ev);
        }

        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop, None),
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = surface.with_window(|w| w.inner_size());
                self.resize(size);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop, id),
            _ => {}
        }
    }
}
