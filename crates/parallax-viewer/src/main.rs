mod app;
mod controls;
mod demo;

use parallax_engine::device::GpuInit;
use parallax_engine::logging::{init_logging, LoggingConfig};
use parallax_engine::window::{Runtime, RuntimeConfig};
use parallax_stereo::StereoConfig;
use winit::dpi::LogicalSize;

use crate::app::ViewerApp;

fn main() {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "parallax".to_string(),
        size: LogicalSize::new(1600.0, 600.0),
        gpu: GpuInit::default(),
    };
    let app = ViewerApp::new(demo::demo_scene(), StereoConfig::default());

    if let Err(err) = Runtime::run(config, app) {
        log::error!("parallax runtime error: {err:#}");
        std::process::exit(1);
    }
}
