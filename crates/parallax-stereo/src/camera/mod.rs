//! Mono camera and the stereo eye pair derived from it.

mod camera;
mod stereo;

pub use camera::{Camera, CameraInput};
pub use stereo::{frustum_rh, EyeCamera, EyePair, StereoCameraController};
