//! Window-system event translation.

mod winit;

pub(crate) use self::winit::translate;
