use std::fmt;

/// Reason a pass did not produce its visible effect this frame.
///
/// Never fatal: the renderer logs it (once per distinct reason) and moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    /// No scene has been bound.
    MissingScene,
    /// The bound scene has no triangles to build an acceleration structure from.
    MissingAccelerationStructure,
    /// A named input was not supplied in the frame's `RenderData`.
    MissingInput(&'static str),
    /// The quad divide factor exceeds the resolution on at least one axis.
    EmptyGrid {
        width: u32,
        height: u32,
        divide: u32,
    },
    /// A buffer still has the size of a previous grid.
    StaleBuffer { expected: u64, actual: u64 },
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassError::MissingScene => f.write_str("no scene bound"),
            PassError::MissingAccelerationStructure => {
                f.write_str("scene has no acceleration structure")
            }
            PassError::MissingInput(name) => write!(f, "missing input {name:?}"),
            PassError::EmptyGrid {
                width,
                height,
                divide,
            } => write!(
                f,
                "quad divide factor {divide} leaves no quads at {width}x{height}"
            ),
            PassError::StaleBuffer { expected, actual } => write!(
                f,
                "stale buffer: expected {expected} bytes, found {actual}"
            ),
        }
    }
}

impl std::error::Error for PassError {}
