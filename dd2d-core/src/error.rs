//! Error types for dd2d operations.

use thiserror::Error;

/// Result type alias using the dd2d Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a dislocation dynamics simulation.
#[derive(Error, Debug)]
pub enum Error {
    /// Unreadable file, wrong field count, or non-numeric token.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Defect placed outside its slip plane, degenerate direction,
    /// or non-orthonormal frame.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Physically invalid material constants.
    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    /// A dislocation source loaded with a non-positive critical stress,
    /// iteration count, or emission length.
    #[error("source misconfigured: {0}")]
    SourceMisconfigured(String),

    /// A closing defect pair is already at or inside the minimum approach
    /// distance, so no positive time increment exists. The step is aborted
    /// with all positions untouched; a local-reaction pass must resolve
    /// the contact before stepping again.
    #[error(
        "time step underflow: defects at {left:.6e} and {right:.6e} close at {closing_speed:.6e} m/s within the minimum distance"
    )]
    TimeStepUnderflow {
        /// Position of the trailing defect along the slip direction (m).
        left: f64,
        /// Position of the leading defect along the slip direction (m).
        right: f64,
        /// Relative approach speed of the pair (m/s).
        closing_speed: f64,
    },

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
