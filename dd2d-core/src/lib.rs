//! dd2d core - two-dimensional dislocation dynamics kernel.
//!
//! Evolves a population of edge dislocations gliding on crystallographic
//! slip planes inside the grains of a polycrystal, under an externally
//! applied stress and the mutual elastic interactions of all defects.
//! Each time step superposes the analytic dislocation stress fields,
//! applies the Peach-Koehler force law with a CRSS threshold, selects a
//! collision-free time increment, moves the defects, and runs the
//! discrete events: Frank-Read dipole emission, annihilation, pinning.
//!
//! # Architecture
//!
//! The simulation is a four-level hierarchy of nested local frames:
//!
//! ```text
//! Polycrystal - Grain - SlipSystem - SlipPlane - {Defect, DislocationSource}
//! ```
//!
//! - [`CoordinateSystem`] and [`FrameChain`]: rotations and translations
//!   between nested frames
//! - [`Defect`]: the tagged defect model ([`Dislocation`],
//!   [`DislocationSource`], obstacles and boundary sentinels)
//! - [`SlipPlane`]: the 1-D glide line evolving its sorted defects
//! - [`Polycrystal`]: the per-step orchestrator
//! - [`reader`] / [`statistics`]: the ASCII input and output adapters

pub mod defect;
pub mod error;
pub mod frame;
pub mod grain;
pub mod material;
pub mod polycrystal;
pub mod reader;
pub mod rng;
pub mod slip_plane;
pub mod slip_system;
pub mod source;
pub mod statistics;
pub mod types;

pub use defect::{Defect, DefectKind, Dislocation, FieldSource};
pub use error::{Error, Result};
pub use frame::{CoordinateSystem, FrameChain, RotationMatrix};
pub use grain::Grain;
pub use material::Material;
pub use polycrystal::{
    DefectRecord, Polycrystal, StepControls, StepOutcome, Tessellation,
};
pub use reader::{read_orientations, read_slip_plane, read_tessellation, Parameters};
pub use rng::GaussianSampler;
pub use slip_plane::SlipPlane;
pub use slip_system::SlipSystem;
pub use source::DislocationSource;
pub use statistics::{write_defect_file, write_times};
pub use types::{Point3, Stress, Vec3};
