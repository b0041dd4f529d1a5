//! Slip systems: families of parallel slip planes.

use crate::error::{Error, Result};
use crate::frame::{CoordinateSystem, RotationMatrix};
use crate::slip_plane::SlipPlane;
use crate::types::{Stress, Vec3};

/// Tolerance for the direction/normal orthogonality and the plane
/// parallelism checks.
const ALIGNMENT_TOLERANCE: f64 = 1e-9;

/// A slip system: a slip direction, a normal, and the slip planes
/// sharing that normal. The system frame has x along the slip direction
/// and y along the normal.
#[derive(Debug, Clone)]
pub struct SlipSystem {
    direction: Vec3,
    normal: Vec3,
    planes: Vec<SlipPlane>,
    coordinate_system: CoordinateSystem,
    applied_stress: Stress,
}

impl SlipSystem {
    /// Create a slip system from its slip direction and normal, both in
    /// the grain frame, with its frame origin at `origin`.
    pub fn new(direction: Vec3, normal: Vec3, origin: Vec3) -> Result<Self> {
        if direction.norm() == 0.0 {
            return Err(Error::InvalidGeometry("slip direction is zero".into()));
        }
        if normal.norm() == 0.0 {
            return Err(Error::InvalidGeometry("slip-system normal is zero".into()));
        }
        let x_hat = direction.normalize();
        let y_hat = normal.normalize();
        if x_hat.dot(&y_hat).abs() > ALIGNMENT_TOLERANCE {
            return Err(Error::InvalidGeometry(
                "slip direction must be perpendicular to the normal".into(),
            ));
        }
        let rotation = RotationMatrix::from_local_triad(&[x_hat, y_hat, x_hat.cross(&y_hat)])?;
        Ok(Self {
            direction: x_hat,
            normal: y_hat,
            planes: Vec::new(),
            coordinate_system: CoordinateSystem::new(origin, rotation),
            applied_stress: Stress::zero(),
        })
    }

    /// Unit slip direction in the grain frame.
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Unit normal in the grain frame.
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    /// The system's frame relative to the grain.
    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coordinate_system
    }

    /// Add a slip plane. The plane's geometry is expressed in the system
    /// frame, so its normal must be parallel to the system's y axis.
    pub fn add_plane(&mut self, plane: SlipPlane) -> Result<()> {
        if plane.normal().cross(&Vec3::y()).norm() > ALIGNMENT_TOLERANCE {
            return Err(Error::InvalidGeometry(
                "slip plane normal is not parallel to the system normal".into(),
            ));
        }
        self.planes.push(plane);
        Ok(())
    }

    /// The slip planes of this system.
    pub fn planes(&self) -> &[SlipPlane] {
        &self.planes
    }

    /// Mutable access to the slip planes.
    pub fn planes_mut(&mut self) -> &mut [SlipPlane] {
        &mut self.planes
    }

    /// A slip plane by index.
    pub fn plane(&self, i: usize) -> Option<&SlipPlane> {
        self.planes.get(i)
    }

    /// Number of slip planes.
    pub fn n_planes(&self) -> usize {
        self.planes.len()
    }

    /// Applied stress in the system frame.
    pub fn applied_stress(&self) -> Stress {
        self.applied_stress
    }

    /// Set the applied stress (system frame) and rotate it down into
    /// every slip plane.
    pub fn set_applied_stress(&mut self, stress: Stress) {
        self.applied_stress = stress;
        for plane in &mut self.planes {
            let local = plane.coordinate_system().stress_to_local(&stress);
            plane.set_applied_stress(local);
        }
    }
}
