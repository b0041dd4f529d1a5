//! Grains: oriented crystallites carrying slip systems.

use crate::frame::{CoordinateSystem, RotationMatrix};
use crate::slip_system::SlipSystem;
use crate::types::{Stress, Vec3};

/// A grain of the polycrystal: a boundary polygon, a crystallographic
/// orientation, and the slip systems active inside it.
#[derive(Debug, Clone)]
pub struct Grain {
    /// Grain-boundary polygon (closed point list) in the polycrystal frame.
    boundary: Vec<Vec3>,
    /// Crystallographic orientation as Bunge Euler angles (rad).
    orientation: Vec3,
    systems: Vec<SlipSystem>,
    coordinate_system: CoordinateSystem,
    applied_stress: Stress,
}

impl Grain {
    /// Create a grain from its boundary polygon and orientation. The
    /// grain frame sits at the polygon centroid, rotated by the
    /// orientation; an empty polygon leaves the frame at the origin.
    pub fn new(boundary: Vec<Vec3>, orientation: Vec3) -> Self {
        let centroid = if boundary.is_empty() {
            Vec3::zeros()
        } else {
            boundary.iter().sum::<Vec3>() / boundary.len() as f64
        };
        let rotation =
            RotationMatrix::from_euler_angles(orientation.x, orientation.y, orientation.z);
        Self {
            boundary,
            orientation,
            systems: Vec::new(),
            coordinate_system: CoordinateSystem::new(centroid, rotation),
            applied_stress: Stress::zero(),
        }
    }

    /// Grain-boundary polygon in the polycrystal frame.
    pub fn boundary(&self) -> &[Vec3] {
        &self.boundary
    }

    /// Orientation as Bunge Euler angles (rad).
    pub fn orientation(&self) -> Vec3 {
        self.orientation
    }

    /// The grain's frame relative to the polycrystal.
    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coordinate_system
    }

    /// Add a slip system.
    pub fn add_system(&mut self, system: SlipSystem) {
        self.systems.push(system);
    }

    /// The slip systems of this grain.
    pub fn systems(&self) -> &[SlipSystem] {
        &self.systems
    }

    /// Mutable access to the slip systems.
    pub fn systems_mut(&mut self) -> &mut [SlipSystem] {
        &mut self.systems
    }

    /// A slip system by index.
    pub fn system(&self, i: usize) -> Option<&SlipSystem> {
        self.systems.get(i)
    }

    /// Number of slip systems.
    pub fn n_systems(&self) -> usize {
        self.systems.len()
    }

    /// Applied stress in the grain frame.
    pub fn applied_stress(&self) -> Stress {
        self.applied_stress
    }

    /// Set the applied stress (grain frame) and rotate it down into
    /// every slip system and plane.
    pub fn set_applied_stress(&mut self, stress: Stress) {
        self.applied_stress = stress;
        for system in &mut self.systems {
            let local = system.coordinate_system().stress_to_local(&stress);
            system.set_applied_stress(local);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_centroid_origin() {
        let boundary = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ];
        let grain = Grain::new(boundary, Vec3::zeros());
        let origin = grain.coordinate_system().origin();
        assert_relative_eq!(origin.x, 1.0);
        assert_relative_eq!(origin.y, 1.0);
        assert_eq!(grain.boundary().len(), 4);
        assert_eq!(grain.orientation(), Vec3::zeros());
        assert_eq!(grain.n_systems(), 0);
    }

    #[test]
    fn test_empty_boundary_sits_at_origin() {
        let grain = Grain::new(Vec::new(), Vec3::zeros());
        assert_relative_eq!(grain.coordinate_system().origin().norm(), 0.0);
    }

    #[test]
    fn test_orientation_rotates_applied_stress() {
        // A grain rotated 90° about z sees a base σ_xx as σ_yy.
        let mut grain = Grain::new(Vec::new(), Vec3::new(std::f64::consts::FRAC_PI_2, 0.0, 0.0));
        grain.add_system(SlipSystem::new(Vec3::x(), Vec3::y(), Vec3::zeros()).unwrap());

        let local = grain
            .coordinate_system()
            .stress_to_local(&Stress::new([1e8, 0.0, 0.0, 0.0, 0.0, 0.0]));
        grain.set_applied_stress(local);
        assert_relative_eq!(grain.applied_stress().yy(), 1e8, epsilon = 1e-4);
        assert_relative_eq!(grain.applied_stress().xx(), 0.0, epsilon = 1e-4);
    }
}
