//! Core data types for dislocation dynamics.
//!
//! This module defines the fundamental types used throughout dd2d:
//! - Geometric primitives (points, vectors)
//! - The symmetric stress tensor and its frame rotations

use nalgebra::{Matrix3, Vector3, Vector6};
use std::ops::{Add, AddAssign, Mul};

/// A point in 3D space.
pub type Point3 = Vector3<f64>;

/// A 3D vector (Burgers vector, force, velocity, etc.).
pub type Vec3 = Vector3<f64>;

/// Symmetric stress tensor in Voigt notation.
///
/// Components are ordered as: [σ_xx, σ_yy, σ_zz, σ_xy, σ_yz, σ_xz].
/// The tensor is persisted in one frame at a time; changing frame goes
/// through [`Stress::rotated`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stress(pub Vector6<f64>);

impl Stress {
    /// Create a new stress tensor from Voigt components.
    pub fn new(components: [f64; 6]) -> Self {
        Self(Vector6::from_row_slice(&components))
    }

    /// Zero stress state.
    pub fn zero() -> Self {
        Self(Vector6::zeros())
    }

    /// Build a stress tensor from a 3x3 matrix, symmetrizing the
    /// off-diagonal pairs.
    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        Self::new([
            m[(0, 0)],
            m[(1, 1)],
            m[(2, 2)],
            0.5 * (m[(0, 1)] + m[(1, 0)]),
            0.5 * (m[(1, 2)] + m[(2, 1)]),
            0.5 * (m[(0, 2)] + m[(2, 0)]),
        ])
    }

    /// Extract the full 3x3 symmetric stress matrix.
    pub fn to_matrix(&self) -> Matrix3<f64> {
        let s = &self.0;
        Matrix3::new(s[0], s[3], s[5], s[3], s[1], s[4], s[5], s[4], s[2])
    }

    /// Normal component σ_xx.
    pub fn xx(&self) -> f64 {
        self.0[0]
    }

    /// Normal component σ_yy.
    pub fn yy(&self) -> f64 {
        self.0[1]
    }

    /// Normal component σ_zz.
    pub fn zz(&self) -> f64 {
        self.0[2]
    }

    /// Shear component σ_xy.
    pub fn xy(&self) -> f64 {
        self.0[3]
    }

    /// Shear component σ_yz.
    pub fn yz(&self) -> f64 {
        self.0[4]
    }

    /// Shear component σ_xz.
    pub fn xz(&self) -> f64 {
        self.0[5]
    }

    /// Express the tensor in the frame reached by the rotation `r`.
    ///
    /// Computes σ' = R·σ·Rᵀ through the 3x3 form. For a rotation whose
    /// rows are the new frame's axes in the old frame, this takes the
    /// tensor from the old frame to the new one; passing the transpose
    /// rotates back.
    pub fn rotated(&self, r: &Matrix3<f64>) -> Self {
        Self::from_matrix(&(r * self.to_matrix() * r.transpose()))
    }

    /// Compute von Mises equivalent stress.
    pub fn von_mises(&self) -> f64 {
        let s = &self.0;
        let term1 = (s[0] - s[1]).powi(2) + (s[1] - s[2]).powi(2) + (s[2] - s[0]).powi(2);
        let term2 = 6.0 * (s[3].powi(2) + s[4].powi(2) + s[5].powi(2));
        ((term1 + term2) / 2.0).sqrt()
    }
}

impl Add for Stress {
    type Output = Stress;

    fn add(self, rhs: Stress) -> Stress {
        Stress(self.0 + rhs.0)
    }
}

impl AddAssign for Stress {
    fn add_assign(&mut self, rhs: Stress) {
        self.0 += rhs.0;
    }
}

impl Mul<f64> for Stress {
    type Output = Stress;

    fn mul(self, rhs: f64) -> Stress {
        Stress(self.0 * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_matrix_round_trip() {
        let stress = Stress::new([100.0, 200.0, 300.0, 10.0, 20.0, 30.0]);
        let back = Stress::from_matrix(&stress.to_matrix());
        for i in 0..6 {
            assert_relative_eq!(back.0[i], stress.0[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_from_matrix_symmetrizes() {
        let m = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let stress = Stress::from_matrix(&m);
        assert_relative_eq!(stress.xy(), 3.0, epsilon = 1e-15);
        assert_relative_eq!(stress.yz(), 7.0, epsilon = 1e-15);
        assert_relative_eq!(stress.xz(), 5.0, epsilon = 1e-15);
    }

    #[test]
    fn test_rotation_quarter_turn_about_z() {
        // Rotating a pure σ_xx state by 90° about z turns it into pure σ_yy.
        let stress = Stress::new([100.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let r = Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let rotated = stress.rotated(&r);
        assert_relative_eq!(rotated.xx(), 0.0, epsilon = 1e-10);
        assert_relative_eq!(rotated.yy(), 100.0, epsilon = 1e-10);
        assert_relative_eq!(rotated.xy(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rotation_round_trip() {
        let stress = Stress::new([100.0, -50.0, 30.0, 10.0, -20.0, 5.0]);
        let angle = 0.7_f64;
        let (s, c) = angle.sin_cos();
        let r = Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0);
        let back = stress.rotated(&r).rotated(&r.transpose());
        for i in 0..6 {
            assert_relative_eq!(back.0[i], stress.0[i], epsilon = 1e-12, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_von_mises_pure_shear() {
        // Pure shear: von Mises = √3 · τ.
        let stress = Stress::new([0.0, 0.0, 0.0, 100.0, 0.0, 0.0]);
        assert_relative_eq!(stress.von_mises(), 100.0 * 3.0_f64.sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn test_superposition_operators() {
        let a = Stress::new([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Stress::new([10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
        let sum = a + b * 0.5;
        assert_relative_eq!(sum.xx(), 6.0, epsilon = 1e-15);
        assert_relative_eq!(sum.xz(), 36.0, epsilon = 1e-15);
    }
}
