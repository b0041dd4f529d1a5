//! Nested coordinate systems.
//!
//! The simulation is a tree of local frames: polycrystal → grain →
//! slip system → slip plane, each owning the rotation and translation
//! from its parent. Vectors and tensors are stored in the frame of the
//! level that owns them and converted on demand through these types.
//!
//! Conventions:
//! - A [`RotationMatrix`] takes quantities from the parent frame to the
//!   local frame; its rows are the local triad expressed in the parent
//!   frame. The transpose rotates back.
//! - Tensor rotation is R·σ·Rᵀ towards the local frame and Rᵀ·σ·R back
//!   towards the parent.

use crate::error::{Error, Result};
use crate::types::{Stress, Vec3};
use nalgebra::Matrix3;

/// Tolerance for the orthonormality check on rotation matrices.
const ORTHONORMALITY_TOLERANCE: f64 = 1e-9;

/// An orthonormal rotation between a parent frame and a local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationMatrix(Matrix3<f64>);

impl RotationMatrix {
    /// The identity rotation (local frame coincides with the parent).
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// Build a rotation from a raw matrix, rejecting non-orthonormal input.
    pub fn from_matrix(m: Matrix3<f64>) -> Result<Self> {
        let deviation = (m.transpose() * m - Matrix3::identity()).norm();
        if deviation > ORTHONORMALITY_TOLERANCE {
            return Err(Error::InvalidGeometry(format!(
                "rotation matrix is not orthonormal (RᵀR deviates from I by {deviation:.3e})"
            )));
        }
        Ok(Self(m))
    }

    /// Build the rotation from an ordered pair of orthonormal triads,
    /// parent first: R_ij = local_i · parent_j.
    pub fn from_triads(parent: &[Vec3; 3], local: &[Vec3; 3]) -> Result<Self> {
        let mut m = Matrix3::zeros();
        for i in 0..3 {
            for j in 0..3 {
                m[(i, j)] = local[i].dot(&parent[j]);
            }
        }
        Self::from_matrix(m)
    }

    /// Build the rotation whose rows are the given local triad expressed
    /// in the parent frame.
    pub fn from_local_triad(local: &[Vec3; 3]) -> Result<Self> {
        let parent = [Vec3::x(), Vec3::y(), Vec3::z()];
        Self::from_triads(&parent, local)
    }

    /// Rotation for a crystallographic orientation given as Bunge Euler
    /// angles (φ1, Φ, φ2) in radians, Z-X-Z convention. The rows of the
    /// resulting matrix are the crystal axes expressed in the parent frame.
    pub fn from_euler_angles(phi1: f64, phi: f64, phi2: f64) -> Self {
        let (s1, c1) = phi1.sin_cos();
        let (s, c) = phi.sin_cos();
        let (s2, c2) = phi2.sin_cos();
        Self(Matrix3::new(
            c1 * c2 - s1 * s2 * c,
            s1 * c2 + c1 * s2 * c,
            s2 * s,
            -c1 * s2 - s1 * c2 * c,
            -s1 * s2 + c1 * c2 * c,
            c2 * s,
            s1 * s,
            -c1 * s,
            c,
        ))
    }

    /// The underlying matrix (parent → local).
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Rotate a vector into the local frame.
    pub fn rotate_vector(&self, v: Vec3) -> Vec3 {
        self.0 * v
    }

    /// Rotate a vector back into the parent frame.
    pub fn rotate_vector_back(&self, v: Vec3) -> Vec3 {
        self.0.transpose() * v
    }

    /// Rotate a stress tensor into the local frame (R·σ·Rᵀ).
    pub fn rotate_stress(&self, s: &Stress) -> Stress {
        s.rotated(&self.0)
    }

    /// Rotate a stress tensor back into the parent frame (Rᵀ·σ·R).
    pub fn rotate_stress_back(&self, s: &Stress) -> Stress {
        s.rotated(&self.0.transpose())
    }
}

/// A local frame: rotation and translation relative to a parent frame.
///
/// The root of the hierarchy has no parent; every composite conversion
/// walks an explicit [`FrameChain`], so walking "past" the root simply
/// stops.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateSystem {
    /// Origin of this frame, expressed in the parent frame.
    origin: Vec3,
    /// Rotation taking parent-frame quantities into this frame.
    rotation: RotationMatrix,
}

impl CoordinateSystem {
    /// The base frame: zero origin, identity rotation.
    pub fn base() -> Self {
        Self {
            origin: Vec3::zeros(),
            rotation: RotationMatrix::identity(),
        }
    }

    /// Create a frame at `origin` (parent coordinates) with the given rotation.
    pub fn new(origin: Vec3, rotation: RotationMatrix) -> Self {
        Self { origin, rotation }
    }

    /// Origin of this frame in the parent frame.
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Rotation taking parent-frame quantities into this frame.
    pub fn rotation(&self) -> &RotationMatrix {
        &self.rotation
    }

    /// Rotate a direction vector from this frame into the parent frame.
    pub fn vector_to_parent(&self, v: Vec3) -> Vec3 {
        self.rotation.rotate_vector_back(v)
    }

    /// Rotate a direction vector from the parent frame into this frame.
    pub fn vector_to_local(&self, v: Vec3) -> Vec3 {
        self.rotation.rotate_vector(v)
    }

    /// Convert a point from this frame into the parent frame.
    pub fn point_to_parent(&self, p: Vec3) -> Vec3 {
        self.rotation.rotate_vector_back(p) + self.origin
    }

    /// Convert a point from the parent frame into this frame.
    pub fn point_to_local(&self, p: Vec3) -> Vec3 {
        self.rotation.rotate_vector(p - self.origin)
    }

    /// Express a stress tensor of this frame in the parent frame.
    pub fn stress_to_parent(&self, s: &Stress) -> Stress {
        self.rotation.rotate_stress_back(s)
    }

    /// Express a parent-frame stress tensor in this frame.
    pub fn stress_to_local(&self, s: &Stress) -> Stress {
        self.rotation.rotate_stress(s)
    }
}

/// An ordered root→leaf sequence of frames, used for composite
/// conversions between the base frame and a deeply nested one.
///
/// The hierarchy owns each child frame by value, so chains are built on
/// demand from cheap clones; there are no parent back-references and
/// cycles are structurally impossible.
#[derive(Debug, Clone, Default)]
pub struct FrameChain {
    levels: Vec<CoordinateSystem>,
}

impl FrameChain {
    /// Build a chain from root-most to leaf-most frame.
    pub fn new(levels: Vec<CoordinateSystem>) -> Self {
        Self { levels }
    }

    /// Convert a leaf-frame point up to the base frame.
    pub fn point_to_base(&self, p: Vec3) -> Vec3 {
        self.levels.iter().rev().fold(p, |acc, cs| cs.point_to_parent(acc))
    }

    /// Convert a base-frame point down to the leaf frame.
    pub fn point_to_local(&self, p: Vec3) -> Vec3 {
        self.levels.iter().fold(p, |acc, cs| cs.point_to_local(acc))
    }

    /// Rotate a leaf-frame vector up to the base frame.
    pub fn vector_to_base(&self, v: Vec3) -> Vec3 {
        self.levels.iter().rev().fold(v, |acc, cs| cs.vector_to_parent(acc))
    }

    /// Rotate a base-frame vector down to the leaf frame.
    pub fn vector_to_local(&self, v: Vec3) -> Vec3 {
        self.levels.iter().fold(v, |acc, cs| cs.vector_to_local(acc))
    }

    /// Express a leaf-frame stress tensor in the base frame.
    pub fn stress_to_base(&self, s: &Stress) -> Stress {
        self.levels.iter().rev().fold(*s, |acc, cs| cs.stress_to_parent(&acc))
    }

    /// Express a base-frame stress tensor in the leaf frame.
    pub fn stress_to_local(&self, s: &Stress) -> Stress {
        self.levels.iter().fold(*s, |acc, cs| cs.stress_to_local(&acc))
    }

    /// The accumulated rotation taking base-frame vectors into the leaf frame.
    pub fn rotation_to_local(&self) -> Matrix3<f64> {
        self.levels
            .iter()
            .fold(Matrix3::identity(), |acc, cs| cs.rotation().matrix() * acc)
    }
}
