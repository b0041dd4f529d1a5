//! The defect model.
//!
//! Every entity living on a slip plane is a [`Defect`]: a position in the
//! owning plane's frame plus a kind tag. Kind-specific behaviour (stress
//! field contribution, reaction response) dispatches on the tag, which
//! keeps defects in contiguous storage for the per-step stress loop.
//!
//! The only kind with a non-zero stress field is the edge dislocation.
//! Free surfaces and grain boundaries are bookkeeping defects whose
//! image-stress terms default to zero; [`Defect::stress_field_at`] is the
//! seam where such terms would plug in.

use crate::error::{Error, Result};
use crate::frame::RotationMatrix;
use crate::material::Material;
use crate::source::DislocationSource;
use crate::types::{Stress, Vec3};
use nalgebra::Matrix3;

/// Maximum allowed |b̂·n̂| for a glide dislocation.
const GLIDE_TOLERANCE: f64 = 1e-9;

/// Analytic stress field of an edge dislocation at a point expressed in
/// its local frame (x along b̂, y along n̂, z along ξ̂).
///
/// With K = μ·|b| / (2π·(1−ν)) and r² = x² + y², the non-zero components
/// are:
///
/// - σ_xx = −K·y·(3x² + y²)/r⁴
/// - σ_yy =  K·y·(x² − y²)/r⁴
/// - σ_xy =  K·x·(x² − y²)/r⁴
/// - σ_zz =  ν·(σ_xx + σ_yy)
///
/// At r = 0 the field is taken as zero so a defect never sees its own
/// singularity in the superposition.
fn edge_stress_local(p: Vec3, prefactor: f64, poissons_ratio: f64) -> Stress {
    let (x, y) = (p.x, p.y);
    let r2 = x * x + y * y;
    if r2 == 0.0 {
        return Stress::zero();
    }
    let r4 = r2 * r2;
    let sxx = -prefactor * y * (3.0 * x * x + y * y) / r4;
    let syy = prefactor * y * (x * x - y * y) / r4;
    let sxy = prefactor * x * (x * x - y * y) / r4;
    let szz = poissons_ratio * (sxx + syy);
    Stress::new([sxx, syy, szz, sxy, 0.0, 0.0])
}

/// An edge dislocation constrained to glide on its slip plane.
#[derive(Debug, Clone)]
pub struct Dislocation {
    burgers: Vec3,
    line: Vec3,
    burgers_magnitude: f64,
    mobile: bool,
    /// Rotation from the slip-plane frame into the dislocation's local
    /// frame (x along b̂, y along n̂, z along ξ̂). Invariant in the
    /// absence of lattice rotation.
    rotation: RotationMatrix,
    stress: Stress,
    force: Vec3,
    velocity: Vec3,
    stresses: Vec<Stress>,
    forces: Vec<Vec3>,
    velocities: Vec<Vec3>,
}

impl Dislocation {
    /// Create a dislocation from its Burgers vector, line vector and
    /// mobility, all expressed in the slip-plane frame whose normal is
    /// `plane_normal`.
    ///
    /// # Errors
    ///
    /// Rejects zero Burgers or line vectors, a non-positive Burgers
    /// magnitude, a Burgers vector leaving the glide plane (b̂·n̂ ≠ 0),
    /// and a (b̂, n̂, ξ̂) triad that is not orthonormal.
    pub fn new(
        burgers: Vec3,
        line: Vec3,
        burgers_magnitude: f64,
        mobile: bool,
        plane_normal: Vec3,
    ) -> Result<Self> {
        if burgers.norm() == 0.0 {
            return Err(Error::InvalidGeometry("zero Burgers vector".into()));
        }
        if line.norm() == 0.0 {
            return Err(Error::InvalidGeometry("zero line vector".into()));
        }
        if burgers_magnitude <= 0.0 {
            return Err(Error::InvalidGeometry(
                "Burgers vector magnitude must be positive".into(),
            ));
        }
        let b_hat = burgers.normalize();
        let n_hat = plane_normal.normalize();
        let xi_hat = line.normalize();
        if b_hat.dot(&n_hat).abs() > GLIDE_TOLERANCE {
            return Err(Error::InvalidGeometry(
                "Burgers vector must lie in the slip plane".into(),
            ));
        }
        let rotation = RotationMatrix::from_local_triad(&[b_hat, n_hat, xi_hat])?;
        Ok(Self {
            burgers,
            line: xi_hat,
            burgers_magnitude,
            mobile,
            rotation,
            stress: Stress::zero(),
            force: Vec3::zeros(),
            velocity: Vec3::zeros(),
            stresses: Vec::new(),
            forces: Vec::new(),
            velocities: Vec::new(),
        })
    }

    /// Burgers vector in the slip-plane frame.
    pub fn burgers(&self) -> Vec3 {
        self.burgers
    }

    /// Unit line vector in the slip-plane frame.
    pub fn line(&self) -> Vec3 {
        self.line
    }

    /// Magnitude of the Burgers vector in metres.
    pub fn burgers_magnitude(&self) -> f64 {
        self.burgers_magnitude
    }

    /// Whether the dislocation is free to glide.
    pub fn is_mobile(&self) -> bool {
        self.mobile
    }

    /// Pin the dislocation; its velocity is forced to zero from now on.
    pub fn pin(&mut self) {
        self.mobile = false;
    }

    /// Release a pinned dislocation.
    pub fn release(&mut self) {
        self.mobile = true;
    }

    /// Rotation from the slip-plane frame into the dislocation frame.
    pub fn rotation(&self) -> &RotationMatrix {
        &self.rotation
    }

    /// Stress field at a point given in the dislocation's local frame.
    pub fn stress_field_local(&self, p: Vec3, material: &Material) -> Stress {
        edge_stress_local(
            p,
            material.stress_prefactor(self.burgers_magnitude),
            material.poissons_ratio,
        )
    }

    /// Stress field at a point given relative to the dislocation, in the
    /// slip-plane frame. The result is expressed in the slip-plane frame.
    pub fn stress_field(&self, relative: Vec3, material: &Material) -> Stress {
        let local = self.stress_field_local(self.rotation.rotate_vector(relative), material);
        self.rotation.rotate_stress_back(&local)
    }

    /// Peach–Koehler force F = (σ·b) × ξ under the static friction
    /// threshold: when the resolved shear stress |σ_xy| in the
    /// dislocation's local frame is below `tau_crss`, the force is zero.
    /// The force is returned in the frame of `sigma`.
    pub fn force_peach_koehler(&self, sigma: &Stress, tau_crss: f64) -> Vec3 {
        let resolved = self.rotation.rotate_stress(sigma).xy();
        if resolved.abs() < tau_crss {
            return Vec3::zeros();
        }
        (sigma.to_matrix() * self.burgers).cross(&self.line)
    }

    /// Update the current stress, force and velocity. History is appended
    /// separately at the end of a successful step.
    pub fn set_state(&mut self, stress: Stress, force: Vec3, velocity: Vec3) {
        self.stress = stress;
        self.force = force;
        self.velocity = velocity;
    }

    /// Append the current stress, force and velocity to the per-iteration
    /// histories.
    pub fn record_history(&mut self) {
        self.stresses.push(self.stress);
        self.forces.push(self.force);
        self.velocities.push(self.velocity);
    }

    /// Total stress in the current iteration.
    pub fn stress(&self) -> Stress {
        self.stress
    }

    /// Peach–Koehler force in the current iteration.
    pub fn force(&self) -> Vec3 {
        self.force
    }

    /// Velocity in the current iteration.
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Total stress at iteration `i`; zero for an out-of-range index.
    pub fn stress_at_iteration(&self, i: usize) -> Stress {
        self.stresses.get(i).copied().unwrap_or_else(Stress::zero)
    }

    /// Force at iteration `i`; zero for an out-of-range index.
    pub fn force_at_iteration(&self, i: usize) -> Vec3 {
        self.forces.get(i).copied().unwrap_or_else(Vec3::zeros)
    }

    /// Velocity at iteration `i`; zero for an out-of-range index.
    pub fn velocity_at_iteration(&self, i: usize) -> Vec3 {
        self.velocities.get(i).copied().unwrap_or_else(Vec3::zeros)
    }

    /// Number of recorded iterations.
    pub fn history_len(&self) -> usize {
        self.stresses.len()
    }

    /// Truncate the histories to the first `len` iterations.
    pub fn truncate_history(&mut self, len: usize) {
        self.stresses.truncate(len);
        self.forces.truncate(len);
        self.velocities.truncate(len);
    }
}

/// Kind tag of a defect, with kind-specific payload.
#[derive(Debug, Clone)]
pub enum DefectKind {
    /// A free surface bounding the glide line.
    FreeSurface,
    /// A grain boundary bounding the glide line; pins approaching
    /// dislocations.
    GrainBoundary,
    /// A point obstacle; pins approaching dislocations.
    Obstacle,
    /// A glissile edge dislocation.
    Dislocation(Dislocation),
    /// A Frank–Read dislocation source.
    Source(DislocationSource),
}

/// A defect on a slip plane: a position in the plane's frame plus a kind.
#[derive(Debug, Clone)]
pub struct Defect {
    position: Vec3,
    kind: DefectKind,
}

impl Defect {
    /// A free-surface sentinel at `position`.
    pub fn free_surface(position: Vec3) -> Self {
        Self {
            position,
            kind: DefectKind::FreeSurface,
        }
    }

    /// A grain-boundary sentinel at `position`.
    pub fn grain_boundary(position: Vec3) -> Self {
        Self {
            position,
            kind: DefectKind::GrainBoundary,
        }
    }

    /// A point obstacle at `position`.
    pub fn obstacle(position: Vec3) -> Self {
        Self {
            position,
            kind: DefectKind::Obstacle,
        }
    }

    /// A dislocation at `position`.
    pub fn dislocation(position: Vec3, dislocation: Dislocation) -> Self {
        Self {
            position,
            kind: DefectKind::Dislocation(dislocation),
        }
    }

    /// A dislocation source at `position`.
    pub fn source(position: Vec3, source: DislocationSource) -> Self {
        Self {
            position,
            kind: DefectKind::Source(source),
        }
    }

    /// Position in the owning slip plane's frame.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Move the defect to `position` (plane frame).
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// The kind tag.
    pub fn kind(&self) -> &DefectKind {
        &self.kind
    }

    /// A short label for the kind, used by the statistics writer.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            DefectKind::FreeSurface => "free_surface",
            DefectKind::GrainBoundary => "grain_boundary",
            DefectKind::Obstacle => "obstacle",
            DefectKind::Dislocation(_) => "dislocation",
            DefectKind::Source(_) => "source",
        }
    }

    /// Whether this defect is a dislocation.
    pub fn is_dislocation(&self) -> bool {
        matches!(self.kind, DefectKind::Dislocation(_))
    }

    /// The dislocation payload, if any.
    pub fn as_dislocation(&self) -> Option<&Dislocation> {
        match &self.kind {
            DefectKind::Dislocation(d) => Some(d),
            _ => None,
        }
    }

    /// Mutable dislocation payload, if any.
    pub fn as_dislocation_mut(&mut self) -> Option<&mut Dislocation> {
        match &mut self.kind {
            DefectKind::Dislocation(d) => Some(d),
            _ => None,
        }
    }

    /// The source payload, if any.
    pub fn as_source(&self) -> Option<&DislocationSource> {
        match &self.kind {
            DefectKind::Source(s) => Some(s),
            _ => None,
        }
    }

    /// Mutable source payload, if any.
    pub fn as_source_mut(&mut self) -> Option<&mut DislocationSource> {
        match &mut self.kind {
            DefectKind::Source(s) => Some(s),
            _ => None,
        }
    }

    /// Stress field of this defect at the point `p` (plane frame).
    ///
    /// Only dislocations carry a field; the image-stress terms of free
    /// surfaces and grain boundaries default to zero and would be added
    /// here.
    pub fn stress_field_at(&self, p: Vec3, material: &Material) -> Stress {
        match &self.kind {
            DefectKind::Dislocation(d) => d.stress_field(p - self.position, material),
            _ => Stress::zero(),
        }
    }

    /// Current velocity: non-zero only for mobile dislocations.
    pub fn velocity(&self) -> Vec3 {
        match &self.kind {
            DefectKind::Dislocation(d) => d.velocity(),
            _ => Vec3::zeros(),
        }
    }
}

/// A dislocation's stress field detached from the hierarchy, with its
/// position and orientation expressed in the base frame.
///
/// Collected once per step by the polycrystal so that receivers on one
/// slip plane can sum the fields of dislocations living on every other
/// plane without holding borrows across the tree.
#[derive(Debug, Clone)]
pub struct FieldSource {
    position: Vec3,
    rotation: Matrix3<f64>,
    burgers_magnitude: f64,
}

impl FieldSource {
    /// Build a detached field source from a base-frame position, the
    /// accumulated base→dislocation rotation, and |b|.
    pub fn new(position: Vec3, rotation: Matrix3<f64>, burgers_magnitude: f64) -> Self {
        Self {
            position,
            rotation,
            burgers_magnitude,
        }
    }

    /// Stress at the base-frame point `p`, expressed in the base frame.
    pub fn stress_at(&self, p: Vec3, material: &Material) -> Stress {
        let local_p = self.rotation * (p - self.position);
        let local = edge_stress_local(
            local_p,
            material.stress_prefactor(self.burgers_magnitude),
            material.poissons_ratio,
        );
        local.rotated(&self.rotation.transpose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn edge_along_x() -> Dislocation {
        Dislocation::new(
            Vec3::new(2.5e-10, 0.0, 0.0),
            Vec3::z(),
            2.5e-10,
            true,
            Vec3::y(),
        )
        .unwrap()
    }

    fn material() -> Material {
        Material::new(8e10, 0.3, 1e-4, 1e7).unwrap()
    }

    #[test]
    fn test_stress_field_zero_at_core() {
        let d = edge_along_x();
        let s = d.stress_field_local(Vec3::zeros(), &material());
        assert_eq!(s, Stress::zero());
    }

    #[test]
    fn test_stress_field_on_glide_plane() {
        // On y = 0 the only non-zero in-plane component is σ_xy = K/x.
        let d = edge_along_x();
        let mat = material();
        let x = 1e-7;
        let s = d.stress_field_local(Vec3::new(x, 0.0, 0.0), &mat);
        let k = mat.stress_prefactor(d.burgers_magnitude());
        assert_relative_eq!(s.xy(), k / x, max_relative = 1e-12);
        assert_relative_eq!(s.xx(), 0.0, epsilon = 1e-10);
        assert_relative_eq!(s.yy(), 0.0, epsilon = 1e-10);
        assert_relative_eq!(s.zz(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_stress_field_plane_strain_zz() {
        let d = edge_along_x();
        let mat = material();
        let s = d.stress_field_local(Vec3::new(3e-8, -2e-8, 0.0), &mat);
        assert_relative_eq!(s.zz(), mat.poissons_ratio * (s.xx() + s.yy()), max_relative = 1e-12);
        assert_relative_eq!(s.yz(), 0.0, epsilon = 1e-30);
        assert_relative_eq!(s.xz(), 0.0, epsilon = 1e-30);
    }

    #[test]
    fn test_stress_field_shear_antisymmetry() {
        let d = edge_along_x();
        let mat = material();
        let a = d.stress_field_local(Vec3::new(5e-8, 0.0, 0.0), &mat);
        let b = d.stress_field_local(Vec3::new(-5e-8, 0.0, 0.0), &mat);
        assert_relative_eq!(a.xy(), -b.xy(), max_relative = 1e-12);
    }

    #[test]
    fn test_force_zero_below_threshold() {
        let d = edge_along_x();
        let tau_crss = 1e7;
        let sigma = Stress::new([0.0, 0.0, 0.0, 0.5 * tau_crss, 0.0, 0.0]);
        assert_eq!(d.force_peach_koehler(&sigma, tau_crss), Vec3::zeros());
    }

    #[test]
    fn test_force_glide_component() {
        // For pure shear σ_xy above the threshold, F_x = σ_xy·|b|.
        let d = edge_along_x();
        let sigma_xy = 2e7;
        let sigma = Stress::new([0.0, 0.0, 0.0, sigma_xy, 0.0, 0.0]);
        let f = d.force_peach_koehler(&sigma, 1e7);
        assert_relative_eq!(f.x, sigma_xy * 2.5e-10, max_relative = 1e-12);
        assert_relative_eq!(f.y, 0.0, epsilon = 1e-30);
        assert_relative_eq!(f.z, 0.0, epsilon = 1e-30);
    }

    #[test]
    fn test_burgers_out_of_plane_rejected() {
        let result = Dislocation::new(
            Vec3::new(0.0, 2.5e-10, 0.0),
            Vec3::z(),
            2.5e-10,
            true,
            Vec3::y(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_degenerate_vectors_rejected() {
        assert!(Dislocation::new(Vec3::zeros(), Vec3::z(), 2.5e-10, true, Vec3::y()).is_err());
        assert!(
            Dislocation::new(Vec3::x(), Vec3::zeros(), 2.5e-10, true, Vec3::y()).is_err()
        );
        // Line vector not perpendicular to the Burgers vector.
        assert!(Dislocation::new(Vec3::x(), Vec3::x(), 2.5e-10, true, Vec3::y()).is_err());
    }

    #[test]
    fn test_history_out_of_range_is_zero() {
        let mut d = edge_along_x();
        d.set_state(
            Stress::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            Vec3::x(),
            Vec3::x(),
        );
        d.record_history();
        assert_eq!(d.history_len(), 1);
        assert_relative_eq!(d.stress_at_iteration(0).xx(), 1.0);
        assert_eq!(d.stress_at_iteration(5), Stress::zero());
        assert_eq!(d.force_at_iteration(5), Vec3::zeros());
        assert_eq!(d.velocity_at_iteration(5), Vec3::zeros());
        d.truncate_history(0);
        assert_eq!(d.history_len(), 0);
    }

    #[test]
    fn test_non_dislocation_kinds_carry_no_field() {
        let mat = material();
        let probe = Vec3::new(1e-8, 0.0, 0.0);
        for defect in [
            Defect::free_surface(Vec3::zeros()),
            Defect::grain_boundary(Vec3::zeros()),
            Defect::obstacle(Vec3::zeros()),
        ] {
            assert_eq!(defect.stress_field_at(probe, &mat), Stress::zero());
            assert_eq!(defect.velocity(), Vec3::zeros());
        }
        assert_eq!(Defect::free_surface(Vec3::zeros()).kind_label(), "free_surface");
        assert_eq!(Defect::obstacle(Vec3::zeros()).kind_label(), "obstacle");
    }

    #[test]
    fn test_pin_and_release() {
        let mut d = edge_along_x();
        assert!(d.is_mobile());
        d.pin();
        assert!(!d.is_mobile());
        d.release();
        assert!(d.is_mobile());
    }

    #[test]
    fn test_detached_field_matches_plane_field() {
        // With an identity chain, a FieldSource must reproduce the
        // in-plane stress field exactly.
        let d = edge_along_x();
        let mat = material();
        let center = Vec3::new(1e-7, 0.0, 0.0);
        let probe = Vec3::new(3e-7, 5e-8, 0.0);
        let defect = Defect::dislocation(center, d.clone());
        let expected = defect.stress_field_at(probe, &mat);
        let detached = FieldSource::new(center, *d.rotation().matrix(), d.burgers_magnitude());
        let got = detached.stress_at(probe, &mat);
        for i in 0..6 {
            assert_relative_eq!(got.0[i], expected.0[i], max_relative = 1e-12, epsilon = 1e-3);
        }
    }
}
