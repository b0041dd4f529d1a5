//! Slip-plane evolution.
//!
//! A slip plane restricts its defects to a 1-D glide line between two
//! sentinel defects at the extremities. The plane frame has x along the
//! slip direction, y along the plane normal and z along the line
//! direction, so every dislocation position reduces to a signed x
//! coordinate and the defect list stays sorted by it.
//!
//! The per-iteration pipeline is: stress superposition over all defects,
//! Peach–Koehler forces and drag-law velocities, the collision-avoiding
//! time increment, translation, source emission, and local reactions.

use crate::defect::{Defect, DefectKind, Dislocation, FieldSource};
use crate::error::{Error, Result};
use crate::frame::{CoordinateSystem, FrameChain, RotationMatrix};
use crate::material::Material;
use crate::rng::GaussianSampler;
use crate::source::DislocationSource;
use crate::types::{Stress, Vec3};
use rayon::prelude::*;
use tracing::{debug, warn};

/// Relative tolerance for b₁ + b₂ = 0 in the annihilation test.
const BURGERS_CANCEL_TOLERANCE: f64 = 1e-6;

/// Tolerance for the glide line lying in the plane.
const IN_PLANE_TOLERANCE: f64 = 1e-9;

/// A slip plane: a bounded glide line carrying a sorted defect
/// population.
#[derive(Debug, Clone)]
pub struct SlipPlane {
    extremities: [Vec3; 2],
    normal: Vec3,
    coordinate_system: CoordinateSystem,
    /// Defects sorted by signed position along the slip direction; the
    /// first and last entries are the extremity sentinels.
    defects: Vec<Defect>,
    /// Signed positions of the two sentinels along the slip direction.
    bounds: (f64, f64),
    /// Externally applied stress, expressed in the plane frame.
    applied_stress: Stress,
    /// Time increment chosen for this plane in the current iteration.
    time_increment: f64,
}

impl SlipPlane {
    /// Create a slip plane from its two extremity points, plane normal
    /// and origin, all expressed in the parent frame. The extremities
    /// become grain-boundary sentinels bounding all motion.
    ///
    /// # Errors
    ///
    /// Rejects a zero glide direction or normal and a glide line that
    /// does not lie in the plane.
    pub fn new(extremity_0: Vec3, extremity_1: Vec3, normal: Vec3, origin: Vec3) -> Result<Self> {
        let glide = extremity_1 - extremity_0;
        if glide.norm() == 0.0 {
            return Err(Error::InvalidGeometry("slip direction is zero".into()));
        }
        if normal.norm() == 0.0 {
            return Err(Error::InvalidGeometry("plane normal is zero".into()));
        }
        let x_hat = glide.normalize();
        let y_hat = normal.normalize();
        if x_hat.dot(&y_hat).abs() > IN_PLANE_TOLERANCE {
            return Err(Error::InvalidGeometry(
                "glide line does not lie in the slip plane".into(),
            ));
        }
        let z_hat = x_hat.cross(&y_hat);
        let rotation = RotationMatrix::from_local_triad(&[x_hat, y_hat, z_hat])?;
        let coordinate_system = CoordinateSystem::new(origin, rotation);

        let e0_local = coordinate_system.point_to_local(extremity_0);
        let e1_local = coordinate_system.point_to_local(extremity_1);
        let bounds = (e0_local.x, e1_local.x);
        let defects = vec![
            Defect::grain_boundary(e0_local),
            Defect::grain_boundary(e1_local),
        ];

        Ok(Self {
            extremities: [extremity_0, extremity_1],
            normal: y_hat,
            coordinate_system,
            defects,
            bounds,
            applied_stress: Stress::zero(),
            time_increment: 0.0,
        })
    }

    /// Re-express this plane's frame relative to a new parent frame
    /// (given in the current parent's coordinates). Used when a plane
    /// loaded in grain coordinates is nested under a slip system. Defect
    /// positions live in the plane frame and are unaffected.
    pub fn reparent(&mut self, parent: &CoordinateSystem) -> Result<()> {
        let origin = parent.point_to_local(self.coordinate_system.origin());
        let rotation = RotationMatrix::from_matrix(
            self.coordinate_system.rotation().matrix() * parent.rotation().matrix().transpose(),
        )?;
        self.coordinate_system = CoordinateSystem::new(origin, rotation);
        self.extremities = [
            parent.point_to_local(self.extremities[0]),
            parent.point_to_local(self.extremities[1]),
        ];
        self.normal = parent.vector_to_local(self.normal);
        Ok(())
    }

    /// The two extremity points in the parent frame.
    pub fn extremities(&self) -> &[Vec3; 2] {
        &self.extremities
    }

    /// Unit plane normal in the parent frame.
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    /// The plane's frame relative to its parent.
    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coordinate_system
    }

    /// Unit slip direction expressed in the parent frame.
    pub fn slip_direction(&self) -> Vec3 {
        self.coordinate_system.vector_to_parent(Vec3::x())
    }

    /// The defect list, sorted by position along the slip direction.
    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    /// A defect by index.
    pub fn defect(&self, i: usize) -> Option<&Defect> {
        self.defects.get(i)
    }

    /// Mutable access to the defects, for direct state injection. The
    /// sorted order is restored on the next [`SlipPlane::advance`].
    pub fn defects_mut(&mut self) -> &mut [Defect] {
        &mut self.defects
    }

    /// Number of defects, sentinels included.
    pub fn n_defects(&self) -> usize {
        self.defects.len()
    }

    /// Number of dislocations on the plane.
    pub fn n_dislocations(&self) -> usize {
        self.defects.iter().filter(|d| d.is_dislocation()).count()
    }

    /// Applied stress in the plane frame.
    pub fn applied_stress(&self) -> Stress {
        self.applied_stress
    }

    /// Set the applied stress, already expressed in the plane frame.
    pub fn set_applied_stress(&mut self, stress: Stress) {
        self.applied_stress = stress;
    }

    /// Time increment chosen for this plane in the current iteration.
    pub fn time_increment(&self) -> f64 {
        self.time_increment
    }

    /// Record the time increment the polycrystal selected.
    pub fn set_time_increment(&mut self, dt: f64) {
        self.time_increment = dt;
    }

    /// Insert a defect into the sorted list.
    ///
    /// # Errors
    ///
    /// Rejects positions at or beyond the extremity sentinels.
    pub fn insert_defect(&mut self, defect: Defect) -> Result<()> {
        let x = defect.position().x;
        if x <= self.bounds.0 || x >= self.bounds.1 {
            return Err(Error::InvalidGeometry(format!(
                "defect position {x:.6e} outside the slip plane extremities [{:.6e}, {:.6e}]",
                self.bounds.0, self.bounds.1
            )));
        }
        let idx = self
            .defects
            .partition_point(|existing| existing.position().x <= x);
        self.defects.insert(idx, defect);
        Ok(())
    }

    /// Build and insert a dislocation. Vectors are given in the plane
    /// frame; the plane normal used for the glide check is the frame's
    /// y axis.
    pub fn insert_dislocation(
        &mut self,
        position: Vec3,
        burgers: Vec3,
        line: Vec3,
        burgers_magnitude: f64,
        mobile: bool,
    ) -> Result<()> {
        let dislocation = Dislocation::new(burgers, line, burgers_magnitude, mobile, Vec3::y())?;
        self.insert_defect(Defect::dislocation(position, dislocation))
    }

    /// Build and insert a dislocation source.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_source(
        &mut self,
        position: Vec3,
        burgers: Vec3,
        line: Vec3,
        burgers_magnitude: f64,
        tau_critical: f64,
        iterations_required: u32,
        half_spacing: f64,
    ) -> Result<()> {
        let source = DislocationSource::new(
            burgers,
            line,
            burgers_magnitude,
            tau_critical,
            iterations_required,
            half_spacing,
            Vec3::y(),
        )?;
        self.insert_defect(Defect::source(position, source))
    }

    /// Total stress experienced by defect `i`: the applied stress plus
    /// the field of every other defect on this plane, all in the plane
    /// frame. Self-interaction is skipped.
    pub fn total_stress_at(&self, i: usize, material: &Material) -> Stress {
        let p = self.defects[i].position();
        let mut sigma = self.applied_stress;
        for (j, defect) in self.defects.iter().enumerate() {
            if j != i {
                sigma += defect.stress_field_at(p, material);
            }
        }
        sigma
    }

    /// Total stress at every defect, including the fields of dislocations
    /// on other planes (`externals`, given in the base frame together
    /// with this plane's root→leaf chain).
    ///
    /// Receivers are independent, so the outer loop is parallel; each
    /// receiver's sum stays serial so the result is bit-identical to a
    /// serial pass.
    pub fn compute_total_stresses(
        &self,
        material: &Material,
        externals: &[FieldSource],
        chain: &FrameChain,
    ) -> Vec<Stress> {
        (0..self.defects.len())
            .into_par_iter()
            .map(|i| {
                let mut sigma = self.total_stress_at(i, material);
                if !externals.is_empty() {
                    let p_base = chain.point_to_base(self.defects[i].position());
                    let mut external = Stress::zero();
                    for source in externals {
                        external += source.stress_at(p_base, material);
                    }
                    sigma += chain.stress_to_local(&external);
                }
                sigma
            })
            .collect()
    }

    /// Compute every dislocation's total stress, Peach–Koehler force and
    /// drag-law velocity, storing them as the current state.
    pub fn update_dynamics(
        &mut self,
        material: &Material,
        externals: &[FieldSource],
        chain: &FrameChain,
    ) {
        let stresses = self.compute_total_stresses(material, externals, chain);
        for (defect, sigma) in self.defects.iter_mut().zip(stresses) {
            if let Some(d) = defect.as_dislocation_mut() {
                let force = d.force_peach_koehler(&sigma, material.crss);
                let velocity = if d.is_mobile() {
                    Vec3::new(force.x / material.drag_coefficient, 0.0, 0.0)
                } else {
                    Vec3::zeros()
                };
                d.set_state(sigma, force, velocity);
            }
        }
    }

    /// Drag-law velocity of defect `i`: v = F/B projected onto the slip
    /// direction. Pinned dislocations and non-dislocation kinds return
    /// zero.
    pub fn velocity_of(&self, i: usize, material: &Material) -> Vec3 {
        match self.defects[i].as_dislocation() {
            Some(d) if d.is_mobile() => {
                Vec3::new(d.force().x / material.drag_coefficient, 0.0, 0.0)
            }
            _ => Vec3::zeros(),
        }
    }

    /// Largest time increment such that no closing pair of adjacent
    /// defects approaches within `min_distance`, capped at `dt_max`.
    ///
    /// # Errors
    ///
    /// Returns `TimeStepUnderflow` when a closing pair is already at or
    /// inside `min_distance`, i.e. no positive increment exists.
    pub fn ideal_time_increment(&self, min_distance: f64, dt_max: f64) -> Result<f64> {
        let mut dt = dt_max;
        for pair in self.defects.windows(2) {
            let closing = pair[0].velocity().x - pair[1].velocity().x;
            if closing <= 0.0 {
                continue;
            }
            let gap = pair[1].position().x - pair[0].position().x - min_distance;
            if gap <= 0.0 {
                return Err(Error::TimeStepUnderflow {
                    left: pair[0].position().x,
                    right: pair[1].position().x,
                    closing_speed: closing,
                });
            }
            dt = dt.min(gap / closing);
        }
        Ok(dt.max(0.0))
    }

    /// Translate every mobile defect by v·Δt along the slip direction,
    /// restore the sorted order, and cull defects that reached or
    /// crossed an extremity sentinel. Returns the number culled.
    pub fn advance(&mut self, dt: f64) -> usize {
        for defect in &mut self.defects {
            let v = defect.velocity().x;
            if v != 0.0 {
                let mut p = defect.position();
                p.x += v * dt;
                defect.set_position(p);
            }
        }
        self.defects.sort_by(|a, b| {
            a.position()
                .x
                .partial_cmp(&b.position().x)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let (lo, hi) = self.bounds;
        let before = self.defects.len();
        self.defects.retain(|d| match d.kind() {
            DefectKind::FreeSurface | DefectKind::GrainBoundary => true,
            _ => d.position().x > lo && d.position().x < hi,
        });
        let culled = before - self.defects.len();
        if culled > 0 {
            debug!(culled, "defects left the slip plane");
        }
        culled
    }

    /// Evaluate every source's resolved shear stress, integrate the
    /// emission criterion, and emit dipoles. Returns the number of
    /// dipoles emitted.
    ///
    /// The emission offset is the source's half-spacing plus an optional
    /// Gaussian jitter (`jitter` is the standard deviation in metres;
    /// zero keeps emission fully deterministic).
    pub fn check_sources(
        &mut self,
        material: &Material,
        externals: &[FieldSource],
        chain: &FrameChain,
        sampler: &mut GaussianSampler,
        jitter: f64,
    ) -> Result<usize> {
        struct Emission {
            position: Vec3,
            burgers: Vec3,
            line: Vec3,
            burgers_magnitude: f64,
            half_spacing: f64,
        }

        let mut emissions: Vec<Emission> = Vec::new();
        for i in 0..self.defects.len() {
            if self.defects[i].as_source().is_none() {
                continue;
            }
            let mut sigma = self.total_stress_at(i, material);
            if !externals.is_empty() {
                let p_base = chain.point_to_base(self.defects[i].position());
                let mut external = Stress::zero();
                for source in externals {
                    external += source.stress_at(p_base, material);
                }
                sigma += chain.stress_to_local(&external);
            }
            let position = self.defects[i].position();
            if let Some(src) = self.defects[i].as_source_mut() {
                let tau = src.rotation().rotate_stress(&sigma).xy();
                if src.record_resolved_stress(tau) {
                    emissions.push(Emission {
                        position,
                        burgers: src.burgers(),
                        line: src.line(),
                        burgers_magnitude: src.burgers_magnitude(),
                        half_spacing: src.half_spacing(),
                    });
                }
            }
        }

        let mut emitted = 0;
        for emission in emissions {
            let offset = emission.half_spacing + sampler.sample(0.0, jitter);
            let left = emission.position - Vec3::new(offset, 0.0, 0.0);
            let right = emission.position + Vec3::new(offset, 0.0, 0.0);
            if left.x <= self.bounds.0 || right.x >= self.bounds.1 {
                warn!(
                    x = emission.position.x,
                    "dipole arm would land outside the glide line, emission skipped"
                );
                continue;
            }
            let positive = Dislocation::new(
                emission.burgers,
                emission.line,
                emission.burgers_magnitude,
                true,
                Vec3::y(),
            )?;
            let negative = Dislocation::new(
                -emission.burgers,
                emission.line,
                emission.burgers_magnitude,
                true,
                Vec3::y(),
            )?;
            self.insert_defect(Defect::dislocation(right, positive))?;
            self.insert_defect(Defect::dislocation(left, negative))?;
            emitted += 1;
            debug!(x = emission.position.x, "dipole emitted");
        }
        Ok(emitted)
    }

    /// Scan adjacent pairs for local reactions: annihilation of two
    /// dislocations with cancelling Burgers vectors, and pinning of a
    /// mobile dislocation on an obstacle or grain boundary. Returns
    /// (annihilated pairs, pinned dislocations).
    pub fn check_local_reactions(&mut self, reaction_radius: f64) -> (usize, usize) {
        let mut to_remove: Vec<usize> = Vec::new();
        let mut pinned = 0;

        let mut i = 0;
        while i + 1 < self.defects.len() {
            let gap = self.defects[i + 1].position().x - self.defects[i].position().x;
            if gap.abs() > reaction_radius {
                i += 1;
                continue;
            }

            if let (Some(a), Some(b)) = (
                self.defects[i].as_dislocation(),
                self.defects[i + 1].as_dislocation(),
            ) {
                let scale = a.burgers().norm() + b.burgers().norm();
                if (a.burgers() + b.burgers()).norm() <= BURGERS_CANCEL_TOLERANCE * scale {
                    to_remove.push(i);
                    to_remove.push(i + 1);
                    debug!(
                        left = self.defects[i].position().x,
                        right = self.defects[i + 1].position().x,
                        "dislocation pair annihilated"
                    );
                    i += 2;
                    continue;
                }
            }

            let pins = |kind: &DefectKind| {
                matches!(kind, DefectKind::Obstacle | DefectKind::GrainBoundary)
            };
            if pins(self.defects[i + 1].kind()) {
                if let Some(d) = self.defects[i].as_dislocation_mut() {
                    if d.is_mobile() {
                        d.pin();
                        pinned += 1;
                        debug!(x = self.defects[i].position().x, "dislocation pinned");
                    }
                }
            } else if pins(self.defects[i].kind()) {
                if let Some(d) = self.defects[i + 1].as_dislocation_mut() {
                    if d.is_mobile() {
                        d.pin();
                        pinned += 1;
                        debug!(x = self.defects[i + 1].position().x, "dislocation pinned");
                    }
                }
            }
            i += 1;
        }

        for idx in to_remove.iter().rev() {
            self.defects.remove(*idx);
        }
        (to_remove.len() / 2, pinned)
    }

    /// Append the current stress, force and velocity of every
    /// dislocation to its per-iteration history.
    pub fn record_history(&mut self) {
        for defect in &mut self.defects {
            if let Some(d) = defect.as_dislocation_mut() {
                d.record_history();
            }
        }
    }

    /// Truncate every dislocation's history to the first `len` iterations.
    pub fn truncate_history(&mut self, len: usize) {
        for defect in &mut self.defects {
            if let Some(d) = defect.as_dislocation_mut() {
                d.truncate_history(len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane() -> SlipPlane {
        SlipPlane::new(
            Vec3::new(-1e-6, 0.0, 0.0),
            Vec3::new(1e-6, 0.0, 0.0),
            Vec3::y(),
            Vec3::zeros(),
        )
        .unwrap()
    }

    fn material() -> Material {
        Material::new(8e10, 0.3, 1e-4, 1e7).unwrap()
    }

    fn insert_edge(plane: &mut SlipPlane, x: f64, sign: f64) {
        plane
            .insert_dislocation(
                Vec3::new(x, 0.0, 0.0),
                Vec3::new(sign * 2.5e-10, 0.0, 0.0),
                Vec3::z(),
                2.5e-10,
                true,
            )
            .unwrap();
    }

    #[test]
    fn test_construction_sentinels() {
        let plane = plane();
        assert_eq!(plane.n_defects(), 2);
        assert_relative_eq!(plane.defects()[0].position().x, -1e-6);
        assert_relative_eq!(plane.defects()[1].position().x, 1e-6);
    }

    #[test]
    fn test_degenerate_geometry_rejected() {
        let p = Vec3::new(1e-6, 0.0, 0.0);
        assert!(SlipPlane::new(p, p, Vec3::y(), Vec3::zeros()).is_err());
        assert!(SlipPlane::new(-p, p, Vec3::zeros(), Vec3::zeros()).is_err());
        // Normal parallel to the glide line.
        assert!(SlipPlane::new(-p, p, Vec3::x(), Vec3::zeros()).is_err());
    }

    #[test]
    fn test_insert_keeps_sorted_order() {
        let mut plane = plane();
        insert_edge(&mut plane, 5e-7, 1.0);
        insert_edge(&mut plane, -5e-7, 1.0);
        insert_edge(&mut plane, 0.0, 1.0);
        let xs: Vec<f64> = plane.defects().iter().map(|d| d.position().x).collect();
        for pair in xs.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(plane.n_dislocations(), 3);
    }

    #[test]
    fn test_insert_outside_extremities_rejected() {
        let mut plane = plane();
        let result = plane.insert_dislocation(
            Vec3::new(2e-6, 0.0, 0.0),
            Vec3::new(2.5e-10, 0.0, 0.0),
            Vec3::z(),
            2.5e-10,
            true,
        );
        assert!(matches!(result, Err(Error::InvalidGeometry(_))));
        // Exactly on a sentinel is also outside.
        let result = plane.insert_dislocation(
            Vec3::new(1e-6, 0.0, 0.0),
            Vec3::new(2.5e-10, 0.0, 0.0),
            Vec3::z(),
            2.5e-10,
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_total_stress_skips_self() {
        let mut plane = plane();
        insert_edge(&mut plane, 0.0, 1.0);
        let applied = Stress::new([0.0, 0.0, 0.0, 3e7, 0.0, 0.0]);
        plane.set_applied_stress(applied);
        // A lone dislocation sees only the applied stress.
        let sigma = plane.total_stress_at(1, &material());
        for i in 0..6 {
            assert_relative_eq!(sigma.0[i], applied.0[i], epsilon = 1e-20);
        }
    }

    #[test]
    fn test_total_stress_adds_neighbour_field() {
        let mut plane = plane();
        insert_edge(&mut plane, -2e-7, 1.0);
        insert_edge(&mut plane, 2e-7, 1.0);
        let mat = material();
        let receiver = plane.defects()[1].position();
        let expected = plane.defects()[2].stress_field_at(receiver, &mat);
        let sigma = plane.total_stress_at(1, &mat);
        for i in 0..6 {
            assert_relative_eq!(sigma.0[i], expected.0[i], max_relative = 1e-12, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_superposition_is_linear_in_burgers_magnitude() {
        let mat = material();
        let sigma_of = |bmag_scale: f64| {
            let mut plane = plane();
            plane
                .insert_dislocation(
                    Vec3::new(-2e-7, 0.0, 0.0),
                    Vec3::new(2.5e-10, 0.0, 0.0),
                    Vec3::z(),
                    bmag_scale * 2.5e-10,
                    true,
                )
                .unwrap();
            insert_edge(&mut plane, 2e-7, 1.0);
            plane.total_stress_at(2, &mat)
        };
        let unit = sigma_of(1.0);
        let tripled = sigma_of(3.0);
        for i in 0..6 {
            assert_relative_eq!(tripled.0[i], 3.0 * unit.0[i], max_relative = 1e-12, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_velocity_of_pinned_is_zero() {
        let mut plane = plane();
        insert_edge(&mut plane, 0.0, 1.0);
        plane.set_applied_stress(Stress::new([0.0, 0.0, 0.0, 5e7, 0.0, 0.0]));
        let mat = material();
        plane.update_dynamics(&mat, &[], &FrameChain::default());
        assert!(plane.velocity_of(1, &mat).x > 0.0);

        if let Some(d) = plane.defects[1].as_dislocation_mut() {
            d.pin();
        }
        plane.update_dynamics(&mat, &[], &FrameChain::default());
        assert_eq!(plane.velocity_of(1, &mat), Vec3::zeros());
        assert_eq!(plane.defects()[1].velocity(), Vec3::zeros());
    }

    #[test]
    fn test_ideal_time_increment_closing_pair() {
        // Two defects separated by 3·minDistance closing at 1 m/s allow
        // exactly Δt = 2·minDistance.
        let min_distance = 1e-8;
        let mut plane = plane();
        insert_edge(&mut plane, -1.5 * min_distance, 1.0);
        insert_edge(&mut plane, 1.5 * min_distance, -1.0);
        if let Some(d) = plane.defects[1].as_dislocation_mut() {
            d.set_state(Stress::zero(), Vec3::zeros(), Vec3::new(0.5, 0.0, 0.0));
        }
        if let Some(d) = plane.defects[2].as_dislocation_mut() {
            d.set_state(Stress::zero(), Vec3::zeros(), Vec3::new(-0.5, 0.0, 0.0));
        }
        let dt = plane.ideal_time_increment(min_distance, 1.0).unwrap();
        assert_relative_eq!(dt, 2.0 * min_distance, max_relative = 1e-12);
    }

    #[test]
    fn test_ideal_time_increment_non_closing_pair() {
        let mut plane = plane();
        insert_edge(&mut plane, -1e-7, 1.0);
        insert_edge(&mut plane, 1e-7, 1.0);
        if let Some(d) = plane.defects[1].as_dislocation_mut() {
            d.set_state(Stress::zero(), Vec3::zeros(), Vec3::new(-1.0, 0.0, 0.0));
        }
        if let Some(d) = plane.defects[2].as_dislocation_mut() {
            d.set_state(Stress::zero(), Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0));
        }
        // Separating defects impose no constraint; the cap applies.
        let dt = plane.ideal_time_increment(1e-8, 0.25).unwrap();
        assert_relative_eq!(dt, 0.25);
    }

    #[test]
    fn test_time_step_underflow() {
        let min_distance = 1e-8;
        let mut plane = plane();
        insert_edge(&mut plane, -0.4 * min_distance, 1.0);
        insert_edge(&mut plane, 0.4 * min_distance, -1.0);
        if let Some(d) = plane.defects[1].as_dislocation_mut() {
            d.set_state(Stress::zero(), Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0));
        }
        let result = plane.ideal_time_increment(min_distance, 1.0);
        assert!(matches!(result, Err(Error::TimeStepUnderflow { .. })));
    }

    #[test]
    fn test_advance_translates_and_culls() {
        let mut plane = plane();
        insert_edge(&mut plane, 0.0, 1.0);
        insert_edge(&mut plane, 9.5e-7, 1.0);
        if let Some(d) = plane.defects[1].as_dislocation_mut() {
            d.set_state(Stress::zero(), Vec3::zeros(), Vec3::new(1e-7, 0.0, 0.0));
        }
        if let Some(d) = plane.defects[2].as_dislocation_mut() {
            d.set_state(Stress::zero(), Vec3::zeros(), Vec3::new(1e-7, 0.0, 0.0));
        }
        // After 1 s the first dislocation moved to 1e-7; the second
        // crossed the right sentinel and is culled.
        let culled = plane.advance(1.0);
        assert_eq!(culled, 1);
        assert_eq!(plane.n_dislocations(), 1);
        assert_relative_eq!(plane.defects()[1].position().x, 1e-7, max_relative = 1e-12);
    }

    #[test]
    fn test_annihilation_removes_both() {
        let radius = 1e-8;
        let mut plane = plane();
        insert_edge(&mut plane, -0.4 * radius, 1.0);
        insert_edge(&mut plane, 0.4 * radius, -1.0);
        assert_eq!(plane.n_defects(), 4);
        let (annihilated, pinned) = plane.check_local_reactions(radius);
        assert_eq!(annihilated, 1);
        assert_eq!(pinned, 0);
        assert_eq!(plane.n_defects(), 2);
    }

    #[test]
    fn test_same_sign_pair_does_not_annihilate() {
        let radius = 1e-8;
        let mut plane = plane();
        insert_edge(&mut plane, -0.4 * radius, 1.0);
        insert_edge(&mut plane, 0.4 * radius, 1.0);
        let (annihilated, _) = plane.check_local_reactions(radius);
        assert_eq!(annihilated, 0);
        assert_eq!(plane.n_dislocations(), 2);
    }

    #[test]
    fn test_obstacle_pins_neighbour() {
        let radius = 1e-8;
        let mut plane = plane();
        plane
            .insert_defect(Defect::obstacle(Vec3::new(0.0, 0.0, 0.0)))
            .unwrap();
        insert_edge(&mut plane, 0.5 * radius, 1.0);
        let (annihilated, pinned) = plane.check_local_reactions(radius);
        assert_eq!(annihilated, 0);
        assert_eq!(pinned, 1);
        let d = plane.defects()[2].as_dislocation().unwrap();
        assert!(!d.is_mobile());
    }

    #[test]
    fn test_source_emits_dipole() {
        let mut plane = plane();
        plane
            .insert_source(
                Vec3::zeros(),
                Vec3::new(2.5e-10, 0.0, 0.0),
                Vec3::z(),
                2.5e-10,
                1e7,
                5,
                5e-8,
            )
            .unwrap();
        plane.set_applied_stress(Stress::new([0.0, 0.0, 0.0, 2e7, 0.0, 0.0]));
        let mat = material();
        let mut sampler = GaussianSampler::new(0);
        for step in 1..=4 {
            let emitted = plane
                .check_sources(&mat, &[], &FrameChain::default(), &mut sampler, 0.0)
                .unwrap();
            assert_eq!(emitted, 0, "early emission at step {step}");
        }
        let emitted = plane
            .check_sources(&mat, &[], &FrameChain::default(), &mut sampler, 0.0)
            .unwrap();
        assert_eq!(emitted, 1);
        assert_eq!(plane.n_dislocations(), 2);
        // The arms straddle the source at its half-spacing.
        let xs: Vec<f64> = plane
            .defects()
            .iter()
            .filter(|d| d.is_dislocation())
            .map(|d| d.position().x)
            .collect();
        assert_relative_eq!(xs[0], -5e-8, max_relative = 1e-12);
        assert_relative_eq!(xs[1], 5e-8, max_relative = 1e-12);
    }
}
