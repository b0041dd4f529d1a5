//! The polycrystal orchestrator.
//!
//! The polycrystal is the root of the frame hierarchy. One call to
//! [`Polycrystal::step`] advances the whole simulation by one time
//! increment:
//!
//! 1. rotate the applied stress into every nested frame,
//! 2. compute every defect's total stress, force and velocity,
//! 3. pick the largest collision-free time increment over all planes,
//! 4. translate every mobile defect,
//! 5. run source emission,
//! 6. run local reactions,
//! 7. append the per-iteration histories.
//!
//! Iteration order is deterministic throughout: grains, systems and
//! planes in insertion order, defects in sorted position order. The
//! specified semantics are serial; the only parallelism is the
//! per-receiver stress summation inside each plane, which is
//! bit-identical to a serial pass.

use crate::defect::FieldSource;
use crate::error::Result;
use crate::frame::{CoordinateSystem, FrameChain};
use crate::grain::Grain;
use crate::material::Material;
use crate::rng::GaussianSampler;
use crate::slip_plane::SlipPlane;
use crate::types::{Stress, Vec3};
use tracing::{debug, info};

/// The Voronoi microstructure: one closed polygon per grain.
#[derive(Debug, Clone, Default)]
pub struct Tessellation {
    /// Grain polygons in the polycrystal frame.
    pub polygons: Vec<Vec<Vec3>>,
}

impl Tessellation {
    /// Number of grains in the tessellation.
    pub fn n_grains(&self) -> usize {
        self.polygons.len()
    }
}

/// Per-step control parameters.
#[derive(Debug, Clone)]
pub struct StepControls {
    /// Upper bound on any step's time increment (s).
    pub dt_max: f64,
    /// Minimum approach distance between adjacent defects (m).
    pub min_distance: f64,
    /// Cutoff distance for local reactions (m).
    pub reaction_radius: f64,
    /// Standard deviation of the dipole-placement jitter (m); zero keeps
    /// emission deterministic.
    pub emission_jitter: f64,
}

/// What happened during one successful step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// The time increment that was applied (s).
    pub time_increment: f64,
    /// Dipoles emitted by sources.
    pub emitted: usize,
    /// Dislocation pairs annihilated.
    pub annihilated: usize,
    /// Dislocations pinned on obstacles or grain boundaries.
    pub pinned: usize,
    /// Defects culled at the plane extremities.
    pub culled: usize,
}

/// A per-defect snapshot used by the statistics writer, with every
/// quantity expressed in the base frame.
#[derive(Debug, Clone)]
pub struct DefectRecord {
    /// Kind label of the defect.
    pub kind: &'static str,
    /// Position in the base frame.
    pub position: Vec3,
    /// Current total stress (zero for kinds that do not track one).
    pub stress: Stress,
    /// Current Peach–Koehler force.
    pub force: Vec3,
    /// Current velocity.
    pub velocity: Vec3,
}

/// The polycrystal: tessellation, grains, applied stress and the root
/// coordinate system.
#[derive(Debug, Clone)]
pub struct Polycrystal {
    tessellation: Tessellation,
    grains: Vec<Grain>,
    applied_stress_base: Stress,
    applied_stress_local: Stress,
    coordinate_system: CoordinateSystem,
    sampler: GaussianSampler,
    /// Elapsed time at the end of every completed iteration.
    times: Vec<f64>,
    elapsed: f64,
}

impl Polycrystal {
    /// Create a polycrystal whose root frame is `coordinate_system`,
    /// with a seeded nucleation-noise stream.
    pub fn new(coordinate_system: CoordinateSystem, seed: u64) -> Self {
        Self {
            tessellation: Tessellation::default(),
            grains: Vec::new(),
            applied_stress_base: Stress::zero(),
            applied_stress_local: Stress::zero(),
            coordinate_system,
            sampler: GaussianSampler::new(seed),
            times: Vec::new(),
            elapsed: 0.0,
        }
    }

    /// Attach the Voronoi tessellation.
    pub fn set_tessellation(&mut self, tessellation: Tessellation) {
        self.tessellation = tessellation;
    }

    /// The Voronoi tessellation.
    pub fn tessellation(&self) -> &Tessellation {
        &self.tessellation
    }

    /// Insert a grain. Grains keep their insertion order for the whole
    /// simulation.
    pub fn insert_grain(&mut self, grain: Grain) {
        self.grains.push(grain);
    }

    /// The grains in insertion order.
    pub fn grains(&self) -> &[Grain] {
        &self.grains
    }

    /// A grain by index.
    pub fn grain(&self, i: usize) -> Option<&Grain> {
        self.grains.get(i)
    }

    /// Number of grains.
    pub fn n_grains(&self) -> usize {
        self.grains.len()
    }

    /// The root coordinate system.
    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coordinate_system
    }

    /// Set the externally applied stress, given in the base frame.
    pub fn set_applied_stress(&mut self, stress: Stress) {
        self.applied_stress_base = stress;
        self.applied_stress_local = self.coordinate_system.stress_to_local(&stress);
    }

    /// Applied stress in the base frame.
    pub fn applied_stress_base(&self) -> Stress {
        self.applied_stress_base
    }

    /// Applied stress in the polycrystal's local frame.
    pub fn applied_stress_local(&self) -> Stress {
        self.applied_stress_local
    }

    /// Elapsed time at the end of every completed iteration.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Iterate over every slip plane in deterministic order.
    pub fn slip_planes(&self) -> impl Iterator<Item = &SlipPlane> {
        self.grains
            .iter()
            .flat_map(|g| g.systems())
            .flat_map(|s| s.planes())
    }

    /// Total number of defects in the simulation, sentinels included.
    pub fn n_defects(&self) -> usize {
        self.slip_planes().map(|p| p.n_defects()).sum()
    }

    /// Total number of dislocations in the simulation.
    pub fn n_dislocations(&self) -> usize {
        self.slip_planes().map(|p| p.n_dislocations()).sum()
    }

    /// Rotate the applied stress down into every grain, slip system and
    /// slip plane.
    pub fn propagate_applied_stress(&mut self) {
        let local = self.applied_stress_local;
        for grain in &mut self.grains {
            let grain_stress = grain.coordinate_system().stress_to_local(&local);
            grain.set_applied_stress(grain_stress);
        }
    }

    /// Total stress at a base-frame point: the applied stress plus the
    /// field of every dislocation, expressed in the base frame.
    pub fn total_stress_at(&self, p: Vec3, material: &Material) -> Stress {
        let mut sigma = self.applied_stress_base;
        for (_, source) in self.collect_field_sources() {
            sigma += source.stress_at(p, material);
        }
        sigma
    }

    /// Detach every dislocation's stress field into the base frame,
    /// tagged with the index of the plane it lives on.
    fn collect_field_sources(&self) -> Vec<(usize, FieldSource)> {
        let mut sources = Vec::new();
        let mut plane_id = 0;
        let root = self.coordinate_system.clone();
        for grain in &self.grains {
            for system in grain.systems() {
                for plane in system.planes() {
                    let chain = FrameChain::new(vec![
                        root.clone(),
                        grain.coordinate_system().clone(),
                        system.coordinate_system().clone(),
                        plane.coordinate_system().clone(),
                    ]);
                    let base_rotation = chain.rotation_to_local();
                    for defect in plane.defects() {
                        if let Some(d) = defect.as_dislocation() {
                            sources.push((
                                plane_id,
                                FieldSource::new(
                                    chain.point_to_base(defect.position()),
                                    d.rotation().matrix() * base_rotation,
                                    d.burgers_magnitude(),
                                ),
                            ));
                        }
                    }
                    plane_id += 1;
                }
            }
        }
        sources
    }

    /// Advance the simulation by one step.
    ///
    /// # Errors
    ///
    /// `TimeStepUnderflow` when some closing pair is already inside the
    /// minimum distance. The step aborts before any motion, every defect
    /// keeps its pre-step position and no history is appended; run
    /// [`Polycrystal::resolve_contacts`] before retrying.
    pub fn step(&mut self, material: &Material, controls: &StepControls) -> Result<StepOutcome> {
        // 1. Applied stress into every nested frame.
        self.propagate_applied_stress();

        // 2. Total stress, force and velocity for every defect. Fields
        // of dislocations on other planes enter through the base frame.
        let field_sources = self.collect_field_sources();
        let root = self.coordinate_system.clone();
        let mut plane_id = 0;
        for grain in &mut self.grains {
            let grain_cs = grain.coordinate_system().clone();
            for system in grain.systems_mut() {
                let system_cs = system.coordinate_system().clone();
                for plane in system.planes_mut() {
                    let chain = FrameChain::new(vec![
                        root.clone(),
                        grain_cs.clone(),
                        system_cs.clone(),
                        plane.coordinate_system().clone(),
                    ]);
                    let externals: Vec<FieldSource> = field_sources
                        .iter()
                        .filter(|(id, _)| *id != plane_id)
                        .map(|(_, s)| s.clone())
                        .collect();
                    plane.update_dynamics(material, &externals, &chain);
                    plane_id += 1;
                }
            }
        }

        // 3. The time increment, reduced over all planes. An underflow
        // aborts here, before any motion.
        let mut dt = controls.dt_max;
        for plane in self.slip_planes() {
            dt = dt.min(plane.ideal_time_increment(controls.min_distance, controls.dt_max)?);
        }

        // 4. Motion.
        let mut culled = 0;
        for plane in self.planes_mut() {
            plane.set_time_increment(dt);
            culled += plane.advance(dt);
        }

        // 5. Source emission, against the post-motion stress state.
        let field_sources = self.collect_field_sources();
        let root = self.coordinate_system.clone();
        let sampler = &mut self.sampler;
        let mut emitted = 0;
        let mut plane_id = 0;
        for grain in &mut self.grains {
            let grain_cs = grain.coordinate_system().clone();
            for system in grain.systems_mut() {
                let system_cs = system.coordinate_system().clone();
                for plane in system.planes_mut() {
                    let chain = FrameChain::new(vec![
                        root.clone(),
                        grain_cs.clone(),
                        system_cs.clone(),
                        plane.coordinate_system().clone(),
                    ]);
                    let externals: Vec<FieldSource> = field_sources
                        .iter()
                        .filter(|(id, _)| *id != plane_id)
                        .map(|(_, s)| s.clone())
                        .collect();
                    emitted += plane.check_sources(
                        material,
                        &externals,
                        &chain,
                        sampler,
                        controls.emission_jitter,
                    )?;
                    plane_id += 1;
                }
            }
        }

        // 6. Local reactions.
        let mut annihilated = 0;
        let mut pinned = 0;
        for plane in self.planes_mut() {
            let (a, p) = plane.check_local_reactions(controls.reaction_radius);
            annihilated += a;
            pinned += p;
        }

        // 7. History.
        self.elapsed += dt;
        self.times.push(self.elapsed);
        for plane in self.planes_mut() {
            plane.record_history();
        }

        let outcome = StepOutcome {
            time_increment: dt,
            emitted,
            annihilated,
            pinned,
            culled,
        };
        debug!(
            dt,
            emitted, annihilated, pinned, culled, "step completed"
        );
        Ok(outcome)
    }

    /// Run a local-reaction pass over every plane, resolving the
    /// contacts left behind by an aborted step. Returns (annihilated
    /// pairs, pinned dislocations).
    pub fn resolve_contacts(&mut self, reaction_radius: f64) -> (usize, usize) {
        let mut annihilated = 0;
        let mut pinned = 0;
        for plane in self.planes_mut() {
            let (a, p) = plane.check_local_reactions(reaction_radius);
            annihilated += a;
            pinned += p;
        }
        info!(annihilated, pinned, "contacts resolved after aborted step");
        (annihilated, pinned)
    }

    /// Truncate the per-iteration histories, the time trace included,
    /// to the first `len` iterations.
    pub fn truncate_history(&mut self, len: usize) {
        self.times.truncate(len);
        self.elapsed = self.times.last().copied().unwrap_or(0.0);
        for plane in self.planes_mut() {
            plane.truncate_history(len);
        }
    }

    /// Snapshot every defect for the statistics writer, with positions,
    /// stresses, forces and velocities rotated up into the base frame.
    pub fn collect_records(&self) -> Vec<DefectRecord> {
        let mut records = Vec::new();
        let root = self.coordinate_system.clone();
        for grain in &self.grains {
            for system in grain.systems() {
                for plane in system.planes() {
                    let chain = FrameChain::new(vec![
                        root.clone(),
                        grain.coordinate_system().clone(),
                        system.coordinate_system().clone(),
                        plane.coordinate_system().clone(),
                    ]);
                    for defect in plane.defects() {
                        let (stress, force, velocity) = match defect.as_dislocation() {
                            Some(d) => (
                                chain.stress_to_base(&d.stress()),
                                chain.vector_to_base(d.force()),
                                chain.vector_to_base(d.velocity()),
                            ),
                            None => (Stress::zero(), Vec3::zeros(), Vec3::zeros()),
                        };
                        records.push(DefectRecord {
                            kind: defect.kind_label(),
                            position: chain.point_to_base(defect.position()),
                            stress,
                            force,
                            velocity,
                        });
                    }
                }
            }
        }
        records
    }

    fn planes_mut(&mut self) -> impl Iterator<Item = &mut SlipPlane> {
        self.grains
            .iter_mut()
            .flat_map(|g| g.systems_mut())
            .flat_map(|s| s.planes_mut())
    }
}
