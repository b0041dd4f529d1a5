//! Command-line front-end for the dd2d dislocation dynamics simulator.
//!
//! Reads a parameter file, builds the polycrystal, runs the configured
//! number of steps and writes one defect file per step. Exit code 0 on
//! normal completion, non-zero on unreadable input or malformed records.

mod telemetry;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::eyre;
use dd2d_core::{
    read_orientations, read_slip_plane, read_tessellation, write_defect_file, write_times,
    CoordinateSystem, Error, Grain, Parameters, Polycrystal, SlipPlane, SlipSystem, Vec3,
};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the parameter file.
    parameter_file: PathBuf,
    /// Log verbosity, overridable through RUST_LOG.
    #[arg(value_enum, short, long, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Error => "error",
        };
        write!(f, "{name}")
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    telemetry::init_subscriber(telemetry::get_subscriber(cli.log_level.to_string()));
    run(cli)
}

fn run(cli: Cli) -> color_eyre::Result<()> {
    let params = Parameters::from_file(&cli.parameter_file)?;
    let material = params.material()?;
    let controls = params.step_controls();
    let mut polycrystal = build_polycrystal(&params)?;
    info!(
        grains = polycrystal.n_grains(),
        dislocations = polycrystal.n_dislocations(),
        steps = params.step_count,
        "simulation loaded"
    );

    let mut step = 0;
    while step < params.step_count {
        match polycrystal.step(&material, &controls) {
            Ok(outcome) => {
                step += 1;
                write_defect_file(&params.output_file_mask, step, &polycrystal)?;
                info!(
                    step,
                    dt = outcome.time_increment,
                    emitted = outcome.emitted,
                    annihilated = outcome.annihilated,
                    "step done"
                );
            }
            Err(Error::TimeStepUnderflow { .. }) => {
                warn!("time step underflow, resolving contacts before retrying");
                let (annihilated, pinned) = polycrystal.resolve_contacts(controls.reaction_radius);
                if annihilated + pinned == 0 {
                    return Err(eyre!(
                        "time step underflow persists: no local reaction resolved the contact"
                    ));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    write_times(
        &PathBuf::from(format!("{}times", params.output_file_mask)),
        polycrystal.times(),
    )?;
    info!(steps = step, "simulation complete");
    Ok(())
}

/// Build the polycrystal the parameter file describes.
///
/// With a tessellation and orientations file, every grain gets its
/// boundary polygon and orientation, and the structure file populates
/// the first grain. Without them, the structure file's plane is wrapped
/// in a single identity-oriented grain.
fn build_polycrystal(params: &Parameters) -> color_eyre::Result<Polycrystal> {
    let plane = read_slip_plane(
        &params.dislocation_structure_file,
        params.dipole_half_spacing(),
    )?;

    let mut polycrystal = Polycrystal::new(CoordinateSystem::base(), params.rng_seed);
    polycrystal.set_applied_stress(params.applied_stress);

    match (&params.tessellation_file, &params.orientations_file) {
        (Some(tessellation_path), Some(orientations_path)) => {
            let tessellation = read_tessellation(tessellation_path)?;
            let orientations = read_orientations(orientations_path)?;
            if tessellation.n_grains() == 0 {
                return Err(eyre!("tessellation file holds no grains"));
            }
            if orientations.len() != tessellation.n_grains() {
                return Err(eyre!(
                    "{} orientations for {} grains",
                    orientations.len(),
                    tessellation.n_grains()
                ));
            }
            let mut grains: Vec<Grain> = tessellation
                .polygons
                .iter()
                .zip(&orientations)
                .map(|(polygon, orientation)| Grain::new(polygon.clone(), *orientation))
                .collect();
            attach_plane(&mut grains[0], plane)?;
            polycrystal.set_tessellation(tessellation);
            for grain in grains {
                polycrystal.insert_grain(grain);
            }
        }
        (None, None) => {
            let mut grain = Grain::new(Vec::new(), Vec3::zeros());
            attach_plane(&mut grain, plane)?;
            polycrystal.insert_grain(grain);
        }
        _ => {
            return Err(eyre!(
                "tessellationFile and orientationsFile must be given together"
            ));
        }
    }
    Ok(polycrystal)
}

/// Wrap a grain-frame slip plane in a slip system aligned with its
/// glide direction and nest it under the grain.
fn attach_plane(grain: &mut Grain, mut plane: SlipPlane) -> dd2d_core::Result<()> {
    let mut system = SlipSystem::new(plane.slip_direction(), plane.normal(), Vec3::zeros())?;
    plane.reparent(system.coordinate_system())?;
    system.add_plane(plane)?;
    grain.add_system(system);
    Ok(())
}
