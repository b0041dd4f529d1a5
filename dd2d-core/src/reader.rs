//! ASCII input adapters.
//!
//! Three file formats feed a simulation:
//!
//! - the parameter file: `key value...` lines,
//! - the tessellation file: a sequence of 2-D polygons, each a vertex
//!   count followed by that many `x y` pairs,
//! - the slip-plane structure file: extremities, normal, origin, then
//!   counted dislocation and source records.
//!
//! Blank lines and lines whose first non-whitespace character is `#`
//! are skipped everywhere. Any unreadable file, wrong field count or
//! non-numeric token surfaces as [`Error::MalformedInput`] before any
//! state is published.

use crate::error::{Error, Result};
use crate::material::Material;
use crate::polycrystal::{StepControls, Tessellation};
use crate::slip_plane::SlipPlane;
use crate::types::{Stress, Vec3};
use std::fs;
use std::path::{Path, PathBuf};

/// True when an input line carries no data.
fn ignore_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::MalformedInput(format!("cannot read {}: {e}", path.display())))
}

fn parse_float(token: &str, what: &str) -> Result<f64> {
    token
        .parse()
        .map_err(|_| Error::MalformedInput(format!("non-numeric token `{token}` in {what}")))
}

fn parse_integer(token: &str, what: &str) -> Result<u64> {
    token
        .parse()
        .map_err(|_| Error::MalformedInput(format!("non-integer token `{token}` in {what}")))
}

/// A whitespace-token stream over the data lines of a file.
struct TokenCursor {
    tokens: Vec<String>,
    pos: usize,
}

impl TokenCursor {
    fn new(content: &str) -> Self {
        let tokens = content
            .lines()
            .filter(|line| !ignore_line(line))
            .flat_map(|line| line.split_whitespace().map(str::to_owned))
            .collect();
        Self { tokens, pos: 0 }
    }

    fn next(&mut self, what: &str) -> Result<&str> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| Error::MalformedInput(format!("file truncated before {what}")))?;
        self.pos += 1;
        Ok(token)
    }

    fn float(&mut self, what: &str) -> Result<f64> {
        let token = self.next(what)?.to_owned();
        parse_float(&token, what)
    }

    fn integer(&mut self, what: &str) -> Result<u64> {
        let token = self.next(what)?.to_owned();
        parse_integer(&token, what)
    }

    fn vector(&mut self, what: &str) -> Result<Vec3> {
        Ok(Vec3::new(
            self.float(what)?,
            self.float(what)?,
            self.float(what)?,
        ))
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.tokens.len()
    }
}

/// The simulation parameters, read from a key-value file.
#[derive(Debug, Clone)]
pub struct Parameters {
    /// Shear modulus μ (Pa).
    pub shear_modulus: f64,
    /// Poisson's ratio ν.
    pub poissons_ratio: f64,
    /// Drag coefficient B (Pa·s).
    pub drag_coefficient: f64,
    /// Default critical resolved shear stress (Pa).
    pub crss: f64,
    /// Externally applied stress in the base frame.
    pub applied_stress: Stress,
    /// Upper bound for any step's time increment (s).
    pub dt_max: f64,
    /// Minimum approach distance between defects (m).
    pub min_distance: f64,
    /// Local-reaction cutoff (m).
    pub reaction_radius: f64,
    /// Number of steps to run.
    pub step_count: usize,
    /// Path to the slip-plane structure file.
    pub dislocation_structure_file: PathBuf,
    /// Optional Voronoi tessellation file.
    pub tessellation_file: Option<PathBuf>,
    /// Optional grain orientations file.
    pub orientations_file: Option<PathBuf>,
    /// Name mask for the per-step output files.
    pub output_file_mask: String,
    /// Seed for the nucleation-noise stream.
    pub rng_seed: u64,
    /// Dipole emission half-spacing (m); defaults to twice the reaction
    /// radius so fresh dipoles clear the annihilation cutoff.
    pub dipole_half_spacing: Option<f64>,
    /// Standard deviation of the dipole-placement jitter (m).
    pub emission_jitter: f64,
}

impl Parameters {
    /// Read a parameter file.
    pub fn from_file(path: &Path) -> Result<Self> {
        fn one<'a>(key: &str, values: &[&'a str]) -> Result<&'a str> {
            if values.len() == 1 {
                Ok(values[0])
            } else {
                Err(Error::MalformedInput(format!(
                    "key `{key}` expects one value, found {}",
                    values.len()
                )))
            }
        }

        let content = read_file(path)?;

        let mut shear_modulus = None;
        let mut poissons_ratio = None;
        let mut drag_coefficient = None;
        let mut crss = None;
        let mut applied_stress = None;
        let mut dt_max = None;
        let mut min_distance = None;
        let mut reaction_radius = None;
        let mut step_count = None;
        let mut dislocation_structure_file = None;
        let mut tessellation_file = None;
        let mut orientations_file = None;
        let mut output_file_mask = None;
        let mut rng_seed = None;
        let mut dipole_half_spacing = None;
        let mut emission_jitter = None;

        for line in content.lines().filter(|l| !ignore_line(l)) {
            let mut tokens = line.split_whitespace();
            let key = tokens.next().unwrap_or_default();
            let values: Vec<&str> = tokens.collect();

            match key {
                "mu" => shear_modulus = Some(parse_float(one(key, &values)?, "mu")?),
                "nu" => poissons_ratio = Some(parse_float(one(key, &values)?, "nu")?),
                "B" => drag_coefficient = Some(parse_float(one(key, &values)?, "B")?),
                "tau_crss" => crss = Some(parse_float(one(key, &values)?, "tau_crss")?),
                "appliedStress" => {
                    if values.len() != 6 {
                        return Err(Error::MalformedInput(format!(
                            "appliedStress expects 6 components, found {}",
                            values.len()
                        )));
                    }
                    let mut components = [0.0; 6];
                    for (slot, token) in components.iter_mut().zip(values.iter().copied()) {
                        *slot = parse_float(token, "appliedStress")?;
                    }
                    applied_stress = Some(Stress::new(components));
                }
                "dtMax" => dt_max = Some(parse_float(one(key, &values)?, "dtMax")?),
                "minDistance" => min_distance = Some(parse_float(one(key, &values)?, "minDistance")?),
                "reactionRadius" => {
                    reaction_radius = Some(parse_float(one(key, &values)?, "reactionRadius")?)
                }
                "stepCount" => {
                    step_count = Some(parse_integer(one(key, &values)?, "stepCount")? as usize)
                }
                "dislocationStructureFile" => {
                    dislocation_structure_file = Some(PathBuf::from(one(key, &values)?))
                }
                "tessellationFile" => tessellation_file = Some(PathBuf::from(one(key, &values)?)),
                "orientationsFile" => orientations_file = Some(PathBuf::from(one(key, &values)?)),
                "outputFileMask" => output_file_mask = Some(one(key, &values)?.to_owned()),
                "rngSeed" => rng_seed = Some(parse_integer(one(key, &values)?, "rngSeed")?),
                "dipoleHalfSpacing" => {
                    dipole_half_spacing = Some(parse_float(one(key, &values)?, "dipoleHalfSpacing")?)
                }
                "emissionJitter" => {
                    emission_jitter = Some(parse_float(one(key, &values)?, "emissionJitter")?)
                }
                other => {
                    return Err(Error::MalformedInput(format!(
                        "unrecognized parameter key `{other}`"
                    )));
                }
            }
        }

        fn require<T>(value: Option<T>, key: &str) -> Result<T> {
            value.ok_or_else(|| Error::MalformedInput(format!("missing parameter `{key}`")))
        }

        Ok(Self {
            shear_modulus: require(shear_modulus, "mu")?,
            poissons_ratio: require(poissons_ratio, "nu")?,
            drag_coefficient: require(drag_coefficient, "B")?,
            crss: crss.unwrap_or(0.0),
            applied_stress: applied_stress.unwrap_or_else(Stress::zero),
            dt_max: require(dt_max, "dtMax")?,
            min_distance: require(min_distance, "minDistance")?,
            reaction_radius: require(reaction_radius, "reactionRadius")?,
            step_count: require(step_count, "stepCount")?,
            dislocation_structure_file: require(
                dislocation_structure_file,
                "dislocationStructureFile",
            )?,
            tessellation_file,
            orientations_file,
            output_file_mask: output_file_mask.unwrap_or_else(|| "defects_".to_owned()),
            rng_seed: rng_seed.unwrap_or(0),
            dipole_half_spacing,
            emission_jitter: emission_jitter.unwrap_or(0.0),
        })
    }

    /// Build the material these parameters describe.
    pub fn material(&self) -> Result<Material> {
        Material::new(
            self.shear_modulus,
            self.poissons_ratio,
            self.drag_coefficient,
            self.crss,
        )
    }

    /// Build the per-step controls.
    pub fn step_controls(&self) -> StepControls {
        StepControls {
            dt_max: self.dt_max,
            min_distance: self.min_distance,
            reaction_radius: self.reaction_radius,
            emission_jitter: self.emission_jitter,
        }
    }

    /// The dipole half-spacing, defaulted to twice the reaction radius.
    pub fn dipole_half_spacing(&self) -> f64 {
        self.dipole_half_spacing
            .unwrap_or(2.0 * self.reaction_radius)
    }
}

/// Read a Voronoi tessellation: for each grain a vertex count followed
/// by that many `x y` pairs.
pub fn read_tessellation(path: &Path) -> Result<Tessellation> {
    let content = read_file(path)?;
    let mut cursor = TokenCursor::new(&content);

    let mut polygons = Vec::new();
    while !cursor.is_exhausted() {
        let n = cursor.integer("tessellation vertex count")? as usize;
        if n == 0 {
            return Err(Error::MalformedInput(
                "tessellation polygon with zero vertices".into(),
            ));
        }
        let mut polygon = Vec::with_capacity(n);
        for _ in 0..n {
            let x = cursor.float("tessellation vertex")?;
            let y = cursor.float("tessellation vertex")?;
            polygon.push(Vec3::new(x, y, 0.0));
        }
        polygons.push(polygon);
    }
    Ok(Tessellation { polygons })
}

/// Read grain orientations: one three-component vector of Euler angles
/// (radians) per data line.
pub fn read_orientations(path: &Path) -> Result<Vec<Vec3>> {
    let content = read_file(path)?;
    let mut orientations = Vec::new();
    for line in content.lines().filter(|l| !ignore_line(l)) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 3 {
            return Err(Error::MalformedInput(format!(
                "orientation line expects 3 components, found {}",
                tokens.len()
            )));
        }
        orientations.push(Vec3::new(
            parse_float(tokens[0], "orientation")?,
            parse_float(tokens[1], "orientation")?,
            parse_float(tokens[2], "orientation")?,
        ));
    }
    Ok(orientations)
}

/// Read a slip-plane structure file: extremities, normal, origin, then
/// the counted dislocation and source records.
///
/// Positions and vectors in the file are given in the plane's parent
/// frame; the reader converts them into the plane frame on insertion.
/// Sources take their emission half-spacing from `dipole_half_spacing`.
pub fn read_slip_plane(path: &Path, dipole_half_spacing: f64) -> Result<SlipPlane> {
    let content = read_file(path)?;
    let mut cursor = TokenCursor::new(&content);

    let extremity_0 = cursor.vector("slip plane extremity 0")?;
    let extremity_1 = cursor.vector("slip plane extremity 1")?;
    let normal = cursor.vector("slip plane normal")?;
    let origin = cursor.vector("slip plane origin")?;
    let mut plane = SlipPlane::new(extremity_0, extremity_1, normal, origin)?;
    let cs = plane.coordinate_system().clone();

    let n_dislocations = cursor.integer("dislocation count")?;
    for _ in 0..n_dislocations {
        let position = cursor.vector("dislocation position")?;
        let burgers = cursor.vector("dislocation Burgers vector")?;
        let line = cursor.vector("dislocation line vector")?;
        let magnitude = cursor.float("dislocation Burgers magnitude")?;
        let mobility = cursor.integer("dislocation mobility")?;
        plane.insert_dislocation(
            cs.point_to_local(position),
            cs.vector_to_local(burgers),
            cs.vector_to_local(line),
            magnitude,
            mobility != 0,
        )?;
    }

    let n_sources = cursor.integer("source count")?;
    for _ in 0..n_sources {
        let position = cursor.vector("source position")?;
        let burgers = cursor.vector("source Burgers vector")?;
        let line = cursor.vector("source line vector")?;
        let magnitude = cursor.float("source Burgers magnitude")?;
        let tau_critical = cursor.float("source critical stress")?;
        let iterations = cursor.integer("source iteration count")?;
        let iterations = u32::try_from(iterations).map_err(|_| {
            Error::MalformedInput("source iteration count out of range".into())
        })?;
        plane.insert_source(
            cs.point_to_local(position),
            cs.vector_to_local(burgers),
            cs.vector_to_local(line),
            magnitude,
            tau_critical,
            iterations,
            dipole_half_spacing,
        )?;
    }

    if !cursor.is_exhausted() {
        return Err(Error::MalformedInput(
            "trailing tokens after the last source record".into(),
        ));
    }
    Ok(plane)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    fn write_temp(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parameters_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "params.txt",
            "# material\n\
             mu 8e10\n\
             nu 0.3\n\
             B 1e-4\n\
             tau_crss 1e7\n\
             \n\
             appliedStress 0 0 0 2e7 0 0\n\
             dtMax 1e-9\n\
             minDistance 1e-8\n\
             reactionRadius 5e-9\n\
             stepCount 100\n\
             dislocationStructureFile plane.txt\n\
             rngSeed 42\n",
        );
        let params = Parameters::from_file(&path).unwrap();
        assert_relative_eq!(params.shear_modulus, 8e10);
        assert_relative_eq!(params.applied_stress.xy(), 2e7);
        assert_eq!(params.step_count, 100);
        assert_eq!(params.rng_seed, 42);
        assert_relative_eq!(params.dipole_half_spacing(), 1e-8);
        assert!(params.material().is_ok());
    }

    #[test]
    fn test_parameters_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "params.txt", "mu 8e10\nnu 0.3\n");
        let result = Parameters::from_file(&path);
        assert!(matches!(result, Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_parameters_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "params.txt", "mu 8e10\nbogusKey 1\n");
        assert!(Parameters::from_file(&path).is_err());
    }

    #[test]
    fn test_parameters_non_numeric_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "params.txt", "mu eighty\n");
        assert!(Parameters::from_file(&path).is_err());
    }

    #[test]
    fn test_parameters_wrong_applied_stress_arity() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "params.txt", "appliedStress 1 2 3\n");
        assert!(Parameters::from_file(&path).is_err());
    }

    #[test]
    fn test_tessellation_two_polygons() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "tess.txt",
            "# two grains\n\
             3\n0 0  1 0  0 1\n\
             4\n2 0  3 0  3 1  2 1\n",
        );
        let tess = read_tessellation(&path).unwrap();
        assert_eq!(tess.n_grains(), 2);
        assert_eq!(tess.polygons[0].len(), 3);
        assert_eq!(tess.polygons[1].len(), 4);
        assert_relative_eq!(tess.polygons[1][2].x, 3.0);
    }

    #[test]
    fn test_tessellation_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "tess.txt", "3\n0 0  1 0\n");
        assert!(read_tessellation(&path).is_err());
    }

    #[test]
    fn test_orientations() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "orient.txt", "0.1 0.2 0.3\n# skip\n0.4 0.5 0.6\n");
        let orientations = read_orientations(&path).unwrap();
        assert_eq!(orientations.len(), 2);
        assert_relative_eq!(orientations[1].z, 0.6);
    }

    #[test]
    fn test_orientations_wrong_arity() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "orient.txt", "0.1 0.2\n");
        assert!(read_orientations(&path).is_err());
    }

    #[test]
    fn test_slip_plane_structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "plane.txt",
            "-1e-6 0 0\n\
             1e-6 0 0\n\
             0 1 0\n\
             0 0 0\n\
             2\n\
             -2e-7 0 0  2.5e-10 0 0  0 0 1  2.5e-10 1\n\
             2e-7 0 0  -2.5e-10 0 0  0 0 1  2.5e-10 0\n\
             1\n\
             0 0 0  2.5e-10 0 0  0 0 1  2.5e-10 1e7 5\n",
        );
        let plane = read_slip_plane(&path, 5e-8).unwrap();
        assert_eq!(plane.n_defects(), 5);
        assert_eq!(plane.n_dislocations(), 2);
        let pinned = plane.defects()[3].as_dislocation().unwrap();
        assert!(!pinned.is_mobile());
        let source = plane.defects()[2].as_source().unwrap();
        assert_eq!(source.iterations_required(), 5);
        assert_relative_eq!(source.half_spacing(), 5e-8);
    }

    #[test]
    fn test_slip_plane_bad_source_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "plane.txt",
            "-1e-6 0 0\n1e-6 0 0\n0 1 0\n0 0 0\n\
             0\n\
             1\n\
             0 0 0  2.5e-10 0 0  0 0 1  2.5e-10 -1e7 5\n",
        );
        let result = read_slip_plane(&path, 5e-8);
        assert!(matches!(result, Err(Error::SourceMisconfigured(_))));
    }

    #[test]
    fn test_slip_plane_trailing_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "plane.txt",
            "-1e-6 0 0\n1e-6 0 0\n0 1 0\n0 0 0\n0\n0\nextra\n",
        );
        assert!(read_slip_plane(&path, 5e-8).is_err());
    }
}
