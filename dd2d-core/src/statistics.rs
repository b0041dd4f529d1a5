//! Step output files.
//!
//! At every iteration the simulation appends one file, named by a
//! caller-supplied mask plus the step index, holding one line per
//! defect:
//!
//! ```text
//! kind x y z σ_xx σ_yy σ_zz σ_xy σ_xz σ_yz F_x F_y F_z v_x v_y v_z
//! ```
//!
//! Positions, stresses, forces and velocities are expressed in the base
//! frame, with fixed 12-significant-digit scientific formatting.

use crate::error::Result;
use crate::polycrystal::Polycrystal;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write the per-defect state of the polycrystal for one step. Returns
/// the path of the file written (`mask` + step index).
pub fn write_defect_file(mask: &str, step: usize, polycrystal: &Polycrystal) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{mask}{step}"));
    let mut out = BufWriter::new(File::create(&path)?);
    for record in polycrystal.collect_records() {
        let p = record.position;
        let s = record.stress;
        let f = record.force;
        let v = record.velocity;
        writeln!(
            out,
            "{} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e} {:.11e}",
            record.kind,
            p.x, p.y, p.z,
            s.xx(), s.yy(), s.zz(), s.xy(), s.xz(), s.yz(),
            f.x, f.y, f.z,
            v.x, v.y, v.z,
        )?;
    }
    out.flush()?;
    Ok(path)
}

/// Write the elapsed-time trace, one instant per completed iteration.
pub fn write_times(path: &Path, times: &[f64]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for t in times {
        writeln!(out, "{t:.11e}")?;
    }
    out.flush()?;
    Ok(())
}
