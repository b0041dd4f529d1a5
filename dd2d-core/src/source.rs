//! Frank–Read dislocation sources.
//!
//! A source sits on a slip plane and integrates the resolved shear
//! stress it experiences. Once the stress has stayed at or above the
//! critical value with a stable sign for the configured number of
//! consecutive iterations, the source emits a dipole: two dislocations
//! of opposite Burgers vector centred on the source.

use crate::error::{Error, Result};
use crate::frame::RotationMatrix;
use crate::types::Vec3;

/// A Frank–Read source fixed on its slip plane. Sources are created at
/// load and never destroyed.
#[derive(Debug, Clone)]
pub struct DislocationSource {
    burgers: Vec3,
    line: Vec3,
    burgers_magnitude: f64,
    tau_critical: f64,
    iterations_required: u32,
    counter: u32,
    last_sign: i8,
    half_spacing: f64,
    /// Rotation from the slip-plane frame into the source's local frame.
    rotation: RotationMatrix,
}

impl DislocationSource {
    /// Create a source.
    ///
    /// # Errors
    ///
    /// Returns `SourceMisconfigured` for a non-positive critical stress,
    /// iteration requirement, or emission half-spacing, and
    /// `InvalidGeometry` for a degenerate (b̂, n̂, ξ̂) triad, exactly as
    /// for dislocations.
    pub fn new(
        burgers: Vec3,
        line: Vec3,
        burgers_magnitude: f64,
        tau_critical: f64,
        iterations_required: u32,
        half_spacing: f64,
        plane_normal: Vec3,
    ) -> Result<Self> {
        if tau_critical <= 0.0 {
            return Err(Error::SourceMisconfigured(
                "critical resolved shear stress must be positive".into(),
            ));
        }
        if iterations_required == 0 {
            return Err(Error::SourceMisconfigured(
                "required iteration count must be at least 1".into(),
            ));
        }
        if half_spacing <= 0.0 {
            return Err(Error::SourceMisconfigured(
                "dipole half-spacing must be positive".into(),
            ));
        }
        if burgers.norm() == 0.0 || line.norm() == 0.0 {
            return Err(Error::InvalidGeometry(
                "zero Burgers or line vector on a source".into(),
            ));
        }
        let rotation = RotationMatrix::from_local_triad(&[
            burgers.normalize(),
            plane_normal.normalize(),
            line.normalize(),
        ])?;
        Ok(Self {
            burgers,
            line: line.normalize(),
            burgers_magnitude,
            tau_critical,
            iterations_required,
            counter: 0,
            last_sign: 0,
            half_spacing,
            rotation,
        })
    }

    /// Burgers vector of the emitted dislocations, slip-plane frame.
    pub fn burgers(&self) -> Vec3 {
        self.burgers
    }

    /// Unit line vector, slip-plane frame.
    pub fn line(&self) -> Vec3 {
        self.line
    }

    /// Magnitude of the Burgers vector in metres.
    pub fn burgers_magnitude(&self) -> f64 {
        self.burgers_magnitude
    }

    /// Critical resolved shear stress of this source (Pa).
    pub fn tau_critical(&self) -> f64 {
        self.tau_critical
    }

    /// Consecutive super-critical iterations needed for an emission.
    pub fn iterations_required(&self) -> u32 {
        self.iterations_required
    }

    /// Current value of the integration counter.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Emission half-spacing: each dipole arm is placed this far from
    /// the source along the slip direction.
    pub fn half_spacing(&self) -> f64 {
        self.half_spacing
    }

    /// Rotation from the slip-plane frame into the source frame.
    pub fn rotation(&self) -> &RotationMatrix {
        &self.rotation
    }

    /// Feed one iteration's resolved shear stress into the source.
    ///
    /// The counter increments while |τ| ≥ τ_c and the sign of τ matches
    /// the previous iteration's; any sub-critical value or sign flip
    /// resets it. Returns `true` exactly when the counter reaches the
    /// required iteration count; the counter is reset on emission.
    pub fn record_resolved_stress(&mut self, tau: f64) -> bool {
        let sign: i8 = if tau > 0.0 {
            1
        } else if tau < 0.0 {
            -1
        } else {
            0
        };
        if sign != 0 && tau.abs() >= self.tau_critical && (self.counter == 0 || sign == self.last_sign)
        {
            self.counter += 1;
            self.last_sign = sign;
        } else {
            self.counter = 0;
            self.last_sign = 0;
        }
        if self.counter >= self.iterations_required {
            self.counter = 0;
            self.last_sign = 0;
            return true;
        }
        false
    }
}
