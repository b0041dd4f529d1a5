//! Material property definitions.
//!
//! Isotropic linear elastic constants plus the two glide parameters the
//! dislocation dynamics consumes: the drag coefficient of the overdamped
//! velocity law v = F/B, and the critical resolved shear stress below
//! which a dislocation does not move.

use crate::error::{Error, Result};
use std::f64::consts::PI;

/// Material properties for a dislocation dynamics simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Shear modulus μ (Pa).
    pub shear_modulus: f64,
    /// Poisson's ratio ν (dimensionless).
    pub poissons_ratio: f64,
    /// Drag coefficient B (Pa·s) of the glide law v = F/B.
    pub drag_coefficient: f64,
    /// Critical resolved shear stress τ_c (Pa).
    pub crss: f64,
}

impl Material {
    /// Create a new material.
    ///
    /// # Errors
    ///
    /// Returns an error if the constants are physically invalid:
    /// μ ≤ 0, ν outside (-1, 0.5), B ≤ 0, or τ_c < 0.
    pub fn new(
        shear_modulus: f64,
        poissons_ratio: f64,
        drag_coefficient: f64,
        crss: f64,
    ) -> Result<Self> {
        if shear_modulus <= 0.0 {
            return Err(Error::InvalidMaterial(
                "shear modulus must be positive".into(),
            ));
        }
        if poissons_ratio <= -1.0 || poissons_ratio >= 0.5 {
            return Err(Error::InvalidMaterial(
                "Poisson's ratio must be in range (-1, 0.5)".into(),
            ));
        }
        if drag_coefficient <= 0.0 {
            return Err(Error::InvalidMaterial(
                "drag coefficient must be positive".into(),
            ));
        }
        if crss < 0.0 {
            return Err(Error::InvalidMaterial(
                "critical resolved shear stress must be non-negative".into(),
            ));
        }
        Ok(Self {
            shear_modulus,
            poissons_ratio,
            drag_coefficient,
            crss,
        })
    }

    /// Prefactor K = μ·|b| / (2π·(1−ν)) of the edge dislocation stress field.
    pub fn stress_prefactor(&self, burgers_magnitude: f64) -> f64 {
        self.shear_modulus * burgers_magnitude / (2.0 * PI * (1.0 - self.poissons_ratio))
    }
}

/// Common material presets.
impl Material {
    /// Aluminum (μ = 26.5 GPa, ν = 0.345, B = 1e-4 Pa·s, τ_c = 5 MPa).
    pub fn aluminum() -> Self {
        Self {
            shear_modulus: 26.5e9,
            poissons_ratio: 0.345,
            drag_coefficient: 1.0e-4,
            crss: 5.0e6,
        }
    }
}
