//! Scale/descale transforms.
//!
//! The pipeline is handed two pre-fitted, opaque transforms at startup:
//! `scale` maps raw target units into the oracle's normalized space and
//! `descale` is its inverse. The core never fits or mutates them.

/// A pre-fitted pair of forward/inverse normalization transforms for the
/// target dimension.
pub trait TargetTransform: Send + Sync + 'static {
    /// Raw units -> normalized space.
    fn scale(&self, raw: f64) -> f64;

    /// Normalized space -> raw units.
    fn descale(&self, normalized: f64) -> f64;
}

/// No-op transform: the oracle predicts directly in raw units.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityTransform;

impl TargetTransform for IdentityTransform {
    fn scale(&self, raw: f64) -> f64 {
        raw
    }

    fn descale(&self, normalized: f64) -> f64 {
        normalized
    }
}

/// Affine min-max style transform: `scaled = (raw - offset) / factor`.
///
/// Matches the shape of a pre-fitted min-max scaler; the parameters arrive
/// via configuration, never fitted here.
#[derive(Debug, Copy, Clone)]
pub struct AffineTransform {
    factor: f64,
    offset: f64,
}

impl AffineTransform {
    /// `factor` must be finite and non-zero; returns `None` otherwise.
    pub fn new(factor: f64, offset: f64) -> Option<Self> {
        if !factor.is_finite() || factor == 0.0 || !offset.is_finite() {
            return None;
        }
        Some(Self { factor, offset })
    }
}

impl TargetTransform for AffineTransform {
    fn scale(&self, raw: f64) -> f64 {
        (raw - self.offset) / self.factor
    }

    fn descale(&self, normalized: f64) -> f64 {
        normalized * self.factor + self.offset
    }
}
