//! Probabilistic admission.

use rand::Rng;

use crate::error::ConfigError;

/**
 * Keeps a report with probability `sampling`.
 *
 * `None` admits everything. `Some(0.0)` admits nothing. Otherwise a uniform
 * draw in `[0, 1)` above the ratio is a sampling hit. No state is kept
 * between checks.
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct Sampler {
    sampling: Option<f64>,
}

impl Sampler {
    pub fn new(sampling: Option<f64>) -> Result<Self, ConfigError> {
        if let Some(ratio) = sampling {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::InvalidSampling(ratio));
            }
        }
        Ok(Self { sampling })
    }

    pub fn sampling(&self) -> Option<f64> {
        self.sampling
    }

    /// Draws and returns `true` if the report should be dropped.
    pub fn is_hit(&self) -> bool {
        self.is_hit_with(rand::thread_rng().gen::<f64>())
    }

    /// Decides for a given draw in `[0, 1)`.
    pub fn is_hit_with(&self, draw: f64) -> bool {
        match self.sampling {
            None => false,
            Some(ratio) => ratio <= 0.0 || draw > ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_never_hits() {
        let sampler = Sampler::new(None).unwrap();
        assert!((0..1_000).all(|_| !sampler.is_hit()));
    }

    #[test]
    fn test_one_never_hits() {
        let sampler = Sampler::new(Some(1.0)).unwrap();
        assert!((0..1_000).all(|_| !sampler.is_hit()));
        assert!(!sampler.is_hit_with(0.999_999));
    }

    #[test]
    fn test_zero_always_hits() {
        let sampler = Sampler::new(Some(0.0)).unwrap();
        assert!((0..1_000).all(|_| sampler.is_hit()));
        assert!(sampler.is_hit_with(0.0));
    }

    #[test]
    fn test_draw_above_ratio_hits() {
        let sampler = Sampler::new(Some(0.25)).unwrap();
        assert!(sampler.is_hit_with(0.5));
        assert!(!sampler.is_hit_with(0.25));
        assert!(!sampler.is_hit_with(0.1));
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        assert!(Sampler::new(Some(1.5)).is_err());
        assert!(Sampler::new(Some(-0.1)).is_err());
        assert!(Sampler::new(Some(f64::NAN)).is_err());
    }
}
