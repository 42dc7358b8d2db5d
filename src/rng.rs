//! Reproducible random draws for every other component.
//!
//! Unlike a wrapper around an externally-owned generator, every stream here is a single `u64`
//! splitmix64 state that this crate owns outright: `define_malaria_rng!` declares a named stream,
//! the first draw against it lazily derives its seed from the scenario's master seed and the
//! stream's own name, and every later draw just advances that one integer. Because the entire
//! state is a `u64` per stream it is trivially and exactly `Serialize`/`Deserialize`, which is
//! what lets `checkpoint.rs` capture and restore the generator byte-for-byte rather than only
//! reseeding it (see DESIGN.md). Components draw exclusively through the methods below, so the
//! draw order for a given stream is a deterministic function of call order alone -- the
//! reproducibility contract this crate relies on.

use std::collections::HashMap;
use std::ops::Range;

use ixa::{define_data_plugin, Context, IxaError};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF, Gamma, LogNormal, Normal};

/// A single named splitmix64 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRng(u64);

impl StreamRng {
    fn seeded(seed: u64) -> Self {
        StreamRng(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn next_unit(&mut self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let numerator = (self.next_u64() >> 11) as f64;
        numerator / (1u64 << 53) as f64
    }
}

fn name_hash(name: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn derive_stream_seed(master_seed: u64, name: &str) -> u64 {
    StreamRng::seeded(master_seed ^ name_hash(name)).next_u64()
}

/// Identifies one named RNG stream. `define_malaria_rng!` is the only intended implementor.
pub trait RngStream: Copy {
    const NAME: &'static str;
}

/// Declares a unit-struct RNG stream handle, the crate-owned analogue of `ixa::define_rng!`.
#[macro_export]
macro_rules! define_malaria_rng {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;
        impl $crate::rng::RngStream for $name {
            const NAME: &'static str = stringify!($name);
        }
    };
}

/// Every named stream's state, plus the master seed new streams derive from. Fully owned by this
/// crate and fully serializable, which is what `checkpoint.rs` round-trips.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RngState {
    master_seed: Option<u64>,
    streams: HashMap<String, StreamRng>,
}

define_data_plugin!(MalariaRng, RngState, RngState::default());

impl RngState {
    fn stream_mut(&mut self, name: &'static str) -> &mut StreamRng {
        let master_seed = self
            .master_seed
            .expect("ContextMalariaRandomExt::init_random must be called before sampling");
        self.streams
            .entry(name.to_string())
            .or_insert_with(|| StreamRng::seeded(derive_stream_seed(master_seed, name)))
    }
}

/// Snapshots the full RNG state (master seed plus every stream touched so far) for
/// `checkpoint.rs` to embed in a `CheckpointImage`.
#[must_use]
pub fn snapshot(context: &Context) -> RngState {
    context.get_data_container(MalariaRng).cloned().unwrap_or_default()
}

/// Restores a previously-snapshotted RNG state, so that draws after this call reproduce the
/// exact sequence that would have followed the snapshot in the original run.
pub fn restore(context: &mut Context, state: RngState) {
    *context.get_data_container_mut(MalariaRng) = state;
}

/// Support for `sample_range`, implemented only for the integer types this crate draws ranges
/// over.
pub trait RangeSample: Copy {
    fn to_u64(self) -> u64;
    fn from_u64(value: u64) -> Self;
}

impl RangeSample for usize {
    fn to_u64(self) -> u64 {
        self as u64
    }
    fn from_u64(value: u64) -> Self {
        value as usize
    }
}

impl RangeSample for u32 {
    fn to_u64(self) -> u64 {
        u64::from(self)
    }
    #[allow(clippy::cast_possible_truncation)]
    fn from_u64(value: u64) -> Self {
        value as u32
    }
}

pub trait ContextMalariaRandomExt {
    /// Seeds every RNG stream this crate owns from a single scenario integer. Must be called
    /// before any `sample_*` draw.
    fn init_random(&mut self, seed: u64);

    /// Uniform draw on [0, 1).
    fn sample_unit_uniform<R: RngStream>(&mut self, rng_id: R) -> f64;

    /// Standard Gaussian draw.
    fn sample_gaussian<R: RngStream>(&mut self, rng_id: R) -> f64;

    /// Gaussian(mean, sd) draw.
    fn sample_normal<R: RngStream>(&mut self, rng_id: R, mean: f64, sd: f64) -> f64;

    /// Bernoulli(p) draw; `p` is clamped to `[0, 1]`.
    fn sample_bernoulli<R: RngStream>(&mut self, rng_id: R, p: f64) -> bool;

    /// Gamma(shape, scale) draw.
    ///
    /// # Errors
    /// Returns `IxaError` if `shape` or `scale` are not strictly positive.
    fn sample_gamma<R: RngStream>(&mut self, rng_id: R, shape: f64, scale: f64) -> Result<f64, IxaError>;

    /// Beta(alpha, beta) draw.
    ///
    /// # Errors
    /// Returns `IxaError` if `alpha` or `beta` are not strictly positive.
    fn sample_beta<R: RngStream>(&mut self, rng_id: R, alpha: f64, beta: f64) -> Result<f64, IxaError>;

    /// Lognormal draw parameterised on the log scale.
    ///
    /// # Errors
    /// Returns `IxaError` if `sd_log` is not strictly positive.
    fn sample_lognormal<R: RngStream>(
        &mut self,
        rng_id: R,
        mean_log: f64,
        sd_log: f64,
    ) -> Result<f64, IxaError>;

    /// Poisson(lambda) draw via Knuth's multiply-uniforms algorithm. Returns 0 for `lambda <= 0`.
    ///
    /// # Errors
    /// Returns `IxaError` if `lambda` is non-finite and positive.
    fn sample_poisson<R: RngStream>(&mut self, rng_id: R, lambda: f64) -> Result<u64, IxaError>;

    /// Samples the maximum of `trials - 1` standard uniforms, `U = V^(1/(trials-1))`, then
    /// composes it with the inverse-standard-normal and the supplied lognormal parameters. Used
    /// to draw per-infection autoregression noise that must dominate `trials - 1` independent
    /// draws (the "maximum of T-1 uniforms" sampler named in the within-host model).
    ///
    /// # Errors
    /// Returns `IxaError` if `trials < 2` or `sd_log` is not strictly positive.
    fn sample_lognormal_max<R: RngStream>(
        &mut self,
        rng_id: R,
        trials: u32,
        mean_log: f64,
        sd_log: f64,
    ) -> Result<f64, IxaError>;

    /// Uniform integer draw in `range`, used where a discrete index rather than a continuous
    /// quantity is needed (e.g. picking a live host to seed an imported infection).
    fn sample_range<R: RngStream, T: RangeSample>(&mut self, rng_id: R, range: Range<T>) -> T;
}

impl ContextMalariaRandomExt for Context {
    fn init_random(&mut self, seed: u64) {
        let state = self.get_data_container_mut(MalariaRng);
        state.master_seed = Some(seed);
        state.streams.clear();
    }

    fn sample_unit_uniform<R: RngStream>(&mut self, _rng_id: R) -> f64 {
        self.get_data_container_mut(MalariaRng).stream_mut(R::NAME).next_unit()
    }

    fn sample_gaussian<R: RngStream>(&mut self, rng_id: R) -> f64 {
        let u = self.sample_unit_uniform(rng_id);
        Normal::new(0.0, 1.0).unwrap().inverse_cdf(u)
    }

    fn sample_normal<R: RngStream>(&mut self, rng_id: R, mean: f64, sd: f64) -> f64 {
        if sd <= 0.0 {
            return mean;
        }
        let u = self.sample_unit_uniform(rng_id);
        Normal::new(mean, sd).unwrap().inverse_cdf(u)
    }

    fn sample_bernoulli<R: RngStream>(&mut self, rng_id: R, p: f64) -> bool {
        self.sample_unit_uniform(rng_id) < p.clamp(0.0, 1.0)
    }

    fn sample_gamma<R: RngStream>(&mut self, rng_id: R, shape: f64, scale: f64) -> Result<f64, IxaError> {
        let dist = Gamma::new(shape, 1.0 / scale).map_err(|e| {
            IxaError::IxaError(format!("invalid gamma parameters shape={shape}, scale={scale}: {e}"))
        })?;
        let u = self.sample_unit_uniform(rng_id);
        Ok(dist.inverse_cdf(u))
    }

    fn sample_beta<R: RngStream>(&mut self, rng_id: R, alpha: f64, beta: f64) -> Result<f64, IxaError> {
        let dist = Beta::new(alpha, beta).map_err(|e| {
            IxaError::IxaError(format!("invalid beta parameters alpha={alpha}, beta={beta}: {e}"))
        })?;
        let u = self.sample_unit_uniform(rng_id);
        Ok(dist.inverse_cdf(u))
    }

    fn sample_lognormal<R: RngStream>(
        &mut self,
        rng_id: R,
        mean_log: f64,
        sd_log: f64,
    ) -> Result<f64, IxaError> {
        let dist = LogNormal::new(mean_log, sd_log).map_err(|e| {
            IxaError::IxaError(format!(
                "invalid lognormal parameters mean_log={mean_log}, sd_log={sd_log}: {e}"
            ))
        })?;
        let u = self.sample_unit_uniform(rng_id);
        Ok(dist.inverse_cdf(u))
    }

    fn sample_poisson<R: RngStream>(&mut self, rng_id: R, lambda: f64) -> Result<u64, IxaError> {
        if lambda <= 0.0 {
            return Ok(0);
        }
        if !lambda.is_finite() {
            return Err(IxaError::IxaError(format!(
                "Poisson draw requested with non-finite lambda: {lambda}"
            )));
        }
        let l = (-lambda).exp();
        let mut k: u64 = 0;
        let mut p = 1.0;
        loop {
            k += 1;
            p *= self.sample_unit_uniform(rng_id);
            if p <= l {
                break;
            }
        }
        Ok(k - 1)
    }

    fn sample_lognormal_max<R: RngStream>(
        &mut self,
        rng_id: R,
        trials: u32,
        mean_log: f64,
        sd_log: f64,
    ) -> Result<f64, IxaError> {
        if trials < 2 {
            return Err(IxaError::IxaError(
                "sample_lognormal_max requires trials >= 2".to_string(),
            ));
        }
        if sd_log <= 0.0 {
            return Err(IxaError::IxaError(format!(
                "sample_lognormal_max requires sd_log > 0, got {sd_log}"
            )));
        }
        let v = self.sample_unit_uniform(rng_id);
        let u = v.powf(1.0 / f64::from(trials - 1));
        let standard_normal = Normal::new(0.0, 1.0).unwrap();
        let z = standard_normal.inverse_cdf(u);
        Ok((mean_log + sd_log * z).exp())
    }

    fn sample_range<R: RngStream, T: RangeSample>(&mut self, rng_id: R, range: Range<T>) -> T {
        let lo = range.start.to_u64();
        let hi = range.end.to_u64();
        if hi <= lo {
            return T::from_u64(lo);
        }
        let span = hi - lo;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let offset = (self.sample_unit_uniform(rng_id) * span as f64) as u64;
        T::from_u64(lo + offset.min(span - 1))
    }
}

#[cfg(test)]
mod test {
    use super::ContextMalariaRandomExt;
    use ixa::Context;

    crate::define_malaria_rng!(TestRng);

    #[test]
    fn test_poisson_nonpositive_lambda_returns_zero() {
        let mut context = Context::new();
        context.init_random(42);
        assert_eq!(context.sample_poisson(TestRng, 0.0).unwrap(), 0);
        assert_eq!(context.sample_poisson(TestRng, -5.0).unwrap(), 0);
    }

    #[test]
    fn test_poisson_nonfinite_lambda_errors() {
        let mut context = Context::new();
        context.init_random(42);
        assert!(context.sample_poisson(TestRng, f64::INFINITY).is_err());
    }

    #[test]
    fn test_gamma_rejects_nonpositive_shape() {
        let mut context = Context::new();
        context.init_random(42);
        assert!(context.sample_gamma(TestRng, -1.0, 1.0).is_err());
    }

    #[test]
    fn test_beta_draw_is_in_unit_interval() {
        let mut context = Context::new();
        context.init_random(42);
        for _ in 0..50 {
            let x = context.sample_beta(TestRng, 2.0, 5.0).unwrap();
            assert!((0.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn test_lognormal_max_requires_at_least_two_trials() {
        let mut context = Context::new();
        context.init_random(42);
        assert!(context.sample_lognormal_max(TestRng, 1, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_reproducible_sequence_for_same_seed() {
        let mut c1 = Context::new();
        c1.init_random(7);
        let mut c2 = Context::new();
        c2.init_random(7);
        let seq1: Vec<f64> = (0..10).map(|_| c1.sample_gaussian(TestRng)).collect();
        let seq2: Vec<f64> = (0..10).map(|_| c2.sample_gaussian(TestRng)).collect();
        assert_eq!(seq1, seq2);
    }

    #[test]
    fn test_distinct_streams_are_independent() {
        crate::define_malaria_rng!(OtherRng);
        let mut context = Context::new();
        context.init_random(7);
        let a = context.sample_gaussian(TestRng);
        let b = context.sample_gaussian(OtherRng);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sample_range_stays_within_bounds() {
        let mut context = Context::new();
        context.init_random(1);
        for _ in 0..100 {
            let x: usize = context.sample_range(TestRng, 3..8);
            assert!((3..8).contains(&x));
        }
    }
}
