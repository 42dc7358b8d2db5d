//! Empirical parasite-density model for a single concurrent infection (component C3).
//!
//! Each infection tracks a short rolling window of its own lagged log-densities and evolves them
//! with a day-since-start autoregressive process, the core empirical model this simulator is
//! built around.

use ixa::{Context, IxaError};
use statrs::distribution::ContinuousCDF;

use crate::rng::ContextMalariaRandomExt;

crate::define_malaria_rng!(InfectionRng);

/// Parasites/uL above which a density value is clamped; breaching it is recoverable (§4.3).
pub const MAX_DENSITY: f64 = 2e6;

/// Density below which an infection is considered extinct.
pub const EXTINCTION_LEVEL: f64 = 0.001;

/// Upper bound applied when drawing the three sub-patent seed densities, on the log scale.
const SUB_PATENT_LOG_LIMIT: f64 = 0.0;

const MAX_AMPLIFICATION_RETRIES: u32 = 10;

/// Tabulated autoregression coefficient parameters by whole days since infection start. The
/// table is extrapolated as a constant beyond its last entry, matching the age-interpolation
/// convention used elsewhere in this crate.
struct ArCoefficientTable {
    /// (mean, sd) for b1, b2, b3 at successive days-since-start.
    entries: &'static [(f64, f64, f64, f64, f64, f64)],
}

const AR_COEFFICIENTS: ArCoefficientTable = ArCoefficientTable {
    entries: &[
        (1.2, 0.35, -0.35, 0.30, -0.10, 0.25),
        (1.05, 0.30, -0.25, 0.28, -0.08, 0.22),
        (0.95, 0.28, -0.18, 0.25, -0.06, 0.20),
        (0.85, 0.26, -0.12, 0.22, -0.05, 0.18),
        (0.78, 0.24, -0.08, 0.20, -0.04, 0.16),
        (0.72, 0.22, -0.05, 0.18, -0.03, 0.15),
        (0.68, 0.20, -0.03, 0.16, -0.02, 0.14),
        (0.65, 0.19, -0.02, 0.15, -0.02, 0.13),
        (0.62, 0.18, -0.01, 0.14, -0.01, 0.12),
        (0.60, 0.17, 0.0, 0.13, -0.01, 0.12),
    ],
};

impl ArCoefficientTable {
    fn lookup(&self, day: u32) -> (f64, f64, f64, f64, f64, f64) {
        let idx = (day as usize).min(self.entries.len() - 1);
        self.entries[idx]
    }
}

const NOISE_SD_INTERCEPT: f64 = 0.1;
const NOISE_SD_SLOPE: f64 = 0.001;
const MEAN_INFLATION: f64 = 1.0;
const SIGMA_INFLATION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfectionOutcome {
    /// Still patent/sub-patent; carries the density for this step.
    Density,
    /// Density fell below the extinction level.
    Extinct,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EmpiricalInfection {
    pub start_step: f64,
    pub duration: f64,
    pub genotype_id: u32,
    /// Lagged log-densities, most recent last: `[L0, L1, L2]`.
    log_density_lags: [f64; 3],
    pub current_density: f64,
}

impl EmpiricalInfection {
    /// Creates a new infection, sampling its duration and seeding its lag window from the
    /// sub-patent sampler.
    ///
    /// # Errors
    /// Propagates any sampling error from the underlying distributions.
    pub fn new(
        context: &mut Context,
        start_step: f64,
        genotype_id: u32,
    ) -> Result<Self, IxaError> {
        let duration = context.sample_lognormal(InfectionRng, 5.13, 0.80)? + 1.0;
        let log_density_lags = [
            sample_sub_patent(context, 1.0, 0.2)?,
            sample_sub_patent(context, 1.2, 0.25)?,
            sample_sub_patent(context, 1.4, 0.3)?,
        ];
        Ok(EmpiricalInfection {
            start_step,
            duration,
            genotype_id,
            log_density_lags,
            current_density: 0.0,
        })
    }

    #[must_use]
    pub fn days_since_start(&self, current_step: f64) -> f64 {
        current_step - self.start_step
    }

    #[must_use]
    pub fn has_expired(&self, current_step: f64) -> bool {
        self.days_since_start(current_step) >= self.duration
    }

    /// Advances the infection's density by one step.
    ///
    /// # Errors
    /// Propagates sampling errors from the RNG layer.
    pub fn update(
        &mut self,
        context: &mut Context,
        age_days: f64,
        survival_factor: f64,
        global_multiplier: f64,
    ) -> Result<InfectionOutcome, IxaError> {
        let days_since_start = self.days_since_start(context.get_current_time()).max(0.0);
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let day_bucket = days_since_start as u32;
        let (b1_mean, b1_sd, b2_mean, b2_sd, b3_mean, b3_sd) = AR_COEFFICIENTS.lookup(day_bucket);

        let [l0, l1, l2] = self.log_density_lags;

        let mut amplified_log_density = 0.0;
        let mut accepted = false;
        for _ in 0..MAX_AMPLIFICATION_RETRIES {
            let b1 = context.sample_normal(InfectionRng, b1_mean, b1_sd);
            let b2 = context.sample_normal(InfectionRng, b2_mean, b2_sd);
            let b3 = context.sample_normal(InfectionRng, b3_mean, b3_sd);

            let expected_log_density =
                b1 * (l0 + l1 + l2) / 3.0 + b2 * (l2 - l0) / 2.0 + b3 * (l2 + l0 - 2.0 * l1) / 4.0;

            let noise_sd = NOISE_SD_INTERCEPT + NOISE_SD_SLOPE * age_days;
            let noise = context.sample_normal(InfectionRng, 0.0, noise_sd);
            let candidate = expected_log_density + noise;

            if candidate.exp() <= MAX_DENSITY {
                amplified_log_density = candidate;
                accepted = true;
                break;
            }
        }
        if !accepted {
            ixa::warn!(
                "infection amplification exceeded {} retries; clamping to max density",
                MAX_AMPLIFICATION_RETRIES
            );
            amplified_log_density = MAX_DENSITY.ln();
        }

        let inflation_noise = context.sample_normal(InfectionRng, 0.0, SIGMA_INFLATION);
        let inflated_density = MEAN_INFLATION * (amplified_log_density + inflation_noise).exp();

        let density = (inflated_density * survival_factor).min(MAX_DENSITY);
        if density > MAX_DENSITY * 0.999 {
            ixa::warn!("infection density clamped at maxDens = {MAX_DENSITY}");
        }

        self.log_density_lags = [l1, l2, density.max(1e-12).ln()];

        let reported_density = density * global_multiplier;
        if reported_density < EXTINCTION_LEVEL {
            self.current_density = 0.0;
            Ok(InfectionOutcome::Extinct)
        } else {
            self.current_density = reported_density;
            Ok(InfectionOutcome::Density)
        }
    }
}

/// Draws one of the three sub-patent seed log-densities preceding patency.
///
/// Samples `Beta(alpha, alpha*(1-mu)/mu)`, shifts by the upper bound, then applies the inflation
/// sampler; retries up to 10 times if the result exceeds the upper bound, otherwise clamps.
fn sample_sub_patent(context: &mut Context, alpha: f64, mu: f64) -> Result<f64, IxaError> {
    let beta_param = alpha * (1.0 - mu) / mu;
    let mut value = SUB_PATENT_LOG_LIMIT;
    let mut accepted = false;
    for _ in 0..MAX_AMPLIFICATION_RETRIES {
        let x = context.sample_beta(InfectionRng, alpha, beta_param)?;
        let shifted = SUB_PATENT_LOG_LIMIT - x;
        let inflation_noise = context.sample_normal(InfectionRng, 0.0, SIGMA_INFLATION);
        let candidate = shifted + inflation_noise;
        if candidate <= SUB_PATENT_LOG_LIMIT {
            value = candidate;
            accepted = true;
            break;
        }
    }
    if !accepted {
        value = SUB_PATENT_LOG_LIMIT;
    }
    Ok(value)
}

/// Exposed for the within-host aggregator's immunity decay, which needs the inverse standard
/// normal CDF for some of its own distributional bookkeeping.
#[must_use]
pub fn inverse_standard_normal_cdf(p: f64) -> f64 {
    statrs::distribution::Normal::new(0.0, 1.0)
        .unwrap()
        .inverse_cdf(p.clamp(1e-12, 1.0 - 1e-12))
}
