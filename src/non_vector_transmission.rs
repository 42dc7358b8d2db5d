//! Forced-EIR (non-vector) transmission coupling: a seasonal per-step EIR vector, rescaled during
//! the main phase by host-infectiousness (kappa) feedback (component C8).

use ixa::{define_data_plugin, Context, IxaError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonVectorTransmissionState {
    /// Per-step seasonal EIR, length `steps_per_year`.
    seasonal_step_eir: Vec<f64>,
    /// Full-run kappa history, one entry appended per step.
    kappa: Vec<f64>,
    /// Kappa captured at the warm-up -> main-phase switchover, indexed the same way as `kappa`.
    initial_kappa: Vec<f64>,
    eip_steps: usize,
}

define_data_plugin!(
    NonVectorTransmission,
    Option<NonVectorTransmissionState>,
    None
);

/// Minimum fraction of the mean EIR any single step's seasonal value is clamped to.
const MIN_EIR_MULT: f64 = 0.01;

/// Folds a daily-resolution EIR array into a step-resolution vector by averaging, then clamps
/// each value to at least `min_eir_mult * mean`.
///
/// # Errors
/// Returns `IxaError` if `daily_eir` is empty or `days_per_step` is zero.
pub fn fold_daily_to_step(daily_eir: &[f64], days_per_step: usize) -> Result<Vec<f64>, IxaError> {
    if daily_eir.is_empty() {
        return Err(IxaError::IxaError(
            "daily EIR array must not be empty".to_string(),
        ));
    }
    if days_per_step == 0 {
        return Err(IxaError::IxaError("days_per_step must be positive".to_string()));
    }
    let step_values: Vec<f64> = daily_eir
        .chunks(days_per_step)
        .map(|chunk| chunk.iter().sum::<f64>() / chunk.len() as f64)
        .collect();
    let mean = step_values.iter().sum::<f64>() / step_values.len() as f64;
    let floor = MIN_EIR_MULT * mean;
    Ok(step_values.into_iter().map(|v| v.max(floor)).collect())
}

pub trait ContextNonVectorTransmissionExt {
    /// # Errors
    /// Returns `IxaError` if `daily_eir`/`days_per_step` are invalid.
    fn init_non_vector_transmission(
        &mut self,
        daily_eir: &[f64],
        days_per_step: usize,
        eip_steps: usize,
    ) -> Result<(), IxaError>;

    /// Records this step's population-average kappa (probability a mosquito becomes infected at
    /// one bite); appends to the running history.
    fn record_kappa(&mut self, step: usize, kappa: f64);

    /// Captures the current kappa history as `initialKappa`, called once at the warm-up -> main
    /// transition.
    fn capture_initial_kappa(&mut self);

    /// Returns the step EIR: the stored seasonal value in forced/warm-up mode, or the
    /// kappa-rescaled value in dynamic mode.
    ///
    /// # Errors
    /// Returns `IxaError` if dynamic mode is requested and `initialKappa` at the lookback index
    /// is ≈0 (the documented fatal-at-switchover behaviour).
    fn step_eir(&self, step: usize, forced: bool) -> Result<f64, IxaError>;

    /// Returns a clone of the current state for checkpointing, if initialised.
    fn non_vector_transmission_snapshot(&self) -> Option<NonVectorTransmissionState>;

    /// Restores a previously snapshotted state, replacing any existing one.
    fn restore_non_vector_transmission(&mut self, state: NonVectorTransmissionState);
}

impl ContextNonVectorTransmissionExt for Context {
    fn init_non_vector_transmission(
        &mut self,
        daily_eir: &[f64],
        days_per_step: usize,
        eip_steps: usize,
    ) -> Result<(), IxaError> {
        let seasonal_step_eir = fold_daily_to_step(daily_eir, days_per_step)?;
        *self.get_data_container_mut(NonVectorTransmission) = Some(NonVectorTransmissionState {
            seasonal_step_eir,
            kappa: Vec::new(),
            initial_kappa: Vec::new(),
            eip_steps,
        });
        Ok(())
    }

    fn record_kappa(&mut self, step: usize, kappa: f64) {
        let state = self
            .get_data_container_mut(NonVectorTransmission)
            .as_mut()
            .expect("non-vector transmission not initialised");
        if state.kappa.len() <= step {
            state.kappa.resize(step + 1, 0.0);
        }
        state.kappa[step] = kappa.clamp(0.0, 1.0);
    }

    fn capture_initial_kappa(&mut self) {
        let state = self
            .get_data_container_mut(NonVectorTransmission)
            .as_mut()
            .expect("non-vector transmission not initialised");
        state.initial_kappa.clone_from(&state.kappa);
    }

    fn step_eir(&self, step: usize, forced: bool) -> Result<f64, IxaError> {
        let state = self
            .get_data_container(NonVectorTransmission)
            .and_then(Option::as_ref)
            .ok_or_else(|| IxaError::IxaError("non-vector transmission not initialised".to_string()))?;
        let steps_per_year = state.seasonal_step_eir.len();
        let seasonal = state.seasonal_step_eir[step % steps_per_year];
        if forced {
            return Ok(seasonal);
        }
        if step < state.eip_steps {
            return Ok(seasonal);
        }
        let lookback = step - state.eip_steps;
        let initial = state.initial_kappa.get(lookback).copied().unwrap_or(0.0);
        if initial < 4.0 * f64::MIN_POSITIVE {
            return Err(IxaError::IxaError(format!(
                "numeric: initialKappa[{lookback}] is approximately zero at the warm-up/main switchover"
            )));
        }
        let current = state.kappa.get(lookback).copied().unwrap_or(0.0);
        Ok(seasonal * current / initial)
    }

    fn non_vector_transmission_snapshot(&self) -> Option<NonVectorTransmissionState> {
        self.get_data_container(NonVectorTransmission).and_then(Clone::clone)
    }

    fn restore_non_vector_transmission(&mut self, state: NonVectorTransmissionState) {
        *self.get_data_container_mut(NonVectorTransmission) = Some(state);
    }
}

#[cfg(test)]
mod test {
    use super::{fold_daily_to_step, ContextNonVectorTransmissionExt};
    use ixa::Context;

    #[test]
    fn test_fold_daily_to_step_averages() {
        let daily = vec![1.0, 1.0, 3.0, 3.0];
        let stepped = fold_daily_to_step(&daily, 2).unwrap();
        assert_eq!(stepped, vec![1.0, 3.0]);
    }

    #[test]
    fn test_fold_empty_errors() {
        assert!(fold_daily_to_step(&[], 1).is_err());
    }

    #[test]
    fn test_forced_mode_returns_seasonal_value() {
        let mut context = Context::new();
        context
            .init_non_vector_transmission(&[1.0, 2.0, 3.0, 4.0], 1, 10)
            .unwrap();
        let eir = context.step_eir(2, true).unwrap();
        assert_eq!(eir, 3.0);
    }

    #[test]
    fn test_dynamic_mode_fails_on_zero_initial_kappa() {
        let mut context = Context::new();
        context
            .init_non_vector_transmission(&vec![1.0; 365], 1, 0)
            .unwrap();
        context.record_kappa(0, 0.5);
        context.capture_initial_kappa();
        assert!(context.step_eir(0, false).is_err());
    }

    #[test]
    fn test_dynamic_mode_rescales_by_kappa_ratio() {
        let mut context = Context::new();
        context
            .init_non_vector_transmission(&vec![2.0; 365], 1, 0)
            .unwrap();
        context.record_kappa(0, 0.2);
        context.capture_initial_kappa();
        context.record_kappa(0, 0.1);
        let eir = context.step_eir(0, false).unwrap();
        assert!((eir - 1.0).abs() < 1e-9);
    }
}
