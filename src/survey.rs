//! Accumulates configured measures per survey and age group into the output matrix (component
//! C12).

use ixa::{define_data_plugin, Context, IxaError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measure {
    HostCount,
    PatentHostCount,
    EpisodeCount,
    SevereEpisodeCount,
    DeathCount,
    InfectionCount,
    LogDensitySum,
    SimulatedEir,
    InputEir,
    Kappa,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeBand {
    pub lower_years: f64,
    pub upper_years: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    pub survey_times: Vec<f64>,
    pub age_bands: Vec<AgeBand>,
    pub enabled_measures: Vec<Measure>,
}

#[derive(Debug, Clone)]
pub struct SurveyRow {
    pub survey_index: usize,
    pub age_band_index: usize,
    pub measure: Measure,
    pub value: f64,
}

#[derive(Debug, Clone, Default)]
struct SurveyAccumulatorState {
    config: Option<SurveyConfig>,
    next_survey_index: usize,
    /// keyed by (age_band_index, measure) for the current in-progress survey period.
    current_buffer: std::collections::HashMap<(usize, Measure), f64>,
    rows: Vec<SurveyRow>,
}

define_data_plugin!(SurveyAccumulator, SurveyAccumulatorState, SurveyAccumulatorState::default());

pub trait ContextSurveyExt {
    fn init_survey(&mut self, config: SurveyConfig);

    /// Adds `value` to the running total for `(age_band_index, measure)` in the current period.
    fn accumulate(&mut self, age_band_index: usize, measure: Measure, value: f64);

    /// Swaps out the current accumulator into a row set if `current_step` matches the next
    /// configured survey time, advancing the survey pointer. Returns true if a survey fired.
    fn check_survey_boundary(&mut self, current_step: f64) -> bool;

    fn rows(&self) -> Vec<SurveyRow>;

    /// # Errors
    /// Returns `IxaError` if survey has not been initialised.
    fn age_band_index_for(&self, age_years: f64) -> Result<usize, IxaError>;
}

impl ContextSurveyExt for Context {
    fn init_survey(&mut self, config: SurveyConfig) {
        let state = self.get_data_container_mut(SurveyAccumulator);
        state.config = Some(config);
        state.next_survey_index = 0;
        state.current_buffer.clear();
        state.rows.clear();
    }

    fn accumulate(&mut self, age_band_index: usize, measure: Measure, value: f64) {
        let state = self.get_data_container_mut(SurveyAccumulator);
        if let Some(config) = &state.config {
            if !config.enabled_measures.contains(&measure) {
                return;
            }
        }
        *state
            .current_buffer
            .entry((age_band_index, measure))
            .or_insert(0.0) += value;
    }

    fn check_survey_boundary(&mut self, current_step: f64) -> bool {
        let state = self.get_data_container_mut(SurveyAccumulator);
        let Some(config) = state.config.clone() else {
            return false;
        };
        let Some(&next_time) = config.survey_times.get(state.next_survey_index) else {
            return false;
        };
        if (current_step - next_time).abs() > 1e-9 {
            return false;
        }
        let survey_index = state.next_survey_index;
        for age_band_index in 0..config.age_bands.len() {
            for &measure in &config.enabled_measures {
                let value = state
                    .current_buffer
                    .get(&(age_band_index, measure))
                    .copied()
                    .unwrap_or(0.0);
                state.rows.push(SurveyRow {
                    survey_index,
                    age_band_index,
                    measure,
                    value,
                });
            }
        }
        state.current_buffer.clear();
        state.next_survey_index += 1;
        true
    }

    fn rows(&self) -> Vec<SurveyRow> {
        self.get_data_container(SurveyAccumulator)
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }

    fn age_band_index_for(&self, age_years: f64) -> Result<usize, IxaError> {
        let state = self
            .get_data_container(SurveyAccumulator)
            .ok_or_else(|| IxaError::IxaError("survey not initialised".to_string()))?;
        let config = state
            .config
            .as_ref()
            .ok_or_else(|| IxaError::IxaError("survey not initialised".to_string()))?;
        Ok(config
            .age_bands
            .iter()
            .position(|b| age_years >= b.lower_years && age_years < b.upper_years)
            .unwrap_or(config.age_bands.len().saturating_sub(1)))
    }
}

#[cfg(test)]
mod test {
    use super::{AgeBand, ContextSurveyExt, Measure, SurveyConfig};
    use ixa::Context;

    fn config() -> SurveyConfig {
        SurveyConfig {
            survey_times: vec![10.0, 20.0],
            age_bands: vec![
                AgeBand { lower_years: 0.0, upper_years: 5.0 },
                AgeBand { lower_years: 5.0, upper_years: 200.0 },
            ],
            enabled_measures: vec![Measure::HostCount, Measure::EpisodeCount],
        }
    }

    #[test]
    fn test_accumulate_and_flush_on_boundary() {
        let mut context = Context::new();
        context.init_survey(config());
        context.accumulate(0, Measure::HostCount, 5.0);
        context.accumulate(0, Measure::HostCount, 3.0);
        assert!(!context.check_survey_boundary(9.0));
        assert!(context.check_survey_boundary(10.0));
        let rows = context.rows();
        let host_row = rows
            .iter()
            .find(|r| r.age_band_index == 0 && r.measure == Measure::HostCount)
            .unwrap();
        assert_eq!(host_row.value, 8.0);
    }

    #[test]
    fn test_disabled_measure_is_not_accumulated() {
        let mut context = Context::new();
        context.init_survey(config());
        context.accumulate(0, Measure::Kappa, 42.0);
        context.check_survey_boundary(10.0);
        let rows = context.rows();
        assert!(!rows.iter().any(|r| r.measure == Measure::Kappa));
    }

    #[test]
    fn test_age_band_index_for() {
        let mut context = Context::new();
        context.init_survey(config());
        assert_eq!(context.age_band_index_for(2.0).unwrap(), 0);
        assert_eq!(context.age_band_index_for(10.0).unwrap(), 1);
    }
}
