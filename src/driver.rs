//! Top-level phase machine tying every component together into one simulation run
//! (component C14): `Starting` -> `OneLifeSpan` -> `TransmissionInit` -> `Main` -> `End`.

use std::collections::HashMap;
use std::path::PathBuf;

use ixa::{Context, ContextPeopleExt, IxaError};

use crate::age_interpolation::AgeBandTable;
use crate::checkpoint;
use crate::host_transmission::{
    sample_species_availability, AvailabilityDistribution, ContextHostTransmissionExt,
    PerHostTransmission, PerHostTransmissionState,
};
use crate::human::{Alive, BirthStep, ContextHumanExt, HumanUpdateParams};
use crate::infection_incidence::{draw_new_infection_count, expected_new_infections, IncidenceParams};
use crate::interventions::ContextInterventionManagerExt;
use crate::non_vector_transmission::ContextNonVectorTransmissionExt;
use crate::parameters::{
    ContextParametersExt, EntomologyConfig, InfectionModelSelector, ModelParameters,
    ParametersValues, VectorSpeciesConfig,
};
use crate::pathogenesis::PathogenesisParams;
use crate::population::{build_target_age_distribution, ContextPopulationExt};
use crate::reports::survey_writer;
use crate::rng::ContextMalariaRandomExt;
use crate::survey::{ContextSurveyExt, Measure};
use crate::vector_transmission::{ContextVectorTransmissionExt, HostAggregates, VectorSpeciesState, DAYS_PER_YEAR};
use crate::within_host::{ContextWithinHostExt, WithinHostParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimPhase {
    Starting,
    OneLifeSpan,
    TransmissionInit,
    Main,
    End,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub seed: Option<u64>,
    pub checkpoint: Option<PathBuf>,
    pub checkpoint_stop: bool,
    pub output: PathBuf,
    pub compress_output: bool,
    pub print_interventions: bool,
    pub print_survey_times: bool,
    pub deprecation_warnings: bool,
}

/// Runtime numeric constants resolved from `ModelParameters` at scenario load. The named model
/// "default" is the only variant with built-in defaults; the explicit 38-entry form is accepted
/// but only a handful of positions are consumed by this crate's reduced parameter set (see
/// DESIGN.md).
#[derive(Debug, Clone, Copy)]
pub struct ResolvedModelParams {
    pub within_host: WithinHostParams,
    pub pathogenesis: PathogenesisParams,
    pub incidence: IncidenceParams,
}

/// # Errors
/// Returns `scenario:`-prefixed `IxaError` if an explicit parameter vector is too short.
pub fn resolve_model_parameters(model: &ModelParameters) -> Result<ResolvedModelParams, IxaError> {
    let defaults = ResolvedModelParams {
        within_host: WithinHostParams {
            immune_decay_rate: 0.0,
            s_imm: 0.049,
            h_star: 97.3,
            gamma: 2.0,
            detection_limit: 40.0,
            infectiousness_tau: 1.0,
            infectiousness_density_exponent: 1.0,
        },
        pathogenesis: PathogenesisParams {
            alpha: 0.1,
            y1: 1.0,
            y2: 1.0,
            mu_y: 0.01,
            threshold_severe: 1.0e5,
            indirect_mortality_base_risk: 0.005,
            doomed_delay_steps: 6.0,
        },
        incidence: IncidenceParams {
            model: crate::infection_incidence::InfectionIncidenceModel::Default,
            s_inf: 0.049,
            e_star: 15.0,
        },
    };
    match &model.infection_model {
        InfectionModelSelector::Named(name) if name == "default" => Ok(defaults),
        InfectionModelSelector::Named(other) => Err(IxaError::IxaError(format!(
            "scenario: unknown named infection model {other:?}"
        ))),
        InfectionModelSelector::Explicit(values) => {
            if values.len() < 6 {
                return Err(IxaError::IxaError(
                    "scenario: explicit infection model parameter vector is too short".to_string(),
                ));
            }
            let mut resolved = defaults;
            resolved.within_host.s_imm = values[0];
            resolved.within_host.h_star = values[1];
            resolved.within_host.gamma = values[2];
            resolved.within_host.detection_limit = values[3];
            resolved.pathogenesis.threshold_severe = values[4];
            resolved.incidence.e_star = values[5];
            Ok(resolved)
        }
    }
}

fn mortality_table() -> &'static AgeBandTable {
    static TABLE: std::sync::OnceLock<AgeBandTable> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        AgeBandTable::new(&[
            (1.0, 0.08),
            (5.0, 0.02),
            (15.0, 0.005),
            (f64::INFINITY, 0.01),
        ])
    })
}

fn living_people_age_sorted(context: &Context) -> Vec<ixa::PersonId> {
    let mut people = context.query_people((Alive, true));
    people.sort_by(|a, b| {
        let age_a = context.get_person_property(*a, BirthStep);
        let age_b = context.get_person_property(*b, BirthStep);
        age_a.partial_cmp(&age_b).unwrap()
    });
    people
}

fn build_human_params(step_duration_days: f64, resolved: &ResolvedModelParams) -> HumanUpdateParams {
    HumanUpdateParams {
        step_length_days: step_duration_days,
        within_host: resolved.within_host,
        pathogenesis: resolved.pathogenesis,
        mortality_table: mortality_table(),
    }
}

/// `(days_per_step, eip_steps)`, the latter only meaningful for vector entomology.
fn step_timing(parameters: &ParametersValues) -> (usize, usize) {
    let days_per_step = parameters.model.step_duration_days.round().max(1.0) as usize;
    let eip_steps = match &parameters.entomology {
        EntomologyConfig::Vector { species } => species
            .first()
            .map_or(0, |s| s.params.eip_days / days_per_step.max(1)),
        _ => 0,
    };
    (days_per_step, eip_steps)
}

/// Registers entomological state from the scenario: seasonal EIR tables for non-vector modes, or
/// one `VectorSpeciesState` per configured species for vector mode.
fn init_entomology(context: &mut Context, parameters: &ParametersValues) -> Result<(), IxaError> {
    let (days_per_step, eip_steps) = step_timing(parameters);
    match &parameters.entomology {
        EntomologyConfig::NonVectorDaily { daily_eir } => {
            context.init_non_vector_transmission(daily_eir, days_per_step, eip_steps)?;
        }
        EntomologyConfig::NonVectorFourier { mean_eir, fourier_coefficients } => {
            let daily: Vec<f64> = (0..DAYS_PER_YEAR)
                .map(|day| {
                    let angle = 2.0 * std::f64::consts::PI * day as f64 / DAYS_PER_YEAR as f64;
                    let seasonal: f64 = fourier_coefficients
                        .iter()
                        .enumerate()
                        .map(|(k, c)| c * ((k as f64 + 1.0) * angle).cos())
                        .sum();
                    (mean_eir * (1.0 + seasonal)).max(0.0)
                })
                .collect();
            context.init_non_vector_transmission(&daily, days_per_step, eip_steps)?;
        }
        EntomologyConfig::Vector { species } => {
            for species_config in species {
                context.register_vector_species(
                    species_config.species_id,
                    VectorSpeciesState::new(species_config.params.clone(), 1000.0),
                );
            }
        }
    }
    Ok(())
}

/// Draws and stores each person's per-species availability/biting/resting state (§4.6), sampled
/// once per host and held fixed afterwards. A no-op under non-vector entomology.
fn seed_vector_transmission_state(
    context: &mut Context,
    people: &[ixa::PersonId],
    species: &[VectorSpeciesConfig],
) -> Result<(), IxaError> {
    for &person in people {
        let mut state = PerHostTransmissionState::default();
        state.hetero_multiplier = 1.0;
        for species_config in species {
            let dist = AvailabilityDistribution {
                mean: species_config.availability_mean,
                variance: species_config.availability_variance,
                biting_alpha: species_config.biting_probability_alpha,
                biting_beta: species_config.biting_probability_beta,
                resting_alpha: species_config.resting_probability_alpha,
                resting_beta: species_config.resting_probability_beta,
            };
            state.species.push(sample_species_availability(context, &dist)?);
        }
        context.set_person_property(person, PerHostTransmission, state);
    }
    Ok(())
}

/// Seeds one newborn's vector transmission state, if entomology is vector-mode; a no-op
/// otherwise.
fn seed_newborn_vector_state(
    context: &mut Context,
    person: ixa::PersonId,
    entomology: &EntomologyConfig,
) -> Result<(), IxaError> {
    let EntomologyConfig::Vector { species } = entomology else {
        return Ok(());
    };
    seed_vector_transmission_state(context, &[person], species)
}

/// Sums one species' per-host contributions (`alpha`, `alpha*pBiting*pResting`, and that term
/// weighted by infectiousness) across the living population, per §4.9 steps 1-4.
fn compute_host_aggregates(
    context: &Context,
    people: &[ixa::PersonId],
    species_idx: usize,
    within_host_params: &WithinHostParams,
) -> HostAggregates {
    let mut sum_alpha = 0.0;
    let mut sum_p_df_terms = 0.0;
    let mut sum_p_dif_terms = 0.0;
    for &person in people {
        let alpha = context.effective_availability(person, species_idx, 1.0);
        let p_bite = context.effective_biting(person, species_idx);
        let p_rest = context.effective_resting(person, species_idx);
        let term = alpha * p_bite * p_rest;
        sum_alpha += alpha;
        sum_p_df_terms += term;
        sum_p_dif_terms += term * context.prob_transmission_to_mosquito(person, within_host_params);
    }
    HostAggregates { sum_alpha, sum_p_df_terms, sum_p_dif_terms }
}

/// Repeats/truncates `values` to exactly `DAYS_PER_YEAR` entries, cycling short scenario-supplied
/// series rather than padding with zeros.
fn to_annual_array(values: &[f64]) -> [f64; DAYS_PER_YEAR] {
    let mut out = [0.0; DAYS_PER_YEAR];
    if values.is_empty() {
        return out;
    }
    for (day, slot) in out.iter_mut().enumerate() {
        *slot = values[day % values.len()];
    }
    out
}

/// Exposes every living host to this step's EIR: computes each host's expected new-infection
/// count via C7 and seeds the realised Poisson draw as new C3 infections.
fn expose_population_to_eir(
    context: &mut Context,
    people: &[ixa::PersonId],
    step_eir: f64,
    incidence: &IncidenceParams,
    within_host_params: &WithinHostParams,
) -> Result<(), IxaError> {
    if step_eir <= 0.0 {
        return Ok(());
    }
    for &person in people {
        let susceptibility = context.susceptibility(person, within_host_params);
        let expected = expected_new_infections(context, step_eir, susceptibility, incidence)?;
        let count = draw_new_infection_count(context, expected)?;
        for _ in 0..count {
            let _ = context.add_infection(person, 0);
        }
    }
    Ok(())
}

/// Computes the population-average kappa (probability a biting mosquito is infected) across
/// every living host, the quantity C8/C9 feed back into forced- and dynamic-EIR calculations.
fn compute_kappa(context: &Context, people: &[ixa::PersonId], within_host_params: &WithinHostParams) -> f64 {
    if people.is_empty() {
        return 0.0;
    }
    let total: f64 = people
        .iter()
        .map(|p| context.prob_transmission_to_mosquito(*p, within_host_params))
        .sum();
    (total / people.len() as f64).clamp(0.0, 1.0)
}

/// Writes a checkpoint and signals the step loop to stop if `--checkpoint-stop` was requested;
/// a no-op (never stops) when no checkpoint directory is configured or the flag is absent. This
/// is the per-step "checkpoint poll" named first in §4.14's step order.
fn checkpoint_poll(
    context: &Context,
    parameters: &ParametersValues,
    options: &RunOptions,
) -> Result<bool, IxaError> {
    let Some(dir) = &options.checkpoint else {
        return Ok(false);
    };
    if !options.checkpoint_stop {
        return Ok(false);
    }
    checkpoint::write_checkpoint(context, parameters, dir)?;
    Ok(true)
}

/// Runs one full simulation: population seeding, the life-span and transmission-init warm-up
/// phases, then the main phase's fixed per-step order (survey check, intervention dispatch,
/// human loop, vector/non-vector update), matching spec.md §4.14/§5 exactly.
///
/// If `options.checkpoint` already names a directory holding a checkpoint, resumes from it
/// instead of seeding a fresh population (see [`resume_simulation`]).
///
/// # Errors
/// Propagates any `IxaError` from parameter validation, entomological fitting, or per-step
/// sampling, classified by `crate::error::classify` at the call site.
pub fn run_simulation(context: &mut Context, options: &RunOptions) -> Result<(), IxaError> {
    if let Some(dir) = &options.checkpoint {
        if checkpoint::has_checkpoint(dir) {
            return resume_simulation(context, options);
        }
    }

    crate::parameters::init_parameters(context, &options.input)?;
    let parameters = context.get_params();
    if let Some(seed) = options.seed {
        context.init_random(seed);
    } else {
        context.init_random(parameters.seed);
    }

    let resolved = resolve_model_parameters(&parameters.model)?;
    let human_params = build_human_params(parameters.model.step_duration_days, &resolved);

    let population_size = parameters.demography.population_size;
    let age_distribution = build_target_age_distribution(&parameters.demography)?;
    let people =
        context.seed_initial_population(population_size, &age_distribution, parameters.demography.max_age_years)?;

    init_entomology(context, &parameters)?;
    if let EntomologyConfig::Vector { species } = &parameters.entomology {
        seed_vector_transmission_state(context, &people, species)?;
    }

    context.init_survey(parameters.monitoring.clone());
    survey_writer::init(context, &options.output.to_string_lossy())?;

    run_one_life_span(context, &human_params, &resolved, &parameters)?;
    run_transmission_init(context, &resolved, &parameters)?;
    let stopped = run_main_phase(context, &human_params, &resolved, &parameters, options, 0)?;
    if !stopped && options.checkpoint.is_some() && !options.checkpoint_stop {
        checkpoint::write_checkpoint(context, &parameters, options.checkpoint.as_ref().unwrap())?;
    }

    Ok(())
}

/// Restores a checkpointed run's population, non-vector transmission state, and RNG, fast-forwards
/// the context clock to the checkpointed time, and continues the `Main` phase from there to
/// completion. Entomological registration is rebuilt from the scenario (a pure function of it) and
/// then overwritten where the checkpoint carries its own mutable state.
///
/// # Errors
/// Propagates parameter/checkpoint load errors, or any error from the resumed step loop.
pub fn resume_simulation(context: &mut Context, options: &RunOptions) -> Result<(), IxaError> {
    crate::parameters::init_parameters(context, &options.input)?;
    let parameters = context.get_params();
    let dir = options.checkpoint.as_ref().ok_or_else(|| {
        IxaError::IxaError("checkpoint: --checkpoint <dir> is required to resume".to_string())
    })?;

    let resolved = resolve_model_parameters(&parameters.model)?;
    let human_params = build_human_params(parameters.model.step_duration_days, &resolved);

    init_entomology(context, &parameters)?;

    context.init_survey(parameters.monitoring.clone());
    survey_writer::init(context, &options.output.to_string_lossy())?;

    let restored_time = checkpoint::load_checkpoint(context, &parameters, dir)?;
    context.add_plan(restored_time, |_| {});
    context.execute();

    let warmup_steps = warmup_length_steps(&parameters) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let resume_step = (restored_time - warmup_steps).max(0.0) as u64;

    let stopped = run_main_phase(context, &human_params, &resolved, &parameters, options, resume_step)?;
    if !stopped && !options.checkpoint_stop {
        checkpoint::write_checkpoint(context, &parameters, dir)?;
    }

    Ok(())
}

fn run_one_life_span(
    context: &mut Context,
    human_params: &HumanUpdateParams,
    resolved: &ResolvedModelParams,
    parameters: &ParametersValues,
) -> Result<(), IxaError> {
    // Checkpoint polling only applies to the Main phase: `resume_simulation` always re-enters
    // straight into Main, so a checkpoint taken mid-warm-up would have nowhere correct to resume.
    let warmup_steps = warmup_length_steps(parameters);
    let is_non_vector = !matches!(parameters.entomology, EntomologyConfig::Vector { .. });
    for step in 0..warmup_steps {
        let people = living_people_age_sorted(context);
        if is_non_vector {
            let step_eir = context.step_eir(step as usize, true)?;
            expose_population_to_eir(context, &people, step_eir, &resolved.incidence, &resolved.within_host)?;
        }
        for person in people {
            context.update_human(person, 1.0, 1.0, human_params)?;
            if !context.get_person_property(person, Alive) {
                let newborn = context.replace_on_death(parameters.demography.max_age_years)?;
                seed_newborn_vector_state(context, newborn, &parameters.entomology)?;
            }
        }
        context.add_plan(context.get_current_time() + 1.0, |_| {});
        context.execute();
    }
    Ok(())
}

/// `max(human_max_age_steps.ceil_to_year(), transmission_model.min_warmup())`.
fn warmup_length_steps(parameters: &ParametersValues) -> u64 {
    let days_per_step = parameters.model.step_duration_days.max(1.0);
    let steps_per_year = (365.0 / days_per_step).ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let human_max_age_steps = ((parameters.demography.max_age_years * 365.0 / days_per_step).ceil() / steps_per_year).ceil()
        as u64
        * steps_per_year as u64;
    let transmission_min_warmup = match &parameters.entomology {
        EntomologyConfig::Vector { .. } => steps_per_year as u64,
        _ => 0,
    };
    human_max_age_steps.max(transmission_min_warmup)
}

fn run_transmission_init(
    context: &mut Context,
    resolved: &ResolvedModelParams,
    parameters: &ParametersValues,
) -> Result<(), IxaError> {
    let EntomologyConfig::Vector { species } = &parameters.entomology else {
        return Ok(());
    };

    let people = living_people_age_sorted(context);
    // Host composition doesn't vary day-to-day before the simulation clock starts running, so the
    // same aggregate is reused for all 365 days; species beyond the first share it too, matching
    // `init_iterate`'s one-`HostAggregates`-per-day contract (see DESIGN.md).
    let hosts = compute_host_aggregates(context, &people, 0, &resolved.within_host);
    let hosts_by_day: Vec<HostAggregates> = vec![hosts; DAYS_PER_YEAR];

    let mut targets = HashMap::new();
    for species_config in species {
        targets.insert(species_config.species_id, to_annual_array(&species_config.target_daily_eir));
    }
    loop {
        let extra_steps = crate::vector_transmission::init_iterate(context, &hosts_by_day, &targets)?;
        if extra_steps == 0 {
            break;
        }
    }
    Ok(())
}

fn run_main_phase(
    context: &mut Context,
    human_params: &HumanUpdateParams,
    resolved: &ResolvedModelParams,
    parameters: &ParametersValues,
    options: &RunOptions,
    start_step: u64,
) -> Result<bool, IxaError> {
    let is_non_vector = !matches!(parameters.entomology, EntomologyConfig::Vector { .. });
    if start_step == 0 {
        context.finalize_deployments();
        if is_non_vector {
            context.capture_initial_kappa();
        }
    }
    let mut already_written = 0usize;

    let species_configs: Vec<VectorSpeciesConfig> = match &parameters.entomology {
        EntomologyConfig::Vector { species } => species.clone(),
        _ => Vec::new(),
    };
    // Seeds the very first main-phase step's exposure in vector mode, before any step's vector
    // update has run; overwritten at the end of every iteration with that step's freshly computed
    // EIR, which then feeds the *next* step's exposure (see the loop body's ordering note).
    let mut vector_step_eir = 0.0;

    let total_steps = (parameters.max_time / parameters.model.step_duration_days.max(1.0)).ceil() as u64;
    for step in start_step..total_steps {
        if checkpoint_poll(context, parameters, options)? {
            return Ok(true);
        }

        let current_step = context.get_current_time();
        if context.check_survey_boundary(current_step) {
            survey_writer::flush_new_rows(context, &mut already_written);
        }

        context.dispatch_timed_deployments(current_step);

        // Human updates (C10): exposure uses the EIR this population was already primed with by
        // the end of the previous step's vector update (forced mode recomputes it fresh each step
        // since it has no dependency on human state).
        let people = living_people_age_sorted(context);
        let step_eir = if is_non_vector {
            // Forced mode unconditionally: this driver's non-vector path has no independent
            // vector-mosquito state to rescale against, so the dynamic/kappa-ratio mode
            // (`step_eir(.., false)`) is left for scenarios with real feedback coupling rather
            // than tripping its zero-`initialKappa` fatal path on a legitimately zero-EIR run.
            context.step_eir(step as usize, true)?
        } else {
            vector_step_eir
        };
        context.accumulate(0, Measure::SimulatedEir, step_eir);
        expose_population_to_eir(context, &people, step_eir, &resolved.incidence, &resolved.within_host)?;

        for &person in &people {
            context.update_human(person, 1.0, 1.0, human_params)?;
            if !context.get_person_property(person, Alive) {
                let newborn = context.replace_on_death(parameters.demography.max_age_years)?;
                seed_newborn_vector_state(context, newborn, &parameters.entomology)?;
            }
        }

        // Vector update (C9): reads per-human availability and infectiousness as left by the
        // human loop just above, matching §4.14's "vector update reads ... after the human loop".
        let people_after_update = living_people_age_sorted(context);
        if !is_non_vector {
            let mut hosts_by_species = HashMap::with_capacity(species_configs.len());
            for (species_idx, species_config) in species_configs.iter().enumerate() {
                hosts_by_species.insert(
                    species_config.species_id,
                    compute_host_aggregates(context, &people_after_update, species_idx, &resolved.within_host),
                );
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let day = current_step as i64;
            // Per-host weighting by that host's own alpha/pBiting (§4.9 point 6) is left for a
            // richer C7 hookup; until then every host shares the population-summed step EIR.
            vector_step_eir = context.step_all_species(day, &hosts_by_species);
        }

        let kappa = compute_kappa(context, &people_after_update, &resolved.within_host);
        context.record_kappa(step as usize, kappa);
        for &person in &people_after_update {
            let age_years = context.age_years(person);
            let band = context.age_band_index_for(age_years).unwrap_or(0);
            context.accumulate(band, Measure::HostCount, 1.0);
            if context.is_patent(person, resolved.within_host.detection_limit) {
                context.accumulate(band, Measure::PatentHostCount, 1.0);
            }
        }

        context.add_plan(context.get_current_time() + 1.0, |_| {});
        context.execute();
    }

    Ok(false)
}
