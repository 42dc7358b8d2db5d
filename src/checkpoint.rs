//! Persisted-state round-tripping (component C15): two alternating `bincode` files plus a
//! one-byte marker recording which is current, so a crash mid-write never advances the marker
//! past an incomplete file.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use ixa::{Context, ContextPeopleExt, IxaError, PersonId};
use serde::{Deserialize, Serialize};

use crate::host_transmission::PerHostTransmissionState;
use crate::human::{Alive, BirthStep, ComorbidityFactor, MaxAgeYears};
use crate::non_vector_transmission::{ContextNonVectorTransmissionExt, NonVectorTransmissionState};
use crate::parameters::ParametersValues;
use crate::pathogenesis::DoomedState;
use crate::rng::RngState;
use crate::vector_transmission::{restore_vector_transmission, vector_transmission_snapshot, VectorSpeciesState};
use crate::within_host::WithinHostState;

/// One human's full mutable state, captured in allocation order so that replaying the same
/// sequence of `add_person` calls against a fresh `Context` reproduces identical `PersonId`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersonSnapshot {
    alive: bool,
    birth_step: f64,
    comorbidity_factor: f64,
    max_age_years: f64,
    within_host: WithinHostState,
    doomed: Option<DoomedState>,
    transmission: PerHostTransmissionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointImage {
    scenario_checksum: u64,
    current_time: f64,
    population: Vec<PersonSnapshot>,
    non_vector: Option<NonVectorTransmissionState>,
    /// Every registered vector species' full Nv/Ov/Sv and p_a/p_df/p_dif histories plus its
    /// fitted emergence rate; empty under non-vector entomology.
    vector: HashMap<u32, VectorSpeciesState>,
    /// Every named RNG stream's exact generator state, written last so that restoring it
    /// reproduces the subsequent draw sequence bit-for-bit (§4.15's "RNG state last" rule).
    rng: RngState,
}

fn scenario_checksum(parameters: &ParametersValues) -> Result<u64, IxaError> {
    let encoded = bincode::serialize(parameters).map_err(|e| {
        IxaError::IxaError(format!("checkpoint: failed to hash scenario parameters: {e}"))
    })?;
    let mut hasher = DefaultHasher::new();
    encoded.hash(&mut hasher);
    Ok(hasher.finish())
}

fn marker_path(dir: &Path) -> PathBuf {
    dir.join("checkpoint.marker")
}

fn slot_path(dir: &Path, slot: u8) -> PathBuf {
    if slot == 0 {
        dir.join("checkpoint_a.bin")
    } else {
        dir.join("checkpoint_b.bin")
    }
}

fn current_slot(dir: &Path) -> Result<Option<u8>, IxaError> {
    let marker = marker_path(dir);
    if !marker.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&marker)
        .map_err(|e| IxaError::IxaError(format!("checkpoint: failed to read marker file: {e}")))?;
    match bytes.first() {
        Some(0) => Ok(Some(0)),
        Some(1) => Ok(Some(1)),
        _ => Err(IxaError::IxaError(
            "checkpoint: marker file does not contain a valid slot byte".to_string(),
        )),
    }
}

fn collect_population(context: &Context) -> Vec<PersonSnapshot> {
    let mut people: Vec<PersonId> = context.query_people((Alive, true));
    people.extend(context.query_people((Alive, false)));
    people.sort_by(|a, b| {
        context
            .get_person_property(*a, BirthStep)
            .partial_cmp(&context.get_person_property(*b, BirthStep))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    people
        .into_iter()
        .map(|person| PersonSnapshot {
            alive: context.get_person_property(person, Alive),
            birth_step: context.get_person_property(person, BirthStep),
            comorbidity_factor: context.get_person_property(person, ComorbidityFactor),
            max_age_years: context.get_person_property(person, MaxAgeYears),
            within_host: context.get_person_property(person, crate::within_host::WithinHost),
            doomed: context.get_person_property(person, crate::pathogenesis::Doomed),
            transmission: context.get_person_property(person, crate::host_transmission::PerHostTransmission),
        })
        .collect()
}

fn restore_population(context: &mut Context, population: &[PersonSnapshot]) -> Result<(), IxaError> {
    for snapshot in population {
        let person = context.add_person(((BirthStep, snapshot.birth_step), (Alive, snapshot.alive)))?;
        context.set_person_property(person, ComorbidityFactor, snapshot.comorbidity_factor);
        context.set_person_property(person, MaxAgeYears, snapshot.max_age_years);
        context.set_person_property(person, crate::within_host::WithinHost, snapshot.within_host.clone());
        context.set_person_property(person, crate::pathogenesis::Doomed, snapshot.doomed);
        context.set_person_property(
            person,
            crate::host_transmission::PerHostTransmission,
            snapshot.transmission.clone(),
        );
    }
    Ok(())
}

/// Writes a full checkpoint image to the slot that is not currently marked as live, then flips
/// the marker only after the slot file is fully written and flushed to disk.
///
/// # Errors
/// Returns a `checkpoint:`-prefixed `IxaError` on any I/O or serialization failure.
pub fn write_checkpoint(
    context: &Context,
    parameters: &ParametersValues,
    dir: &Path,
) -> Result<(), IxaError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| IxaError::IxaError(format!("checkpoint: failed to create directory: {e}")))?;

    let next_slot = match current_slot(dir)? {
        Some(0) => 1,
        _ => 0,
    };

    let image = CheckpointImage {
        scenario_checksum: scenario_checksum(parameters)?,
        current_time: context.get_current_time(),
        population: collect_population(context),
        non_vector: context.non_vector_transmission_snapshot(),
        vector: vector_transmission_snapshot(context),
        rng: crate::rng::snapshot(context),
    };

    let encoded = bincode::serialize(&image)
        .map_err(|e| IxaError::IxaError(format!("checkpoint: failed to serialize image: {e}")))?;

    let path = slot_path(dir, next_slot);
    let mut file = std::fs::File::create(&path)
        .map_err(|e| IxaError::IxaError(format!("checkpoint: failed to create {path:?}: {e}")))?;
    file.write_all(&encoded)
        .map_err(|e| IxaError::IxaError(format!("checkpoint: failed to write {path:?}: {e}")))?;
    file.sync_all()
        .map_err(|e| IxaError::IxaError(format!("checkpoint: failed to fsync {path:?}: {e}")))?;

    std::fs::write(marker_path(dir), [next_slot])
        .map_err(|e| IxaError::IxaError(format!("checkpoint: failed to write marker file: {e}")))?;

    Ok(())
}

/// Loads the most recently written checkpoint image and replays it onto `context`, which must be
/// empty (no people added yet), restoring the RNG state last so the very next draw continues
/// exactly where the checkpointed run left off.
///
/// # Errors
/// Returns a `checkpoint:`-prefixed `IxaError` if no checkpoint exists, the scenario checksum
/// does not match `parameters`, deserialization fails, or trailing bytes remain after the image.
pub fn load_checkpoint(
    context: &mut Context,
    parameters: &ParametersValues,
    dir: &Path,
) -> Result<f64, IxaError> {
    let slot = current_slot(dir)?
        .ok_or_else(|| IxaError::IxaError("checkpoint: no checkpoint marker found".to_string()))?;
    let path = slot_path(dir, slot);
    let bytes = std::fs::read(&path)
        .map_err(|e| IxaError::IxaError(format!("checkpoint: failed to read {path:?}: {e}")))?;

    let image: CheckpointImage = {
        let mut cursor = std::io::Cursor::new(&bytes);
        let image = bincode::deserialize_from(&mut cursor).map_err(|e| {
            IxaError::IxaError(format!("checkpoint: failed to deserialize image: {e}"))
        })?;
        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(IxaError::IxaError(format!(
                "checkpoint: {} trailing byte(s) after deserialized image",
                bytes.len() - consumed
            )));
        }
        image
    };

    let expected = scenario_checksum(parameters)?;
    if image.scenario_checksum != expected {
        return Err(IxaError::IxaError(
            "checkpoint: scenario checksum does not match the checkpoint's recorded scenario"
                .to_string(),
        ));
    }

    // Population and application state are restored first; the RNG state last, mirroring the
    // write order's "RNG last" rule so the next draw continues the exact checkpointed sequence.
    restore_population(context, &image.population)?;
    if let Some(non_vector) = image.non_vector {
        context.restore_non_vector_transmission(non_vector);
    }
    restore_vector_transmission(context, image.vector);
    crate::rng::restore(context, image.rng);

    Ok(image.current_time)
}

/// True iff `dir` holds a checkpoint marker, i.e. a prior run wrote at least one checkpoint here.
#[must_use]
pub fn has_checkpoint(dir: &Path) -> bool {
    marker_path(dir).exists()
}

#[cfg(test)]
mod test {
    use super::{load_checkpoint, write_checkpoint};
    use crate::human::{Alive, BirthStep};
    use crate::parameters::{EntomologyConfig, ModelParameters, InfectionModelSelector};
    use crate::population::DemographyParams;
    use crate::survey::SurveyConfig;
    use crate::rng::ContextMalariaRandomExt;
    use ixa::{Context, ContextPeopleExt};
    use std::path::PathBuf;

    fn sample_parameters() -> crate::parameters::ParametersValues {
        crate::parameters::ParametersValues {
            seed: 99,
            model: ModelParameters {
                infection_model: InfectionModelSelector::Named("default".to_string()),
                pre_erythrocytic_latency_days: 12.0,
                step_duration_days: 5.0,
            },
            demography: DemographyParams {
                population_size: 100,
                max_age_years: 90.0,
                growth_rate_rho: 0.0,
                hazard_m1_coefficient: 0.01,
                hazard_m2_coefficient: 0.0001,
            },
            entomology: EntomologyConfig::NonVectorDaily { daily_eir: vec![1.0; 365] },
            interventions: vec![],
            monitoring: SurveyConfig { survey_times: vec![], age_bands: vec![], enabled_measures: vec![] },
            max_time: 1000.0,
            output_path: PathBuf::from("output.tsv"),
        }
    }

    #[test]
    fn test_round_trip_restores_population() {
        let dir = tempfile::tempdir().unwrap();
        let parameters = sample_parameters();

        let mut context = Context::new();
        context.init_random(1);
        context.add_person(((BirthStep, 0.0), (Alive, true))).unwrap();
        context.add_person(((BirthStep, 5.0), (Alive, false))).unwrap();

        write_checkpoint(&context, &parameters, dir.path()).unwrap();

        let mut restored = Context::new();
        let restored_time = load_checkpoint(&mut restored, &parameters, dir.path()).unwrap();
        assert_eq!(restored_time, context.get_current_time());

        let alive_count = restored.query_people((Alive, true)).len();
        let dead_count = restored.query_people((Alive, false)).len();
        assert_eq!(alive_count, 1);
        assert_eq!(dead_count, 1);
    }

    #[test]
    fn test_checksum_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut parameters = sample_parameters();
        let context = Context::new();
        write_checkpoint(&context, &parameters, dir.path()).unwrap();

        parameters.max_time = 2000.0;
        let mut restored = Context::new();
        assert!(load_checkpoint(&mut restored, &parameters, dir.path()).is_err());
    }

    #[test]
    fn test_second_checkpoint_alternates_slot() {
        let dir = tempfile::tempdir().unwrap();
        let parameters = sample_parameters();
        let context = Context::new();
        write_checkpoint(&context, &parameters, dir.path()).unwrap();
        assert!(dir.path().join("checkpoint_a.bin").exists());
        write_checkpoint(&context, &parameters, dir.path()).unwrap();
        assert!(dir.path().join("checkpoint_b.bin").exists());
        let marker = std::fs::read(dir.path().join("checkpoint.marker")).unwrap();
        assert_eq!(marker, vec![1]);
    }

    #[test]
    fn test_load_without_checkpoint_errors() {
        let dir = tempfile::tempdir().unwrap();
        let parameters = sample_parameters();
        let mut context = Context::new();
        assert!(load_checkpoint(&mut context, &parameters, dir.path()).is_err());
    }
}
