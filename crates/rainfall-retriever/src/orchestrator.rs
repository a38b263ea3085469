//! Retrieval Orchestrator
//!
//! Owns the editable form (the textual Coordinate Model plus address) and the
//! retrieval phase. Every mutation is published as a [`Snapshot`] on a watch
//! channel, so the map surface and the HTTP layer observe the same sequence of
//! states.
//!
//! At most one attempt is in flight. Each admitted attempt gets a fresh
//! generation; a result is written back only while its generation is still
//! current, so [`Orchestrator::reset`] (or a newer attempt) turns late answers
//! into no-ops.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use ts_rs::TS;

use crate::coordinate::{format_degrees, parse_coordinate, Coordinate, DEFAULT_LATITUDE, DEFAULT_LONGITUDE};
use crate::dataset::RainfallDataset;
use crate::error::{
    Failure, INVALID_COORDINATES_MESSAGE, MISSING_ADDRESS_MESSAGE, UNEXPECTED_FAILURE_MESSAGE,
};
use crate::geocoding::Geocoder;
use crate::rainfall::RainfallSource;

/// Which field set drives the next retrieval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum InputMode {
    #[default]
    Coords,
    Address,
}

/// User-editable text
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub latitude: String,
    pub longitude: String,
    pub address: String,
    pub mode: InputMode,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            latitude: DEFAULT_LATITUDE.to_string(),
            longitude: DEFAULT_LONGITUDE.to_string(),
            address: String::new(),
            mode: InputMode::Coords,
        }
    }
}

impl FormState {
    /// The coordinate the text currently describes, if it is valid
    pub fn coordinate(&self) -> Option<Coordinate> {
        parse_coordinate(&self.latitude, &self.longitude).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Success(Arc<RainfallDataset>),
    Failed(Failure),
}

impl Phase {
    pub fn is_loading(&self) -> bool {
        matches!(self, Phase::Loading)
    }

    pub fn dataset(&self) -> Option<&Arc<RainfallDataset>> {
        match self {
            Phase::Success(dataset) => Some(dataset),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Phase::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Everything observers need, published after each mutation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub form: FormState,
    pub phase: Phase,
    /// Bumped by every admitted submit and by reset
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The attempt ran to completion (or failed validation) and this is the phase it left
    Completed(Phase),
    /// Another attempt is loading; nothing changed
    Busy,
    /// The attempt was superseded by a reset before it resolved
    Discarded,
}

/// What an admitted attempt resolved from the form
enum Target {
    Coordinate(Coordinate),
    Address(String),
}

enum Admission {
    Busy,
    Rejected(Phase),
    Started { generation: u64, target: Target },
}

pub struct Orchestrator {
    geocoder: Arc<dyn Geocoder>,
    rainfall: Arc<dyn RainfallSource>,
    state: watch::Sender<Snapshot>,
}

impl Orchestrator {
    pub fn new(geocoder: Arc<dyn Geocoder>, rainfall: Arc<dyn RainfallSource>) -> Self {
        Self::with_form(geocoder, rainfall, FormState::default())
    }

    pub fn with_form(
        geocoder: Arc<dyn Geocoder>,
        rainfall: Arc<dyn RainfallSource>,
        form: FormState,
    ) -> Self {
        Self {
            geocoder,
            rainfall,
            state: watch::Sender::new(Snapshot {
                form,
                ..Snapshot::default()
            }),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    pub fn set_latitude(&self, text: &str) {
        self.edit(|form| replace(&mut form.latitude, text));
    }

    pub fn set_longitude(&self, text: &str) {
        self.edit(|form| replace(&mut form.longitude, text));
    }

    pub fn set_address(&self, text: &str) {
        self.edit(|form| replace(&mut form.address, text));
    }

    pub fn set_mode(&self, mode: InputMode) {
        self.edit(|form| {
            let changed = form.mode != mode;
            form.mode = mode;
            changed
        });
    }

    /// A click or marker drag on the map: writes both fields and forces Coords mode
    pub fn map_interaction(&self, lat: f64, lng: f64) {
        let latitude = format_degrees(lat);
        let longitude = format_degrees(lng);
        debug!(lat = %latitude, lng = %longitude, "Map interaction");
        self.edit(|form| {
            let changed = replace(&mut form.latitude, &latitude)
                | replace(&mut form.longitude, &longitude)
                | (form.mode != InputMode::Coords);
            form.mode = InputMode::Coords;
            changed
        });
    }

    /// Back to Idle, dropping any dataset or error; an in-flight attempt will be discarded
    pub fn reset(&self) {
        self.state.send_modify(|s| {
            s.generation += 1;
            s.phase = Phase::Idle;
        });
        info!("Retrieval state reset");
    }

    /// Run one retrieval from the current form
    ///
    /// Suspends at most twice, geocoding first (Address mode only) and then the
    /// rainfall fetch. Each client call runs as its own task, so a client that
    /// panics ends the attempt as an unexpected failure. If the returned future
    /// is dropped before it resolves, the phase goes back to Idle and the
    /// outstanding call's answer is never written.
    pub async fn submit(&self) -> SubmitOutcome {
        let (generation, target) = match self.begin() {
            Admission::Busy => {
                debug!("Submit ignored while loading");
                return SubmitOutcome::Busy;
            }
            Admission::Rejected(phase) => return SubmitOutcome::Completed(phase),
            Admission::Started { generation, target } => (generation, target),
        };
        let guard = AttemptGuard {
            state: &self.state,
            generation,
            armed: true,
        };

        let coordinate = match target {
            Target::Coordinate(coordinate) => coordinate,
            Target::Address(address) => {
                let geocoder = self.geocoder.clone();
                match tokio::spawn(async move { geocoder.geocode(&address).await }).await {
                    Ok(Ok(resolved)) => match self.apply_geocoded(generation, resolved) {
                        Some(coordinate) => coordinate,
                        None => return self.finish(guard, None),
                    },
                    Ok(Err(e)) => {
                        warn!(generation, error = %e, "Geocoding failed");
                        return self.finish(guard, Some(Phase::Failed(Failure::geocoding(&e))));
                    }
                    Err(e) => return self.finish(guard, Some(unexpected(generation, &e))),
                }
            }
        };

        let rainfall = self.rainfall.clone();
        let fetched = tokio::spawn(async move { rainfall.fetch_estimates(coordinate).await }).await;
        let phase = match fetched {
            Ok(Ok(dataset)) => {
                info!(generation, %coordinate, "Retrieval succeeded");
                Phase::Success(Arc::new(dataset))
            }
            Ok(Err(e)) => {
                warn!(generation, %coordinate, error = %e, "Rainfall retrieval failed");
                Phase::Failed(Failure::retrieval(&e))
            }
            Err(e) => unexpected(generation, &e),
        };
        self.finish(guard, Some(phase))
    }

    fn edit(&self, apply: impl FnOnce(&mut FormState) -> bool) {
        self.state.send_if_modified(|s| apply(&mut s.form));
    }

    /// Admission, validation and entering Loading happen in one critical section
    fn begin(&self) -> Admission {
        let mut admission = Admission::Busy;
        self.state.send_if_modified(|s| {
            if s.phase.is_loading() {
                return false;
            }
            s.generation += 1;

            let target = match s.form.mode {
                InputMode::Coords => parse_coordinate(&s.form.latitude, &s.form.longitude)
                    .map(Target::Coordinate)
                    .map_err(|e| {
                        warn!(latitude = %s.form.latitude, longitude = %s.form.longitude, error = %e, "Rejected coordinates");
                        INVALID_COORDINATES_MESSAGE
                    }),
                InputMode::Address => {
                    let address = s.form.address.trim();
                    if address.is_empty() {
                        warn!("Rejected empty address");
                        Err(MISSING_ADDRESS_MESSAGE)
                    } else {
                        Ok(Target::Address(address.to_string()))
                    }
                }
            };

            admission = match target {
                Ok(target) => {
                    s.phase = Phase::Loading;
                    info!(generation = s.generation, mode = ?s.form.mode, "Retrieval started");
                    Admission::Started {
                        generation: s.generation,
                        target,
                    }
                }
                Err(message) => {
                    s.phase = Phase::Failed(Failure::validation(message));
                    Admission::Rejected(s.phase.clone())
                }
            };
            true
        });
        admission
    }

    /// Write the geocoded point back into the text fields and re-read it from there
    fn apply_geocoded(&self, generation: u64, resolved: Coordinate) -> Option<Coordinate> {
        let mut coordinate = None;
        self.state.send_if_modified(|s| {
            if s.generation != generation || !s.phase.is_loading() {
                return false;
            }
            s.form.latitude = format_degrees(resolved.latitude());
            s.form.longitude = format_degrees(resolved.longitude());
            coordinate = Some(parse_coordinate(&s.form.latitude, &s.form.longitude).unwrap_or(resolved));
            true
        });
        if let Some(c) = coordinate {
            info!(generation, coordinate = %c, "Address geocoded");
        }
        coordinate
    }

    /// Leave Loading with `phase`, or report the attempt as superseded
    fn finish(&self, mut guard: AttemptGuard<'_>, phase: Option<Phase>) -> SubmitOutcome {
        guard.armed = false;
        let generation = guard.generation;

        let Some(phase) = phase else {
            debug!(generation, "Retrieval superseded");
            return SubmitOutcome::Discarded;
        };

        let written = self.state.send_if_modified(|s| {
            if s.generation != generation || !s.phase.is_loading() {
                return false;
            }
            s.phase = phase.clone();
            true
        });
        if written {
            SubmitOutcome::Completed(phase)
        } else {
            debug!(generation, "Retrieval superseded");
            SubmitOutcome::Discarded
        }
    }
}

/// A client task that panicked or was cancelled fits none of the client error kinds
fn unexpected(generation: u64, err: &JoinError) -> Phase {
    error!(generation, error = %err, "Retrieval task failed");
    Phase::Failed(Failure::unexpected(UNEXPECTED_FAILURE_MESSAGE))
}

fn replace(field: &mut String, text: &str) -> bool {
    if field == text {
        return false;
    }
    text.clone_into(field);
    true
}

/// Clears Loading if the submit future is dropped mid-attempt
struct AttemptGuard<'a> {
    state: &'a watch::Sender<Snapshot>,
    generation: u64,
    armed: bool,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let generation = self.generation;
        let cleared = self.state.send_if_modified(|s| {
            if s.generation == generation && s.phase.is_loading() {
                s.phase = Phase::Idle;
                true
            } else {
                false
            }
        });
        if cleared {
            warn!(generation, "Retrieval abandoned before completion");
        }
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::testing::{FakeGeocoder, FakeRainfall};
    use super::*;
    use crate::dataset::ReturnPeriod;
    use crate::error::{ErrorKind, GEOCODING_FAILURE_MESSAGE};

    fn orchestrator(
        geocoder: FakeGeocoder,
        rainfall: FakeRainfall,
    ) -> (Arc<Orchestrator>, Arc<FakeGeocoder>, Arc<FakeRainfall>) {
        let geocoder = Arc::new(geocoder);
        let rainfall = Arc::new(rainfall);
        let orchestrator = Arc::new(Orchestrator::new(geocoder.clone(), rainfall.clone()));
        (orchestrator, geocoder, rainfall)
    }

    fn failure_of(outcome: &SubmitOutcome) -> &Failure {
        match outcome {
            SubmitOutcome::Completed(Phase::Failed(failure)) => failure,
            other => panic!("expected a failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_default_coordinates_succeed() {
        let (orch, geocoder, rainfall) =
            orchestrator(FakeGeocoder::failing(), FakeRainfall::returning(4.1));

        let outcome = orch.submit().await;

        let snapshot = orch.snapshot();
        assert!(matches!(outcome, SubmitOutcome::Completed(Phase::Success(_))));
        assert!(!snapshot.phase.is_loading());
        assert!(snapshot.phase.failure().is_none());
        let dataset = snapshot.phase.dataset().unwrap();
        assert_eq!(dataset.intensity().records().len(), 8);
        assert_eq!(dataset.max_intensity(ReturnPeriod::Hundred), 4.1);
        assert_eq!(geocoder.calls(), 0);
        let seen = rainfall.coordinates.lock().unwrap().clone();
        assert_eq!(seen, vec![Coordinate::new(32.2226, -110.9747).unwrap()]);
    }

    #[tokio::test]
    async fn test_out_of_range_latitude_makes_no_calls() {
        let (orch, geocoder, rainfall) =
            orchestrator(FakeGeocoder::failing(), FakeRainfall::returning(4.1));
        orch.set_latitude("95");
        orch.set_longitude("-110");

        let outcome = orch.submit().await;

        let failure = failure_of(&outcome);
        assert_eq!(failure.kind, ErrorKind::Validation);
        assert_eq!(failure.user_message(), INVALID_COORDINATES_MESSAGE);
        assert_eq!(geocoder.calls() + rainfall.calls(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_inputs_never_reach_network() {
        let (orch, _, rainfall) = orchestrator(FakeGeocoder::failing(), FakeRainfall::returning(1.0));
        for (lat, lon) in [
            ("-90.5", "0"),
            ("90.000001", "0"),
            ("0", "180.5"),
            ("0", "-181"),
            ("NaN", "0"),
            ("inf", "0"),
            ("abc", "10"),
            ("", ""),
        ] {
            orch.set_latitude(lat);
            orch.set_longitude(lon);
            let outcome = orch.submit().await;
            assert_eq!(failure_of(&outcome).kind, ErrorKind::Validation, "{lat}, {lon}");
        }
        assert_eq!(rainfall.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_address_makes_no_calls() {
        let (orch, geocoder, rainfall) =
            orchestrator(FakeGeocoder::resolving(40.0, -105.0), FakeRainfall::returning(1.0));
        orch.set_mode(InputMode::Address);

        for address in ["", "   \t"] {
            orch.set_address(address);
            let outcome = orch.submit().await;
            let failure = failure_of(&outcome);
            assert_eq!(failure.kind, ErrorKind::Validation);
            assert_eq!(failure.user_message(), "Please enter a U.S. address.");
        }
        assert_eq!(geocoder.calls() + rainfall.calls(), 0);
    }

    #[tokio::test]
    async fn test_address_geocodes_before_fetch() {
        let (orch, geocoder, rainfall) =
            orchestrator(FakeGeocoder::resolving(39.7392358, -104.990251), FakeRainfall::returning(2.0));
        orch.set_mode(InputMode::Address);
        orch.set_address("  1600 Pennsylvania Ave, Denver, CO ");

        let outcome = orch.submit().await;

        assert!(matches!(outcome, SubmitOutcome::Completed(Phase::Success(_))));
        assert_eq!(
            geocoder.addresses.lock().unwrap().clone(),
            vec!["1600 Pennsylvania Ave, Denver, CO".to_string()]
        );
        // The fetch uses the 6-decimal text written back into the form
        let snapshot = orch.snapshot();
        assert_eq!(snapshot.form.latitude, "39.739236");
        assert_eq!(snapshot.form.longitude, "-104.990251");
        assert_eq!(snapshot.form.mode, InputMode::Address);
        let seen = rainfall.coordinates.lock().unwrap().clone();
        assert_eq!(seen, vec![Coordinate::new(39.739236, -104.990251).unwrap()]);
    }

    #[tokio::test]
    async fn test_geocoding_failure_skips_fetch() {
        let (orch, geocoder, rainfall) =
            orchestrator(FakeGeocoder::failing(), FakeRainfall::returning(2.0));
        orch.set_mode(InputMode::Address);
        orch.set_address("nowhere in particular");

        let outcome = orch.submit().await;

        let failure = failure_of(&outcome);
        assert_eq!(failure.kind, ErrorKind::Geocoding);
        assert_eq!(failure.user_message(), GEOCODING_FAILURE_MESSAGE);
        assert_eq!(geocoder.calls(), 1);
        assert_eq!(rainfall.calls(), 0);
        assert_eq!(orch.snapshot().form.latitude, DEFAULT_LATITUDE);
    }

    #[tokio::test]
    async fn test_rainfall_failure_is_retrieval_error() {
        let (orch, _, _) = orchestrator(FakeGeocoder::failing(), FakeRainfall::failing());

        let outcome = orch.submit().await;

        let failure = failure_of(&outcome);
        assert_eq!(failure.kind, ErrorKind::Retrieval);
        assert_eq!(failure.user_message(), "Failed to get valid data from the AI model.");
        assert!(!orch.snapshot().phase.is_loading());
    }

    #[tokio::test]
    async fn test_panicking_client_is_unexpected_error() {
        let (orch, _, rainfall) = orchestrator(FakeGeocoder::failing(), FakeRainfall::panicking());

        let outcome = orch.submit().await;

        let failure = failure_of(&outcome);
        assert_eq!(failure.kind, ErrorKind::Unexpected);
        assert_eq!(failure.user_message(), UNEXPECTED_FAILURE_MESSAGE);
        assert_eq!(rainfall.calls(), 1);
        assert!(!orch.snapshot().phase.is_loading());
    }

    #[tokio::test]
    async fn test_map_interaction_forces_coords_mode() {
        let (orch, _, _) = orchestrator(FakeGeocoder::failing(), FakeRainfall::returning(1.0));
        orch.set_mode(InputMode::Address);
        orch.set_address("Boulder, CO");

        orch.map_interaction(40.0, -105.0);

        let form = orch.snapshot().form;
        assert_eq!(form.latitude, "40.000000");
        assert_eq!(form.longitude, "-105.000000");
        assert_eq!(form.mode, InputMode::Coords);
        assert_eq!(form.address, "Boulder, CO");
    }

    #[tokio::test]
    async fn test_identical_edits_do_not_notify() {
        let (orch, _, _) = orchestrator(FakeGeocoder::failing(), FakeRainfall::returning(1.0));
        let rx = orch.subscribe();

        orch.set_latitude(DEFAULT_LATITUDE);
        orch.set_mode(InputMode::Coords);
        assert!(!rx.has_changed().unwrap());

        orch.set_latitude("33.0");
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_loading_clears_previous_result() {
        let gate = Arc::new(Notify::new());
        let (orch, _, _) = orchestrator(
            FakeGeocoder::failing(),
            FakeRainfall::returning(3.0).gated(gate.clone()),
        );
        orch.set_latitude("95");
        orch.submit().await;
        assert!(orch.snapshot().phase.failure().is_some());

        orch.set_latitude("32.2226");
        let mut rx = orch.subscribe();
        let task = tokio::spawn({
            let orch = orch.clone();
            async move { orch.submit().await }
        });

        let loading = rx.wait_for(|s| s.phase.is_loading()).await.unwrap().clone();
        assert!(loading.phase.failure().is_none());
        assert!(loading.phase.dataset().is_none());

        gate.notify_one();
        assert!(matches!(task.await.unwrap(), SubmitOutcome::Completed(Phase::Success(_))));
    }

    #[tokio::test]
    async fn test_submit_while_loading_is_busy() {
        let gate = Arc::new(Notify::new());
        let (orch, _, rainfall) = orchestrator(
            FakeGeocoder::failing(),
            FakeRainfall::returning(3.0).gated(gate.clone()),
        );
        let mut rx = orch.subscribe();
        let first = tokio::spawn({
            let orch = orch.clone();
            async move { orch.submit().await }
        });
        rx.wait_for(|s| s.phase.is_loading()).await.unwrap();
        let generation = orch.snapshot().generation;

        assert_eq!(orch.submit().await, SubmitOutcome::Busy);
        assert_eq!(orch.snapshot().generation, generation);

        gate.notify_one();
        assert!(matches!(first.await.unwrap(), SubmitOutcome::Completed(Phase::Success(_))));
        assert_eq!(rainfall.calls(), 1);
    }

    #[tokio::test]
    async fn test_dropped_submit_leaves_idle() {
        let gate = Arc::new(Notify::new());
        let (orch, _, _) = orchestrator(
            FakeGeocoder::failing(),
            FakeRainfall::returning(3.0).gated(gate),
        );

        let result = tokio::time::timeout(Duration::from_millis(20), orch.submit()).await;

        assert!(result.is_err());
        assert_eq!(orch.snapshot().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_reset_discards_late_result() {
        let gate = Arc::new(Notify::new());
        let (orch, _, _) = orchestrator(
            FakeGeocoder::failing(),
            FakeRainfall::returning(3.0).gated(gate.clone()),
        );
        let mut rx = orch.subscribe();
        let task = tokio::spawn({
            let orch = orch.clone();
            async move { orch.submit().await }
        });
        rx.wait_for(|s| s.phase.is_loading()).await.unwrap();

        orch.reset();
        gate.notify_one();

        assert_eq!(task.await.unwrap(), SubmitOutcome::Discarded);
        assert_eq!(orch.snapshot().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_reset_during_geocoding_keeps_form() {
        let gate = Arc::new(Notify::new());
        let (orch, _, rainfall) = orchestrator(
            FakeGeocoder::resolving(40.0, -105.0).gated(gate.clone()),
            FakeRainfall::returning(3.0),
        );
        orch.set_mode(InputMode::Address);
        orch.set_address("Boulder, CO");
        let mut rx = orch.subscribe();
        let task = tokio::spawn({
            let orch = orch.clone();
            async move { orch.submit().await }
        });
        rx.wait_for(|s| s.phase.is_loading()).await.unwrap();

        orch.reset();
        gate.notify_one();

        assert_eq!(task.await.unwrap(), SubmitOutcome::Discarded);
        assert_eq!(orch.snapshot().form.latitude, DEFAULT_LATITUDE);
        assert_eq!(rainfall.calls(), 0);
    }

    #[tokio::test]
    async fn test_resubmit_replaces_dataset() {
        let (orch, _, rainfall) = orchestrator(FakeGeocoder::failing(), FakeRainfall::returning(3.0));
        orch.submit().await;
        let first = orch.snapshot();
        orch.submit().await;
        let second = orch.snapshot();

        assert_eq!(second.generation, first.generation + 1);
        assert!(!Arc::ptr_eq(
            first.phase.dataset().unwrap(),
            second.phase.dataset().unwrap()
        ));
        assert_eq!(rainfall.calls(), 2);
    }
}
