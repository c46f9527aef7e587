//! The single-threaded instrument core.
//!
//! One entry point, [`InstrumentCore::process_line`], takes each raw
//! line from the ingestion path, parses it, routes it to the position
//! tracker or the traffic decoder, and re-evaluates the task and
//! airspace engines whenever the cycle produced a fresh fix. All state
//! lives behind this one struct and is owned by the calling thread;
//! nothing here blocks and nothing here is fatal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::airspace::AirspaceVolume;
use crate::airspace_engine::{AirspaceProximityEngine, ProximityThresholds, ProximityWarning};
use crate::config::InstrumentConfig;
use crate::flarm::{CollisionAlert, FlarmAlertDecoder, TrafficTarget};
use crate::position::{FixTransition, PositionFix, PositionTracker};
use crate::sentence::{Sentence, parse_sentence};
use crate::task::{Task, TaskError};
use crate::task_engine::{TaskEngine, TaskEvent, TaskState};

/// Everything one processed line can surface to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoreEvent {
    FixAcquired,
    FixLost,
    /// A new complete fix snapshot was published
    FixUpdated(PositionFix),
    Task(TaskEvent),
    Airspace(ProximityWarning),
    /// Collision alert relayed from the traffic receiver
    Collision(CollisionAlert),
    /// The fix was too old to evaluate against; engines skipped this tick
    EvaluationSuspended { fix_age_seconds: i64 },
}

/// The wired-up instrument core
pub struct InstrumentCore {
    tracker: PositionTracker,
    task_engine: TaskEngine,
    airspace_engine: AirspaceProximityEngine,
    traffic: FlarmAlertDecoder,
    stale_fix: Duration,
    dropped_sentences: u64,
}

impl InstrumentCore {
    pub fn new(config: &InstrumentConfig) -> Self {
        let thresholds = ProximityThresholds {
            lateral_near_m: config.airspace.lateral_near_m,
            lateral_very_near_m: config.airspace.lateral_very_near_m,
            vertical_near_m: config.airspace.vertical_near_m,
            vertical_very_near_m: config.airspace.vertical_very_near_m,
        };

        Self {
            tracker: PositionTracker::new(config.position.altitude_source),
            task_engine: TaskEngine::new(),
            airspace_engine: AirspaceProximityEngine::new(
                thresholds,
                Duration::seconds(config.airspace.cooldown_seconds as i64),
            ),
            traffic: FlarmAlertDecoder::new(
                Duration::seconds(config.traffic.expiry_seconds as i64),
                Duration::seconds(config.traffic.silence_seconds as i64),
                config.traffic.max_targets,
            ),
            stale_fix: Duration::seconds(config.position.stale_fix_seconds as i64),
            dropped_sentences: 0,
        }
    }

    /// Process one raw line from the device. Returns the events this
    /// cycle emitted, in order.
    pub fn process_line(&mut self, line: &str, received_at: DateTime<Utc>) -> Vec<CoreEvent> {
        let sentence = match parse_sentence(line) {
            Ok(sentence) => sentence,
            Err(error) => {
                // Dropped, never fatal; the stream continues
                self.dropped_sentences += 1;
                metrics::counter!("vario.sentence.dropped_total").increment(1);
                debug!("Dropping sentence: {error} ({line})");
                return Vec::new();
            }
        };

        let mut events = Vec::new();

        let update = match sentence {
            Sentence::Gga(gga) => Some(self.tracker.apply_gga(&gga, received_at)),
            Sentence::Rmc(rmc) => Some(self.tracker.apply_rmc(&rmc, received_at)),
            Sentence::Gsv(gsv) => {
                self.tracker.apply_gsv(&gsv);
                None
            }
            Sentence::PressureAltitude(baro) => {
                self.tracker.apply_pressure_altitude(&baro);
                None
            }
            Sentence::FlarmTraffic(traffic) => {
                self.traffic.decode_traffic(&traffic, received_at);
                None
            }
            Sentence::FlarmStatus(status) => {
                if let Some(alert) = self.traffic.decode_status(&status, received_at) {
                    events.push(CoreEvent::Collision(alert));
                }
                None
            }
            Sentence::Unsupported(id) => {
                trace!("Ignoring unsupported sentence {id}");
                None
            }
        };

        let Some(update) = update else {
            return events;
        };

        match update.transition {
            Some(FixTransition::Acquired) => events.push(CoreEvent::FixAcquired),
            Some(FixTransition::Lost) => events.push(CoreEvent::FixLost),
            None => {}
        }

        if update.new_fix {
            events.extend(self.evaluate(received_at));
        }

        events
    }

    /// Re-evaluate both engines against the freshly published fix
    fn evaluate(&mut self, received_at: DateTime<Utc>) -> Vec<CoreEvent> {
        let Some(fix) = self.tracker.current().cloned() else {
            return Vec::new();
        };

        let mut events = vec![CoreEvent::FixUpdated(fix.clone())];

        // A fix that predates the freshness window is published but not
        // evaluated; geometry against a stale position means nothing.
        // A zero window disables the check (replay mode).
        let age = received_at - fix.timestamp;
        if self.stale_fix > Duration::zero() && age > self.stale_fix {
            debug!("Fix is {}s old, suspending evaluation", age.num_seconds());
            events.push(CoreEvent::EvaluationSuspended {
                fix_age_seconds: age.num_seconds(),
            });
            return events;
        }

        let previous = self.tracker.previous().cloned();
        for event in self.task_engine.update(previous.as_ref(), &fix) {
            events.push(CoreEvent::Task(event));
        }

        for warning in self.airspace_engine.evaluate(&fix) {
            events.push(CoreEvent::Airspace(warning));
        }

        events
    }

    // Task API, delegated to the engine

    pub fn activate_task(&mut self, task: Task) -> Result<Vec<TaskEvent>, TaskError> {
        self.task_engine.activate(task)
    }

    pub fn deactivate_task(&mut self) -> Option<TaskEvent> {
        self.task_engine.deactivate()
    }

    pub fn restart_task(&mut self) -> Option<TaskEvent> {
        self.task_engine.restart()
    }

    pub fn task_state(&self) -> TaskState {
        self.task_engine.state()
    }

    pub fn current_target(&self) -> Option<uuid::Uuid> {
        self.task_engine.current_target()
    }

    pub fn reached_prefix(&self) -> Vec<uuid::Uuid> {
        self.task_engine.reached_prefix()
    }

    // Airspace API

    pub fn load_airspace(&mut self, volumes: Vec<AirspaceVolume>) {
        self.airspace_engine.load_volumes(volumes);
    }

    pub fn warnings_since(&self, tick: u64) -> Vec<ProximityWarning> {
        self.airspace_engine.warnings_since(tick)
    }

    // Traffic API

    pub fn active_targets(&self, now: DateTime<Utc>) -> Vec<TrafficTarget> {
        self.traffic.active_targets(now)
    }

    pub fn load_traffic_aliases(&mut self, aliases: std::collections::HashMap<String, String>) {
        self.traffic.load_aliases(aliases);
    }

    // Introspection

    pub fn current_fix(&self) -> Option<&PositionFix> {
        self.tracker.current()
    }

    pub fn dropped_sentences(&self) -> u64 {
        self.dropped_sentences
    }
}
