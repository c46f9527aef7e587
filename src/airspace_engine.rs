//! Airspace proximity evaluation.
//!
//! Every new fix classifies the separation to each time-active volume
//! into a band. Warnings fire on band escalation only; easing back out
//! is recorded silently so skirting a boundary cannot flap alerts, and a
//! per-volume cool-down suppresses repeats. All timing is measured
//! against fix timestamps, which keeps replayed streams deterministic.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::airspace::{AirspaceClass, AirspaceVolume};
use crate::position::PositionFix;

/// Separation band, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProximityBand {
    None,
    Near,
    VeryNear,
    Inside,
}

/// Lateral and vertical threshold sets for the Near/VeryNear bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityThresholds {
    pub lateral_near_m: f64,
    pub lateral_very_near_m: f64,
    pub vertical_near_m: f64,
    pub vertical_very_near_m: f64,
}

impl Default for ProximityThresholds {
    fn default() -> Self {
        Self {
            lateral_near_m: 2_000.0,
            lateral_very_near_m: 600.0,
            vertical_near_m: 350.0,
            vertical_very_near_m: 100.0,
        }
    }
}

impl ProximityThresholds {
    pub fn classify(&self, lateral_m: f64, vertical_m: f64) -> ProximityBand {
        if lateral_m == 0.0 && vertical_m == 0.0 {
            ProximityBand::Inside
        } else if lateral_m <= self.lateral_very_near_m && vertical_m <= self.vertical_very_near_m {
            ProximityBand::VeryNear
        } else if lateral_m <= self.lateral_near_m && vertical_m <= self.vertical_near_m {
            ProximityBand::Near
        } else {
            ProximityBand::None
        }
    }
}

/// One emitted warning. Transient: consumers read them via
/// [`AirspaceProximityEngine::warnings_since`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityWarning {
    pub airspace_id: Uuid,
    pub airspace_name: String,
    pub class: AirspaceClass,
    pub band: ProximityBand,
    pub lateral_distance_m: f64,
    pub vertical_distance_m: f64,
    pub timestamp: DateTime<Utc>,
    /// Monotonically increasing evaluation counter
    pub tick: u64,
}

#[derive(Debug)]
struct VolumeState {
    band: ProximityBand,
    last_alert: Option<DateTime<Utc>>,
}

/// Evaluates the fix stream against the loaded volume set
#[derive(Debug)]
pub struct AirspaceProximityEngine {
    volumes: Vec<AirspaceVolume>,
    thresholds: ProximityThresholds,
    cooldown: Duration,
    states: HashMap<Uuid, VolumeState>,
    emitted: Vec<ProximityWarning>,
    tick: u64,
}

impl AirspaceProximityEngine {
    pub fn new(thresholds: ProximityThresholds, cooldown: Duration) -> Self {
        Self {
            volumes: Vec::new(),
            thresholds,
            cooldown,
            states: HashMap::new(),
            emitted: Vec::new(),
            tick: 0,
        }
    }

    /// Install the session's airspace set, resetting all warning state
    pub fn load_volumes(&mut self, volumes: Vec<AirspaceVolume>) {
        info!("Loaded {} airspace volumes", volumes.len());
        self.volumes = volumes;
        self.states.clear();
        self.emitted.clear();
        self.tick = 0;
    }

    pub fn volumes(&self) -> &[AirspaceVolume] {
        &self.volumes
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Classify the fix against every time-active volume and return the
    /// warnings this evaluation emitted.
    pub fn evaluate(&mut self, fix: &PositionFix) -> Vec<ProximityWarning> {
        self.tick += 1;
        let mut emitted = Vec::new();

        for volume in &self.volumes {
            if !volume.activity.is_active_at(fix.timestamp) {
                continue;
            }

            let lateral = volume.lateral_distance_m(fix.latitude, fix.longitude);
            let vertical = volume.vertical_distance_m(fix.altitude_m);
            let band = self.thresholds.classify(lateral, vertical);

            let state = self.states.entry(volume.id).or_insert(VolumeState {
                band: ProximityBand::None,
                last_alert: None,
            });

            let escalated = band > state.band;
            if !escalated {
                if band < state.band {
                    debug!(
                        "Separation to '{}' eased to {:?}, recorded silently",
                        volume.name, band
                    );
                }
                state.band = band;
                continue;
            }

            state.band = band;

            // Cool-down: a volume that alerted recently stays quiet even
            // while its band keeps fluctuating
            if let Some(last) = state.last_alert
                && fix.timestamp - last < self.cooldown
            {
                debug!(
                    "Suppressing {:?} warning for '{}' inside cool-down",
                    band, volume.name
                );
                continue;
            }

            state.last_alert = Some(fix.timestamp);
            let warning = ProximityWarning {
                airspace_id: volume.id,
                airspace_name: volume.name.clone(),
                class: volume.class,
                band,
                lateral_distance_m: lateral,
                vertical_distance_m: vertical,
                timestamp: fix.timestamp,
                tick: self.tick,
            };
            warn!(
                "Airspace warning: {:?} of '{}' (lateral {:.0} m, vertical {:.0} m)",
                band, volume.name, lateral, vertical
            );
            self.emitted.push(warning.clone());
            emitted.push(warning);
        }

        emitted
    }

    /// All warnings emitted after the given tick, oldest first
    pub fn warnings_since(&self, tick: u64) -> Vec<ProximityWarning> {
        self.emitted
            .iter()
            .filter(|warning| warning.tick > tick)
            .cloned()
            .collect()
    }
}
