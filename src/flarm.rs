//! Proximity-traffic decoding and the rolling target table.
//!
//! Intruder sentences (PFLAA) upsert per-target state keyed by the radio
//! device id; aggregate-status sentences (PFLAU) carry the receiver
//! health and the most urgent alert. The table is bounded and entries
//! expire after a short silence, reflecting the roughly one-hertz
//! broadcast rate of the underlying radio protocol. Alarm levels are
//! relayed verbatim from the sender, never escalated locally.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::geodesy;
use crate::sentence::{FlarmStatusData, FlarmTrafficData};

/// Collision alarm urgency as classified by the sending device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlarmLevel {
    None,
    Info,
    Caution,
    Warning,
    Alarm,
}

impl AlarmLevel {
    /// Map the dataport wire value (0..3). Caution is reserved for
    /// bearingless obstacle alerts, which only the status sentence
    /// reports.
    pub fn from_wire(level: u8) -> Self {
        match level {
            0 => AlarmLevel::None,
            1 => AlarmLevel::Info,
            2 => AlarmLevel::Warning,
            _ => AlarmLevel::Alarm,
        }
    }
}

/// One nearby aircraft, position relative to own ship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficTarget {
    /// Radio device id, six hex digits; identity, never the alias
    pub device_id: String,
    /// Display name from the external alias table, if any
    pub alias: Option<String>,
    /// Bearing from own position to the target, degrees true
    pub bearing_deg: f64,
    pub distance_m: f64,
    /// Positive above own altitude
    pub relative_vertical_m: f64,
    pub climb_rate_ms: Option<f64>,
    pub track_deg: Option<f64>,
    pub ground_speed_ms: Option<f64>,
    pub alarm: AlarmLevel,
    pub last_seen: DateTime<Utc>,
}

impl TrafficTarget {
    /// Bearing as a 1..=12 clock position relative to own track
    pub fn clock_position(&self, own_track_deg: f64) -> u8 {
        let relative = geodesy::normalize_deg(self.bearing_deg - own_track_deg);
        let hour = (relative / 30.0).round() as u8 % 12;
        if hour == 0 { 12 } else { hour }
    }

    /// Name to show: alias when assigned, device id otherwise
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.device_id)
    }
}

/// A collision alert decoded from the aggregate-status sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionAlert {
    pub level: AlarmLevel,
    /// Relative bearing to the threat, -180..180; absent for
    /// bearingless (obstacle) alerts
    pub relative_bearing_deg: Option<i32>,
    pub relative_vertical_m: Option<i32>,
    pub distance_m: Option<u32>,
    pub device_id: Option<String>,
}

/// Decodes traffic sentences into the rolling target table
#[derive(Debug)]
pub struct FlarmAlertDecoder {
    targets: HashMap<String, TrafficTarget>,
    aliases: HashMap<String, String>,
    /// Targets quiet for longer than this are pruned
    expiry: Duration,
    /// Status sentences with no traffic for this long clear the table
    silence: Duration,
    max_targets: usize,
    last_traffic_at: Option<DateTime<Utc>>,
}

/// PFLAU alarm type value for obstacle alerts
const ALARM_TYPE_OBSTACLE: u8 = 3;

impl FlarmAlertDecoder {
    pub fn new(expiry: Duration, silence: Duration, max_targets: usize) -> Self {
        Self {
            targets: HashMap::new(),
            aliases: HashMap::new(),
            expiry,
            silence,
            max_targets,
            last_traffic_at: None,
        }
    }

    /// Install the device-id to display-name mapping. Display only; the
    /// table stays keyed by device id.
    pub fn load_aliases(&mut self, aliases: HashMap<String, String>) {
        info!("Loaded {} traffic aliases", aliases.len());
        for target in self.targets.values_mut() {
            target.alias = aliases.get(&target.device_id).cloned();
        }
        self.aliases = aliases;
    }

    /// Upsert one intruder. Returns the updated target state.
    pub fn decode_traffic(
        &mut self,
        traffic: &FlarmTrafficData,
        received_at: DateTime<Utc>,
    ) -> &TrafficTarget {
        self.prune(received_at);
        self.last_traffic_at = Some(received_at);

        let bearing_deg = geodesy::normalize_deg(
            traffic
                .relative_east_m
                .atan2(traffic.relative_north_m)
                .to_degrees(),
        );
        let distance_m =
            (traffic.relative_north_m.powi(2) + traffic.relative_east_m.powi(2)).sqrt();

        // Room for a new entry: evict the longest-quiet target once the
        // bounded table is full
        if !self.targets.contains_key(&traffic.id) && self.targets.len() >= self.max_targets {
            if let Some(oldest) = self
                .targets
                .values()
                .min_by_key(|target| target.last_seen)
                .map(|target| target.device_id.clone())
            {
                debug!("Traffic table full, evicting {oldest}");
                self.targets.remove(&oldest);
            }
        }

        let target = TrafficTarget {
            device_id: traffic.id.clone(),
            alias: self.aliases.get(&traffic.id).cloned(),
            bearing_deg,
            distance_m,
            relative_vertical_m: traffic.relative_vertical_m,
            climb_rate_ms: traffic.climb_rate_ms,
            track_deg: traffic.track_deg,
            ground_speed_ms: traffic.ground_speed_ms,
            alarm: AlarmLevel::from_wire(traffic.alarm_level),
            last_seen: received_at,
        };

        self.targets.insert(traffic.id.clone(), target);
        &self.targets[&traffic.id]
    }

    /// Process an aggregate-status sentence. A status arriving after a
    /// silent period means the receiver currently tracks nothing, so the
    /// table is cleared. Returns an alert when the sender reports one.
    pub fn decode_status(
        &mut self,
        status: &FlarmStatusData,
        received_at: DateTime<Utc>,
    ) -> Option<CollisionAlert> {
        let silent = self
            .last_traffic_at
            .is_none_or(|last| received_at - last >= self.silence);

        if silent && !self.targets.is_empty() {
            debug!(
                "No traffic for {}s, clearing {} targets",
                self.silence.num_seconds(),
                self.targets.len()
            );
            self.targets.clear();
        }

        if status.alarm_level == 0 {
            return None;
        }

        // Bearingless obstacle alerts downgrade to Caution; everything
        // else relays the sender's level
        let level = if status.alarm_type == ALARM_TYPE_OBSTACLE
            && status.relative_bearing_deg.is_none()
        {
            AlarmLevel::Caution
        } else {
            AlarmLevel::from_wire(status.alarm_level)
        };

        Some(CollisionAlert {
            level,
            relative_bearing_deg: status.relative_bearing_deg,
            relative_vertical_m: status.relative_vertical_m,
            distance_m: status.relative_distance_m,
            device_id: status.id.clone(),
        })
    }

    /// Current targets sorted for display: most urgent alarm first,
    /// closest first within the same level.
    pub fn active_targets(&self, now: DateTime<Utc>) -> Vec<TrafficTarget> {
        let mut targets: Vec<TrafficTarget> = self
            .targets
            .values()
            .filter(|target| now - target.last_seen <= self.expiry)
            .cloned()
            .collect();

        targets.sort_by(|a, b| {
            b.alarm
                .cmp(&a.alarm)
                .then(a.distance_m.total_cmp(&b.distance_m))
        });
        targets
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let expiry = self.expiry;
        self.targets.retain(|device_id, target| {
            let keep = now - target.last_seen <= expiry;
            if !keep {
                debug!("Expiring traffic target {device_id}");
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> FlarmAlertDecoder {
        FlarmAlertDecoder::new(Duration::seconds(5), Duration::seconds(4), 50)
    }

    fn traffic(id: &str, alarm: u8, north: f64, east: f64) -> FlarmTrafficData {
        FlarmTrafficData {
            alarm_level: alarm,
            relative_north_m: north,
            relative_east_m: east,
            relative_vertical_m: 50.0,
            id_type: 2,
            id: id.to_string(),
            track_deg: Some(120.0),
            ground_speed_ms: Some(28.0),
            climb_rate_ms: Some(1.2),
            aircraft_type: Some(1),
        }
    }

    fn status(alarm: u8, bearing: Option<i32>, alarm_type: u8) -> FlarmStatusData {
        FlarmStatusData {
            rx_count: 2,
            tx_ok: true,
            gps_status: 2,
            power_ok: true,
            alarm_level: alarm,
            relative_bearing_deg: bearing,
            alarm_type,
            relative_vertical_m: Some(-30),
            relative_distance_m: Some(400),
            id: None,
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        let base: DateTime<Utc> = "2025-06-01T10:00:00Z".parse().unwrap();
        base + Duration::seconds(seconds)
    }

    #[test]
    fn test_upsert_decodes_relative_position() {
        let mut decoder = decoder();
        let target = decoder.decode_traffic(&traffic("DD8F12", 0, 1000.0, 1000.0), at(0));

        assert_eq!(target.device_id, "DD8F12");
        assert!((target.bearing_deg - 45.0).abs() < 1e-9);
        assert!((target.distance_m - 1414.2).abs() < 0.1);
        assert_eq!(target.alarm, AlarmLevel::None);

        // A second sentence for the same id replaces, not duplicates
        decoder.decode_traffic(&traffic("DD8F12", 1, -500.0, 0.0), at(1));
        assert_eq!(decoder.target_count(), 1);
        let targets = decoder.active_targets(at(1));
        assert!((targets[0].bearing_deg - 180.0).abs() < 1e-9);
        assert_eq!(targets[0].alarm, AlarmLevel::Info);
    }

    #[test]
    fn test_sort_by_alarm_then_distance() {
        let mut decoder = decoder();
        decoder.decode_traffic(&traffic("AAAAAA", 0, 200.0, 0.0), at(0));
        decoder.decode_traffic(&traffic("BBBBBB", 2, 3000.0, 0.0), at(0));
        decoder.decode_traffic(&traffic("CCCCCC", 2, 800.0, 0.0), at(0));
        decoder.decode_traffic(&traffic("DDDDDD", 0, 100.0, 0.0), at(0));

        let ids: Vec<String> = decoder
            .active_targets(at(1))
            .into_iter()
            .map(|t| t.device_id)
            .collect();
        assert_eq!(ids, vec!["CCCCCC", "BBBBBB", "DDDDDD", "AAAAAA"]);
    }

    #[test]
    fn test_targets_expire_after_silence() {
        let mut decoder = decoder();
        decoder.decode_traffic(&traffic("DD8F12", 0, 1000.0, 0.0), at(0));

        assert_eq!(decoder.active_targets(at(4)).len(), 1);
        assert!(decoder.active_targets(at(6)).is_empty());

        // The next upsert prunes the stale entry from the table itself
        decoder.decode_traffic(&traffic("AAAAAA", 0, 500.0, 0.0), at(10));
        assert_eq!(decoder.target_count(), 1);
    }

    #[test]
    fn test_status_after_silence_clears_table() {
        let mut decoder = decoder();
        decoder.decode_traffic(&traffic("DD8F12", 0, 1000.0, 0.0), at(0));

        // Status well within the silence window keeps the table
        decoder.decode_status(&status(0, None, 0), at(2));
        assert_eq!(decoder.target_count(), 1);

        // Status after the silence window treats the sky as empty
        decoder.decode_status(&status(0, None, 0), at(8));
        assert_eq!(decoder.target_count(), 0);
    }

    #[test]
    fn test_status_alert_relays_level() {
        let mut decoder = decoder();
        let alert = decoder.decode_status(&status(3, Some(-45), 2), at(0)).unwrap();
        assert_eq!(alert.level, AlarmLevel::Alarm);
        assert_eq!(alert.relative_bearing_deg, Some(-45));

        // No alarm, no alert
        assert!(decoder.decode_status(&status(0, None, 0), at(1)).is_none());
    }

    #[test]
    fn test_bearingless_obstacle_maps_to_caution() {
        let mut decoder = decoder();
        let alert = decoder.decode_status(&status(2, None, 3), at(0)).unwrap();
        assert_eq!(alert.level, AlarmLevel::Caution);
    }

    #[test]
    fn test_alias_is_display_only() {
        let mut decoder = decoder();
        decoder.decode_traffic(&traffic("DD8F12", 0, 1000.0, 0.0), at(0));

        let mut aliases = HashMap::new();
        aliases.insert("DD8F12".to_string(), "D-KXYZ".to_string());
        decoder.load_aliases(aliases);

        let targets = decoder.active_targets(at(1));
        assert_eq!(targets[0].display_name(), "D-KXYZ");
        assert_eq!(targets[0].device_id, "DD8F12");

        // Later upserts keep resolving the alias
        decoder.decode_traffic(&traffic("DD8F12", 0, 900.0, 0.0), at(2));
        assert_eq!(decoder.active_targets(at(2))[0].display_name(), "D-KXYZ");
    }

    #[test]
    fn test_bounded_table_evicts_quietest() {
        let mut decoder = FlarmAlertDecoder::new(Duration::seconds(60), Duration::seconds(4), 3);
        decoder.decode_traffic(&traffic("AAAAAA", 0, 100.0, 0.0), at(0));
        decoder.decode_traffic(&traffic("BBBBBB", 0, 100.0, 0.0), at(1));
        decoder.decode_traffic(&traffic("CCCCCC", 0, 100.0, 0.0), at(2));
        decoder.decode_traffic(&traffic("DDDDDD", 0, 100.0, 0.0), at(3));

        assert_eq!(decoder.target_count(), 3);
        let ids: Vec<String> = decoder
            .active_targets(at(3))
            .into_iter()
            .map(|t| t.device_id)
            .collect();
        assert!(!ids.contains(&"AAAAAA".to_string()));
        assert!(ids.contains(&"DDDDDD".to_string()));
    }

    #[test]
    fn test_clock_position() {
        let target = TrafficTarget {
            device_id: "DD8F12".to_string(),
            alias: None,
            bearing_deg: 90.0,
            distance_m: 1000.0,
            relative_vertical_m: 0.0,
            climb_rate_ms: None,
            track_deg: None,
            ground_speed_ms: None,
            alarm: AlarmLevel::None,
            last_seen: at(0),
        };

        // Flying north, a target due east sits at 3 o'clock
        assert_eq!(target.clock_position(0.0), 3);
        // Flying east it is dead ahead
        assert_eq!(target.clock_position(90.0), 12);
        // Flying south it is at 9 o'clock
        assert_eq!(target.clock_position(180.0), 9);
    }
}
