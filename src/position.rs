//! Current-fix bookkeeping.
//!
//! The tracker merges the position sentences (GGA for quality, position,
//! GPS altitude and satellite count; RMC for speed, track and the UTC
//! date; PGRMZ for pressure altitude) into one immutable [`PositionFix`]
//! snapshot that is replaced wholesale on every valid position sentence.
//! Downstream engines only ever see complete snapshots.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sentence::{GgaData, GsvData, PressureAltitudeData, RmcData};

/// Fix quality derived from the sentence stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixQuality {
    None,
    TwoD,
    ThreeD,
}

/// Which altitude feeds the effective fix altitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AltitudeSource {
    Gps,
    Baro,
}

/// One complete position/velocity/time sample. Immutable; a new snapshot
/// replaces the previous one on each valid position sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub gps_altitude_m: Option<f64>,
    pub pressure_altitude_m: Option<f64>,
    /// Altitude per the configured source, meters MSL
    pub altitude_m: f64,
    /// True when the configured source was unavailable and the fix fell
    /// back to the other one
    pub altitude_degraded: bool,
    pub ground_speed_knots: Option<f64>,
    pub track_deg: Option<f64>,
    pub quality: FixQuality,
    pub satellites: u32,
}

/// Edge-triggered fix-quality transitions. Each fires exactly once per
/// crossing of the 3D threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixTransition {
    Acquired,
    Lost,
}

/// Result of applying one sentence to the tracker
#[derive(Debug, Default)]
pub struct TrackerUpdate {
    /// Set when the sentence produced a new complete fix snapshot
    pub new_fix: bool,
    pub transition: Option<FixTransition>,
}

/// Merges position sentences into the current fix
#[derive(Debug)]
pub struct PositionTracker {
    altitude_source: AltitudeSource,

    // Last seen values, merged into each published snapshot
    last_date: Option<NaiveDate>,
    pressure_altitude_m: Option<f64>,
    speed_knots: Option<f64>,
    track_deg: Option<f64>,
    satellites_in_view: u32,

    current: Option<PositionFix>,
    previous: Option<PositionFix>,
    had_3d: bool,
}

impl PositionTracker {
    pub fn new(altitude_source: AltitudeSource) -> Self {
        Self {
            altitude_source,
            last_date: None,
            pressure_altitude_m: None,
            speed_knots: None,
            track_deg: None,
            satellites_in_view: 0,
            current: None,
            previous: None,
            had_3d: false,
        }
    }

    /// The most recent complete fix, if any
    pub fn current(&self) -> Option<&PositionFix> {
        self.current.as_ref()
    }

    /// The fix before the current one; line-crossing geometry needs both
    pub fn previous(&self) -> Option<&PositionFix> {
        self.previous.as_ref()
    }

    pub fn satellites_in_view(&self) -> u32 {
        self.satellites_in_view
    }

    pub fn apply_gga(&mut self, gga: &GgaData, received_at: DateTime<Utc>) -> TrackerUpdate {
        let quality = match gga.quality {
            0 => FixQuality::None,
            _ if gga.satellites >= 4 => FixQuality::ThreeD,
            _ => FixQuality::TwoD,
        };

        self.publish(
            gga.latitude,
            gga.longitude,
            gga.time,
            gga.altitude_m,
            quality,
            gga.satellites,
            received_at,
        )
    }

    pub fn apply_rmc(&mut self, rmc: &RmcData, received_at: DateTime<Utc>) -> TrackerUpdate {
        if let Some(date) = rmc.date {
            self.last_date = Some(date);
        }
        self.speed_knots = rmc.speed_knots;
        if rmc.track_deg.is_some() {
            self.track_deg = rmc.track_deg;
        }

        let quality = if rmc.valid {
            // RMC carries no satellite count; keep the quality the GGA
            // stream established, defaulting to 2D until one arrives
            self.current
                .as_ref()
                .map(|fix| fix.quality)
                .filter(|q| *q != FixQuality::None)
                .unwrap_or(FixQuality::TwoD)
        } else {
            FixQuality::None
        };

        let gps_altitude = self.current.as_ref().and_then(|fix| fix.gps_altitude_m);
        let satellites = self.current.as_ref().map(|fix| fix.satellites).unwrap_or(0);

        self.publish(
            rmc.latitude,
            rmc.longitude,
            rmc.time,
            gps_altitude,
            quality,
            satellites,
            received_at,
        )
    }

    /// Pressure altitude feeds the next published snapshot; it does not
    /// publish one itself.
    pub fn apply_pressure_altitude(&mut self, baro: &PressureAltitudeData) {
        self.pressure_altitude_m = Some(baro.altitude_m);
    }

    /// Satellite detail is tracked for display only, never part of the fix
    pub fn apply_gsv(&mut self, gsv: &GsvData) {
        self.satellites_in_view = gsv.satellites_in_view;
    }

    #[allow(clippy::too_many_arguments)]
    fn publish(
        &mut self,
        latitude: Option<f64>,
        longitude: Option<f64>,
        time: Option<NaiveTime>,
        gps_altitude_m: Option<f64>,
        quality: FixQuality,
        satellites: u32,
        received_at: DateTime<Utc>,
    ) -> TrackerUpdate {
        let transition = self.quality_transition(quality);

        let (Some(latitude), Some(longitude), Some(time)) = (latitude, longitude, time) else {
            // Without a position there is no snapshot to publish, but a
            // fix-lost transition must still surface
            return TrackerUpdate {
                new_fix: false,
                transition,
            };
        };

        let date = self.last_date.unwrap_or_else(|| received_at.date_naive());
        let timestamp = date.and_time(time).and_utc();

        let (altitude_m, altitude_degraded) = self.effective_altitude(gps_altitude_m);

        let fix = PositionFix {
            timestamp,
            latitude,
            longitude,
            gps_altitude_m,
            pressure_altitude_m: self.pressure_altitude_m,
            altitude_m,
            altitude_degraded,
            ground_speed_knots: self.speed_knots,
            track_deg: self.track_deg,
            quality,
            satellites,
        };

        self.previous = self.current.take();
        self.current = Some(fix);

        TrackerUpdate {
            new_fix: true,
            transition,
        }
    }

    fn effective_altitude(&self, gps_altitude_m: Option<f64>) -> (f64, bool) {
        match self.altitude_source {
            AltitudeSource::Gps => (gps_altitude_m.unwrap_or(0.0), false),
            AltitudeSource::Baro => match self.pressure_altitude_m {
                Some(baro) => (baro, false),
                None => (gps_altitude_m.unwrap_or(0.0), true),
            },
        }
    }

    fn quality_transition(&mut self, quality: FixQuality) -> Option<FixTransition> {
        let is_3d = quality == FixQuality::ThreeD;
        let transition = match (self.had_3d, is_3d) {
            (false, true) => Some(FixTransition::Acquired),
            (true, false) => Some(FixTransition::Lost),
            _ => None,
        };
        self.had_3d = is_3d;
        transition
    }
}
