//! Airspace volume model.
//!
//! Volumes are loaded once per session from the external airspace data
//! subsystem and are read-only here. A volume is a polygon boundary with
//! vertical limits and an optional activity window; the proximity engine
//! asks it for lateral and vertical separation of the current fix.

use chrono::{DateTime, Utc};
use geo::{Contains, Coord, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geodesy;

/// Airspace classification, the categories the warning engine
/// distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AirspaceClass {
    ClassA,
    ClassB,
    ClassC,
    ClassD,
    ClassE,
    ClassF,
    ClassG,
    #[serde(rename = "CTR")]
    Ctr,
    #[serde(rename = "TMA")]
    Tma,
    #[serde(rename = "TMZ")]
    Tmz,
    #[serde(rename = "RMZ")]
    Rmz,
    #[serde(rename = "ATZ")]
    Atz,
    Airway,
    Restricted,
    Danger,
    Prohibited,
    WaveWindow,
    GliderSector,
    LowFlight,
    #[serde(rename = "SUA")]
    Sua,
}

/// One vertical bound of a volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AltitudeLimit {
    /// Meters above mean sea level
    Msl(f64),
    /// Flight level in hundreds of feet on the standard atmosphere
    FlightLevel(u32),
    Ground,
    Unlimited,
}

impl AltitudeLimit {
    /// Limit in meters MSL; `None` for an unlimited bound
    pub fn meters(&self) -> Option<f64> {
        match *self {
            AltitudeLimit::Msl(m) => Some(m),
            AltitudeLimit::FlightLevel(fl) => Some(fl as f64 * 100.0 * 0.3048),
            AltitudeLimit::Ground => Some(0.0),
            AltitudeLimit::Unlimited => None,
        }
    }
}

/// When the volume is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivityWindow {
    Always,
    Bounded {
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl ActivityWindow {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        match self {
            ActivityWindow::Always => true,
            ActivityWindow::Bounded { begin, end } => at >= *begin && at < *end,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AirspaceVolume {
    pub id: Uuid,
    pub name: String,
    pub class: AirspaceClass,
    pub lower: AltitudeLimit,
    pub upper: AltitudeLimit,
    /// Boundary as lon/lat (x/y) ring
    boundary: Polygon<f64>,
    pub activity: ActivityWindow,
}

impl AirspaceVolume {
    /// Build a volume from a boundary ring of (latitude, longitude)
    /// vertices. The ring closes itself.
    pub fn new(
        name: impl Into<String>,
        class: AirspaceClass,
        lower: AltitudeLimit,
        upper: AltitudeLimit,
        ring_lat_lon: &[(f64, f64)],
        activity: ActivityWindow,
    ) -> Self {
        let exterior: LineString<f64> = ring_lat_lon
            .iter()
            .map(|(lat, lon)| Coord { x: *lon, y: *lat })
            .collect();

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            class,
            lower,
            upper,
            boundary: Polygon::new(exterior, vec![]),
            activity,
        }
    }

    pub fn contains_lateral(&self, latitude: f64, longitude: f64) -> bool {
        self.boundary.contains(&Point::new(longitude, latitude))
    }

    /// Lateral distance from a point to the boundary, 0 inside
    pub fn lateral_distance_m(&self, latitude: f64, longitude: f64) -> f64 {
        if self.contains_lateral(latitude, longitude) {
            return 0.0;
        }

        self.boundary
            .exterior()
            .lines()
            .map(|line| {
                geodesy::distance_to_segment_m(
                    latitude,
                    longitude,
                    line.start.y,
                    line.start.x,
                    line.end.y,
                    line.end.x,
                )
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// Vertical distance from an altitude to the volume's band, 0 within
    pub fn vertical_distance_m(&self, altitude_m: f64) -> f64 {
        if let Some(lower) = self.lower.meters()
            && altitude_m < lower
        {
            return lower - altitude_m;
        }
        if let Some(upper) = self.upper.meters()
            && altitude_m > upper
        {
            return altitude_m - upper;
        }
        0.0
    }
}
