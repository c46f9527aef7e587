//! Tokenizing and validation of the line-oriented sensor protocol.
//!
//! The device emits ASCII sentences of the form `$TTTFFF,field,...*HH`
//! where `HH` is the XOR of every character between `$` and `*` rendered
//! as two hex digits. Standard NMEA position sentences (GGA, RMC, GSV)
//! arrive interleaved with the Garmin pressure-altitude extension (PGRMZ)
//! and the Flarm dataport traffic sentences (PFLAA, PFLAU).
//!
//! Parsing is all-or-nothing per line: a checksum mismatch or malformed
//! field rejects the whole sentence and no state is touched. Sentence
//! types we do not recognize parse to [`Sentence::Unsupported`] so newer
//! device firmware does not break ingestion.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a raw line is rejected. Both variants are recoverable: the
/// line is dropped and the stream continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SentenceError {
    #[error("malformed sentence: {reason}")]
    Malformed { reason: String },

    #[error("checksum mismatch: sentence carries {expected:02X}, computed {computed:02X}")]
    ChecksumMismatch { expected: u8, computed: u8 },
}

fn malformed(reason: impl Into<String>) -> SentenceError {
    SentenceError::Malformed {
        reason: reason.into(),
    }
}

/// GGA: fix quality, time, position, satellite count, GPS altitude
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GgaData {
    pub time: Option<NaiveTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// 0 = no fix, 1 = GPS, 2 = DGPS
    pub quality: u8,
    pub satellites: u32,
    pub altitude_m: Option<f64>,
}

/// RMC: validity, time and date, position, ground speed, track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmcData {
    pub time: Option<NaiveTime>,
    pub date: Option<NaiveDate>,
    pub valid: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_knots: Option<f64>,
    pub track_deg: Option<f64>,
}

/// One satellite block from a GSV sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteInfo {
    pub prn: u32,
    pub elevation_deg: Option<u32>,
    pub azimuth_deg: Option<u32>,
    pub snr_db: Option<u32>,
}

/// GSV: satellites in view, split over several messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsvData {
    pub total_messages: u32,
    pub message_index: u32,
    pub satellites_in_view: u32,
    pub satellites: Vec<SatelliteInfo>,
}

/// PGRMZ: pressure altitude from the vario/Flarm barometric sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureAltitudeData {
    pub altitude_m: f64,
}

/// PFLAA: one proximity-traffic intruder, position relative to own ship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlarmTrafficData {
    /// 0 = none .. 3 = alarm, relayed verbatim from the sender
    pub alarm_level: u8,
    pub relative_north_m: f64,
    pub relative_east_m: f64,
    pub relative_vertical_m: f64,
    pub id_type: u8,
    /// Six hex digit radio address of the target
    pub id: String,
    pub track_deg: Option<f64>,
    pub ground_speed_ms: Option<f64>,
    pub climb_rate_ms: Option<f64>,
    pub aircraft_type: Option<u8>,
}

/// PFLAU: aggregate receiver status and the most relevant alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlarmStatusData {
    /// Number of devices currently received
    pub rx_count: u32,
    pub tx_ok: bool,
    /// 0 = no GPS, 1 = on ground, 2 = airborne
    pub gps_status: u8,
    pub power_ok: bool,
    pub alarm_level: u8,
    /// Relative bearing to the alert source, -180..180, empty when none
    pub relative_bearing_deg: Option<i32>,
    /// 0 = none, 2 = aircraft, 3 = obstacle
    pub alarm_type: u8,
    pub relative_vertical_m: Option<i32>,
    pub relative_distance_m: Option<u32>,
    pub id: Option<String>,
}

/// A validated, typed sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sentence {
    Gga(GgaData),
    Rmc(RmcData),
    Gsv(GsvData),
    PressureAltitude(PressureAltitudeData),
    FlarmTraffic(FlarmTrafficData),
    FlarmStatus(FlarmStatusData),
    /// Checksum-valid sentence of a type this core does not interpret
    Unsupported(String),
}

/// XOR checksum over a sentence body (the characters between `$` and `*`)
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Parse and validate one raw line into a typed sentence.
///
/// The line may carry trailing CR/LF. Unknown sentence types with a valid
/// checksum return [`Sentence::Unsupported`], never an error.
pub fn parse_sentence(line: &str) -> Result<Sentence, SentenceError> {
    let line = line.trim_end_matches(['\r', '\n']);

    let body = line
        .strip_prefix('$')
        .ok_or_else(|| malformed("missing '$' start delimiter"))?;

    let (body, checksum_str) = body
        .rsplit_once('*')
        .ok_or_else(|| malformed("missing '*' checksum delimiter"))?;

    if checksum_str.len() != 2 {
        return Err(malformed(format!(
            "checksum field must be two hex digits, got {checksum_str:?}"
        )));
    }

    let expected = u8::from_str_radix(checksum_str, 16)
        .map_err(|_| malformed(format!("invalid checksum digits {checksum_str:?}")))?;
    let computed = checksum(body);

    if expected != computed {
        return Err(SentenceError::ChecksumMismatch { expected, computed });
    }

    let fields: Vec<&str> = body.split(',').collect();
    let sentence_id = fields[0];

    // Talker-prefixed standard sentences (GPGGA, GNGGA, ...) are matched
    // on the three letter type; proprietary sentences on the full id.
    if sentence_id.len() == 5 && !sentence_id.starts_with('P') {
        match &sentence_id[2..] {
            "GGA" => return parse_gga(&fields).map(Sentence::Gga),
            "RMC" => return parse_rmc(&fields).map(Sentence::Rmc),
            "GSV" => return parse_gsv(&fields).map(Sentence::Gsv),
            _ => return Ok(Sentence::Unsupported(sentence_id.to_string())),
        }
    }

    match sentence_id {
        "PGRMZ" => parse_pgrmz(&fields).map(Sentence::PressureAltitude),
        "PFLAA" => parse_pflaa(&fields).map(Sentence::FlarmTraffic),
        "PFLAU" => parse_pflau(&fields).map(Sentence::FlarmStatus),
        _ => Ok(Sentence::Unsupported(sentence_id.to_string())),
    }
}

fn require<'a>(fields: &[&'a str], index: usize, what: &str) -> Result<&'a str, SentenceError> {
    fields
        .get(index)
        .copied()
        .ok_or_else(|| malformed(format!("missing field {index} ({what})")))
}

fn opt_field<'a>(fields: &[&'a str], index: usize) -> Option<&'a str> {
    fields.get(index).copied().filter(|f| !f.is_empty())
}

fn parse_f64(value: &str, what: &str) -> Result<f64, SentenceError> {
    value
        .parse::<f64>()
        .map_err(|_| malformed(format!("invalid {what} {value:?}")))
}

fn parse_u32(value: &str, what: &str) -> Result<u32, SentenceError> {
    value
        .parse::<u32>()
        .map_err(|_| malformed(format!("invalid {what} {value:?}")))
}

fn opt_f64(fields: &[&str], index: usize, what: &str) -> Result<Option<f64>, SentenceError> {
    opt_field(fields, index).map(|f| parse_f64(f, what)).transpose()
}

fn opt_u32(fields: &[&str], index: usize, what: &str) -> Result<Option<u32>, SentenceError> {
    opt_field(fields, index).map(|f| parse_u32(f, what)).transpose()
}

/// `hhmmss` or `hhmmss.sss` UTC time of day
fn parse_time(value: &str) -> Result<NaiveTime, SentenceError> {
    let format = if value.contains('.') { "%H%M%S%.f" } else { "%H%M%S" };
    NaiveTime::parse_from_str(value, format)
        .map_err(|_| malformed(format!("invalid UTC time {value:?}")))
}

/// `ddmmyy` UTC date
fn parse_date(value: &str) -> Result<NaiveDate, SentenceError> {
    NaiveDate::parse_from_str(value, "%d%m%y")
        .map_err(|_| malformed(format!("invalid UTC date {value:?}")))
}

/// `ddmm.mmmm` / `dddmm.mmmm` coordinate plus hemisphere letter.
/// `degree_digits` is 2 for latitude, 3 for longitude.
fn parse_coordinate(
    value: &str,
    hemisphere: &str,
    degree_digits: usize,
    what: &str,
) -> Result<f64, SentenceError> {
    if !value.is_ascii() || value.len() < degree_digits + 2 {
        return Err(malformed(format!("{what} field too short: {value:?}")));
    }

    let (deg_str, min_str) = value.split_at(degree_digits);
    let degrees = parse_f64(deg_str, what)?;
    let minutes = parse_f64(min_str, what)?;

    if minutes >= 60.0 {
        return Err(malformed(format!("{what} minutes out of range: {value:?}")));
    }

    let magnitude = degrees + minutes / 60.0;

    match hemisphere {
        "N" | "E" => Ok(magnitude),
        "S" | "W" => Ok(-magnitude),
        other => Err(malformed(format!("invalid hemisphere {other:?} for {what}"))),
    }
}

fn parse_position(
    fields: &[&str],
    lat_index: usize,
) -> Result<(Option<f64>, Option<f64>), SentenceError> {
    let latitude = match opt_field(fields, lat_index) {
        Some(lat) => Some(parse_coordinate(
            lat,
            require(fields, lat_index + 1, "latitude hemisphere")?,
            2,
            "latitude",
        )?),
        None => None,
    };
    let longitude = match opt_field(fields, lat_index + 2) {
        Some(lon) => Some(parse_coordinate(
            lon,
            require(fields, lat_index + 3, "longitude hemisphere")?,
            3,
            "longitude",
        )?),
        None => None,
    };
    Ok((latitude, longitude))
}

fn parse_gga(fields: &[&str]) -> Result<GgaData, SentenceError> {
    if fields.len() < 10 {
        return Err(malformed(format!("GGA needs 10 fields, got {}", fields.len())));
    }

    let time = opt_field(fields, 1).map(parse_time).transpose()?;
    let (latitude, longitude) = parse_position(fields, 2)?;
    let quality = parse_u32(require(fields, 6, "fix quality")?, "fix quality")? as u8;
    let satellites = opt_u32(fields, 7, "satellite count")?.unwrap_or(0);
    let altitude_m = opt_f64(fields, 9, "altitude")?;

    Ok(GgaData {
        time,
        latitude,
        longitude,
        quality,
        satellites,
        altitude_m,
    })
}

fn parse_rmc(fields: &[&str]) -> Result<RmcData, SentenceError> {
    if fields.len() < 10 {
        return Err(malformed(format!("RMC needs 10 fields, got {}", fields.len())));
    }

    let time = opt_field(fields, 1).map(parse_time).transpose()?;
    let valid = match require(fields, 2, "status")? {
        "A" => true,
        "V" | "" => false,
        other => return Err(malformed(format!("invalid RMC status {other:?}"))),
    };
    let (latitude, longitude) = parse_position(fields, 3)?;
    let speed_knots = opt_f64(fields, 7, "ground speed")?;
    let track_deg = opt_f64(fields, 8, "track")?;
    let date = opt_field(fields, 9).map(parse_date).transpose()?;

    Ok(RmcData {
        time,
        date,
        valid,
        latitude,
        longitude,
        speed_knots,
        track_deg,
    })
}

fn parse_gsv(fields: &[&str]) -> Result<GsvData, SentenceError> {
    if fields.len() < 4 {
        return Err(malformed(format!("GSV needs 4 fields, got {}", fields.len())));
    }

    let total_messages = parse_u32(require(fields, 1, "message total")?, "message total")?;
    let message_index = parse_u32(require(fields, 2, "message index")?, "message index")?;
    let satellites_in_view = parse_u32(require(fields, 3, "satellites in view")?, "satellites in view")?;

    let mut satellites = Vec::new();
    let mut index = 4;
    while index + 3 < fields.len() {
        if let Some(prn) = opt_u32(fields, index, "satellite prn")? {
            satellites.push(SatelliteInfo {
                prn,
                elevation_deg: opt_u32(fields, index + 1, "elevation")?,
                azimuth_deg: opt_u32(fields, index + 2, "azimuth")?,
                snr_db: opt_u32(fields, index + 3, "snr")?,
            });
        }
        index += 4;
    }

    Ok(GsvData {
        total_messages,
        message_index,
        satellites_in_view,
        satellites,
    })
}

fn parse_pgrmz(fields: &[&str]) -> Result<PressureAltitudeData, SentenceError> {
    if fields.len() < 3 {
        return Err(malformed(format!("PGRMZ needs 3 fields, got {}", fields.len())));
    }

    let value = parse_f64(require(fields, 1, "altitude")?, "altitude")?;
    let altitude_m = match require(fields, 2, "altitude unit")? {
        "f" | "F" => value * 0.3048,
        "m" | "M" => value,
        other => return Err(malformed(format!("invalid altitude unit {other:?}"))),
    };

    Ok(PressureAltitudeData { altitude_m })
}

fn parse_pflaa(fields: &[&str]) -> Result<FlarmTrafficData, SentenceError> {
    if fields.len() < 11 {
        return Err(malformed(format!("PFLAA needs 11 fields, got {}", fields.len())));
    }

    let alarm_level = parse_u32(require(fields, 1, "alarm level")?, "alarm level")? as u8;
    if alarm_level > 3 {
        return Err(malformed(format!("alarm level out of range: {alarm_level}")));
    }

    let id = require(fields, 6, "target id")?;
    if id.is_empty() {
        return Err(malformed("empty target id"));
    }

    Ok(FlarmTrafficData {
        alarm_level,
        relative_north_m: parse_f64(require(fields, 2, "relative north")?, "relative north")?,
        relative_east_m: parse_f64(require(fields, 3, "relative east")?, "relative east")?,
        relative_vertical_m: parse_f64(require(fields, 4, "relative vertical")?, "relative vertical")?,
        id_type: opt_u32(fields, 5, "id type")?.unwrap_or(0) as u8,
        id: id.to_string(),
        track_deg: opt_f64(fields, 7, "track")?,
        ground_speed_ms: opt_f64(fields, 9, "ground speed")?,
        climb_rate_ms: opt_f64(fields, 10, "climb rate")?,
        aircraft_type: opt_field(fields, 11)
            .map(|f| u8::from_str_radix(f, 16))
            .transpose()
            .map_err(|_| malformed("invalid aircraft type"))?,
    })
}

fn parse_pflau(fields: &[&str]) -> Result<FlarmStatusData, SentenceError> {
    if fields.len() < 10 {
        return Err(malformed(format!("PFLAU needs 10 fields, got {}", fields.len())));
    }

    let alarm_level = parse_u32(require(fields, 5, "alarm level")?, "alarm level")? as u8;
    if alarm_level > 3 {
        return Err(malformed(format!("alarm level out of range: {alarm_level}")));
    }

    let relative_bearing_deg = opt_field(fields, 6)
        .map(|f| f.parse::<i32>())
        .transpose()
        .map_err(|_| malformed("invalid relative bearing"))?;

    let relative_vertical_m = opt_field(fields, 8)
        .map(|f| f.parse::<i32>())
        .transpose()
        .map_err(|_| malformed("invalid relative vertical"))?;

    Ok(FlarmStatusData {
        rx_count: parse_u32(require(fields, 1, "rx count")?, "rx count")?,
        tx_ok: require(fields, 2, "tx status")? == "1",
        gps_status: parse_u32(require(fields, 3, "gps status")?, "gps status")? as u8,
        power_ok: require(fields, 4, "power status")? == "1",
        alarm_level,
        relative_bearing_deg,
        alarm_type: opt_u32(fields, 7, "alarm type")?.unwrap_or(0) as u8,
        relative_vertical_m,
        relative_distance_m: opt_u32(fields, 9, "relative distance")?,
        id: opt_field(fields, 10).map(|f| f.to_string()),
    })
}
