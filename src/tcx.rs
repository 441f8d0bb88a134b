use crate::dlog;
use crate::error::ImportError;
use crate::types::{Lap, Trackpoint};
use chrono::{DateTime, NaiveDateTime};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use std::fs;
use std::io::{BufReader, Cursor};
use std::mem;
use std::path::Path;

/// One `<Activity>` element as found in the file, not yet resolved against
/// the sport table.
#[derive(Debug, Clone)]
pub struct ParsedActivity {
    pub sport_label: String,
    pub start_time: NaiveDateTime,
    pub laps: Vec<Lap>,
}

pub fn parse_file(path: &Path) -> Result<Vec<ParsedActivity>, ImportError> {
    let bytes = fs::read(path)?;
    parse_bytes(&bytes)
}

pub fn parse_str(xml: &str) -> Result<Vec<ParsedActivity>, ImportError> {
    parse_bytes(xml.as_bytes())
}

fn parse_bytes(bytes: &[u8]) -> Result<Vec<ParsedActivity>, ImportError> {
    let cursor = Cursor::new(bytes);
    let reader = BufReader::new(cursor);
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();

    let mut st = TcxState::default();
    let mut out: Vec<ParsedActivity> = Vec::new();
    let mut saw_root = false;

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                if !saw_root {
                    saw_root = true;
                    // The schema namespace is document-supplied; elements are
                    // matched by local name so any prefix binding works.
                    if let Some(ns) = attr_value(&e, b"xmlns") {
                        dlog!("document namespace {ns}");
                    }
                }
                handle_start(&mut st, &e);
            }
            Ok(Event::Empty(e)) => {
                handle_start(&mut st, &e);
                let name = e.local_name().as_ref().to_vec();
                handle_end(&mut st, &name, &mut out)?;
            }
            Ok(Event::End(e)) => {
                let name = e.local_name().as_ref().to_vec();
                handle_end(&mut st, &name, &mut out)?;
            }
            Ok(Event::Text(e)) => handle_text(&mut st, &e),
            Err(e) => return Err(ImportError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    if !st.saw_activities {
        return Err(malformed("missing Activities container"));
    }

    Ok(out)
}

/// Which text-bearing leaf element the cursor is inside.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Field {
    #[default]
    None,
    ActivityId,
    LapTotalTime,
    LapDistance,
    LapMaxSpeed,
    LapCalories,
    HrValue,
    TpTime,
    TpLat,
    TpLon,
    TpAltitude,
    TpDistance,
}

#[derive(Default)]
struct TcxState {
    saw_activities: bool,
    in_activities: bool,
    in_activity: bool,
    in_lap: bool,
    in_track: bool,
    in_trackpoint: bool,
    in_position: bool,
    in_lap_avg_hr: bool,
    in_lap_max_hr: bool,
    in_tp_hr: bool,
    field: Field,

    activity: ActivityBuilder,
    lap: LapBuilder,
    point: PointBuilder,
}

#[derive(Default)]
struct ActivityBuilder {
    sport_label: Option<String>,
    start_time: Option<NaiveDateTime>,
    laps: Vec<Lap>,
}

#[derive(Default)]
struct LapBuilder {
    start_time: Option<NaiveDateTime>,
    total_time_s: Option<f64>,
    distance_m: Option<f64>,
    max_speed_m_s: Option<f64>,
    calories: Option<u32>,
    max_heart_rate: Option<u32>,
    avg_heart_rate: Option<u32>,
    trackpoints: Vec<Trackpoint>,
}

#[derive(Default)]
struct PointBuilder {
    time: Option<NaiveDateTime>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    altitude_m: Option<f64>,
    distance_m: Option<f64>,
    heart_rate: Option<u32>,
}

fn handle_start(st: &mut TcxState, e: &BytesStart<'_>) {
    match e.local_name().as_ref() {
        b"Activities" => {
            st.saw_activities = true;
            st.in_activities = true;
        }
        b"Activity" if st.in_activities => {
            st.in_activity = true;
            st.activity = ActivityBuilder {
                sport_label: attr_value(e, b"Sport"),
                ..ActivityBuilder::default()
            };
        }
        b"Id" if st.in_activity && !st.in_lap => st.field = Field::ActivityId,
        b"Lap" if st.in_activity => {
            st.in_lap = true;
            st.lap = LapBuilder {
                start_time: attr_value(e, b"StartTime")
                    .as_deref()
                    .and_then(parse_timestamp),
                ..LapBuilder::default()
            };
        }
        b"Track" if st.in_lap => st.in_track = true,
        b"Trackpoint" if st.in_track => {
            st.in_trackpoint = true;
            st.point = PointBuilder::default();
        }
        b"Position" if st.in_trackpoint => st.in_position = true,
        b"LatitudeDegrees" if st.in_position => st.field = Field::TpLat,
        b"LongitudeDegrees" if st.in_position => st.field = Field::TpLon,
        b"Time" if st.in_trackpoint => st.field = Field::TpTime,
        b"AltitudeMeters" if st.in_trackpoint => st.field = Field::TpAltitude,
        b"DistanceMeters" => {
            if st.in_trackpoint {
                st.field = Field::TpDistance;
            } else if st.in_lap {
                st.field = Field::LapDistance;
            }
        }
        b"HeartRateBpm" if st.in_trackpoint => st.in_tp_hr = true,
        b"TotalTimeSeconds" if st.in_lap && !st.in_trackpoint => st.field = Field::LapTotalTime,
        b"MaximumSpeed" if st.in_lap && !st.in_trackpoint => st.field = Field::LapMaxSpeed,
        b"Calories" if st.in_lap && !st.in_trackpoint => st.field = Field::LapCalories,
        b"AverageHeartRateBpm" if st.in_lap && !st.in_trackpoint => st.in_lap_avg_hr = true,
        b"MaximumHeartRateBpm" if st.in_lap && !st.in_trackpoint => st.in_lap_max_hr = true,
        b"Value" if st.in_tp_hr || st.in_lap_avg_hr || st.in_lap_max_hr => {
            st.field = Field::HrValue;
        }
        _ => {}
    }
}

fn handle_end(
    st: &mut TcxState,
    name: &[u8],
    out: &mut Vec<ParsedActivity>,
) -> Result<(), ImportError> {
    st.field = Field::None;
    match name {
        b"Activities" => st.in_activities = false,
        b"Activity" if st.in_activity => {
            st.in_activity = false;
            out.push(mem::take(&mut st.activity).build()?);
        }
        b"Lap" if st.in_lap => {
            st.in_lap = false;
            let lap = mem::take(&mut st.lap).build()?;
            st.activity.laps.push(lap);
        }
        b"Track" => st.in_track = false,
        b"Trackpoint" if st.in_trackpoint => {
            st.in_trackpoint = false;
            let point = mem::take(&mut st.point).build()?;
            st.lap.trackpoints.push(point);
        }
        b"Position" => st.in_position = false,
        b"HeartRateBpm" => st.in_tp_hr = false,
        b"AverageHeartRateBpm" => st.in_lap_avg_hr = false,
        b"MaximumHeartRateBpm" => st.in_lap_max_hr = false,
        _ => {}
    }
    Ok(())
}

fn handle_text(st: &mut TcxState, e: &BytesText<'_>) {
    let Ok(text) = e.decode() else {
        return;
    };
    let text = text.as_ref();
    match st.field {
        Field::ActivityId => st.activity.start_time = parse_timestamp(text),
        Field::LapTotalTime => st.lap.total_time_s = text.parse().ok(),
        Field::LapDistance => st.lap.distance_m = text.parse().ok(),
        Field::LapMaxSpeed => st.lap.max_speed_m_s = text.parse().ok(),
        Field::LapCalories => st.lap.calories = text.parse().ok(),
        Field::HrValue => {
            // A zero or unparsable reading means the sensor was absent.
            let value = text.parse::<u32>().ok().filter(|v| *v > 0);
            if st.in_tp_hr {
                st.point.heart_rate = value;
            } else if st.in_lap_avg_hr {
                st.lap.avg_heart_rate = value;
            } else if st.in_lap_max_hr {
                st.lap.max_heart_rate = value;
            }
        }
        Field::TpTime => st.point.time = parse_timestamp(text),
        Field::TpLat => st.point.latitude = text.parse().ok(),
        Field::TpLon => st.point.longitude = text.parse().ok(),
        Field::TpAltitude => st.point.altitude_m = text.parse().ok(),
        Field::TpDistance => st.point.distance_m = text.parse().ok(),
        Field::None => {}
    }
}

impl ActivityBuilder {
    fn build(self) -> Result<ParsedActivity, ImportError> {
        let sport_label = self
            .sport_label
            .ok_or_else(|| malformed("Activity missing Sport attribute"))?;
        let start_time = self
            .start_time
            .ok_or_else(|| malformed("Activity missing Id timestamp"))?;
        Ok(ParsedActivity {
            sport_label,
            start_time,
            laps: self.laps,
        })
    }
}

impl LapBuilder {
    fn build(self) -> Result<Lap, ImportError> {
        let start_time = self
            .start_time
            .ok_or_else(|| malformed("Lap missing StartTime"))?;
        let duration_s = self
            .total_time_s
            .ok_or_else(|| malformed("Lap missing TotalTimeSeconds"))?;
        let distance_m = self
            .distance_m
            .ok_or_else(|| malformed("Lap missing DistanceMeters"))?;
        let max_speed_m_s = self
            .max_speed_m_s
            .ok_or_else(|| malformed("Lap missing MaximumSpeed"))?;
        Ok(Lap {
            start_time,
            duration_s,
            distance_m,
            max_speed_m_s,
            calories: self.calories,
            max_heart_rate: self.max_heart_rate,
            avg_heart_rate: self.avg_heart_rate,
            trackpoints: self.trackpoints,
        })
    }
}

impl PointBuilder {
    fn build(self) -> Result<Trackpoint, ImportError> {
        let time = self
            .time
            .ok_or_else(|| malformed("Trackpoint missing Time"))?;
        // A position with only one coordinate is as useless as none: both
        // collapse to a pause.
        let (latitude, longitude) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
            _ => (None, None),
        };
        Ok(Trackpoint {
            time,
            latitude,
            longitude,
            altitude_m: self.altitude_m,
            distance_m: self.distance_m,
            heart_rate: self.heart_rate,
        })
    }
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    for a in e.attributes().with_checks(false).flatten() {
        if a.key.as_ref() == key
            && let Ok(v) = a.unescape_value()
        {
            return Some(v.into_owned());
        }
    }
    None
}

/// Recording timestamps come as RFC 3339 with a Z suffix; the offset is
/// dropped and the wall-clock value kept, naive.
pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

fn malformed(msg: &str) -> ImportError {
    ImportError::MalformedInput(msg.to_string())
}
