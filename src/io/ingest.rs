//! CSV ingest of observed events and spectrum tables.
//!
//! Turns an event table into clean [`Event`]s:
//! - **Strict schema** for `s1` and `s2` (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - optional metadata columns default to 0; `r` and `theta` are derived

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use csv::StringRecord;

use crate::domain::{EnergySpectrum, Event};
use crate::error::AppError;

/// Summary of the signals actually loaded.
#[derive(Debug, Clone)]
pub struct EventStats {
    pub n_events: usize,
    pub s1_min: f64,
    pub s1_max: f64,
    pub s2_min: f64,
    pub s2_max: f64,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct IngestedEvents {
    pub events: Vec<Event>,
    pub stats: EventStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Load events from a CSV file.
pub fn load_events(path: &Path) -> Result<IngestedEvents, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_events(file)
}

/// Read events from any CSV source.
pub fn read_events<R: Read>(source: R) -> Result<IngestedEvents, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| AppError::io(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    for required in ["s1", "s2"] {
        if !header_map.contains_key(required) {
            return Err(AppError::invalid_input(format!(
                "Missing required column: `{required}`"
            )));
        }
    }

    let mut events = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &header_map) {
            Ok(event) => events.push(event),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    let rows_used = events.len();
    let stats = compute_stats(&events)
        .ok_or_else(|| AppError::invalid_input("No valid event rows in CSV."))?;

    Ok(IngestedEvents {
        events,
        stats,
        row_errors,
        rows_read,
        rows_used,
    })
}

/// Load a static energy spectrum from a CSV with `energy` and `rate` columns.
pub fn load_spectrum_csv(path: &Path) -> Result<EnergySpectrum, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open spectrum CSV '{}': {e}", path.display())))?;
    read_spectrum(file)
}

pub fn read_spectrum<R: Read>(source: R) -> Result<EnergySpectrum, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let headers = reader
        .headers()
        .map_err(|e| AppError::io(format!("Failed to read spectrum headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let mut energies = Vec::new();
    let mut rates = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::io(format!("Spectrum line {line}: {e}")))?;
        let energy = parse_required_f64(&record, &header_map, "energy")
            .map_err(|e| AppError::invalid_input(format!("Spectrum line {line}: {e}")))?;
        let rate = parse_required_f64(&record, &header_map, "rate")
            .map_err(|e| AppError::invalid_input(format!("Spectrum line {line}: {e}")))?;
        energies.push(energy);
        rates.push(rate);
    }
    EnergySpectrum::new(energies, rates)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Event, String> {
    let s1 = parse_required_f64(record, header_map, "s1")?;
    let s2 = parse_required_f64(record, header_map, "s2")?;

    let optional = |name: &str| -> Result<f64, String> {
        match get_optional(record, header_map, name) {
            None => Ok(0.0),
            Some(s) => parse_f64(s).ok_or_else(|| format!("Invalid `{name}` value: '{s}'.")),
        }
    };
    let x = optional("x")?;
    let y = optional("y")?;
    let z = optional("z")?;
    let drift_time = optional("drift_time")?;

    let event_time = match get_optional(record, header_map, "event_time") {
        None => 0.0,
        Some(s) => parse_event_time(s)?,
    };

    Ok(Event {
        s1,
        s2,
        x,
        y,
        z,
        r: x.hypot(y),
        theta: y.atan2(x),
        drift_time,
        event_time,
    })
}

fn parse_required_f64(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<f64, String> {
    let raw = get_optional(record, header_map, name)
        .ok_or_else(|| format!("Missing required value: `{name}`"))?;
    parse_f64(raw).ok_or_else(|| format!("Invalid `{name}` value: '{raw}'."))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_f64(s: &str) -> Option<f64> {
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

/// Event time as ns since the Unix epoch, or an ISO-like UTC timestamp.
fn parse_event_time(s: &str) -> Result<f64, String> {
    if let Some(v) = parse_f64(s) {
        return Ok(v);
    }
    const FMTS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];
    for fmt in FMTS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            let utc = t.and_utc();
            return Ok(utc.timestamp() as f64 * 1e9 + utc.timestamp_subsec_nanos() as f64);
        }
    }
    Err(format!("Invalid `event_time` value: '{s}'."))
}

fn compute_stats(events: &[Event]) -> Option<EventStats> {
    if events.is_empty() {
        return None;
    }
    let fold = |f: fn(&Event) -> f64| {
        events.iter().map(f).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
    };
    let (s1_min, s1_max) = fold(|e| e.s1);
    let (s2_min, s2_max) = fold(|e| e.s2);
    Some(EventStats {
        n_events: events.len(),
        s1_min,
        s1_max,
        s2_min,
        s2_max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_required_and_optional_columns() {
        let csv = "S1,s2,x,y,drift_time\n10,500,3,4,1000\n20,800,,,\n";
        let data = read_events(csv.as_bytes()).unwrap();
        assert_eq!(data.rows_used, 2);
        assert_eq!(data.events[0].r, 5.0);
        assert_eq!(data.events[0].drift_time, 1000.0);
        assert_eq!(data.events[1].x, 0.0);
        assert_eq!(data.stats.s1_max, 20.0);
    }

    #[test]
    fn bad_rows_are_reported_not_fatal() {
        let csv = "s1,s2\n10,500\nabc,600\n12,\n";
        let data = read_events(csv.as_bytes()).unwrap();
        assert_eq!(data.rows_read, 3);
        assert_eq!(data.rows_used, 1);
        assert_eq!(data.row_errors.len(), 2);
        assert_eq!(data.row_errors[0].line, 3);
    }

    #[test]
    fn missing_signal_column_is_an_error() {
        let err = read_events("s1,x\n1,2\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn no_valid_rows_is_an_error() {
        assert!(read_events("s1,s2\nnan,1\n".as_bytes()).is_err());
    }

    #[test]
    fn spectrum_csv() {
        let s = read_spectrum("energy,rate\n1.0,2.0\n2.0,3.0\n".as_bytes()).unwrap();
        assert_eq!(s.energies, vec![1.0, 2.0]);
        assert_eq!(s.total_rate(), 5.0);
        assert!(read_spectrum("energy,rate\n1.0,-2.0\n".as_bytes()).is_err());
    }

    #[test]
    fn event_time_accepts_timestamps() {
        let t = parse_event_time("1970-01-01T00:00:01").unwrap();
        assert_eq!(t, 1e9);
        assert_eq!(parse_event_time("123.5").unwrap(), 123.5);
        assert!(parse_event_time("yesterday").is_err());
    }
}
