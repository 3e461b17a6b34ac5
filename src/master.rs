//! Read and write the master table.
//!
//! The master table is the only state kept between runs. It is read in full at the start of a
//! run and replaced in full at the end. The replacement is written to a temporary file in the
//! same directory and then renamed over the old table, so a run that fails partway leaves the
//! previous table as it was.
//!
//! The first column of the file is an unnamed row index, which is written for compatibility
//! with tools that expect it but ignored when read.
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{NaiveDate, Weekday};
use csv::{StringRecord, Writer};
use log::info;
use tempfile::NamedTempFile;

use crate::clean::{parse_date_prefix, parse_volume};
use crate::extract_from_file::{column_indices, create_reader, LANE_DIRECTION_COLUMN, ROAD_COLUMN};
use crate::{weekday_name, AtrError, LaneDirection, MasterRecord};

pub const DEVICE_COLUMN: &str = "Device";
pub const LOCATION_COLUMN: &str = "Location Name";
pub const DATE_COLUMN: &str = "Date";
pub const WEEKNUM_COLUMN: &str = "Weeknum";
pub const WEEKDAY_COLUMN: &str = "Weekday";

/// Names of the two volume columns, which vary with the years being compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeColumns {
    pub prior: String,
    pub current: String,
}

impl Default for VolumeColumns {
    fn default() -> Self {
        Self {
            prior: "Prior Year Volume".to_string(),
            current: "Current Year Volume".to_string(),
        }
    }
}

impl VolumeColumns {
    /// The full header, after the index column.
    pub fn header(&self) -> [&str; 9] {
        [
            ROAD_COLUMN,
            DEVICE_COLUMN,
            LOCATION_COLUMN,
            DATE_COLUMN,
            WEEKNUM_COLUMN,
            WEEKDAY_COLUMN,
            LANE_DIRECTION_COLUMN,
            self.prior.as_str(),
            self.current.as_str(),
        ]
    }
}

/// Read the master table at `path`.
///
/// A missing file is the start of a new table, not an error.
pub fn read_master(path: &Path, columns: &VolumeColumns) -> Result<Vec<MasterRecord>, AtrError> {
    if !path.exists() {
        info!("No master table at {path:?}; starting a new one.");
        return Ok(vec![]);
    }
    let file = File::open(path)?;
    let records = read_master_from_reader(file, columns)?;
    info!("Read {} records from master table {path:?}.", records.len());
    Ok(records)
}

/// Read master records from CSV.
///
/// Unlike the report, the master table is trusted: any bad row fails the whole read.
pub fn read_master_from_reader<R: Read>(
    rdr: R,
    columns: &VolumeColumns,
) -> Result<Vec<MasterRecord>, AtrError> {
    let mut rdr = create_reader(rdr);
    let idx = column_indices(rdr.headers()?, &columns.header())?;

    let mut records = vec![];
    for (i, row) in rdr.records().enumerate() {
        let row = row?;
        let record = parse_record(&row, &idx).map_err(|message| AtrError::InvalidMasterRecord {
            line: i + 1,
            message,
        })?;
        records.push(record);
    }
    Ok(records)
}

fn parse_record(row: &StringRecord, idx: &[usize]) -> Result<MasterRecord, String> {
    let field = |i: usize| row.get(idx[i]).unwrap_or_default();
    let optional = |i: usize| Some(field(i)).filter(|v| !v.is_empty()).map(str::to_string);

    let date: NaiveDate = parse_date_prefix(field(3)).map_err(|e| e.to_string())?;
    let iso_week = parse_volume(field(4))
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| (1..=53).contains(v))
        .ok_or_else(|| format!("invalid week number `{}`", field(4)))?;
    let weekday = field(5)
        .parse::<Weekday>()
        .map_err(|_| format!("invalid weekday `{}`", field(5)))?;
    let lane_direction = field(6)
        .parse::<LaneDirection>()
        .map_err(|e| e.to_string())?;
    let prior_volume = match field(7) {
        "" => 0,
        v => parse_volume(v).map_err(|e| e.to_string())?,
    };
    let current_volume = match field(8) {
        "" => None,
        v => Some(parse_volume(v).map_err(|e| e.to_string())?),
    };

    Ok(MasterRecord {
        road: optional(0),
        device: optional(1),
        location: optional(2),
        date,
        iso_week,
        weekday,
        lane_direction,
        prior_volume,
        current_volume,
    })
}

/// Write master records as CSV, with the leading index column.
pub fn write_master_to_writer<W: Write>(
    wtr: W,
    records: &[MasterRecord],
    columns: &VolumeColumns,
) -> Result<(), AtrError> {
    let mut wtr = Writer::from_writer(wtr);

    let mut header = vec![""];
    header.extend(columns.header());
    wtr.write_record(&header)?;

    for (i, record) in records.iter().enumerate() {
        wtr.write_record([
            i.to_string(),
            record.road.clone().unwrap_or_default(),
            record.device.clone().unwrap_or_default(),
            record.location.clone().unwrap_or_default(),
            record.date.format("%Y-%m-%d").to_string(),
            record.iso_week.to_string(),
            weekday_name(record.weekday).to_string(),
            record.lane_direction.to_string(),
            record.prior_volume.to_string(),
            record
                .current_volume
                .map(|v| v.to_string())
                .unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Replace the file at `path` with `records`, via a temporary file and a rename.
pub fn write_master_atomic(
    path: &Path,
    records: &[MasterRecord],
    columns: &VolumeColumns,
) -> Result<(), AtrError> {
    let dir = match path.parent() {
        Some(v) if !v.as_os_str().is_empty() => v,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    write_master_to_writer(&mut tmp, records, columns)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    info!("Wrote {} records to {path:?}.", records.len());
    Ok(())
}
