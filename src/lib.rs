//! Build a dense, daily traffic-volume history from ATR (automatic traffic recorder) reports.
//!
//! The reporting tool exports hourly volumes per device and lane direction. A run of this
//! library turns one such export into a row for every location, direction and day in the span
//! of the export (whether or not a reading exists), appends those rows to the master table kept
//! from previous runs, and fills in each row's volume from 52 weeks earlier for year-over-year
//! comparison.
//!
//! The stages, in order:
//!  * [extract_from_file] reads the report by column name into [RawReading]s
//!  * [clean] parses dates and volumes and resolves device names via [normalize]
//!  * [aggregate] sums hourly volumes into [DailyVolume]s
//!  * [calendar] builds the [SkeletonRow]s that every day/location/direction must have
//!  * [merge] joins the daily volumes onto the skeleton, producing [MasterRecord]s
//!  * [lookback] fills in the prior-year volume
//!  * [master] reads and (atomically) rewrites the persisted master table
//!
//! [pipeline] ties these together.

use std::fmt;
use std::io;
use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aggregate;
pub mod calendar;
pub mod clean;
pub mod config;
pub mod extract_from_file;
pub mod lookback;
pub mod master;
pub mod merge;
pub mod normalize;
pub mod pipeline;

/// Errors that stop a run.
///
/// Problems with individual report rows are not errors of this kind; see [RowProblem].
#[derive(Debug, Error)]
pub enum AtrError {
    #[error("unable to read or write file: {0}")]
    Io(#[from] io::Error),
    #[error("error reading or writing CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("required column `{0}` not found")]
    MissingColumn(String),
    #[error("location `{0}` has no entry in the road/direction tables")]
    UnmappedLocation(String),
    #[error("invalid lookup tables: {0}")]
    InvalidLookups(String),
    #[error("unable to parse lookup tables: {0}")]
    LookupsSyntax(#[from] toml::de::Error),
    #[error("invalid record in master table at line {line}: {message}")]
    InvalidMasterRecord { line: usize, message: String },
    #[error("unable to replace master table: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("no usable rows in report")]
    EmptyBatch,
}

/// Why a single report row could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowProblem {
    #[error("unparseable date `{0}`")]
    BadDate(String),
    #[error("unparseable volume `{0}`")]
    BadVolume(String),
    #[error("unknown lane direction `{0}`")]
    BadDirection(String),
}

impl RowProblem {
    /// Short label used when summarizing rejections.
    pub fn kind(&self) -> &'static str {
        match self {
            RowProblem::BadDate(_) => "date",
            RowProblem::BadVolume(_) => "volume",
            RowProblem::BadDirection(_) => "lane direction",
        }
    }
}

/// A rejected report row, with its line number among the data rows (starting at 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    pub line: usize,
    pub problem: RowProblem,
}

/// The direction of a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LaneDirection {
    North,
    East,
    South,
    West,
}

impl LaneDirection {
    /// The other direction on the same axis.
    pub fn opposite(&self) -> Self {
        match self {
            LaneDirection::North => LaneDirection::South,
            LaneDirection::South => LaneDirection::North,
            LaneDirection::East => LaneDirection::West,
            LaneDirection::West => LaneDirection::East,
        }
    }
}

impl FromStr for LaneDirection {
    type Err = RowProblem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "north" | "n" | "nb" | "northbound" => Ok(LaneDirection::North),
            "east" | "e" | "eb" | "eastbound" => Ok(LaneDirection::East),
            "south" | "s" | "sb" | "southbound" => Ok(LaneDirection::South),
            "west" | "w" | "wb" | "westbound" => Ok(LaneDirection::West),
            _ => Err(RowProblem::BadDirection(s.to_string())),
        }
    }
}

impl fmt::Display for LaneDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneDirection::North => write!(f, "North"),
            LaneDirection::East => write!(f, "East"),
            LaneDirection::South => write!(f, "South"),
            LaneDirection::West => write!(f, "West"),
        }
    }
}

/// Full English name of a weekday.
///
/// (chrono's `Display` for [Weekday] gives the three-letter abbreviation.)
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// One row of the report, as exported. Nothing has been parsed yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReading {
    pub datetime: String,
    pub road: String,
    pub device: String,
    pub site_id: String,
    pub hour: String,
    pub lane_direction: String,
    pub lane: String,
    pub volume: String,
}

/// An hourly reading, with its date broken into the fields used for grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedReading {
    pub road: String,
    pub device: String,
    pub site_id: String,
    pub hour: String,
    pub lane_direction: LaneDirection,
    pub lane: String,
    pub volume: u64,
    pub date: NaiveDate,
    pub iso_week: u32,
    pub weekday: Weekday,
    pub iso_year: i32,
    /// `None` when the device is not in the lookup tables.
    pub location: Option<String>,
}

/// Total volume for one device, lane direction and day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyVolume {
    pub road: String,
    pub device: String,
    pub location: Option<String>,
    pub date: NaiveDate,
    pub iso_year: i32,
    pub iso_week: u32,
    pub weekday: Weekday,
    pub lane_direction: LaneDirection,
    pub volume: u64,
}

/// A day/location/direction that must be present in the master table.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonRow {
    pub date: NaiveDate,
    pub iso_week: u32,
    pub weekday: Weekday,
    pub location: String,
    pub lane_direction: LaneDirection,
}

/// A row of the master table.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterRecord {
    pub road: Option<String>,
    pub device: Option<String>,
    pub location: Option<String>,
    pub date: NaiveDate,
    pub iso_week: u32,
    pub weekday: Weekday,
    pub lane_direction: LaneDirection,
    /// Volume 52 weeks earlier; 0 when unknown.
    pub prior_volume: u64,
    /// `None` when there was no reading for this day.
    pub current_volume: Option<u64>,
}
