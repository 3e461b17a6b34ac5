//! Run a report through every stage and update the master table.
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDate;
use log::{info, warn};

use crate::aggregate::aggregate_daily;
use crate::calendar::{date_span, observed_locations, tile};
use crate::clean::{clean_readings, UnmappedDevicePolicy};
use crate::config::Config;
use crate::extract_from_file::Extract;
use crate::lookback::apply_lookback;
use crate::master::{read_master, write_master_atomic, VolumeColumns};
use crate::merge::{append, merge_onto_skeleton, unmapped_records};
use crate::normalize::Lookups;
use crate::{AtrError, MasterRecord, RawReading, RowRejection};

/// Settings that change what a run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Records dated on or after this get their prior-year volume filled in.
    pub cutover: NaiveDate,
    pub unmapped: UnmappedDevicePolicy,
    pub columns: VolumeColumns,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            cutover: NaiveDate::from_ymd_opt(2020, 1, 1).expect("2020-01-01 is a valid date"),
            unmapped: UnmappedDevicePolicy::default(),
            columns: VolumeColumns::default(),
        }
    }
}

/// What happened during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub raw_rows: usize,
    pub cleaned_rows: usize,
    pub rejections: Vec<RowRejection>,
    pub unmapped_rows: usize,
    pub unmapped_devices: BTreeSet<String>,
    /// Unmapped daily volumes added to the master table (only when retaining them).
    pub unmapped_appended: usize,
    pub daily_rows: usize,
    pub skeleton_rows: usize,
    pub appended_rows: usize,
    pub master_rows: usize,
    pub lookback_filled: usize,
    pub lookback_missed: usize,
}

impl RunSummary {
    /// Number of rejected rows by kind of problem.
    pub fn rejections_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut kinds = BTreeMap::new();
        for rejection in &self.rejections {
            *kinds.entry(rejection.problem.kind()).or_insert(0) += 1;
        }
        kinds
    }

    /// Log the summary.
    pub fn log(&self) {
        info!(
            "Read {} report rows: {} cleaned, {} rejected.",
            self.raw_rows,
            self.cleaned_rows,
            self.rejections.len()
        );
        for (kind, n) in self.rejections_by_kind() {
            warn!("{n} rows rejected for bad {kind}.");
        }
        if self.unmapped_rows > 0 {
            warn!(
                "{} rows from {} unmapped devices ({} daily volumes kept).",
                self.unmapped_rows,
                self.unmapped_devices.len(),
                self.unmapped_appended
            );
        }
        info!(
            "{} daily volumes merged onto a skeleton of {} rows; {} rows appended, master table now has {}.",
            self.daily_rows, self.skeleton_rows, self.appended_rows, self.master_rows
        );
        info!(
            "Prior-year volumes: {} found, {} missing.",
            self.lookback_filled, self.lookback_missed
        );
    }
}

/// Process a report against a master table, returning the extended table.
///
/// This does no I/O. A report with no usable rows is an error, leaving the master unchanged.
pub fn process_batch(
    raw: Vec<RawReading>,
    mut master: Vec<MasterRecord>,
    lookups: &Lookups,
    options: &PipelineOptions,
) -> Result<(Vec<MasterRecord>, RunSummary), AtrError> {
    let mut summary = RunSummary {
        raw_rows: raw.len(),
        ..Default::default()
    };

    let cleaned = clean_readings(raw, lookups);
    summary.cleaned_rows = cleaned.readings.len();
    summary.rejections = cleaned.rejections;
    summary.unmapped_rows = cleaned.unmapped_rows;
    summary.unmapped_devices = cleaned.unmapped_devices;

    let span = date_span(&cleaned.readings).ok_or(AtrError::EmptyBatch)?;

    let daily = aggregate_daily(&cleaned.readings);
    summary.daily_rows = daily.len();

    let locations = observed_locations(&daily);
    let skeleton = tile(&locations, span, lookups)?;
    summary.skeleton_rows = skeleton.len();

    let mut batch = merge_onto_skeleton(&skeleton, &daily, lookups)?;
    if options.unmapped == UnmappedDevicePolicy::Retain {
        let unmapped = unmapped_records(&daily);
        summary.unmapped_appended = unmapped.len();
        batch.extend(unmapped);
    }
    summary.appended_rows = batch.len();

    append(&mut master, batch);
    let stats = apply_lookback(&mut master, options.cutover);
    summary.lookback_filled = stats.filled;
    summary.lookback_missed = stats.missed;
    summary.master_rows = master.len();

    Ok((master, summary))
}

/// Run the whole pipeline as configured: read, process, and replace the master table.
pub fn run(config: &Config) -> Result<RunSummary, AtrError> {
    let lookups = match &config.lookups {
        Some(path) => Lookups::from_path(path)?,
        None => Lookups::builtin()?,
    };

    info!("Processing report {:?}.", config.report);
    let raw = RawReading::extract(&config.report)?;
    let master = read_master(&config.master, &config.options.columns)?;

    let (master, summary) = process_batch(raw, master, &lookups, &config.options)?;
    summary.log();

    write_master_atomic(&config.master, &master, &config.options.columns)?;
    if let Some(output) = &config.output {
        if !same_path(output, &config.master) {
            write_master_atomic(output, &master, &config.options.columns)?;
        }
    }
    Ok(summary)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LaneDirection;

    const BROOMFIELD: &str = "025N230 I-25 N/O SH 7 INTERCHANGE";

    fn raw(datetime: &str, device: &str, direction: &str, volume: &str) -> RawReading {
        RawReading {
            datetime: datetime.to_string(),
            road: "I 25".to_string(),
            device: device.to_string(),
            site_id: "000123".to_string(),
            hour: "0".to_string(),
            lane_direction: direction.to_string(),
            lane: "1".to_string(),
            volume: volume.to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_batch_is_an_error() {
        let lookups = Lookups::builtin().unwrap();
        let raw = vec![raw("garbage", BROOMFIELD, "North", "1")];
        assert!(matches!(
            process_batch(raw, vec![], &lookups, &PipelineOptions::default()),
            Err(AtrError::EmptyBatch)
        ));
    }

    #[test]
    fn year_over_year_filled_across_runs() {
        let lookups = Lookups::builtin().unwrap();
        let options = PipelineOptions {
            cutover: date(2021, 1, 1),
            ..Default::default()
        };

        let first = vec![
            raw("1/10/2020 0:00", BROOMFIELD, "North", "2,400"),
            raw("1/10/2020 1:00", BROOMFIELD, "North", "2,400"),
        ];
        let (master, summary) = process_batch(first, vec![], &lookups, &options).unwrap();
        assert_eq!(summary.skeleton_rows, 2);
        assert_eq!(master.len(), 2);
        // Before the cutover: not looked up at all.
        assert_eq!(summary.lookback_filled + summary.lookback_missed, 0);

        let second = vec![
            raw("1/8/2021 0:00", BROOMFIELD, "North", "5000"),
            raw("1/8/2021 0:00", BROOMFIELD, "South", "4900"),
        ];
        let (master, summary) = process_batch(second, master, &lookups, &options).unwrap();
        assert_eq!(master.len(), 4);
        assert_eq!(summary.lookback_filled, 2);

        let north = master
            .iter()
            .find(|r| r.date == date(2021, 1, 8) && r.lane_direction == LaneDirection::North)
            .unwrap();
        assert_eq!(north.prior_volume, 4800);
        assert_eq!(north.current_volume, Some(5000));

        // The South row of 2020-01-10 exists (from the skeleton) but had no reading.
        let south = master
            .iter()
            .find(|r| r.date == date(2021, 1, 8) && r.lane_direction == LaneDirection::South)
            .unwrap();
        assert_eq!(south.prior_volume, 0);
    }

    #[test]
    fn unmapped_devices_kept_only_when_retained() {
        let lookups = Lookups::builtin().unwrap();
        let rows = || {
            vec![
                raw("1/8/2021 0:00", BROOMFIELD, "North", "5000"),
                raw("1/8/2021 0:00", "NEW DEVICE", "North", "10"),
            ]
        };

        let (master, summary) =
            process_batch(rows(), vec![], &lookups, &PipelineOptions::default()).unwrap();
        assert_eq!(master.len(), 2);
        assert_eq!(summary.unmapped_rows, 1);
        assert_eq!(summary.unmapped_appended, 0);

        let options = PipelineOptions {
            unmapped: UnmappedDevicePolicy::Retain,
            ..Default::default()
        };
        let (master, summary) = process_batch(rows(), vec![], &lookups, &options).unwrap();
        assert_eq!(master.len(), 3);
        assert_eq!(summary.unmapped_appended, 1);
        assert!(master
            .iter()
            .any(|r| r.location.is_none() && r.current_volume == Some(10)));
    }

    #[test]
    fn rejections_summarized_by_kind() {
        let lookups = Lookups::builtin().unwrap();
        let raw = vec![
            raw("1/8/2021 0:00", BROOMFIELD, "North", "5000"),
            raw("1/8/2021 1:00", BROOMFIELD, "North", "lots"),
            raw("1/8/2021 2:00", BROOMFIELD, "North", ""),
            raw("someday", BROOMFIELD, "North", "1"),
        ];
        let (_, summary) =
            process_batch(raw, vec![], &lookups, &PipelineOptions::default()).unwrap();
        let kinds = summary.rejections_by_kind();
        assert_eq!(kinds.get("volume"), Some(&2));
        assert_eq!(kinds.get("date"), Some(&1));
        assert_eq!(summary.cleaned_rows, 1);
    }
}
