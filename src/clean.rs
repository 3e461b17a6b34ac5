//! Turn raw report rows into [CleanedReading]s.
use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use log::{debug, warn};

use crate::normalize::Lookups;
use crate::{CleanedReading, RawReading, RowProblem, RowRejection};

/// Date formats found at the start of the report's datetime field, tried in order.
///
/// Two-digit years must be tried before four-digit ones: `%Y` would read "1/8/21" as the year 21.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"];

/// What to do with rows whose device isn't in the lookup tables.
///
/// Either way, they are counted. Rows that are kept end up in the master table with an empty
/// location so they can be reconciled by hand later.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmappedDevicePolicy {
    #[default]
    Exclude,
    Retain,
}

impl FromStr for UnmappedDevicePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exclude" => Ok(UnmappedDevicePolicy::Exclude),
            "retain" => Ok(UnmappedDevicePolicy::Retain),
            other => Err(format!(
                "unknown unmapped device policy `{other}` (expected `exclude` or `retain`)"
            )),
        }
    }
}

/// The result of cleaning a report.
#[derive(Debug, Clone, Default)]
pub struct CleanedBatch {
    pub readings: Vec<CleanedReading>,
    pub rejections: Vec<RowRejection>,
    /// Number of rows (rejected or not) whose device has no location.
    pub unmapped_rows: usize,
    pub unmapped_devices: BTreeSet<String>,
}

/// Clean a batch of raw readings.
///
/// Rows with an unparseable date, volume or lane direction are rejected and recorded; the rest
/// of the batch is still cleaned.
pub fn clean_readings(raw: Vec<RawReading>, lookups: &Lookups) -> CleanedBatch {
    let mut batch = CleanedBatch::default();

    for (i, reading) in raw.into_iter().enumerate() {
        let location = lookups
            .location_for_device(&reading.device)
            .map(str::to_string);

        if location.is_none() {
            batch.unmapped_rows += 1;
            if batch.unmapped_devices.insert(reading.device.clone()) {
                warn!("Device `{}` not found in lookup tables.", reading.device);
            }
        }

        match clean_reading(reading, location) {
            Ok(v) => batch.readings.push(v),
            Err(problem) => {
                warn!("Row {} rejected: {problem}.", i + 1);
                batch.rejections.push(RowRejection {
                    line: i + 1,
                    problem,
                });
            }
        }
    }

    debug!(
        "Cleaned {} rows, rejected {}.",
        batch.readings.len(),
        batch.rejections.len()
    );
    batch
}

/// Clean a single row, given the location its device maps to.
pub fn clean_reading(
    reading: RawReading,
    location: Option<String>,
) -> Result<CleanedReading, RowProblem> {
    let date = parse_date_prefix(&reading.datetime)?;
    let volume = parse_volume(&reading.volume)?;
    let lane_direction = reading.lane_direction.parse()?;
    let iso_week = date.iso_week();

    Ok(CleanedReading {
        road: reading.road,
        device: reading.device,
        site_id: reading.site_id,
        hour: reading.hour,
        lane_direction,
        lane: reading.lane,
        volume,
        date,
        iso_week: iso_week.week(),
        weekday: date.weekday(),
        iso_year: iso_week.year(),
        location,
    })
}

/// Parse the date from the part of a datetime field before the first space.
pub fn parse_date_prefix(datetime: &str) -> Result<NaiveDate, RowProblem> {
    let date_part = datetime.trim().split(' ').next().unwrap_or_default();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .ok_or_else(|| RowProblem::BadDate(datetime.to_string()))
}

/// Largest volume accepted, hourly or daily. Anything larger is a corrupt field.
///
/// Sums of accepted volumes can't overflow a `u64`.
pub const MAX_VOLUME: u64 = 10_000_000;

/// Parse a volume, which may or may not have thousands separators.
///
/// Values with separators are stripped and then parsed; others are parsed as they are.
/// An integral decimal like "6789.0" is accepted, since volumes that have passed through a
/// float column get written that way. Anything else (signs, exponents, fractions) is rejected,
/// as is a volume above [MAX_VOLUME].
pub fn parse_volume(volume: &str) -> Result<u64, RowProblem> {
    let volume = volume.trim();
    let bad_volume = || RowProblem::BadVolume(volume.to_string());

    let digits = if volume.contains(',') {
        volume.replace(',', "")
    } else {
        volume.to_string()
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits.as_str(), ""),
    };
    if whole.is_empty()
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b == b'0')
    {
        return Err(bad_volume());
    }

    match whole.parse::<u64>() {
        Ok(v) if v <= MAX_VOLUME => Ok(v),
        _ => Err(bad_volume()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

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

    #[test]
    fn volume_with_separators_is_stripped() {
        assert_eq!(parse_volume("12,345"), Ok(12345));
        assert_eq!(parse_volume("1,234,567"), Ok(1234567));
    }

    #[test]
    fn volume_without_separators_parses_unchanged() {
        assert_eq!(parse_volume("6789"), Ok(6789));
        assert_eq!(parse_volume(" 0 "), Ok(0));
        assert_eq!(parse_volume("6789.0"), Ok(6789));
        assert_eq!(parse_volume("31,250.00"), Ok(31250));
    }

    #[test]
    fn volumes_above_ceiling_are_rejected() {
        assert_eq!(parse_volume("10,000,000"), Ok(MAX_VOLUME));
        assert!(matches!(
            parse_volume("10000001"),
            Err(RowProblem::BadVolume(_))
        ));
        assert!(matches!(
            parse_volume(&u64::MAX.to_string()),
            Err(RowProblem::BadVolume(_))
        ));
        assert!(matches!(
            parse_volume("99999999999999999999999"),
            Err(RowProblem::BadVolume(_))
        ));
    }

    #[test]
    fn huge_volumes_rejected_before_they_are_summed() {
        let lookups = Lookups::builtin().unwrap();
        let batch = clean_readings(
            vec![
                raw("1/4/2021 0:00", BROOMFIELD, "North", &u64::MAX.to_string()),
                raw("1/4/2021 1:00", BROOMFIELD, "North", "1"),
            ],
            &lookups,
        );
        assert_eq!(batch.rejections.len(), 1);
        assert_eq!(batch.rejections[0].line, 1);

        let daily = crate::aggregate::aggregate_daily(&batch.readings);
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].volume, 1);
    }

    #[test]
    fn bad_volumes_are_rejected() {
        for bad in [
            "", "abc", ",", "-5", "+5", "12.5", "1,2x3", "NaN", "inf", "1e3", ".0", "6789.0.0",
        ] {
            assert!(
                matches!(parse_volume(bad), Err(RowProblem::BadVolume(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn date_is_taken_before_first_space() {
        let expected = NaiveDate::from_ymd_opt(2021, 1, 8).unwrap();
        assert_eq!(parse_date_prefix("1/8/2021 12:00:00 AM"), Ok(expected));
        assert_eq!(parse_date_prefix("01/08/2021 13:00"), Ok(expected));
        assert_eq!(parse_date_prefix("2021-01-08 00:00:00"), Ok(expected));
        assert_eq!(parse_date_prefix("2021-01-08"), Ok(expected));
        assert_eq!(parse_date_prefix("1/8/21 0:00"), Ok(expected));
        assert!(matches!(
            parse_date_prefix("Hour 1 total"),
            Err(RowProblem::BadDate(_))
        ));
        assert!(matches!(parse_date_prefix(""), Err(RowProblem::BadDate(_))));
    }

    #[test]
    fn jan_1_2021_is_in_iso_week_53_of_2020() {
        let reading = clean_reading(
            raw("1/1/2021 12:00:00 AM", BROOMFIELD, "North", "10"),
            None,
        )
        .unwrap();
        assert_eq!(reading.weekday, Weekday::Fri);
        assert_eq!(reading.iso_week, 53);
        assert_eq!(reading.iso_year, 2020);
        assert_eq!(reading.date.year(), 2021);
    }

    #[test]
    fn cleaning_resolves_location_and_keeps_unmapped_rows() {
        let lookups = Lookups::builtin().unwrap();
        let batch = clean_readings(
            vec![
                raw("1/4/2021 1:00:00 AM", BROOMFIELD, "North", "1,020"),
                raw("1/4/2021 1:00:00 AM", "NEW DEVICE 1", "South", "7"),
                raw("1/4/2021 2:00:00 AM", "NEW DEVICE 1", "South", "9"),
            ],
            &lookups,
        );
        assert_eq!(batch.readings.len(), 3);
        assert!(batch.rejections.is_empty());
        assert_eq!(batch.readings[0].location.as_deref(), Some("I-25 Broomfield"));
        assert_eq!(batch.readings[0].volume, 1020);
        assert_eq!(batch.readings[0].lane_direction, LaneDirection::North);
        assert_eq!(batch.readings[1].location, None);
        assert_eq!(batch.unmapped_rows, 2);
        assert_eq!(batch.unmapped_devices.len(), 1);
    }

    #[test]
    fn bad_rows_are_counted_not_fatal() {
        let lookups = Lookups::builtin().unwrap();
        let batch = clean_readings(
            vec![
                raw("1/4/2021 1:00:00 AM", BROOMFIELD, "North", "100"),
                raw("not a date", BROOMFIELD, "North", "100"),
                raw("1/4/2021 2:00:00 AM", BROOMFIELD, "North", "n/a"),
                raw("1/4/2021 3:00:00 AM", BROOMFIELD, "Sideways", "100"),
            ],
            &lookups,
        );
        assert_eq!(batch.readings.len(), 1);
        assert_eq!(
            batch.rejections,
            vec![
                RowRejection {
                    line: 2,
                    problem: RowProblem::BadDate("not a date".to_string())
                },
                RowRejection {
                    line: 3,
                    problem: RowProblem::BadVolume("n/a".to_string())
                },
                RowRejection {
                    line: 4,
                    problem: RowProblem::BadDirection("Sideways".to_string())
                },
            ]
        );
    }
}
