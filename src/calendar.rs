//! Build the calendar skeleton: a row for every day, location and direction of a report.
//!
//! Daily volumes are joined onto this skeleton, so that a day without any readings at a
//! location still ends up in the master table (with no volume), rather than being missing.
use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate};
use log::debug;

use crate::normalize::Lookups;
use crate::{AtrError, CleanedReading, DailyVolume, SkeletonRow};

/// First and last dates of a batch of readings, or `None` if there are none.
pub fn date_span(readings: &[CleanedReading]) -> Option<(NaiveDate, NaiveDate)> {
    let first = readings.iter().map(|r| r.date).min()?;
    let last = readings.iter().map(|r| r.date).max()?;
    Some((first, last))
}

/// The distinct known locations among daily volumes, in name order.
pub fn observed_locations(daily: &[DailyVolume]) -> Vec<String> {
    daily
        .iter()
        .filter_map(|d| d.location.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Every date from `first` to `last`, inclusive.
pub fn dates_between(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = vec![];
    let mut next_day = Some(first);
    while let Some(day) = next_day {
        if day > last {
            break;
        }
        dates.push(day);
        next_day = day.checked_add_days(Days::new(1));
    }
    dates
}

/// Create the skeleton for `locations` over the inclusive span of dates.
///
/// For each date there is one row per location in its primary direction and one in its
/// secondary direction. Rows are ordered by date and then location, with the primary direction
/// first. Every location must have an entry in the direction tables.
pub fn tile(
    locations: &[String],
    span: (NaiveDate, NaiveDate),
    lookups: &Lookups,
) -> Result<Vec<SkeletonRow>, AtrError> {
    // Resolve all directions up front, so a bad location fails before any work is done.
    let directions = locations
        .iter()
        .map(|location| lookups.directions_for_location(location))
        .collect::<Result<Vec<_>, _>>()?;

    let dates = dates_between(span.0, span.1);

    let build = |primary: bool| {
        let mut rows = Vec::with_capacity(dates.len() * locations.len());
        for date in &dates {
            for (location, (primary_dir, secondary_dir)) in locations.iter().zip(&directions) {
                rows.push(SkeletonRow {
                    date: *date,
                    iso_week: date.iso_week().week(),
                    weekday: date.weekday(),
                    location: location.clone(),
                    lane_direction: if primary { *primary_dir } else { *secondary_dir },
                });
            }
        }
        rows
    };

    let mut skeleton = build(true);
    skeleton.extend(build(false));

    // Stable sort: within a date and location, primary rows stay ahead of secondary ones.
    skeleton.sort_by(|a, b| (a.date, &a.location).cmp(&(b.date, &b.location)));

    debug!(
        "Skeleton of {} days x {} locations x 2 directions = {} rows.",
        dates.len(),
        locations.len(),
        skeleton.len()
    );
    Ok(skeleton)
}
