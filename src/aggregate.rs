//! Aggregate hourly readings into daily volumes.
use std::collections::HashMap;

use chrono::{NaiveDate, Weekday};

use crate::{CleanedReading, DailyVolume, LaneDirection};

/// Identifies the rows that are summed into one [DailyVolume].
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct DailyVolumeKey {
    pub road: String,
    pub device: String,
    pub location: Option<String>,
    pub date: NaiveDate,
    pub iso_year: i32,
    pub iso_week: u32,
    pub weekday: Weekday,
    pub lane_direction: LaneDirection,
}

/// Sum volumes by road, device, location, day and lane direction.
///
/// Readings without a location are summed under a `None` location. They are kept here, but the
/// calendar skeleton only has known locations, so they never match it when merged.
pub fn aggregate_daily(readings: &[CleanedReading]) -> Vec<DailyVolume> {
    let mut daily: HashMap<DailyVolumeKey, u64> = HashMap::new();

    for reading in readings {
        let key = DailyVolumeKey {
            road: reading.road.clone(),
            device: reading.device.clone(),
            location: reading.location.clone(),
            date: reading.date,
            iso_year: reading.iso_year,
            iso_week: reading.iso_week,
            weekday: reading.weekday,
            lane_direction: reading.lane_direction,
        };
        daily
            .entry(key)
            .and_modify(|total| *total += reading.volume)
            .or_insert(reading.volume);
    }

    // Convert HashMap to Vec of structs.
    let mut daily_volumes = daily
        .into_iter()
        .map(|(key, volume)| DailyVolume {
            road: key.road,
            device: key.device,
            location: key.location,
            date: key.date,
            iso_year: key.iso_year,
            iso_week: key.iso_week,
            weekday: key.weekday,
            lane_direction: key.lane_direction,
            volume,
        })
        .collect::<Vec<_>>();

    // The rest of the key (ISO week, weekday) follows from the date.
    daily_volumes.sort_unstable_by(|a, b| {
        (&a.location, a.date, a.lane_direction, &a.road, &a.device).cmp(&(
            &b.location,
            b.date,
            b.lane_direction,
            &b.road,
            &b.device,
        ))
    });
    daily_volumes
}
