//! Join daily volumes onto the calendar skeleton and append them to the master table.
use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDate, Weekday};

use crate::normalize::Lookups;
use crate::{AtrError, DailyVolume, LaneDirection, MasterRecord, SkeletonRow};

/// Fields the skeleton and daily volumes are joined on.
type JoinKey<'a> = (&'a str, NaiveDate, u32, Weekday, LaneDirection);

/// Volumes (and the devices they came from) for one join key.
#[derive(Debug, Default)]
struct Matched<'a> {
    devices: BTreeSet<&'a str>,
    volume: u64,
}

/// Left-join daily volumes onto the skeleton.
///
/// There is exactly one record per skeleton row. A skeleton row with no daily volume gets no
/// current volume and no device. When a location is reported by more than one device (e.g. one
/// per tunnel bore), their volumes for the same day and direction are summed and the devices
/// listed, separated by "; ". The road comes from the lookup tables rather than the report.
pub fn merge_onto_skeleton(
    skeleton: &[SkeletonRow],
    daily: &[DailyVolume],
    lookups: &Lookups,
) -> Result<Vec<MasterRecord>, AtrError> {
    let mut volumes: HashMap<JoinKey, Matched> = HashMap::new();
    for d in daily {
        // Volumes without a location can't match any skeleton row.
        let Some(location) = d.location.as_deref() else {
            continue;
        };
        let matched = volumes
            .entry((location, d.date, d.iso_week, d.weekday, d.lane_direction))
            .or_default();
        matched.devices.insert(d.device.as_str());
        matched.volume += d.volume;
    }

    let mut merged = Vec::with_capacity(skeleton.len());
    for row in skeleton {
        let road = lookups
            .road_for_location(&row.location)
            .ok_or_else(|| AtrError::UnmappedLocation(row.location.clone()))?;

        let key = (
            row.location.as_str(),
            row.date,
            row.iso_week,
            row.weekday,
            row.lane_direction,
        );
        let (device, current_volume) = match volumes.get(&key) {
            Some(m) => (
                Some(m.devices.iter().copied().collect::<Vec<_>>().join("; ")),
                Some(m.volume),
            ),
            None => (None, None),
        };

        merged.push(MasterRecord {
            road: Some(road.to_string()),
            device,
            location: Some(row.location.clone()),
            date: row.date,
            iso_week: row.iso_week,
            weekday: row.weekday,
            lane_direction: row.lane_direction,
            prior_volume: 0,
            current_volume,
        });
    }
    Ok(merged)
}

/// Master records for daily volumes whose device has no known location.
///
/// These are kept only when configured to, for reconciling by hand later.
pub fn unmapped_records(daily: &[DailyVolume]) -> Vec<MasterRecord> {
    daily
        .iter()
        .filter(|d| d.location.is_none())
        .map(|d| MasterRecord {
            road: Some(d.road.clone()),
            device: Some(d.device.clone()),
            location: None,
            date: d.date,
            iso_week: d.iso_week,
            weekday: d.weekday,
            lane_direction: d.lane_direction,
            prior_volume: 0,
            current_volume: Some(d.volume),
        })
        .collect()
}

/// Append a batch to the master table. Nothing is deduplicated.
pub fn append(master: &mut Vec<MasterRecord>, batch: Vec<MasterRecord>) {
    master.extend(batch);
}
