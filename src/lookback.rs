//! Fill in each record's volume from the same weekday of the previous year.
use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use log::debug;

use crate::{LaneDirection, MasterRecord};

/// How far back the comparison row is. Using whole weeks keeps the weekday the same.
pub const LOOKBACK_WEEKS: u64 = 52;

/// Outcome of a lookback pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookbackStats {
    /// Records whose comparison row was found.
    pub filled: usize,
    /// Records on/after the cutover with no comparison row; their prior volume is 0.
    pub missed: usize,
}

/// The date exactly [LOOKBACK_WEEKS] weeks before `date`.
pub fn lookback_date(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_sub_days(Days::new(LOOKBACK_WEEKS * 7))
}

/// Set the prior volume of every record dated on or after `cutover`.
///
/// The prior volume is the current volume of the record with the same location and lane
/// direction dated exactly 52 weeks earlier, or 0 if there is no such record (or it has no
/// volume). Records before the cutover are left as they are.
pub fn apply_lookback(records: &mut [MasterRecord], cutover: NaiveDate) -> LookbackStats {
    // Index current volumes once. If a key appears more than once (the same batch appended
    // twice), the first record wins.
    let mut index: HashMap<(String, LaneDirection, NaiveDate), Option<u64>> = HashMap::new();
    for record in records.iter() {
        if let Some(location) = &record.location {
            index
                .entry((location.clone(), record.lane_direction, record.date))
                .or_insert(record.current_volume);
        }
    }

    let mut stats = LookbackStats::default();
    for record in records.iter_mut().filter(|r| r.date >= cutover) {
        let prior = match (&record.location, lookback_date(record.date)) {
            (Some(location), Some(prior_date)) => {
                index.get(&(location.clone(), record.lane_direction, prior_date))
            }
            _ => None,
        };
        match prior {
            Some(volume) => {
                stats.filled += 1;
                record.prior_volume = volume.unwrap_or(0);
            }
            None => {
                stats.missed += 1;
                record.prior_volume = 0;
            }
        }
    }

    debug!(
        "Lookback from {cutover}: {} filled, {} missed.",
        stats.filled, stats.missed
    );
    stats
}
