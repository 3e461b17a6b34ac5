//! Map raw device names to locations, and locations to their road and directions.
//!
//! The tables are data rather than code: the device names in the report change from one
//! export vintage to the next, so they are kept in a TOML file (see
//! `lookups/colorado_atr.toml` for the tables used by default).
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{AtrError, LaneDirection};

const BUILTIN_LOOKUPS: &str = include_str!("../lookups/colorado_atr.toml");

/// Road and directions of travel at a location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocationInfo {
    pub road: String,
    pub primary: LaneDirection,
    pub secondary: LaneDirection,
}

/// Shape of the lookup file.
#[derive(Debug, Deserialize)]
struct LookupFile {
    devices: HashMap<String, String>,
    #[serde(default)]
    locations: BTreeMap<String, LocationInfo>,
}

/// The lookup tables used to normalize a report.
#[derive(Debug, Clone)]
pub struct Lookups {
    devices: HashMap<String, String>,
    locations: BTreeMap<String, LocationInfo>,
}

impl Lookups {
    /// Create lookups from already-built tables, validating them.
    pub fn new(
        devices: HashMap<String, String>,
        locations: BTreeMap<String, LocationInfo>,
    ) -> Result<Self, AtrError> {
        let lookups = Self { devices, locations };
        lookups.validate()?;
        Ok(lookups)
    }

    /// The tables that ship with this crate.
    pub fn builtin() -> Result<Self, AtrError> {
        Self::from_toml_str(BUILTIN_LOOKUPS)
    }

    /// Parse and validate lookups from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, AtrError> {
        let file: LookupFile = toml::from_str(s)?;
        Self::new(file.devices, file.locations)
    }

    /// Load and validate lookups from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, AtrError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Check that every location a device maps to has a road and an opposing pair of
    /// directions.
    pub fn validate(&self) -> Result<(), AtrError> {
        // Sort the device table so that the first defect reported is stable between runs.
        let mut devices = self.devices.iter().collect::<Vec<_>>();
        devices.sort();

        for (device, location) in devices {
            if !self.locations.contains_key(location) {
                return Err(AtrError::InvalidLookups(format!(
                    "device `{device}` maps to `{location}`, which has no road/direction entry"
                )));
            }
        }
        for (location, info) in &self.locations {
            if info.road.trim().is_empty() {
                return Err(AtrError::InvalidLookups(format!(
                    "location `{location}` has an empty road"
                )));
            }
            if info.secondary != info.primary.opposite() {
                return Err(AtrError::InvalidLookups(format!(
                    "location `{location}` has directions {} and {}, which are not opposites",
                    info.primary, info.secondary
                )));
            }
        }
        Ok(())
    }

    /// The canonical location for a raw device name, if it is known.
    pub fn location_for_device(&self, device: &str) -> Option<&str> {
        self.devices.get(device.trim()).map(String::as_str)
    }

    /// The road a location is on.
    pub fn road_for_location(&self, location: &str) -> Option<&str> {
        self.locations.get(location).map(|info| info.road.as_str())
    }

    /// The primary and secondary directions of travel at a location.
    pub fn directions_for_location(
        &self,
        location: &str,
    ) -> Result<(LaneDirection, LaneDirection), AtrError> {
        self.locations
            .get(location)
            .map(|info| (info.primary, info.secondary))
            .ok_or_else(|| AtrError::UnmappedLocation(location.to_string()))
    }

    /// All locations that have a road/direction entry, in name order.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.locations.keys().map(String::as_str)
    }

    /// Every distinct location that some device maps to.
    pub fn device_locations(&self) -> Vec<&str> {
        let mut locations = self
            .devices
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>();
        locations.sort_unstable();
        locations.dedup();
        locations
    }
}
