//! Extract report rows from a file.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord};
use log::{debug, warn};

use crate::{AtrError, RawReading};

pub const DATETIME_COLUMN: &str = "Date Time Start Short";
pub const ROAD_COLUMN: &str = "Road";
pub const DEVICE_COLUMN: &str = "Device";
pub const SITE_ID_COLUMN: &str = "Site ID";
pub const HOUR_COLUMN: &str = "Hour";
pub const LANE_DIRECTION_COLUMN: &str = "Lane Direction";
pub const LANE_COLUMN: &str = "Lane #";
pub const VOLUME_COLUMN: &str = "Total Volume";

/// Columns that must be present in a report. Any others are ignored.
pub const REPORT_COLUMNS: [&str; 8] = [
    DATETIME_COLUMN,
    ROAD_COLUMN,
    DEVICE_COLUMN,
    SITE_ID_COLUMN,
    HOUR_COLUMN,
    LANE_DIRECTION_COLUMN,
    LANE_COLUMN,
    VOLUME_COLUMN,
];

/// A trait for extracting rows from a file.
pub trait Extract {
    type Item;
    fn extract(path: &Path) -> Result<Vec<Self::Item>, AtrError> {
        let data_file = File::open(path)?;
        debug!("Extracting {path:?}.");
        Self::extract_from_reader(data_file)
    }
    fn extract_from_reader<R: Read>(rdr: R) -> Result<Vec<Self::Item>, AtrError>;
}

/// Extract RawReading records from a report.
impl Extract for RawReading {
    type Item = RawReading;

    fn extract_from_reader<R: Read>(rdr: R) -> Result<Vec<Self::Item>, AtrError> {
        let mut rdr = create_reader(rdr);
        let idx = column_indices(rdr.headers()?, &REPORT_COLUMNS)?;

        let mut readings = vec![];
        for (i, row) in rdr.byte_records().enumerate() {
            let row = row?;
            // Exports aren't always UTF-8; undecodable bytes are replaced.
            if std::str::from_utf8(row.as_slice()).is_err() {
                warn!("Row {} is not valid UTF-8; undecodable bytes replaced.", i + 1);
            }
            // A short row yields empty fields, which are rejected when the row is cleaned.
            let field = |col: usize| {
                String::from_utf8_lossy(row.get(idx[col]).unwrap_or_default()).into_owned()
            };
            readings.push(RawReading {
                datetime: field(0),
                road: field(1),
                device: field(2),
                site_id: field(3),
                hour: field(4),
                lane_direction: field(5),
                lane: field(6),
                volume: field(7),
            });
        }
        Ok(readings)
    }
}

/// Find the position of each of `required` in a header row.
///
/// The first one that is missing is an error.
pub fn column_indices(header: &StringRecord, required: &[&str]) -> Result<Vec<usize>, AtrError> {
    required
        .iter()
        .map(|name| {
            header
                .iter()
                .position(|h| h == *name)
                .ok_or_else(|| AtrError::MissingColumn(name.to_string()))
        })
        .collect()
}

/// Create CSV reader with a header row.
pub fn create_reader<R: Read>(rdr: R) -> Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(rdr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_selects_columns_by_name() {
        let data = "\
Extra,Total Volume,Lane #,Lane Direction,Hour,Site ID,Device,Road,Date Time Start Short
x,\"1,204\",1,North,0,000123,025N230 I-25 N/O SH 7 INTERCHANGE,I 25,1/1/2021 12:00:00 AM
";
        let readings = RawReading::extract_from_reader(data.as_bytes()).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(
            readings[0],
            RawReading {
                datetime: "1/1/2021 12:00:00 AM".to_string(),
                road: "I 25".to_string(),
                device: "025N230 I-25 N/O SH 7 INTERCHANGE".to_string(),
                site_id: "000123".to_string(),
                hour: "0".to_string(),
                lane_direction: "North".to_string(),
                lane: "1".to_string(),
                volume: "1,204".to_string(),
            }
        );
    }

    #[test]
    fn extract_errs_naming_missing_column() {
        let data = "\
Date Time Start Short,Road,Device,Site ID,Hour,Lane Direction,Lane #
1/1/2021 12:00:00 AM,I 25,025N230 I-25 N/O SH 7 INTERCHANGE,000123,0,North,1
";
        match RawReading::extract_from_reader(data.as_bytes()) {
            Err(AtrError::MissingColumn(col)) => assert_eq!(col, VOLUME_COLUMN),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_rows_produce_empty_fields() {
        let data = "\
Date Time Start Short,Road,Device,Site ID,Hour,Lane Direction,Lane #,Total Volume
1/1/2021 12:00:00 AM,I 25
";
        let readings = RawReading::extract_from_reader(data.as_bytes()).unwrap();
        assert_eq!(readings[0].road, "I 25");
        assert_eq!(readings[0].volume, "");
    }

    #[test]
    fn undecodable_bytes_replaced_without_losing_rows() {
        let mut data = b"\
Date Time Start Short,Road,Device,Site ID,Hour,Lane Direction,Lane #,Total Volume
1/1/2021 0:00,I 25,025N230 I-25 N/O SH 7 INTERCHANGE,000123,0,North,1,100
1/1/2021 0:00,I 25,CAF"
            .to_vec();
        // Latin-1 for \u{c9}, as written by some Windows tools.
        data.push(0xC9);
        data.extend_from_slice(b" DEVICE,000124,0,North,1,200\n");

        let readings = RawReading::extract_from_reader(data.as_slice()).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].volume, "100");
        assert_eq!(readings[1].device, "CAF\u{FFFD} DEVICE");
        assert_eq!(readings[1].volume, "200");
    }
}
