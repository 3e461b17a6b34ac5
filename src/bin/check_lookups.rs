//! Check a lookup-table file before using it for a run.
//!
//! Usage: `check_lookups <file.toml>`
//!
//! Exits with status 1 if the file can't be read or the tables are inconsistent.
use std::env;
use std::path::PathBuf;
use std::process;

use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use atr_volumes::normalize::Lookups;

fn main() {
    TermLogger::init(
        LevelFilter::Debug,
        ConfigBuilder::new().set_time_format_rfc3339().build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .expect("Could not configure logging.");

    let path = match env::args().nth(1) {
        Some(v) => PathBuf::from(v),
        None => {
            error!("Usage: check_lookups <file.toml>");
            process::exit(2);
        }
    };

    match Lookups::from_path(&path) {
        Ok(lookups) => {
            info!(
                "{path:?}: devices map to {} locations; {} locations have road and directions.",
                lookups.device_locations().len(),
                lookups.locations().count()
            );
            for location in lookups.locations() {
                match lookups.directions_for_location(location) {
                    Ok((primary, secondary)) => info!("  {location}: {primary}/{secondary}"),
                    Err(e) => error!("  {e}"),
                }
            }
        }
        Err(e) => {
            error!("{path:?}: {e}");
            process::exit(1);
        }
    }
}
