//! Import an ATR report into the master traffic-volume table.
//!
//! Usage: `atr-volumes [REPORT]`
//!
//! The report path may be given as the only argument or in the `REPORT_FILE` environment variable.
//! See [atr_volumes::config] for the other variables, all of which may be set in a .env file.
//!
//! A [log][`LOG`] of the program's work is kept in `LOG_DIR`. If anything about the run fails,
//! the error is logged, the master table is left as it was, and the program exits with status 1.
use std::env;
use std::fs::OpenOptions;
use std::process;

use log::{error, info, LevelFilter};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, TermLogger, TerminalMode, WriteLogger,
};

use atr_volumes::{config::Config, pipeline};

const LOG: &str = "atr_volumes.log";

fn main() {
    // Load any .env file; the variables may also come from the environment itself.
    dotenvy::dotenv().ok();

    // Get env var for path where log will be, panic if it doesn't exist.
    let log_dir = env::var("LOG_DIR").expect("Unable to load log directory path from environment.");

    // Set up logging, panic if it fails.
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Debug,
            config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            LevelFilter::Info,
            config,
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(format!("{log_dir}/{LOG}"))
                .expect("Could not open log file."),
        ),
    ])
    .expect("Could not configure logging.");

    let config = match Config::from_env(env::args().nth(1)) {
        Ok(v) => v,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    match pipeline::run(&config) {
        Ok(summary) => info!(
            "Finished: master table {:?} has {} records.",
            config.master, summary.master_rows
        ),
        Err(e) => {
            error!("Unable to process {:?}: {e}", config.report);
            process::exit(1);
        }
    }
}
