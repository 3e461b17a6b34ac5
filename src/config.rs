//! Configuration of a run, from environment variables (optionally set in a .env file).
//!
//! | variable                | required | meaning                                            |
//! |-------------------------|----------|----------------------------------------------------|
//! | `REPORT_FILE`           | yes*     | the report to import (*or given as an argument)    |
//! | `MASTER_FILE`           | yes      | the master table, read and then replaced           |
//! | `OUTPUT_FILE`           | no       | an additional copy of the new master table         |
//! | `LOOKUPS_FILE`          | no       | lookup tables (TOML); built-in tables otherwise    |
//! | `CUTOVER_DATE`          | no       | first date to fill prior-year volume (YYYY-MM-DD)  |
//! | `UNMAPPED_DEVICES`      | no       | `exclude` (default) or `retain`                    |
//! | `PRIOR_VOLUME_COLUMN`   | no       | header of the prior-year volume column             |
//! | `CURRENT_VOLUME_COLUMN` | no       | header of the current volume column                |
use std::env;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::pipeline::PipelineOptions;
use crate::AtrError;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub report: PathBuf,
    pub master: PathBuf,
    pub output: Option<PathBuf>,
    pub lookups: Option<PathBuf>,
    pub options: PipelineOptions,
}

impl Config {
    /// Load configuration from the environment, after loading any .env file.
    ///
    /// `report` (e.g. from the command line) takes precedence over `REPORT_FILE`.
    pub fn from_env(report: Option<String>) -> Result<Self, AtrError> {
        // A .env file is a convenience; the variables may be set some other way.
        let _ = dotenvy::dotenv();
        Self::from_vars(|name| env::var(name).ok(), report)
    }

    /// Build configuration using `var` to look up each variable.
    pub fn from_vars<F>(var: F, report: Option<String>) -> Result<Self, AtrError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Treat variables set to an empty string as unset.
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let report = report
            .or_else(|| var("REPORT_FILE"))
            .ok_or_else(|| AtrError::InvalidConfig("no report file given".to_string()))?;
        let master = var("MASTER_FILE")
            .ok_or_else(|| AtrError::InvalidConfig("MASTER_FILE not set".to_string()))?;

        let mut options = PipelineOptions::default();
        if let Some(v) = var("CUTOVER_DATE") {
            options.cutover = NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").map_err(|e| {
                AtrError::InvalidConfig(format!("CUTOVER_DATE `{v}` is not a date: {e}"))
            })?;
        }
        if let Some(v) = var("UNMAPPED_DEVICES") {
            options.unmapped = v.parse().map_err(AtrError::InvalidConfig)?;
        }
        if let Some(v) = var("PRIOR_VOLUME_COLUMN") {
            options.columns.prior = v;
        }
        if let Some(v) = var("CURRENT_VOLUME_COLUMN") {
            options.columns.current = v;
        }
        if options.columns.prior == options.columns.current {
            return Err(AtrError::InvalidConfig(
                "prior and current volume columns must have different names".to_string(),
            ));
        }

        Ok(Self {
            report: report.into(),
            master: master.into(),
            output: var("OUTPUT_FILE").map(PathBuf::from),
            lookups: var("LOOKUPS_FILE").map(PathBuf::from),
            options,
        })
    }
}
