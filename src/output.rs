use std::io::{self, Write};

use serde::Serialize;

use crate::backup::{BackupReport, Outcome, Route};
use crate::domain::WorkItem;
use crate::error::BackupError;

#[derive(Debug, Serialize)]
struct OutcomeReport<'a> {
    dataset: &'a str,
    route: Route,
    penalize: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup: Option<&'a BackupReport>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_outcome(work: &WorkItem, outcome: &Outcome) -> io::Result<()> {
        let disposition = outcome.disposition();
        let report = OutcomeReport {
            dataset: work.dataset_name().as_str(),
            route: disposition.route,
            penalize: disposition.penalize,
            cause: disposition.cause,
            backup: match outcome {
                Outcome::Success(report) => Some(report),
                _ => None,
            },
        };
        Self::print_json(&report)
    }

    /// For input the core could not even derive an identifier from: still
    /// reported, on the failure route.
    pub fn print_rejected(input: &str, cause: &BackupError) -> io::Result<()> {
        let report = OutcomeReport {
            dataset: input,
            route: Route::Failure,
            penalize: true,
            cause: Some(cause.to_string()),
            backup: None,
        };
        Self::print_json(&report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
