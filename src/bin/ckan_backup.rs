use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ckan_backup::backup::{Outcome, run_backup};
use ckan_backup::ckan::CkanHttpClient;
use ckan_backup::config::ConfigLoader;
use ckan_backup::domain::WorkItem;
use ckan_backup::error::BackupError;
use ckan_backup::output::JsonOutput;

#[derive(Parser)]
#[command(name = "ckan-backup")]
#[command(about = "Create timestamped backups of CKAN datasets and all of their resources")]
#[command(version, author)]
struct Cli {
    /// Dataset identifiers to back up, one invocation each
    #[arg(required = true)]
    items: Vec<String>,

    /// Path to the JSON config file (default: ckan-backup.json)
    #[arg(long)]
    config: Option<String>,

    /// Derive each identifier from a filename by stripping its extension
    #[arg(long)]
    from_filename: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<BackupError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &BackupError) -> u8 {
    match error {
        BackupError::MissingConfig
        | BackupError::ConfigRead(_)
        | BackupError::ConfigParse(_)
        | BackupError::InvalidEndpoint(_)
        | BackupError::InvalidDatasetName(_)
        | BackupError::MissingIdentifier(_) => 2,
        BackupError::CatalogHttp(_)
        | BackupError::CatalogStatus { .. }
        | BackupError::CatalogResponse(_) => 3,
        BackupError::ResourceNaming(_) => 1,
    }
}

fn outcome_exit_code(outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::Success(_) => 0,
        Outcome::NotFound => 2,
        Outcome::Failure(err) => map_exit_code(err),
    }
}

fn run() -> miette::Result<u8> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;

    let mut worst = 0u8;
    for item in &cli.items {
        let work = if cli.from_filename {
            WorkItem::from_filename(item)
        } else {
            item.parse().map(WorkItem::new)
        };

        let work = match work {
            Ok(work) => work,
            Err(err) => {
                // The unit of work still gets routed, to the failure path.
                JsonOutput::print_rejected(item, &err).into_diagnostic()?;
                worst = worst.max(map_exit_code(&err));
                continue;
            }
        };

        let client =
            CkanHttpClient::new(&config.catalog_url, &config.api_key).into_diagnostic()?;
        let outcome = run_backup(client, &work);
        JsonOutput::print_outcome(&work, &outcome).into_diagnostic()?;
        worst = worst.max(outcome_exit_code(&outcome));
    }

    Ok(worst)
}
