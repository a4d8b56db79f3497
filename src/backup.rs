use serde::Serialize;
use tracing::{error, info, warn};

use crate::ckan::CatalogClient;
use crate::domain::{Dataset, DatasetName, WorkItem};
use crate::error::BackupError;
use crate::naming::{BackupStamp, backup_dataset_name, backup_resource_filename};

/// What one successful invocation produced.
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub source: DatasetName,
    pub backup: DatasetName,
    pub stamp: String,
    pub resources: Vec<String>,
}

/// Exactly one of these is produced per invocation.
#[derive(Debug)]
pub enum Outcome {
    Success(BackupReport),
    NotFound,
    Failure(BackupError),
}

/// The three routing labels the surrounding pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    Success,
    NotFound,
    Failure,
}

/// How the unit of work should be forwarded: which path it takes, whether
/// the upstream re-delivery mechanism should back off, and the cause to
/// attach on failure.
#[derive(Debug, Clone, Serialize)]
pub struct Disposition {
    pub route: Route,
    pub penalize: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl Outcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            Outcome::Success(_) => Disposition {
                route: Route::Success,
                penalize: false,
                cause: None,
            },
            Outcome::NotFound => Disposition {
                route: Route::NotFound,
                penalize: false,
                cause: None,
            },
            Outcome::Failure(err) => Disposition {
                route: Route::Failure,
                penalize: true,
                cause: Some(err.to_string()),
            },
        }
    }
}

/// Runs one backup invocation: lookup, naming, replication. The client is
/// closed on every exit path. Errors from any stage surface here; this is
/// the only place an outcome is decided.
pub fn run_backup<C: CatalogClient>(client: C, work: &WorkItem) -> Outcome {
    let result = execute(&client, work);

    let closed = client.close();

    let outcome = match result {
        Ok(Some(report)) => match closed {
            Ok(()) => Outcome::Success(report),
            Err(err) => Outcome::Failure(err),
        },
        Ok(None) => match closed {
            Ok(()) => Outcome::NotFound,
            Err(err) => Outcome::Failure(err),
        },
        Err(err) => {
            if let Err(close_err) = closed {
                warn!(%close_err, "failed to close catalog session after error");
            }
            Outcome::Failure(err)
        }
    };

    if let Outcome::Failure(err) = &outcome {
        match err {
            BackupError::ResourceNaming(_) => {
                error!(%err, "resource filename is missing an extension separator")
            }
            err if err.is_transport() => error!(%err, "error while using the catalog API"),
            _ => error!(%err, "backup failed"),
        }
    }
    outcome
}

fn execute<C: CatalogClient>(
    client: &C,
    work: &WorkItem,
) -> Result<Option<BackupReport>, BackupError> {
    info!(dataset = %work.dataset_name(), "looking up dataset in catalog");
    let Some(dataset) = client.lookup_dataset(work.dataset_name())? else {
        info!(dataset = %work.dataset_name(), "dataset not present in catalog");
        return Ok(None);
    };

    // One stamp per invocation; every replicated resource shares it.
    let stamp = BackupStamp::now();
    let report = replicate(client, &dataset, &stamp)?;
    info!(
        backup = %report.backup,
        resources = report.resources.len(),
        "backup complete"
    );
    Ok(Some(report))
}

fn replicate<C: CatalogClient>(
    client: &C,
    source: &Dataset,
    stamp: &BackupStamp,
) -> Result<BackupReport, BackupError> {
    let backup_name = backup_dataset_name(&source.name, stamp);

    // The copy must exist before any upload can address it.
    client.create_dataset(source, &backup_name)?;

    // First failure abandons the invocation; uploads already made stay in
    // the catalog. No rollback.
    let mut resources = Vec::with_capacity(source.resources.len());
    for resource in &source.resources {
        let new_filename = backup_resource_filename(&resource.name, stamp)?;
        client.upload_resource(resource, &backup_name, &new_filename)?;
        resources.push(new_filename);
    }

    Ok(BackupReport {
        source: source.name.clone(),
        backup: backup_name,
        stamp: stamp.to_string(),
        resources,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::domain::Resource;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Lookup(String),
        Create(String),
        Upload { target: String, filename: String },
        Close,
    }

    #[derive(Clone, Default)]
    struct MockCatalog {
        dataset: Option<Dataset>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl CatalogClient for MockCatalog {
        fn lookup_dataset(&self, name: &DatasetName) -> Result<Option<Dataset>, BackupError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Lookup(name.as_str().to_string()));
            Ok(self.dataset.clone())
        }

        fn create_dataset(
            &self,
            _source: &Dataset,
            new_name: &DatasetName,
        ) -> Result<(), BackupError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Create(new_name.as_str().to_string()));
            Ok(())
        }

        fn upload_resource(
            &self,
            _resource: &Resource,
            target: &DatasetName,
            new_filename: &str,
        ) -> Result<(), BackupError> {
            self.calls.lock().unwrap().push(Call::Upload {
                target: target.as_str().to_string(),
                filename: new_filename.to_string(),
            });
            Ok(())
        }

        fn close(self) -> Result<(), BackupError> {
            self.calls.lock().unwrap().push(Call::Close);
            Ok(())
        }
    }

    fn dataset(name: &str, resource_names: &[&str]) -> Dataset {
        Dataset {
            name: name.parse().unwrap(),
            title: Some("Test dataset".to_string()),
            notes: None,
            author: None,
            author_email: None,
            maintainer: None,
            maintainer_email: None,
            license_id: None,
            owner_org: None,
            private: None,
            resources: resource_names
                .iter()
                .map(|name| Resource {
                    id: None,
                    name: name.to_string(),
                    url: format!("https://catalog.example.org/{name}"),
                    format: None,
                    description: None,
                    mimetype: None,
                })
                .collect(),
        }
    }

    #[test]
    fn backup_replicates_every_resource_under_one_stamp() {
        let catalog = MockCatalog {
            dataset: Some(dataset("sensors", &["readings.csv", "meta.json"])),
            calls: Arc::default(),
        };
        let calls = catalog.calls.clone();
        let work = WorkItem::new("sensors".parse().unwrap());

        let outcome = run_backup(catalog, &work);

        let Outcome::Success(report) = outcome else {
            panic!("expected success");
        };
        assert!(report.backup.as_str().starts_with("sensors"));
        assert_eq!(report.resources.len(), 2);
        let suffix = &report.backup.as_str()["sensors".len()..];
        assert_eq!(report.stamp, suffix);
        for filename in &report.resources {
            assert!(filename.contains(suffix));
        }
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Close));
    }

    #[test]
    fn missing_dataset_is_not_found_with_zero_writes() {
        let catalog = MockCatalog::default();
        let calls = catalog.calls.clone();
        let work = WorkItem::new("ghost-dataset".parse().unwrap());

        let outcome = run_backup(catalog, &work);

        assert!(matches!(outcome, Outcome::NotFound));
        assert_eq!(
            *calls.lock().unwrap(),
            vec![Call::Lookup("ghost-dataset".to_string()), Call::Close]
        );
    }

    #[test]
    fn dotless_resource_filename_fails_after_dataset_creation() {
        let catalog = MockCatalog {
            dataset: Some(dataset("sensors", &["noext"])),
            calls: Arc::default(),
        };
        let calls = catalog.calls.clone();
        let work = WorkItem::new("sensors".parse().unwrap());

        let outcome = run_backup(catalog, &work);

        assert!(matches!(
            outcome,
            Outcome::Failure(BackupError::ResourceNaming(_))
        ));
        let calls = calls.lock().unwrap();
        // Creation already happened and stays; no upload was attempted.
        assert!(matches!(calls[1], Call::Create(_)));
        assert!(!calls.iter().any(|call| matches!(call, Call::Upload { .. })));
        assert_eq!(calls.last(), Some(&Call::Close));
    }

    #[test]
    fn disposition_routes_and_penalizes() {
        let success = Outcome::Success(BackupReport {
            source: "sensors".parse().unwrap(),
            backup: "sensors20240301_101530".parse().unwrap(),
            stamp: "20240301_101530".to_string(),
            resources: vec![],
        });
        assert_eq!(success.disposition().route, Route::Success);
        assert!(!success.disposition().penalize);

        assert_eq!(Outcome::NotFound.disposition().route, Route::NotFound);
        assert!(!Outcome::NotFound.disposition().penalize);

        let failure = Outcome::Failure(BackupError::CatalogHttp("boom".to_string()));
        let disposition = failure.disposition();
        assert_eq!(disposition.route, Route::Failure);
        assert!(disposition.penalize);
        assert_eq!(disposition.cause.as_deref(), Some("catalog request failed: boom"));
    }
}
