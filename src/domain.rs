use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BackupError;

/// A catalog-safe dataset name: non-empty, ASCII alphanumerics plus `-` and
/// `_`. The catalog rejects anything else, so we refuse it up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetName(String);

impl DatasetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Concatenates a suffix made only of name-safe characters, so the
    /// result stays valid without re-validation.
    pub(crate) fn suffixed(&self, suffix: &str) -> DatasetName {
        DatasetName(format!("{}{}", self.0, suffix))
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetName {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_valid {
            return Err(BackupError::InvalidDatasetName(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// One data file belonging to a dataset, as returned by `package_show`.
/// `name` is the filename (`<base>.<extension>`); `url` points at the
/// content in the source catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
}

/// A catalog package: display metadata plus its ordered resource list.
/// Read at lookup time and never mutated; replication creates a copy
/// under a different name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: DatasetName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
}

/// One unit of work flowing through the surrounding pipeline. Carries the
/// identifier of the dataset to back up; everything else about the item is
/// opaque to this crate and passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    dataset_name: DatasetName,
}

impl WorkItem {
    pub fn new(dataset_name: DatasetName) -> Self {
        Self { dataset_name }
    }

    /// Derives the dataset identifier from a filename by stripping
    /// everything from the first `.` (e.g. `sensors.csv` -> `sensors`).
    pub fn from_filename(filename: &str) -> Result<Self, BackupError> {
        let base = filename.split('.').next().unwrap_or_default();
        let dataset_name = base
            .parse()
            .map_err(|_| BackupError::MissingIdentifier(filename.to_string()))?;
        Ok(Self { dataset_name })
    }

    pub fn dataset_name(&self) -> &DatasetName {
        &self.dataset_name
    }
}
