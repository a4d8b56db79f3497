use std::fmt;

use chrono::NaiveDateTime;

use crate::domain::DatasetName;
use crate::error::BackupError;

/// Wall-clock stamp for one backup invocation, rendered as
/// `yyyyMMdd_HHmmss`. Lexically sortable and made only of characters the
/// catalog accepts in names. Captured once per invocation so every
/// replicated resource shares the exact same stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupStamp(String);

impl BackupStamp {
    pub fn now() -> Self {
        Self::at(chrono::Local::now().naive_local())
    }

    pub fn at(instant: NaiveDateTime) -> Self {
        Self(instant.format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackupStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backup dataset name: original name with the stamp appended, no
/// separator. The stamp only contains name-safe characters, so a valid
/// source name always yields a valid backup name.
pub fn backup_dataset_name(original: &DatasetName, stamp: &BackupStamp) -> DatasetName {
    original.suffixed(stamp.as_str())
}

/// Backup resource filename: split at the first `.` into base and
/// extension, then `base + stamp + "." + extension`. A filename without a
/// `.` is a data-integrity violation and aborts the invocation.
pub fn backup_resource_filename(
    original: &str,
    stamp: &BackupStamp,
) -> Result<String, BackupError> {
    let (base, extension) = original
        .split_once('.')
        .ok_or_else(|| BackupError::ResourceNaming(original.to_string()))?;
    Ok(format!("{base}{stamp}.{extension}"))
}
