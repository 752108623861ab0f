//! Envelope document format and admissibility checks.
//!
//! An envelope wraps a snapshot's data with metadata and derived statistics:
//!
//! ```json
//! {
//!   "metadata":   { "version": "1.0.0", "type": "manual", "timestamp": "...", "createdBy": "..." },
//!   "data":       { "users": [ ... ], "messages": [ ... ] },
//!   "statistics": { "collections": 2, "totalDocuments": 40, "size": 5120 }
//! }
//! ```
//!
//! Tree artifacts carry an envelope too, as their first archive entry.

use crate::error::{BackupError, Result};
use crate::snapshot::Collections;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Version of the envelope format written by this engine.
pub const ENVELOPE_VERSION: &str = "1.0.0";

/// Envelope metadata block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    /// Format version; semver when written by this engine
    #[serde(deserialize_with = "version_string")]
    pub version: String,

    /// Backup kind that produced the envelope
    #[serde(rename = "type", default)]
    pub backup_type: String,

    /// When the snapshot was taken, as found in the document.
    ///
    /// This engine writes RFC 3339; other writers may use epoch milliseconds.
    pub timestamp: Value,

    /// What created this backup (e.g., "archivist v1.0.0")
    #[serde(default)]
    pub created_by: String,
}

impl EnvelopeMetadata {
    /// The timestamp as UTC, if it is an RFC 3339 string or epoch milliseconds.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.timestamp {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            _ => None,
        }
    }

    /// Human-readable timestamp; falls back to the raw value.
    pub fn timestamp_label(&self) -> String {
        match (self.parsed_timestamp(), &self.timestamp) {
            (Some(t), _) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
            (None, Value::String(s)) => s.clone(),
            (None, other) => other.to_string(),
        }
    }
}

/// Accepts `"1.0.0"` as well as bare numbers such as `1`.
fn version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// Statistics derived from the data block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeStatistics {
    /// Number of collections
    pub collections: usize,

    /// Records summed across collections
    pub total_documents: usize,

    /// Serialized size of the data block in bytes
    pub size: u64,
}

/// Complete envelope document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub metadata: EnvelopeMetadata,
    pub data: Value,
    #[serde(default)]
    pub statistics: EnvelopeStatistics,
}

impl Envelope {
    /// Wrap arbitrary data; statistics must be supplied by the caller.
    pub fn new(
        backup_type: impl Into<String>,
        created_by: impl Into<String>,
        timestamp: DateTime<Utc>,
        data: Value,
        statistics: EnvelopeStatistics,
    ) -> Self {
        Self {
            metadata: EnvelopeMetadata {
                version: ENVELOPE_VERSION.to_string(),
                backup_type: backup_type.into(),
                timestamp: Value::String(timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
                created_by: created_by.into(),
            },
            data,
            statistics,
        }
    }

    /// Build an envelope from snapshot collections, summing record counts.
    pub fn from_collections(
        collections: &Collections,
        backup_type: impl Into<String>,
        created_by: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let data = serde_json::to_value(collections)?;
        let size = serde_json::to_vec(&data)?.len() as u64;

        let statistics = EnvelopeStatistics {
            collections: collections.len(),
            total_documents: collections.values().map(Vec::len).sum(),
            size,
        };

        Ok(Self::new(backup_type, created_by, timestamp, data, statistics))
    }

    /// Serialize to pretty JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse and validate an envelope document.
    ///
    /// An envelope is admissible iff `metadata.version`, `metadata.timestamp`
    /// and `data` are present. A version that is not semver, or whose major
    /// component differs from [`ENVELOPE_VERSION`], is logged but accepted.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let document: Value = serde_json::from_slice(bytes).map_err(|e| {
            BackupError::validation(format!("Backup is not a valid JSON document: {}", e))
        })?;

        check_admissible(&document)?;

        let envelope: Envelope = serde_json::from_value(document)
            .map_err(|e| BackupError::validation(format!("Malformed backup envelope: {}", e)))?;

        check_version(&envelope.metadata.version);

        Ok(envelope)
    }

    /// Interpret the data block as named collections.
    pub fn collections(&self) -> Result<Collections> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            BackupError::validation(format!("Backup data is not a set of collections: {}", e))
        })
    }
}

fn check_admissible(document: &Value) -> Result<()> {
    let present = |value: Option<&Value>| value.map_or(false, |v| !v.is_null());
    let metadata = document.get("metadata");

    if !present(metadata.and_then(|m| m.get("version"))) {
        return Err(BackupError::validation("Missing metadata.version"));
    }
    if !present(metadata.and_then(|m| m.get("timestamp"))) {
        return Err(BackupError::validation("Missing metadata.timestamp"));
    }
    if !present(document.get("data")) {
        return Err(BackupError::validation("Missing data"));
    }

    Ok(())
}

/// Warn about envelopes written by a different major version.
///
/// Returns whether the version is known to be compatible.
fn check_version(version: &str) -> bool {
    let (backup_version, current) = match (Version::parse(version), Version::parse(ENVELOPE_VERSION)) {
        (Ok(backup), Ok(current)) => (backup, current),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Envelope version '{}' is not semver ({}), continuing", version, e);
            return false;
        }
    };

    if backup_version.major != current.major {
        warn!(
            "Backup version {} may not be compatible with current version {}",
            backup_version, current
        );
        return false;
    }

    true
}
