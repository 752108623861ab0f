//! Artifact filenames.
//!
//! Names embed a UTC timestamp with `:` and `.` replaced by `-`, so a
//! lexical sort of names is also a chronological sort:
//!
//! ```text
//! backup-2026-10-18T12-30-45-123456Z.json       envelope
//! backup-2026-10-18T12-30-45-123456Z.json.gz    envelope, gzip
//! backup-2026-10-18T12-30-45-123456Z.tar.gz     tree
//! backup-2026-10-18T12-30-45-123456Z-1.json.gz  name collision, sequence 1
//! ```

use crate::artifact::ArtifactStrategy;
use crate::error::{BackupError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Prefix of every generated artifact name
pub const FILENAME_PREFIX: &str = "backup-";

/// Suffix marking a whole-file gzip envelope
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Envelope extension
pub const ENVELOPE_EXTENSION: &str = ".json";

/// Tree artifact extension
pub const TREE_EXTENSION: &str = ".tar.gz";

/// What a filename says about its artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub strategy: ArtifactStrategy,
    pub compressed: bool,
    /// Timestamp embedded in generated names
    pub created_at: Option<DateTime<Utc>>,
    /// Collision sequence number (0 when absent)
    pub sequence: u32,
}

/// Filesystem-safe rendering of a timestamp.
pub fn timestamp_stem(timestamp: DateTime<Utc>) -> String {
    timestamp
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
        .replace([':', '.'], "-")
}

/// Extension for a strategy/compression pair. Tree artifacts are always gzipped.
pub fn extension_for(strategy: ArtifactStrategy, compressed: bool) -> String {
    match strategy {
        ArtifactStrategy::Tree => TREE_EXTENSION.to_string(),
        ArtifactStrategy::Envelope if compressed => {
            format!("{}{}", ENVELOPE_EXTENSION, COMPRESSED_SUFFIX)
        }
        ArtifactStrategy::Envelope => ENVELOPE_EXTENSION.to_string(),
    }
}

/// Build an artifact filename. `sequence` 0 yields the plain name.
pub fn artifact_filename(stem: &str, sequence: u32, extension: &str) -> String {
    if sequence == 0 {
        format!("{}{}{}", FILENAME_PREFIX, stem, extension)
    } else {
        format!("{}{}-{}{}", FILENAME_PREFIX, stem, sequence, extension)
    }
}

/// Reject names that could escape the backup directory.
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(BackupError::validation("Backup filename is empty"));
    }

    if filename == "." || filename == ".." || filename.contains(['/', '\\', '\0']) {
        return Err(BackupError::validation(format!(
            "Invalid backup filename: {}",
            filename
        )));
    }

    Ok(())
}

/// Classify a filename by extension, parsing the embedded timestamp if it
/// is a generated name. Returns `None` for names that are not artifacts.
pub fn parse_filename(filename: &str) -> Option<ArtifactName> {
    let (strategy, compressed, base) = if let Some(base) = filename.strip_suffix(TREE_EXTENSION) {
        (ArtifactStrategy::Tree, true, base)
    } else if let Some(base) = filename
        .strip_suffix(COMPRESSED_SUFFIX)
        .and_then(|b| b.strip_suffix(ENVELOPE_EXTENSION))
    {
        (ArtifactStrategy::Envelope, true, base)
    } else if let Some(base) = filename.strip_suffix(ENVELOPE_EXTENSION) {
        (ArtifactStrategy::Envelope, false, base)
    } else {
        return None;
    };

    if base.is_empty() || filename.starts_with('.') {
        return None;
    }

    let (created_at, sequence) = base
        .strip_prefix(FILENAME_PREFIX)
        .and_then(parse_stem)
        .map(|(ts, seq)| (Some(ts), seq))
        .unwrap_or((None, 0));

    Some(ArtifactName {
        strategy,
        compressed,
        created_at,
        sequence,
    })
}

/// Parse `YYYY-MM-DDTHH-MM-SS-ffffffZ[-n]`
fn parse_stem(stem: &str) -> Option<(DateTime<Utc>, u32)> {
    let (timestamp, rest) = stem.split_once('Z')?;
    let sequence = match rest {
        "" => 0,
        _ => rest.strip_prefix('-')?.parse().ok()?,
    };

    let (date_part, time_part) = timestamp.split_once('T')?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;

    let parts: Vec<&str> = time_part.split('-').collect();
    if parts.len() != 4 {
        return None;
    }
    let hour: u32 = parts[0].parse().ok()?;
    let minute: u32 = parts[1].parse().ok()?;
    let second: u32 = parts[2].parse().ok()?;
    let micros: u32 = parts[3].parse().ok()?;
    let time = NaiveTime::from_hms_micro_opt(hour, minute, second, micros)?;

    let datetime = NaiveDateTime::new(date, time);
    Some((DateTime::from_naive_utc_and_offset(datetime, Utc), sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 30, 45).unwrap()
            + chrono::Duration::microseconds(123_456)
    }

    #[test]
    fn test_timestamp_stem_is_filesystem_safe() {
        let stem = timestamp_stem(sample_time());
        assert_eq!(stem, "2026-10-18T12-30-45-123456Z");
        assert!(!stem.contains(':'));
        assert!(!stem.contains('.'));
    }

    #[test]
    fn test_artifact_filenames() {
        let stem = timestamp_stem(sample_time());
        assert_eq!(
            artifact_filename(&stem, 0, &extension_for(ArtifactStrategy::Envelope, true)),
            "backup-2026-10-18T12-30-45-123456Z.json.gz"
        );
        assert_eq!(
            artifact_filename(&stem, 2, &extension_for(ArtifactStrategy::Envelope, false)),
            "backup-2026-10-18T12-30-45-123456Z-2.json"
        );
        assert_eq!(
            artifact_filename(&stem, 0, &extension_for(ArtifactStrategy::Tree, false)),
            "backup-2026-10-18T12-30-45-123456Z.tar.gz"
        );
    }

    #[test]
    fn test_parse_generated_name() {
        let parsed = parse_filename("backup-2026-10-18T12-30-45-123456Z-3.json.gz").unwrap();
        assert_eq!(parsed.strategy, ArtifactStrategy::Envelope);
        assert!(parsed.compressed);
        assert_eq!(parsed.sequence, 3);

        let created = parsed.created_at.unwrap();
        assert_eq!(created.year(), 2026);
        assert_eq!(created.hour(), 12);
        assert_eq!(created.nanosecond(), 123_456_000);
        assert_eq!(created, sample_time());
    }

    #[test]
    fn test_parse_foreign_names() {
        let parsed = parse_filename("nightly-export.json").unwrap();
        assert_eq!(parsed.strategy, ArtifactStrategy::Envelope);
        assert!(!parsed.compressed);
        assert!(parsed.created_at.is_none());

        let parsed = parse_filename("media.tar.gz").unwrap();
        assert_eq!(parsed.strategy, ArtifactStrategy::Tree);

        assert!(parse_filename("notes.txt").is_none());
        assert!(parse_filename(".json").is_none());
        assert!(parse_filename(".backup-x.json.partial").is_none());
    }

    #[test]
    fn test_generated_names_sort_chronologically() {
        let earlier = timestamp_stem(sample_time());
        let later = timestamp_stem(sample_time() + chrono::Duration::seconds(1));
        assert!(artifact_filename(&earlier, 0, ".json") < artifact_filename(&later, 0, ".json"));
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("backup-x.json").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("../registry.json").is_err());
        assert!(validate_filename("auto/backup.json").is_err());
        assert!(validate_filename("a\\b.json").is_err());
    }
}
