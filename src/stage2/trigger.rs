//! Object-created notifications
//!
//! Stage 2 is triggered by the S3-style event emitted when Stage 1 writes
//! its JSON report. Only the first record is considered.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::TriggerError;

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})").expect("valid timestamp regex")
});

const VALIDATED_SEGMENT: &str = "/validated/";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Notification {
    #[serde(default)]
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationRecord {
    #[serde(default)]
    s3: S3Entity,
}

#[derive(Debug, Default, Deserialize)]
struct S3Entity {
    #[serde(default)]
    bucket: BucketEntity,
    #[serde(default)]
    object: ObjectEntity,
}

#[derive(Debug, Default, Deserialize)]
struct BucketEntity {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectEntity {
    #[serde(default)]
    key: String,
}

/// Bucket and decoded key of the object that triggered the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

/// Form-style key decoding: `+` is a space, then percent-escapes
pub fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode_binary(spaced.as_bytes()) {
        Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Cow::Owned(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

/// Location of the first record of a notification
pub fn parse_notification(event: &serde_json::Value) -> Result<ObjectLocation, TriggerError> {
    let notification = Notification::deserialize(event)?;
    let record = notification
        .records
        .into_iter()
        .next()
        .ok_or(TriggerError::NoRecords)?;

    let bucket = record.s3.bucket.name;
    let key = decode_key(&record.s3.object.key);
    if bucket.is_empty() || key.is_empty() {
        return Err(TriggerError::MissingLocation { bucket, key });
    }

    tracing::info!(%bucket, %key, "Parsed S3 event");
    Ok(ObjectLocation { bucket, key })
}

/// Why a well-formed notification is ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotJson,
    ValidatedOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDecision {
    Process(ObjectLocation),
    Skip {
        location: ObjectLocation,
        reason: SkipReason,
    },
}

impl TriggerDecision {
    /// Summary body of a skipped trigger
    pub fn skip_message(location: &ObjectLocation, reason: SkipReason) -> String {
        match reason {
            SkipReason::NotJson => format!("Skipped non-JSON file: {}", location.key),
            SkipReason::ValidatedOutput => format!("Skipped validated report: {}", location.key),
        }
    }
}

/// Apply the trigger guards in order: malformed → error, non-JSON key →
/// skip, already-validated output → skip
pub fn evaluate(event: &serde_json::Value) -> Result<TriggerDecision, TriggerError> {
    let location = parse_notification(event)?;

    if !location.key.ends_with(".json") {
        tracing::info!(key = %location.key, "Skipping non-JSON file");
        return Ok(TriggerDecision::Skip {
            location,
            reason: SkipReason::NotJson,
        });
    }
    if location.key.contains(VALIDATED_SEGMENT) {
        tracing::info!(key = %location.key, "Skipping validated report (prevent re-trigger)");
        return Ok(TriggerDecision::Skip {
            location,
            reason: SkipReason::ValidatedOutput,
        });
    }
    Ok(TriggerDecision::Process(location))
}

/// First `YYYY-MM-DD_HH-MM-SS` in a key, or empty
pub fn extract_timestamp(key: &str) -> String {
    TIMESTAMP
        .find(key)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
