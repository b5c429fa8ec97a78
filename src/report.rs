//! Shared report plumbing
//!
//! Both stages emit a CSV + JSON pair. The CSV writer, the
//! `{report_metadata, recommendations}` document, artifact upload and the
//! invocation summary live here; each stage supplies its own record type
//! through [`ReportRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, ReportError, StoreError};
use crate::sources::BlobStore;

/// Folder timestamp shared by the two stages, e.g. `2025-01-15_12-00-00`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const JSON_CONTENT_TYPE: &str = "application/json";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Separator for list values in CSV cells and AI alternatives
pub const LIST_SEPARATOR: &str = "; ";

pub fn join_list(values: &[String]) -> String {
    values.join(LIST_SEPARATOR)
}

/// A display record with a fixed column order
pub trait ReportRecord {
    const COLUMNS: &'static [&'static str];

    /// Cell values in `COLUMNS` order
    fn csv_row(&self) -> Vec<String>;
}

/// Render records as CSV. The header row is always written.
pub fn to_csv<R: ReportRecord>(records: &[R]) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(R::COLUMNS)?;
    for record in records {
        writer.write_record(record.csv_row())?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Csv(csv::Error::from(e.into_error())))?;
    Ok(String::from_utf8(bytes)?)
}

/// `{report_metadata, recommendations}` artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument<M, R> {
    pub report_metadata: M,
    pub recommendations: Vec<R>,
}

impl<M: Serialize, R: Serialize> ReportDocument<M, R> {
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Keys and URIs of an uploaded CSV + JSON pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocations {
    pub csv_key: String,
    pub json_key: String,
    pub csv_uri: String,
    pub json_uri: String,
}

/// Upload the CSV, then the JSON. The JSON goes last because its creation
/// is what triggers the next stage.
pub async fn upload_pair(
    store: &dyn BlobStore,
    bucket: &str,
    csv_key: String,
    csv: String,
    json_key: String,
    json: String,
) -> Result<ArtifactLocations, StoreError> {
    store
        .put(bucket, &csv_key, csv.into_bytes(), CSV_CONTENT_TYPE)
        .await?;
    let csv_uri = store.uri(bucket, &csv_key);
    tracing::info!(uri = %csv_uri, "Uploaded CSV report");

    store
        .put(bucket, &json_key, json.into_bytes(), JSON_CONTENT_TYPE)
        .await?;
    let json_uri = store.uri(bucket, &json_key);
    tracing::info!(uri = %json_uri, "Uploaded JSON report");

    Ok(ArtifactLocations {
        csv_key,
        json_key,
        csv_uri,
        json_uri,
    })
}

/// Invocation response: `{statusCode, body, ...stats}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationSummary<S> {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
    #[serde(flatten)]
    pub stats: Option<S>,
}

impl<S> InvocationSummary<S> {
    pub fn ok(body: impl Into<String>, stats: S) -> Self {
        Self {
            status_code: 200,
            body: body.into(),
            stats: Some(stats),
        }
    }

    pub fn message(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
            stats: None,
        }
    }

    /// Summary of an invocation that ended in error
    pub fn from_error(error: &PipelineError) -> Self {
        Self::message(error.status_code(), error.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Tolerant deserializers for report records read back from JSON.
///
/// Reports may come from other producers; absent or null values and
/// numbers written as strings are accepted instead of failing the record.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            Value::Bool(b) => f64::from(u8::from(b)),
            _ => 0.0,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            Value::Array(items) => super::join_list(&items.iter().map(scalar).collect::<Vec<_>>()),
            other => other.to_string(),
        })
    }

    /// Arrays, `"a; b"` strings or null
    pub fn list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => items.iter().map(scalar).collect(),
            Value::String(s) => s
                .split(';')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        })
    }

    fn scalar(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    struct Pair {
        name: String,
        tags: Vec<String>,
    }

    impl ReportRecord for Pair {
        const COLUMNS: &'static [&'static str] = &["Name", "Tags"];

        fn csv_row(&self) -> Vec<String> {
            vec![self.name.clone(), join_list(&self.tags)]
        }
    }

    #[test]
    fn test_csv_header_always_present() {
        let csv = to_csv::<Pair>(&[]).unwrap();
        assert_eq!(csv, "Name,Tags\n");
    }

    #[test]
    fn test_csv_quotes_and_joins() {
        let rows = vec![Pair {
            name: "web, primary".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
        }];
        let csv = to_csv(&rows).unwrap();
        assert_eq!(csv, "Name,Tags\n\"web, primary\",a; b\n");
    }

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(at), "2025-01-15_12-00-00");
    }

    #[test]
    fn test_summary_flattens_stats() {
        #[derive(Serialize)]
        struct Stats {
            total_instances: usize,
        }

        let summary = InvocationSummary::ok("done", Stats { total_instances: 3 });
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            value,
            json!({"statusCode": 200, "body": "done", "total_instances": 3})
        );

        let bare: InvocationSummary<Stats> = InvocationSummary::message(400, "bad event");
        assert!(!bare.is_success());
        assert_eq!(
            serde_json::to_value(&bare).unwrap(),
            json!({"statusCode": 400, "body": "bad event"})
        );
    }

    #[derive(Deserialize)]
    struct Loose {
        #[serde(default, deserialize_with = "lenient::number")]
        price: f64,
        #[serde(default, deserialize_with = "lenient::text")]
        name: String,
        #[serde(default, deserialize_with = "lenient::list")]
        reasons: Vec<String>,
    }

    #[test]
    fn test_lenient_fields() {
        let loose: Loose =
            serde_json::from_value(json!({"price": "12.5", "name": null, "reasons": "a; b"}))
                .unwrap();
        assert_eq!(loose.price, 12.5);
        assert_eq!(loose.name, "");
        assert_eq!(loose.reasons, vec!["a", "b"]);

        let loose: Loose = serde_json::from_value(json!({"price": "", "name": 7})).unwrap();
        assert_eq!(loose.price, 0.0);
        assert_eq!(loose.name, "7");
        assert!(loose.reasons.is_empty());
    }
}
