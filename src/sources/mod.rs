//! External collaborators
//!
//! The pipelines only see these traits. Wire shapes mirror the AWS JSON
//! payloads (Compute Optimizer, EC2 DescribeInstances, Pricing GetProducts,
//! S3 objects) so snapshot files captured from the AWS CLI can be replayed
//! through the local adapters.
//!
//! Implementations own their retry policy; the pipelines make exactly one
//! call per logical operation.

pub mod snapshot;
pub mod store;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{SourceError, StoreError, TagLookupError};

pub use snapshot::{SnapshotPriceSource, SnapshotRecommendationSource, SnapshotSources, SnapshotTagSource};
pub use store::{FsBlobStore, MemoryBlobStore, StoredObject};

/// Request for one page of EC2 instance recommendations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationPageRequest {
    /// Restrict to these accounts; empty means the caller's account
    pub account_ids: Vec<String>,
    pub next_token: Option<String>,
    pub max_results: u32,
}

/// One page of `GetEC2InstanceRecommendations` output.
///
/// Entries stay raw JSON so each one can be structured (or rejected)
/// independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationPage {
    #[serde(default)]
    pub instance_recommendations: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Paginated source of raw right-sizing recommendations
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn fetch_page(
        &self,
        request: &RecommendationPageRequest,
    ) -> Result<RecommendationPage, SourceError>;
}

/// Request for one page of a DescribeInstances call restricted to ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescribeInstancesRequest {
    pub instance_ids: Vec<String>,
    pub max_results: usize,
    pub next_token: Option<String>,
}

/// One page of DescribeInstances output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstancesPage {
    #[serde(default)]
    pub reservations: Vec<Reservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reservation {
    #[serde(default)]
    pub instances: Vec<InstanceDescription>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceDescription {
    pub instance_id: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl InstanceDescription {
    pub fn tag_map(&self) -> BTreeMap<String, String> {
        self.tags
            .iter()
            .map(|t| (t.key.clone(), t.value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Source of instance tags
///
/// A request naming an instance that no longer exists fails with
/// `TagLookupError::NotFound`, the way EC2 reports
/// `InvalidInstanceID.NotFound`. Sources should list the rejected ids in
/// `missing` so the caller can retry with the rest.
#[async_trait]
pub trait TagSource: Send + Sync {
    async fn describe_instances(
        &self,
        request: &DescribeInstancesRequest,
    ) -> Result<DescribeInstancesPage, TagLookupError>;
}

/// Exact attribute match filter of a GetProducts call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMatch {
    pub field: String,
    pub value: String,
}

impl TermMatch {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// GetProducts query against the pricing catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuery {
    pub service_code: String,
    pub filters: Vec<TermMatch>,
    pub max_results: usize,
}

/// On-demand pricing catalog. Returns price-list documents as JSON text,
/// as the Pricing API does.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_products(&self, query: &ProductQuery) -> Result<Vec<String>, SourceError>;
}

/// Blob store receiving report artifacts
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;

    /// Store-scheme URI of an object, used in run summaries
    fn uri(&self, bucket: &str, key: &str) -> String {
        format!("s3://{bucket}/{key}")
    }
}
