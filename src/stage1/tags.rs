//! Tag enrichment
//!
//! Looks up instance tags in batches and attaches them (plus the `Name`
//! display name) to each recommendation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::TagLookupError;
use crate::model::Recommendation;
use crate::sources::{DescribeInstancesRequest, TagSource};

/// Instance ids per describe call
pub const TAG_BATCH_SIZE: usize = 200;

/// Instances per describe page
pub const DESCRIBE_PAGE_SIZE: usize = 100;

pub type TagMap = BTreeMap<String, String>;

pub struct TagEnricher {
    source: Arc<dyn TagSource>,
}

impl TagEnricher {
    pub fn new(source: Arc<dyn TagSource>) -> Self {
        Self { source }
    }

    /// Tags for each id that could be resolved
    pub async fn fetch_tags(
        &self,
        instance_ids: &[String],
    ) -> Result<HashMap<String, TagMap>, TagLookupError> {
        let mut all_tags = HashMap::new();

        for (batch_index, batch) in instance_ids.chunks(TAG_BATCH_SIZE).enumerate() {
            let start = batch_index * TAG_BATCH_SIZE;
            tracing::info!(
                from = start + 1,
                to = start + batch.len(),
                total = instance_ids.len(),
                "Fetching tags for instances"
            );
            self.fetch_batch(batch, &mut all_tags).await?;
        }

        Ok(all_tags)
    }

    /// Resolve one batch. Ids the source reports as missing are dropped and
    /// the rest retried, so only those ids end up without tags.
    async fn fetch_batch(
        &self,
        batch: &[String],
        tags: &mut HashMap<String, TagMap>,
    ) -> Result<(), TagLookupError> {
        let mut remaining = batch.to_vec();

        while !remaining.is_empty() {
            match self.describe_all(&remaining, tags).await {
                Ok(()) => return Ok(()),
                Err(TagLookupError::NotFound { message, missing }) => {
                    // Terminated between the recommendation fetch and now
                    tracing::warn!(
                        %message,
                        missing = missing.len(),
                        "Some instances not found (likely terminated)"
                    );
                    let before = remaining.len();
                    remaining.retain(|id| !missing.contains(id));
                    if remaining.len() == before {
                        return self.fetch_one_by_one(&remaining, tags).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Fallback when the source does not say which ids are gone
    async fn fetch_one_by_one(
        &self,
        ids: &[String],
        tags: &mut HashMap<String, TagMap>,
    ) -> Result<(), TagLookupError> {
        for id in ids {
            match self.describe_all(std::slice::from_ref(id), tags).await {
                Ok(()) => {}
                Err(TagLookupError::NotFound { .. }) => {
                    tracing::warn!(instance_id = %id, "Instance not found");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn describe_all(
        &self,
        ids: &[String],
        tags: &mut HashMap<String, TagMap>,
    ) -> Result<(), TagLookupError> {
        let mut request = DescribeInstancesRequest {
            instance_ids: ids.to_vec(),
            max_results: DESCRIBE_PAGE_SIZE,
            next_token: None,
        };

        loop {
            let page = self.source.describe_instances(&request).await?;
            for instance in page.reservations.iter().flat_map(|r| &r.instances) {
                tags.insert(instance.instance_id.clone(), instance.tag_map());
            }

            match page.next_token.filter(|t| !t.is_empty()) {
                Some(token) => request.next_token = Some(token),
                None => return Ok(()),
            }
        }
    }

    /// Attach tags and names. Unresolved ids get an empty tag map.
    pub async fn enrich(
        &self,
        mut records: Vec<Recommendation>,
    ) -> Result<Vec<Recommendation>, TagLookupError> {
        let ids: Vec<String> = records
            .iter()
            .filter(|r| !r.instance_id.is_empty())
            .map(|r| r.instance_id.clone())
            .collect();
        if ids.is_empty() {
            return Ok(records);
        }

        let mut tags = self.fetch_tags(&ids).await?;
        for rec in &mut records {
            rec.apply_tags(tags.remove(&rec.instance_id).unwrap_or_default());
        }

        tracing::info!(count = records.len(), "Enriched recommendations with tags");
        Ok(records)
    }
}
