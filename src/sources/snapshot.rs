//! Snapshot-file adapters
//!
//! Replay JSON captured with the AWS CLI through the collaborator traits:
//!
//! ```text
//! <dir>/recommendations.json   aws compute-optimizer get-ec2-instance-recommendations
//! <dir>/instances.json         aws ec2 describe-instances            (optional)
//! <dir>/pricing.json           aws pricing get-products              (optional)
//! ```
//!
//! `recommendations.json` may hold a single response or an array of
//! responses. Each array element is served as one page, split into
//! `max_results`-sized slices when it is larger (the CLI merges every page
//! of a large fleet into one response).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{
    DescribeInstancesPage, DescribeInstancesRequest, InstanceDescription, PriceSource,
    ProductQuery, RecommendationPage, RecommendationPageRequest, RecommendationSource,
    Reservation, TagSource,
};
use crate::error::{SourceError, TagLookupError};

const PAGE_TOKEN_PREFIX: &str = "page-";

async fn read_snapshot(path: &Path) -> Result<Option<String>, SourceError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SourceError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ============================================================================
// Recommendations
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RecommendationSnapshot {
    Pages(Vec<RecommendationPage>),
    Single(RecommendationPage),
}

/// Serves captured recommendation pages with synthetic `page-N` tokens
#[derive(Debug, Clone, Default)]
pub struct SnapshotRecommendationSource {
    pages: Vec<RecommendationPage>,
}

impl SnapshotRecommendationSource {
    pub fn from_pages(pages: Vec<RecommendationPage>) -> Self {
        Self { pages }
    }

    pub fn from_json(text: &str) -> Result<Self, SourceError> {
        let pages = match serde_json::from_str::<RecommendationSnapshot>(text)? {
            RecommendationSnapshot::Pages(pages) => pages,
            RecommendationSnapshot::Single(page) => vec![page],
        };
        Ok(Self::from_pages(pages))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page index and entry offset of a `page-N` or `page-N-OFFSET` token
    fn position(token: Option<&str>) -> Result<(usize, usize), SourceError> {
        let Some(token) = token else {
            return Ok((0, 0));
        };
        let unknown = || SourceError::UnknownPageToken {
            token: token.to_string(),
        };
        let rest = token.strip_prefix(PAGE_TOKEN_PREFIX).ok_or_else(unknown)?;
        let (index, offset) = match rest.split_once('-') {
            Some((index, offset)) => (index.parse(), offset.parse()),
            None => (rest.parse(), Ok(0)),
        };
        match (index, offset) {
            (Ok(index), Ok(offset)) => Ok((index, offset)),
            _ => Err(unknown()),
        }
    }
}

fn page_token(index: usize, offset: usize) -> String {
    if offset == 0 {
        format!("{PAGE_TOKEN_PREFIX}{index}")
    } else {
        format!("{PAGE_TOKEN_PREFIX}{index}-{offset}")
    }
}

fn matches_accounts(entry: &Value, account_ids: &[String]) -> bool {
    if account_ids.is_empty() {
        return true;
    }
    entry
        .get("accountId")
        .and_then(Value::as_str)
        .is_some_and(|id| account_ids.iter().any(|a| a == id))
}

#[async_trait]
impl RecommendationSource for SnapshotRecommendationSource {
    async fn fetch_page(
        &self,
        request: &RecommendationPageRequest,
    ) -> Result<RecommendationPage, SourceError> {
        let (index, offset) = Self::position(request.next_token.as_deref())?;
        let Some(page) = self.pages.get(index) else {
            if index == 0 && offset == 0 {
                return Ok(RecommendationPage::default());
            }
            return Err(SourceError::UnknownPageToken {
                token: page_token(index, offset),
            });
        };

        let matching: Vec<&Value> = page
            .instance_recommendations
            .iter()
            .filter(|e| matches_accounts(e, &request.account_ids))
            .collect();
        if offset > matching.len() {
            return Err(SourceError::UnknownPageToken {
                token: page_token(index, offset),
            });
        }

        let end = match request.max_results as usize {
            0 => matching.len(),
            limit => (offset + limit).min(matching.len()),
        };
        let entries: Vec<Value> = matching[offset..end].iter().map(|e| (*e).clone()).collect();

        let next_token = if end < matching.len() {
            Some(page_token(index, end))
        } else {
            (index + 1 < self.pages.len()).then(|| page_token(index + 1, 0))
        };

        Ok(RecommendationPage {
            instance_recommendations: entries,
            next_token,
        })
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Serves captured DescribeInstances output, paged by offset tokens
#[derive(Debug, Clone, Default)]
pub struct SnapshotTagSource {
    instances: BTreeMap<String, InstanceDescription>,
}

impl SnapshotTagSource {
    pub fn from_instances(instances: impl IntoIterator<Item = InstanceDescription>) -> Self {
        Self {
            instances: instances
                .into_iter()
                .map(|i| (i.instance_id.clone(), i))
                .collect(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, SourceError> {
        let page: DescribeInstancesPage = serde_json::from_str(text)?;
        Ok(Self::from_instances(
            page.reservations.into_iter().flat_map(|r| r.instances),
        ))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[async_trait]
impl TagSource for SnapshotTagSource {
    async fn describe_instances(
        &self,
        request: &DescribeInstancesRequest,
    ) -> Result<DescribeInstancesPage, TagLookupError> {
        let missing: Vec<String> = request
            .instance_ids
            .iter()
            .filter(|id| !self.instances.contains_key(id.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(TagLookupError::NotFound {
                message: format!("The instance IDs '{}' do not exist", missing.join(", ")),
                missing,
            });
        }

        let offset = match request.next_token.as_deref() {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| TagLookupError::Request {
                message: format!("Invalid NextToken '{token}'"),
            })?,
        };
        let page_size = if request.max_results == 0 {
            request.instance_ids.len()
        } else {
            request.max_results
        };
        let end = (offset + page_size).min(request.instance_ids.len());

        let instances = request
            .instance_ids
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.instances.get(id).cloned())
            .collect();

        Ok(DescribeInstancesPage {
            reservations: vec![Reservation { instances }],
            next_token: (end < request.instance_ids.len()).then(|| end.to_string()),
        })
    }
}

// ============================================================================
// Pricing
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PriceListSnapshot {
    #[serde(default)]
    price_list: Vec<Value>,
}

/// Serves captured price-list documents, matched on `product.attributes`
#[derive(Debug, Clone, Default)]
pub struct SnapshotPriceSource {
    products: Vec<Value>,
}

impl SnapshotPriceSource {
    pub fn from_products(products: Vec<Value>) -> Self {
        Self { products }
    }

    /// Accepts `{"PriceList": [...]}` where entries are documents or the
    /// JSON-encoded strings the Pricing API returns
    pub fn from_json(text: &str) -> Result<Self, SourceError> {
        let snapshot: PriceListSnapshot = serde_json::from_str(text)?;
        let products = snapshot
            .price_list
            .into_iter()
            .map(|entry| match entry {
                Value::String(s) => serde_json::from_str(&s),
                other => Ok(other),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_products(products))
    }

    fn matches(product: &Value, query: &ProductQuery) -> bool {
        let attributes = &product["product"]["attributes"];
        query
            .filters
            .iter()
            .all(|f| attributes.get(&f.field).and_then(Value::as_str) == Some(f.value.as_str()))
    }
}

#[async_trait]
impl PriceSource for SnapshotPriceSource {
    async fn get_products(&self, query: &ProductQuery) -> Result<Vec<String>, SourceError> {
        let limit = if query.max_results == 0 {
            usize::MAX
        } else {
            query.max_results
        };
        self.products
            .iter()
            .filter(|p| Self::matches(p, query))
            .take(limit)
            .map(|p| serde_json::to_string(p).map_err(SourceError::from))
            .collect()
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// The three snapshot sources of one capture directory
#[derive(Clone)]
pub struct SnapshotSources {
    pub dir: PathBuf,
    pub recommendations: Arc<SnapshotRecommendationSource>,
    pub tags: Arc<SnapshotTagSource>,
    pub prices: Arc<SnapshotPriceSource>,
}

impl SnapshotSources {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let dir = dir.as_ref().to_path_buf();

        let rec_path = dir.join("recommendations.json");
        let recommendations = match read_snapshot(&rec_path).await? {
            Some(text) => SnapshotRecommendationSource::from_json(&text)?,
            None => {
                return Err(SourceError::Io {
                    path: rec_path,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            }
        };

        let tags = match read_snapshot(&dir.join("instances.json")).await? {
            Some(text) => SnapshotTagSource::from_json(&text)?,
            None => SnapshotTagSource::default(),
        };

        let prices = match read_snapshot(&dir.join("pricing.json")).await? {
            Some(text) => SnapshotPriceSource::from_json(&text)?,
            None => SnapshotPriceSource::default(),
        };

        tracing::info!(
            dir = %dir.display(),
            pages = recommendations.page_count(),
            instances = tags.len(),
            "Opened snapshot sources"
        );

        Ok(Self {
            dir,
            recommendations: Arc::new(recommendations),
            tags: Arc::new(tags),
            prices: Arc::new(prices),
        })
    }
}
