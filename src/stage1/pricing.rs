//! On-demand price enrichment
//!
//! Prices are Linux / shared tenancy / no pre-installed software hourly
//! rates for the configured region. Each instance type is looked up at most
//! once per calculator; misses and source errors are cached as `0.0`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::Deserialize;

use crate::model::{PricedRecommendation, Pricing, Recommendation};
use crate::sources::{PriceSource, ProductQuery, TermMatch};

pub const PRICING_SERVICE_CODE: &str = "AmazonEC2";

/// Pricing catalog location name of a region code. Unknown codes are
/// returned unchanged.
pub fn region_long_name(region: &str) -> &str {
    match region {
        "us-east-1" => "US East (N. Virginia)",
        "us-east-2" => "US East (Ohio)",
        "us-west-1" => "US West (N. California)",
        "us-west-2" => "US West (Oregon)",
        "af-south-1" => "Africa (Cape Town)",
        "ap-east-1" => "Asia Pacific (Hong Kong)",
        "ap-south-1" => "Asia Pacific (Mumbai)",
        "ap-south-2" => "Asia Pacific (Hyderabad)",
        "ap-southeast-1" => "Asia Pacific (Singapore)",
        "ap-southeast-2" => "Asia Pacific (Sydney)",
        "ap-southeast-3" => "Asia Pacific (Jakarta)",
        "ap-northeast-1" => "Asia Pacific (Tokyo)",
        "ap-northeast-2" => "Asia Pacific (Seoul)",
        "ap-northeast-3" => "Asia Pacific (Osaka)",
        "ca-central-1" => "Canada (Central)",
        "eu-central-1" => "Europe (Frankfurt)",
        "eu-central-2" => "Europe (Zurich)",
        "eu-west-1" => "Europe (Ireland)",
        "eu-west-2" => "Europe (London)",
        "eu-west-3" => "Europe (Paris)",
        "eu-south-1" => "Europe (Milan)",
        "eu-south-2" => "Europe (Spain)",
        "eu-north-1" => "Europe (Stockholm)",
        "me-south-1" => "Middle East (Bahrain)",
        "me-central-1" => "Middle East (UAE)",
        "sa-east-1" => "South America (Sao Paulo)",
        other => other,
    }
}

// Price-list document, reduced to the on-demand terms.
// Maps are ordered, so "first" means first in key order.
#[derive(Debug, Default, Deserialize)]
struct PriceDocument {
    #[serde(default)]
    terms: PriceTerms,
}

#[derive(Debug, Default, Deserialize)]
struct PriceTerms {
    #[serde(rename = "OnDemand", default)]
    on_demand: BTreeMap<String, OfferTerm>,
}

#[derive(Debug, Default, Deserialize)]
struct OfferTerm {
    #[serde(rename = "priceDimensions", default)]
    price_dimensions: BTreeMap<String, PriceDimension>,
}

#[derive(Debug, Default, Deserialize)]
struct PriceDimension {
    #[serde(rename = "pricePerUnit", default)]
    price_per_unit: BTreeMap<String, String>,
}

/// First positive on-demand USD unit price in a price-list document
pub fn first_on_demand_usd(document: &str) -> Result<Option<f64>, serde_json::Error> {
    let doc: PriceDocument = serde_json::from_str(document)?;
    Ok(doc
        .terms
        .on_demand
        .values()
        .flat_map(|term| term.price_dimensions.values())
        .filter_map(|dim| dim.price_per_unit.get("USD"))
        .filter_map(|usd| usd.trim().parse::<f64>().ok())
        .find(|price| *price > 0.0))
}

/// Cached on-demand price lookups for one region
pub struct PriceCalculator {
    source: Arc<dyn PriceSource>,
    region: String,
    cache: HashMap<String, f64>,
}

impl PriceCalculator {
    pub fn new(source: Arc<dyn PriceSource>, region: impl Into<String>) -> Self {
        Self {
            source,
            region: region.into(),
            cache: HashMap::new(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn query(&self, instance_type: &str) -> ProductQuery {
        ProductQuery {
            service_code: PRICING_SERVICE_CODE.to_string(),
            filters: vec![
                TermMatch::new("instanceType", instance_type),
                TermMatch::new("location", region_long_name(&self.region)),
                TermMatch::new("operatingSystem", "Linux"),
                TermMatch::new("tenancy", "Shared"),
                TermMatch::new("preInstalledSw", "NA"),
                TermMatch::new("capacitystatus", "Used"),
            ],
            max_results: 1,
        }
    }

    /// Hourly on-demand price in USD; `0.0` when unknown. Never fails.
    pub async fn price(&mut self, instance_type: &str) -> f64 {
        if instance_type.is_empty() {
            return 0.0;
        }
        if let Some(price) = self.cache.get(instance_type) {
            return *price;
        }

        let price = match self.source.get_products(&self.query(instance_type)).await {
            Ok(documents) => match documents.first().map(|d| first_on_demand_usd(d)) {
                Some(Ok(Some(price))) => price,
                Some(Err(e)) => {
                    tracing::error!(%instance_type, error = %e, "Unreadable price document");
                    0.0
                }
                _ => {
                    tracing::warn!(
                        %instance_type,
                        region = %self.region,
                        "No On-Demand price found"
                    );
                    0.0
                }
            },
            Err(e) => {
                tracing::error!(%instance_type, error = %e, "Error fetching price");
                0.0
            }
        };

        self.cache.insert(instance_type.to_string(), price);
        price
    }

    /// Price every record. The cache is warmed over the distinct current and
    /// recommended types first.
    pub async fn enrich(&mut self, records: Vec<Recommendation>) -> Vec<PricedRecommendation> {
        let instance_types: BTreeSet<String> = records
            .iter()
            .flat_map(|r| [&r.current_instance_type, &r.recommended_instance_type])
            .filter(|t| !t.is_empty())
            .cloned()
            .collect();

        tracing::info!(
            count = instance_types.len(),
            "Fetching On-Demand prices for unique instance types"
        );
        for instance_type in &instance_types {
            self.price(instance_type).await;
        }

        let mut priced = Vec::with_capacity(records.len());
        for recommendation in records {
            let current = self.price(&recommendation.current_instance_type).await;
            let recommended = self.price(&recommendation.recommended_instance_type).await;
            priced.push(PricedRecommendation {
                pricing: Pricing::from_hourly(current, recommended),
                recommendation,
            });
        }

        tracing::info!(count = priced.len(), "Enriched recommendations with pricing data");
        priced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn price_doc(usd: &str) -> String {
        json!({
            "product": {"attributes": {}},
            "terms": {"OnDemand": {"TERM1": {"priceDimensions": {"DIM1": {
                "unit": "Hrs",
                "pricePerUnit": {"USD": usd}
            }}}}}
        })
        .to_string()
    }

    struct FakePrices {
        prices: HashMap<String, String>,
        queries: Mutex<Vec<ProductQuery>>,
    }

    impl FakePrices {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                prices: pairs
                    .iter()
                    .map(|(t, p)| (t.to_string(), p.to_string()))
                    .collect(),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn lookups(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PriceSource for FakePrices {
        async fn get_products(&self, query: &ProductQuery) -> Result<Vec<String>, SourceError> {
            self.queries.lock().unwrap().push(query.clone());
            let instance_type = &query.filters[0].value;
            if instance_type == "boom.large" {
                return Err(SourceError::Request {
                    message: "throttled".to_string(),
                });
            }
            Ok(self
                .prices
                .get(instance_type)
                .map(|p| vec![price_doc(p)])
                .unwrap_or_default())
        }
    }

    #[test]
    fn test_region_long_name() {
        assert_eq!(region_long_name("us-east-1"), "US East (N. Virginia)");
        assert_eq!(region_long_name("eu-west-1"), "Europe (Ireland)");
        assert_eq!(region_long_name("sa-east-1"), "South America (Sao Paulo)");
        assert_eq!(region_long_name("xx-nowhere-9"), "xx-nowhere-9");
    }

    #[test]
    fn test_first_on_demand_usd_skips_zero() {
        let doc = json!({"terms": {"OnDemand": {
            "A": {"priceDimensions": {"1": {"pricePerUnit": {"USD": "0.0000000000"}}}},
            "B": {"priceDimensions": {"1": {"pricePerUnit": {"USD": "0.1920000000"}}}}
        }}})
        .to_string();
        assert_eq!(first_on_demand_usd(&doc).unwrap(), Some(0.192));
        assert_eq!(first_on_demand_usd("{}").unwrap(), None);
        assert!(first_on_demand_usd("not json").is_err());
    }

    #[tokio::test]
    async fn test_query_filters() {
        let source = Arc::new(FakePrices::new(&[("m5.large", "0.096")]));
        let mut calc = PriceCalculator::new(source.clone(), "eu-west-1");
        assert_eq!(calc.price("m5.large").await, 0.096);

        let queries = source.queries.lock().unwrap();
        let query = &queries[0];
        assert_eq!(query.service_code, "AmazonEC2");
        assert_eq!(query.max_results, 1);
        assert!(query
            .filters
            .contains(&TermMatch::new("location", "Europe (Ireland)")));
        assert!(query
            .filters
            .contains(&TermMatch::new("capacitystatus", "Used")));
        assert_eq!(query.filters.len(), 6);
    }

    #[tokio::test]
    async fn test_unknown_and_failing_types_are_zero_and_cached() {
        let source = Arc::new(FakePrices::new(&[]));
        let mut calc = PriceCalculator::new(source.clone(), "us-east-1");

        assert_eq!(calc.price("x9.huge").await, 0.0);
        assert_eq!(calc.price("x9.huge").await, 0.0);
        assert_eq!(calc.price("boom.large").await, 0.0);
        assert_eq!(calc.price("boom.large").await, 0.0);
        assert_eq!(source.lookups(), 2);

        assert_eq!(calc.price("").await, 0.0);
        assert_eq!(source.lookups(), 2);
    }

    #[tokio::test]
    async fn test_enrich_fetches_each_type_once() {
        let source = Arc::new(FakePrices::new(&[
            ("m5.2xlarge", "0.384"),
            ("m5.xlarge", "0.192"),
        ]));
        let mut calc = PriceCalculator::new(source.clone(), "us-east-1");
        let records = vec![
            Recommendation {
                instance_id: "i-1".into(),
                current_instance_type: "m5.2xlarge".into(),
                recommended_instance_type: "m5.xlarge".into(),
                ..Default::default()
            },
            Recommendation {
                instance_id: "i-2".into(),
                current_instance_type: "m5.2xlarge".into(),
                recommended_instance_type: "m5.xlarge".into(),
                ..Default::default()
            },
        ];

        let priced = calc.enrich(records).await;
        assert_eq!(source.lookups(), 2);
        assert_eq!(priced[0].pricing.current_monthly, 280.32);
        assert_eq!(priced[0].pricing.recommended_monthly, 140.16);
        assert_eq!(priced[1].pricing.monthly_difference, 140.16);
        assert_eq!(priced[1].recommendation.instance_id, "i-2");
    }

    proptest! {
        #[test]
        fn prop_monthly_is_rounded_hourly_times_730(cents in 1u32..1_000_000) {
            let hourly = f64::from(cents) / 10_000.0;
            let source = Arc::new(FakePrices::new(&[("m5.large", &hourly.to_string())]));
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let priced = rt.block_on(async {
                let mut calc = PriceCalculator::new(source, "us-east-1");
                calc.enrich(vec![Recommendation {
                    instance_id: "i-1".into(),
                    current_instance_type: "m5.large".into(),
                    ..Default::default()
                }])
                .await
            });
            let pricing = priced[0].pricing;
            prop_assert_eq!(pricing.current_monthly, crate::model::round_to(hourly * 730.0, 2));
            prop_assert_eq!(pricing.recommended_monthly, 0.0);
            prop_assert_eq!(pricing.monthly_difference, pricing.current_monthly);
        }
    }
}
