//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use ec2_optimizer::error::AdvisorError;
use ec2_optimizer::sources::{
    InstanceDescription, RecommendationPage, SnapshotPriceSource, SnapshotRecommendationSource,
    SnapshotTagSource, Tag,
};
use ec2_optimizer::stage2::advisor::{
    ContentBlock, ConverseOutput, ConverseRequest, ConverseResponse, Message,
};
use ec2_optimizer::stage2::ConverseTransport;
use ec2_optimizer::Stage1Settings;

pub const ACCOUNT_ID: &str = "123456789012";
pub const BUCKET: &str = "cost-reports";
pub const RUN_TIMESTAMP: &str = "2025-01-15_12-00-00";

pub fn run_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
}

pub fn stage1_settings() -> Stage1Settings {
    Stage1Settings {
        report_bucket: BUCKET.to_string(),
        report_prefix: "reports".to_string(),
        region: "us-east-1".to_string(),
        account_ids: Vec::new(),
    }
}

/// Raw Compute Optimizer entry with one recommendation option
pub fn recommendation_entry(
    instance_id: &str,
    current_type: &str,
    recommended_type: &str,
    monthly_savings: f64,
) -> Value {
    json!({
        "instanceArn": format!("arn:aws:ec2:us-east-1:{ACCOUNT_ID}:instance/{instance_id}"),
        "accountId": ACCOUNT_ID,
        "currentInstanceType": current_type,
        "finding": "Overprovisioned",
        "findingReasonCodes": ["CPUOverprovisioned", "MemoryOverprovisioned"],
        "currentPerformanceRisk": "VeryLow",
        "inferredWorkloadTypes": ["Nginx"],
        "recommendationOptions": [{
            "instanceType": recommended_type,
            "performanceRisk": 1.0,
            "migrationEffort": "Low",
            "savingsOpportunity": {
                "savingsOpportunityPercentage": 50.0,
                "estimatedMonthlySavings": {"currency": "USD", "value": monthly_savings}
            },
            "savingsOpportunityAfterDiscounts": {
                "savingsOpportunityPercentage": 45.0,
                "estimatedMonthlySavings": {"currency": "USD", "value": monthly_savings * 0.9}
            }
        }]
    })
}

pub fn recommendation_source(entries: Vec<Value>) -> SnapshotRecommendationSource {
    SnapshotRecommendationSource::from_pages(vec![RecommendationPage {
        instance_recommendations: entries,
        next_token: None,
    }])
}

pub fn instance(instance_id: &str, tags: &[(&str, &str)]) -> InstanceDescription {
    InstanceDescription {
        instance_id: instance_id.to_string(),
        tags: tags
            .iter()
            .map(|(key, value)| Tag {
                key: key.to_string(),
                value: value.to_string(),
            })
            .collect(),
    }
}

pub fn tag_source(instances: Vec<InstanceDescription>) -> SnapshotTagSource {
    SnapshotTagSource::from_instances(instances)
}

/// Linux shared-tenancy on-demand price document for us-east-1
pub fn price_product(instance_type: &str, hourly_usd: &str) -> Value {
    json!({
        "product": {"attributes": {
            "instanceType": instance_type,
            "location": "US East (N. Virginia)",
            "operatingSystem": "Linux",
            "tenancy": "Shared",
            "preInstalledSw": "NA",
            "capacitystatus": "Used"
        }},
        "terms": {"OnDemand": {"TERM.1": {"priceDimensions": {"DIM.1": {
            "unit": "Hrs",
            "pricePerUnit": {"USD": hourly_usd}
        }}}}}
    })
}

pub fn price_source(products: Vec<Value>) -> SnapshotPriceSource {
    SnapshotPriceSource::from_products(products)
}

/// Object-created notification for one key
pub fn s3_event(bucket: &str, key: &str) -> Value {
    json!({"Records": [{
        "eventName": "ObjectCreated:Put",
        "s3": {"bucket": {"name": bucket}, "object": {"key": key}}
    }]})
}

/// Converse transport replaying scripted answers; `None` entries fail
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Option<String>>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Option<&str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(String::from)).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn silent() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConverseTransport for ScriptedTransport {
    async fn converse(
        &self,
        _model_id: &str,
        _request: &ConverseRequest,
    ) -> Result<ConverseResponse, AdvisorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().unwrap().pop_front().flatten() {
            Some(text) => Ok(ConverseResponse {
                output: ConverseOutput {
                    message: Some(Message {
                        role: "assistant".to_string(),
                        content: vec![ContentBlock::text(text)],
                    }),
                },
                ..Default::default()
            }),
            None => Err(AdvisorError::HttpStatus {
                status: 503,
                body: "ServiceUnavailable".to_string(),
            }),
        }
    }
}
