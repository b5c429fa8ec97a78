//! Stage 1 end to end over snapshot sources and an in-memory store

mod helpers;

use std::sync::Arc;

use serde_json::{json, Value};

use ec2_optimizer::sources::MemoryBlobStore;
use ec2_optimizer::stage1::Stage1Stats;
use ec2_optimizer::Stage1Pipeline;
use helpers::*;

const CSV_KEY: &str = "reports/2025-01-15_12-00-00/ec2_optimization_report.csv";
const JSON_KEY: &str = "reports/2025-01-15_12-00-00/ec2_optimization_report.json";

fn pipeline(entries: Vec<Value>, store: Arc<MemoryBlobStore>) -> Stage1Pipeline {
    pipeline_with_terminated(entries, store, &[])
}

/// Ids in `terminated` have recommendations but are unknown to the tag lookup
fn pipeline_with_terminated(
    entries: Vec<Value>,
    store: Arc<MemoryBlobStore>,
    terminated: &[&str],
) -> Stage1Pipeline {
    let ids: Vec<String> = entries
        .iter()
        .filter_map(|e| e["instanceArn"].as_str())
        .filter_map(|arn| arn.rsplit('/').next())
        .map(String::from)
        .collect();

    let mut instances = Vec::new();
    for id in ids.iter().filter(|id| !terminated.contains(&id.as_str())) {
        if id.starts_with("i-eks") {
            instances.push(instance(id, &[("eks:cluster-name", "prod")]));
        } else {
            instances.push(instance(id, &[("Name", "web-01")]));
        }
    }

    Stage1Pipeline::new(
        Arc::new(recommendation_source(entries)),
        Arc::new(tag_source(instances)),
        Arc::new(price_source(vec![
            price_product("m5.2xlarge", "0.3840000000"),
            price_product("m5.xlarge", "0.1920000000"),
        ])),
        store,
    )
}

#[tokio::test]
async fn test_report_excludes_eks_and_prices_rows() {
    let store = Arc::new(MemoryBlobStore::new());
    let pipeline = pipeline(
        vec![
            recommendation_entry("i-0aaa", "m5.2xlarge", "m5.xlarge", 140.16),
            recommendation_entry("i-eks1", "m5.2xlarge", "m5.xlarge", 140.16),
        ],
        store.clone(),
    );

    let summary = pipeline
        .run_at(&stage1_settings(), &json!({"source": "aws.events"}), run_time())
        .await
        .unwrap();

    assert_eq!(summary.status_code, 200);
    assert_eq!(summary.body, "Report generated successfully");
    let Some(Stage1Stats::Reported(stats)) = &summary.stats else {
        panic!("expected a report, got {:?}", summary.stats);
    };
    assert_eq!(stats.total_instances_analyzed, 2);
    assert_eq!(stats.eks_excluded, 1);
    assert_eq!(stats.non_eks_included, 1);
    assert_eq!(stats.total_estimated_monthly_savings_on_demand_usd, 140.16);
    assert_eq!(stats.s3_json, format!("s3://{BUCKET}/{JSON_KEY}"));

    assert_eq!(store.keys(BUCKET), vec![CSV_KEY.to_string(), JSON_KEY.to_string()]);

    let json_object = store.object(BUCKET, JSON_KEY).unwrap();
    assert_eq!(json_object.content_type, "application/json");
    let report: Value = serde_json::from_slice(&json_object.body).unwrap();
    assert_eq!(report["report_metadata"]["report_type"], "raw");
    assert_eq!(report["report_metadata"]["total_instances"], 1);
    assert_eq!(report["report_metadata"]["finding_summary"]["Overprovisioned"], 1);

    let row = &report["recommendations"][0];
    assert_eq!(row["Instance ID"], "i-0aaa");
    assert_eq!(row["Instance Name"], "web-01");
    assert_eq!(row["Current Monthly On-Demand Price (USD)"], 280.32);
    assert_eq!(row["Recommended Monthly On-Demand Price (USD)"], 140.16);
    assert_eq!(row["Monthly Price Difference (USD)"], 140.16);
    assert_eq!(row["CPU Finding Reasons"], json!(["CPUOverprovisioned"]));

    let csv_object = store.object(BUCKET, CSV_KEY).unwrap();
    assert_eq!(csv_object.content_type, "text/csv");
    let csv = String::from_utf8(csv_object.body).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("i-0aaa"));
    assert!(!csv.contains("i-eks1"));
}

#[tokio::test]
async fn test_terminated_instance_does_not_hide_eks_tags() {
    let store = Arc::new(MemoryBlobStore::new());
    let pipeline = pipeline_with_terminated(
        vec![
            recommendation_entry("i-eks1", "m5.2xlarge", "m5.xlarge", 140.16),
            recommendation_entry("i-gone", "m5.2xlarge", "m5.xlarge", 140.16),
            recommendation_entry("i-0web", "m5.2xlarge", "m5.xlarge", 140.16),
        ],
        store.clone(),
        &["i-gone"],
    );

    let summary = pipeline
        .run_at(&stage1_settings(), &json!({}), run_time())
        .await
        .unwrap();

    let Some(Stage1Stats::Reported(stats)) = &summary.stats else {
        panic!("expected a report, got {:?}", summary.stats);
    };
    assert_eq!(stats.total_instances_analyzed, 3);
    assert_eq!(stats.eks_excluded, 1);
    assert_eq!(stats.non_eks_included, 2);

    let json_object = store.object(BUCKET, JSON_KEY).unwrap();
    let report: Value = serde_json::from_slice(&json_object.body).unwrap();
    let rows = report["recommendations"].as_array().unwrap();
    let name_of = |id: &str| {
        rows.iter()
            .find(|r| r["Instance ID"] == id)
            .map(|r| r["Instance Name"].clone())
            .unwrap()
    };
    assert_eq!(name_of("i-0web"), "web-01");
    assert_eq!(name_of("i-gone"), "");
}

#[tokio::test]
async fn test_empty_batch_writes_nothing() {
    let store = Arc::new(MemoryBlobStore::new());
    let summary = pipeline(Vec::new(), store.clone())
        .run_at(&stage1_settings(), &json!({}), run_time())
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&summary).unwrap(),
        json!({"statusCode": 200, "body": "No recommendations found", "total_instances": 0})
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_all_cluster_nodes_writes_nothing() {
    let store = Arc::new(MemoryBlobStore::new());
    let summary = pipeline(
        vec![
            recommendation_entry("i-eks1", "m5.2xlarge", "m5.xlarge", 10.0),
            recommendation_entry("i-eks2", "m5.2xlarge", "m5.xlarge", 10.0),
        ],
        store.clone(),
    )
    .run_at(&stage1_settings(), &json!({}), run_time())
    .await
    .unwrap();

    assert_eq!(
        summary.stats,
        Some(Stage1Stats::AllManaged {
            total_instances: 2,
            eks_excluded: 2,
            non_eks_included: 0,
        })
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unknown_types_price_at_zero() {
    let store = Arc::new(MemoryBlobStore::new());
    let summary = pipeline(
        vec![recommendation_entry("i-0bbb", "x9.mega", "x9.large", 5.0)],
        store.clone(),
    )
    .run_at(&stage1_settings(), &json!({}), run_time())
    .await
    .unwrap();
    assert!(summary.is_success());

    let report: Value =
        serde_json::from_slice(&store.object(BUCKET, JSON_KEY).unwrap().body).unwrap();
    let row = &report["recommendations"][0];
    assert_eq!(row["Current Hourly Price (USD)"], 0.0);
    assert_eq!(row["Recommended Monthly On-Demand Price (USD)"], 0.0);
}

#[tokio::test]
async fn test_malformed_entries_are_dropped() {
    let store = Arc::new(MemoryBlobStore::new());
    let summary = pipeline(
        vec![
            recommendation_entry("i-0aaa", "m5.2xlarge", "m5.xlarge", 140.16),
            json!({"accountId": ACCOUNT_ID, "finding": "Overprovisioned"}),
        ],
        store.clone(),
    )
    .run_at(&stage1_settings(), &json!({}), run_time())
    .await
    .unwrap();

    let Some(Stage1Stats::Reported(stats)) = summary.stats else {
        panic!("expected a report");
    };
    assert_eq!(stats.total_instances_analyzed, 1);
}
