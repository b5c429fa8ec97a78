//! EC2 right-sizing report pipeline
//!
//! Two stages turn Compute Optimizer recommendations into cost reports:
//!
//! ```text
//!                      ┌──────────────────────────── Stage 1 ─────────────────────────────┐
//!  scheduled event ──► │ fetch ──► tag-enrich ──► EKS filter ──► price-enrich ──► report  │
//!                      └──────────────────────────────────────────────────────────┬───────┘
//!                                              {prefix}/{ts}/ec2_optimization_report.{csv,json}
//!                                                                                 │
//!                                                               object-created notification
//!                                                                                 ▼
//!                      ┌──────────────────────────── Stage 2 ─────────────────────────────┐
//!                      │ read report ──► allow-list check ──┬─► Approved                  │
//!                      │                                    └─► AI advisor ─┬─► Alternative│
//!                      │                                                   └─► Failed     │
//!                      └──────────────────────────────────────────────────────────┬───────┘
//!                                    {prefix}/{ts}/validated/ec2_validated_report.{csv,json}
//! ```
//!
//! External services sit behind the traits in [`sources`] and
//! [`stage2::advisor::ConverseTransport`]; the `stage1-report` and
//! `stage2-validate` binaries wire them to snapshot files, a filesystem
//! store and the Bedrock HTTP endpoint.

pub mod config;
pub mod error;
pub mod model;
pub mod report;
pub mod sources;
pub mod stage1;
pub mod stage2;
pub mod telemetry;

pub use config::{Stage1Settings, Stage2Settings};
pub use error::{PipelineError, ReportError};
pub use model::{PricedRecommendation, Pricing, Recommendation};
pub use report::InvocationSummary;
pub use stage1::Stage1Pipeline;
pub use stage2::Stage2Pipeline;
