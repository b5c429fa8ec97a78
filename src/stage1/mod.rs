//! Stage 1: recommendation report
//!
//! fetch → tag-enrich → EKS filter → price-enrich → CSV/JSON report.

pub mod eks_filter;
pub mod pipeline;
pub mod pricing;
pub mod recommendations;
pub mod report;
pub mod tags;

pub use eks_filter::{filter, is_managed};
pub use pipeline::{Stage1Pipeline, Stage1Report, Stage1Stats};
pub use pricing::{region_long_name, PriceCalculator};
pub use recommendations::ComputeOptimizerAdapter;
pub use report::{RawReportMetadata, ReportRow};
pub use tags::TagEnricher;
