use serde::Serialize;

use crate::model::{ChurnReason, Feature};

/// Per-bucket churn and retention, aligned with the bucket list. The two
/// series are complements (summing to 100) for any bucket that saw at least
/// one new customer; buckets with none emit 0 on both.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChurnRetention {
    pub churn_rate: Vec<f64>,
    pub retention_rate: Vec<f64>,
}

/// One churn reason's share of all filtered cancellations.
#[derive(Debug, Clone, Serialize)]
pub struct ChurnReasonShare {
    pub reason: ChurnReason,
    pub count: u64,
    pub pct: f64,
}

/// Share of filtered customers assigned to one product feature.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureAdoption {
    pub feature: Feature,
    pub count: u64,
    pub rate: f64,
}

/// Ticket count for one project. Projects without tickets are omitted.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectIssueCount {
    pub project_id: String,
    pub project_name: String,
    pub count: u64,
}

/// Two-way split of filtered support tickets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionStatus {
    pub resolved: u64,
    pub unresolved: u64,
}

/// Filtered customer totals by subscription tier.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TierCounts {
    pub free: u64,
    pub premium: u64,
}

/// Everything the dashboard renders, derived in one pass from a snapshot and
/// a filter. All numeric series have the same length as `bucket_labels`.
#[derive(Debug, Clone, Serialize)]
pub struct AggregationResult {
    pub window: String,
    pub bucket_labels: Vec<String>,

    pub nps: Vec<f64>,
    pub csat: Vec<f64>,
    pub retention_rate: Vec<f64>,
    pub churn_rate: Vec<f64>,
    pub conversion_rate: Vec<f64>,
    pub revenue_lost: Vec<f64>,
    pub adoption_trend: Vec<f64>,

    pub churn_reasons: Vec<ChurnReasonShare>,
    pub adoption_by_feature: Vec<FeatureAdoption>,
    pub issues_by_project: Vec<ProjectIssueCount>,

    pub resolution_status: ResolutionStatus,
    pub total_free_customers: u64,
    pub total_premium_customers: u64,
}
