use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tier of a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
}

/// Lifecycle status of a customer. Independent of tier: a customer may be
/// free/active, free/inactive, premium/active, or premium/inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Active,
    Inactive,
}

/// Kind of a satisfaction sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Net promoter score, 0-100.
    Nps,
    /// Customer satisfaction score, 0-100.
    Csat,
    /// Customer health score, unconstrained.
    Chs,
}

/// Product feature a customer is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Core,
    Analytics,
    Automation,
    Integrations,
    Collaboration,
}

impl Feature {
    pub const ALL: &'static [Feature] = &[
        Self::Core,
        Self::Analytics,
        Self::Automation,
        Self::Integrations,
        Self::Collaboration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "Core",
            Self::Analytics => "Analytics",
            Self::Automation => "Automation",
            Self::Integrations => "Integrations",
            Self::Collaboration => "Collaboration",
        }
    }
}

/// Reason recorded at cancellation time. Closed set; producers are
/// responsible for only writing these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChurnReason {
    Price,
    Service,
    Features,
    Other,
    #[default]
    None,
}

impl ChurnReason {
    pub const ALL: &'static [ChurnReason] = &[
        Self::Price,
        Self::Service,
        Self::Features,
        Self::Other,
        Self::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "Price",
            Self::Service => "Service",
            Self::Features => "Features",
            Self::Other => "Other",
            Self::None => "None",
        }
    }
}

/// A customer record. Tier and status are independent axes; `cltv` is the
/// monetary lifetime value attached at record-entry time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub tier: Tier,
    pub status: LifecycleStatus,
    /// Date of record for window filtering. Records lacking it are excluded
    /// from any window narrower than the full default.
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signed_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cltv: f64,
    pub feature: Feature,
    #[serde(default)]
    pub project_ids: Vec<String>,
}

/// One satisfaction sample for a customer. Multiple samples per customer and
/// kind are allowed; trend reducers average the flat population per bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub customer_id: String,
    pub kind: MetricKind,
    pub value: f64,
    pub sampled_at: Option<DateTime<Utc>>,
}

/// A support ticket. `resolved_at = None` means still unresolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportTicket {
    pub customer_id: String,
    #[serde(default)]
    pub project_ids: Vec<String>,
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channels: Vec<String>,
}

/// A plan upgrade. Project ids are copied from the customer at event time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeEvent {
    pub customer_id: String,
    pub to_tier: Tier,
    pub upgraded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub project_ids: Vec<String>,
}

/// A cancellation. Carries no project list; project filtering is transitive
/// through the owning customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationEvent {
    pub customer_id: String,
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: ChurnReason,
}

/// A project, used as a filter dimension and ticket grouping key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// A full point-in-time copy of every collection the engine reads. Produced
/// by a snapshot source; the engine never mutates it and retains nothing
/// between invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub metric_samples: Vec<MetricSample>,
    #[serde(default)]
    pub support_tickets: Vec<SupportTicket>,
    #[serde(default)]
    pub upgrades: Vec<UpgradeEvent>,
    #[serde(default)]
    pub cancellations: Vec<CancellationEvent>,
    #[serde(default)]
    pub projects: Vec<Project>,
}
