pub mod buckets;
pub mod date_util;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod model;
pub mod source;

pub use buckets::{month_buckets, TimeBucket};
pub use error::{Error, Result};
pub use filter::{DateWindow, FilterSpec, FilteredRecords};
pub use metrics::{aggregate, AggregationResult};
pub use model::{
    CancellationEvent, ChurnReason, Customer, Feature, LifecycleStatus, MetricKind, MetricSample,
    Project, Snapshot, SupportTicket, Tier, UpgradeEvent,
};
pub use source::{JsonFileSource, SnapshotSource, SnapshotWatcher};
