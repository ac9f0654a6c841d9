pub mod types;

pub use types::*;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::buckets::{month_buckets, TimeBucket};
use crate::filter::{FilterSpec, FilteredRecords};
use crate::model::{
    CancellationEvent, ChurnReason, Customer, Feature, LifecycleStatus, MetricKind, MetricSample,
    Project, Snapshot, SupportTicket, Tier, UpgradeEvent,
};

/// Derive every dashboard KPI from one snapshot under one filter.
///
/// Pure and stateless: `reference` stands in for "now" (it only resolves the
/// default window to a concrete year), so the same inputs always produce the
/// same result. Each collection is filtered exactly once; the filtered
/// customer set doubles as the membership basis for samples and
/// cancellations, which carry no project list of their own.
pub fn aggregate(
    snapshot: &Snapshot,
    spec: &FilterSpec,
    reference: DateTime<Utc>,
) -> AggregationResult {
    let buckets = month_buckets(spec, reference);
    let records = FilteredRecords::build(snapshot, spec);

    log::debug!(
        "aggregate: window={} buckets={} customers={} samples={} tickets={} upgrades={} cancellations={}",
        spec.window,
        buckets.len(),
        records.customers.len(),
        records.samples.len(),
        records.tickets.len(),
        records.upgrades.len(),
        records.cancellations.len(),
    );

    let churn_retention = churn_retention(&records.customers, &records.cancellations, &buckets);
    let revenue_lost =
        revenue_lost_trend(&records.customers, &churn_retention.churn_rate, &buckets);

    AggregationResult {
        window: spec.window.to_string(),
        bucket_labels: buckets.iter().map(|b| b.label.clone()).collect(),
        nps: satisfaction_trend(&records.samples, MetricKind::Nps, &buckets),
        csat: satisfaction_trend(&records.samples, MetricKind::Csat, &buckets),
        conversion_rate: conversion_trend(&records.customers, &records.upgrades, &buckets),
        revenue_lost,
        adoption_trend: adoption_trend(&buckets),
        churn_reasons: churn_reasons(&records.cancellations),
        adoption_by_feature: adoption_by_feature(&records.customers),
        issues_by_project: issues_by_project(&records.tickets, &snapshot.projects),
        resolution_status: resolution_status(&records.tickets),
        total_free_customers: count_tier(&records.customers, Tier::Free),
        total_premium_customers: count_tier(&records.customers, Tier::Premium),
        retention_rate: churn_retention.retention_rate,
        churn_rate: churn_retention.churn_rate,
    }
}

/// Per-bucket flat average of all samples of one kind, 0 when a bucket has
/// none. Every sample in a bucket counts once; repeated samples from the
/// same customer are not collapsed.
pub fn satisfaction_trend(
    samples: &[&MetricSample],
    kind: MetricKind,
    buckets: &[TimeBucket],
) -> Vec<f64> {
    buckets
        .iter()
        .map(|bucket| {
            let values: Vec<f64> = samples
                .iter()
                .filter(|s| s.kind == kind)
                .filter(|s| s.sampled_at.is_some_and(|at| bucket.contains(at)))
                .map(|s| s.value)
                .collect();
            mean(&values)
        })
        .collect()
}

/// Per-bucket churn and retention over the cohort of customers created in
/// that bucket. A cancellation counts as churn only when its customer is
/// currently inactive. A bucket with no new customers emits 0 for both
/// series rather than a 100% retention it never earned.
pub fn churn_retention(
    customers: &[&Customer],
    cancellations: &[&CancellationEvent],
    buckets: &[TimeBucket],
) -> ChurnRetention {
    let status_by_id: HashMap<&str, LifecycleStatus> =
        customers.iter().map(|c| (c.id.as_str(), c.status)).collect();

    let mut out = ChurnRetention::default();
    for bucket in buckets {
        let created = customers
            .iter()
            .filter(|c| c.created_at.is_some_and(|at| bucket.contains(at)))
            .count();

        if created == 0 {
            out.churn_rate.push(0.0);
            out.retention_rate.push(0.0);
            continue;
        }

        let churned = cancellations
            .iter()
            .filter(|c| c.cancelled_at.is_some_and(|at| bucket.contains(at)))
            .filter(|c| {
                status_by_id.get(c.customer_id.as_str()) == Some(&LifecycleStatus::Inactive)
            })
            .count();

        let churn = churned as f64 / created as f64 * 100.0;
        out.churn_rate.push(churn);
        out.retention_rate.push(100.0 - churn);
    }
    out
}

/// Per-bucket free-to-premium conversion: upgrades targeting Premium in the
/// bucket (for customers present in the filtered set) over free customers
/// created in the bucket, 0 when no free customers arrived.
pub fn conversion_trend(
    customers: &[&Customer],
    upgrades: &[&UpgradeEvent],
    buckets: &[TimeBucket],
) -> Vec<f64> {
    let known_ids: HashSet<&str> = customers.iter().map(|c| c.id.as_str()).collect();

    buckets
        .iter()
        .map(|bucket| {
            let free_in_bucket = customers
                .iter()
                .filter(|c| c.tier == Tier::Free)
                .filter(|c| c.created_at.is_some_and(|at| bucket.contains(at)))
                .count();

            if free_in_bucket == 0 {
                return 0.0;
            }

            let upgraded = upgrades
                .iter()
                .filter(|u| u.to_tier == Tier::Premium)
                .filter(|u| u.upgraded_at.is_some_and(|at| bucket.contains(at)))
                .filter(|u| known_ids.contains(u.customer_id.as_str()))
                .count();

            upgraded as f64 / free_in_bucket as f64 * 100.0
        })
        .collect()
}

/// Share of filtered customers on each product feature. Every feature in the
/// enum appears, zero-count ones included.
pub fn adoption_by_feature(customers: &[&Customer]) -> Vec<FeatureAdoption> {
    let total = customers.len().max(1) as f64;
    Feature::ALL
        .iter()
        .map(|&feature| {
            let count = customers.iter().filter(|c| c.feature == feature).count() as u64;
            FeatureAdoption {
                feature,
                count,
                rate: count as f64 / total * 100.0,
            }
        })
        .collect()
}

/// Per-bucket adoption trend.
///
/// TODO: define the trend formula once product settles on a cohort basis;
/// until then every bucket reports zero and only the by-feature breakdown
/// carries real data.
pub fn adoption_trend(buckets: &[TimeBucket]) -> Vec<f64> {
    vec![0.0; buckets.len()]
}

/// Tally of filtered cancellations by reason, as a share of the total. All
/// five reasons appear even with a zero count; shares sum to 100 whenever at
/// least one cancellation exists.
pub fn churn_reasons(cancellations: &[&CancellationEvent]) -> Vec<ChurnReasonShare> {
    let total = cancellations.len().max(1) as f64;
    ChurnReason::ALL
        .iter()
        .map(|&reason| {
            let count = cancellations.iter().filter(|c| c.reason == reason).count() as u64;
            ChurnReasonShare {
                reason,
                count,
                pct: count as f64 / total * 100.0,
            }
        })
        .collect()
}

/// Ticket counts grouped by known project; projects with no tickets are
/// left out of the result.
pub fn issues_by_project(
    tickets: &[&SupportTicket],
    projects: &[Project],
) -> Vec<ProjectIssueCount> {
    projects
        .iter()
        .filter_map(|project| {
            let count = tickets
                .iter()
                .filter(|t| t.project_ids.iter().any(|id| *id == project.id))
                .count() as u64;
            (count > 0).then(|| ProjectIssueCount {
                project_id: project.id.clone(),
                project_name: project.name.clone(),
                count,
            })
        })
        .collect()
}

/// Resolved/unresolved split of the filtered tickets.
pub fn resolution_status(tickets: &[&SupportTicket]) -> ResolutionStatus {
    let resolved = tickets.iter().filter(|t| t.resolved_at.is_some()).count() as u64;
    ResolutionStatus {
        resolved,
        unresolved: tickets.len() as u64 - resolved,
    }
}

/// Per-bucket revenue lost to churn: the bucket cohort's mean lifetime value
/// scaled by the already-computed churn rate.
pub fn revenue_lost_trend(
    customers: &[&Customer],
    churn_rate: &[f64],
    buckets: &[TimeBucket],
) -> Vec<f64> {
    buckets
        .iter()
        .zip(churn_rate)
        .map(|(bucket, churn)| {
            let cltvs: Vec<f64> = customers
                .iter()
                .filter(|c| c.created_at.is_some_and(|at| bucket.contains(at)))
                .map(|c| c.cltv)
                .collect();
            (churn / 100.0) * mean(&cltvs)
        })
        .collect()
}

fn count_tier(customers: &[&Customer], tier: Tier) -> u64 {
    customers.iter().filter(|c| c.tier == tier).count() as u64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn reference() -> DateTime<Utc> {
        at(2025, 6, 15)
    }

    fn customer(id: &str, tier: Tier, status: LifecycleStatus, created: DateTime<Utc>) -> Customer {
        Customer {
            id: id.into(),
            tier,
            status,
            created_at: Some(created),
            signed_up_at: None,
            cltv: 0.0,
            feature: Feature::Core,
            project_ids: vec![],
        }
    }

    fn nps(customer_id: &str, value: f64, sampled: DateTime<Utc>) -> MetricSample {
        MetricSample {
            customer_id: customer_id.into(),
            kind: MetricKind::Nps,
            value,
            sampled_at: Some(sampled),
        }
    }

    fn cancellation(customer_id: &str, reason: ChurnReason, when: DateTime<Utc>) -> CancellationEvent {
        CancellationEvent {
            customer_id: customer_id.into(),
            cancelled_at: Some(when),
            reason,
        }
    }

    #[test]
    fn test_empty_input_full_window() {
        let result = aggregate(&Snapshot::default(), &FilterSpec::default(), reference());

        assert_eq!(result.bucket_labels.len(), 12);
        for series in [
            &result.nps,
            &result.csat,
            &result.retention_rate,
            &result.churn_rate,
            &result.conversion_rate,
            &result.revenue_lost,
            &result.adoption_trend,
        ] {
            assert_eq!(series.len(), 12);
            assert!(series.iter().all(|v| *v == 0.0));
        }

        assert_eq!(result.churn_reasons.len(), 5);
        assert!(result.churn_reasons.iter().all(|r| r.pct == 0.0));
        assert!(result.adoption_by_feature.iter().all(|f| f.rate == 0.0));
        assert!(result.issues_by_project.is_empty());
        assert_eq!(result.resolution_status.resolved, 0);
        assert_eq!(result.resolution_status.unresolved, 0);
        assert_eq!(result.total_free_customers, 0);
        assert_eq!(result.total_premium_customers, 0);
    }

    #[test]
    fn test_single_customer_single_nps_sample() {
        let snapshot = Snapshot {
            customers: vec![customer(
                "c1",
                Tier::Free,
                LifecycleStatus::Active,
                at(2025, 3, 10),
            )],
            metric_samples: vec![nps("c1", 80.0, at(2025, 3, 12))],
            ..Default::default()
        };

        let result = aggregate(&snapshot, &FilterSpec::default(), reference());

        // March is index 2 in the Jan-Dec bucket list.
        assert_eq!(result.nps[2], 80.0);
        for (i, v) in result.nps.iter().enumerate() {
            if i != 2 {
                assert_eq!(*v, 0.0);
            }
        }
        assert_eq!(result.total_free_customers, 1);
        assert_eq!(result.total_premium_customers, 0);

        let core = result
            .adoption_by_feature
            .iter()
            .find(|f| f.feature == Feature::Core)
            .unwrap();
        assert_eq!(core.rate, 100.0);
        assert!(result
            .adoption_by_feature
            .iter()
            .filter(|f| f.feature != Feature::Core)
            .all(|f| f.rate == 0.0));
    }

    #[test]
    fn test_flat_average_keeps_duplicate_samples() {
        let snapshot = Snapshot {
            customers: vec![customer(
                "c1",
                Tier::Free,
                LifecycleStatus::Active,
                at(2025, 1, 1),
            )],
            metric_samples: vec![
                nps("c1", 100.0, at(2025, 1, 2)),
                nps("c1", 50.0, at(2025, 1, 20)),
            ],
            ..Default::default()
        };
        let result = aggregate(&snapshot, &FilterSpec::default(), reference());
        assert_eq!(result.nps[0], 75.0);
    }

    #[test]
    fn test_churn_with_reason() {
        let snapshot = Snapshot {
            customers: vec![customer(
                "c1",
                Tier::Free,
                LifecycleStatus::Inactive,
                at(2025, 1, 5),
            )],
            cancellations: vec![cancellation("c1", ChurnReason::Price, at(2025, 1, 20))],
            ..Default::default()
        };

        let result = aggregate(&snapshot, &FilterSpec::default(), reference());

        assert_eq!(result.churn_rate[0], 100.0);
        assert_eq!(result.retention_rate[0], 0.0);

        let price = result
            .churn_reasons
            .iter()
            .find(|r| r.reason == ChurnReason::Price)
            .unwrap();
        assert_eq!(price.pct, 100.0);
        assert!(result
            .churn_reasons
            .iter()
            .filter(|r| r.reason != ChurnReason::Price)
            .all(|r| r.pct == 0.0));
    }

    #[test]
    fn test_cancellation_of_active_customer_is_not_churn() {
        let snapshot = Snapshot {
            customers: vec![customer(
                "c1",
                Tier::Free,
                LifecycleStatus::Active,
                at(2025, 1, 5),
            )],
            cancellations: vec![cancellation("c1", ChurnReason::Service, at(2025, 1, 20))],
            ..Default::default()
        };
        let result = aggregate(&snapshot, &FilterSpec::default(), reference());
        assert_eq!(result.churn_rate[0], 0.0);
        assert_eq!(result.retention_rate[0], 100.0);
    }

    #[test]
    fn test_churn_retention_complement() {
        let snapshot = Snapshot {
            customers: vec![
                customer("c1", Tier::Free, LifecycleStatus::Inactive, at(2025, 2, 1)),
                customer("c2", Tier::Free, LifecycleStatus::Active, at(2025, 2, 10)),
                customer("c3", Tier::Premium, LifecycleStatus::Active, at(2025, 2, 20)),
            ],
            cancellations: vec![cancellation("c1", ChurnReason::Other, at(2025, 2, 25))],
            ..Default::default()
        };
        let result = aggregate(&snapshot, &FilterSpec::default(), reference());

        for (i, (churn, retention)) in result
            .churn_rate
            .iter()
            .zip(&result.retention_rate)
            .enumerate()
        {
            if i == 1 {
                assert_eq!(churn + retention, 100.0);
            } else {
                // Empty cohorts report 0/0, not 0/100.
                assert_eq!(*churn, 0.0);
                assert_eq!(*retention, 0.0);
            }
        }
        assert!((result.churn_rate[1] - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_upgrade_conversion_fifty_percent() {
        let snapshot = Snapshot {
            customers: vec![
                customer("c1", Tier::Free, LifecycleStatus::Active, at(2025, 4, 3)),
                customer("c2", Tier::Free, LifecycleStatus::Active, at(2025, 4, 8)),
            ],
            upgrades: vec![UpgradeEvent {
                customer_id: "c1".into(),
                to_tier: Tier::Premium,
                upgraded_at: Some(at(2025, 4, 15)),
                project_ids: vec![],
            }],
            ..Default::default()
        };
        let result = aggregate(&snapshot, &FilterSpec::default(), reference());
        assert_eq!(result.conversion_rate[3], 50.0);
    }

    #[test]
    fn test_upgrade_for_unknown_customer_ignored() {
        let snapshot = Snapshot {
            customers: vec![customer(
                "c1",
                Tier::Free,
                LifecycleStatus::Active,
                at(2025, 4, 3),
            )],
            upgrades: vec![UpgradeEvent {
                customer_id: "ghost".into(),
                to_tier: Tier::Premium,
                upgraded_at: Some(at(2025, 4, 15)),
                project_ids: vec![],
            }],
            ..Default::default()
        };
        let result = aggregate(&snapshot, &FilterSpec::default(), reference());
        assert_eq!(result.conversion_rate[3], 0.0);
    }

    #[test]
    fn test_revenue_lost_uses_bucket_cohort_cltv() {
        let mut churned = customer("c1", Tier::Premium, LifecycleStatus::Inactive, at(2025, 5, 2));
        churned.cltv = 1200.0;
        let mut kept = customer("c2", Tier::Premium, LifecycleStatus::Active, at(2025, 5, 9));
        kept.cltv = 800.0;

        let snapshot = Snapshot {
            customers: vec![churned, kept],
            cancellations: vec![cancellation("c1", ChurnReason::Price, at(2025, 5, 20))],
            ..Default::default()
        };
        let result = aggregate(&snapshot, &FilterSpec::default(), reference());

        // May: churn 50%, avg cltv 1000 => 500 lost.
        assert_eq!(result.churn_rate[4], 50.0);
        assert_eq!(result.revenue_lost[4], 500.0);
        assert!(result
            .revenue_lost
            .iter()
            .enumerate()
            .all(|(i, v)| i == 4 || *v == 0.0));
    }

    #[test]
    fn test_custom_range_splits_across_two_buckets() {
        let snapshot = Snapshot {
            customers: vec![
                customer("jan", Tier::Free, LifecycleStatus::Active, at(2025, 1, 15)),
                customer("feb", Tier::Free, LifecycleStatus::Active, at(2025, 2, 15)),
                customer("mar", Tier::Free, LifecycleStatus::Active, at(2025, 3, 15)),
            ],
            metric_samples: vec![
                nps("jan", 40.0, at(2025, 1, 16)),
                nps("feb", 60.0, at(2025, 2, 16)),
                nps("mar", 90.0, at(2025, 3, 16)),
            ],
            ..Default::default()
        };

        let spec = FilterSpec::parse("2025-01-10..2025-02-20", &[]).unwrap();
        let result = aggregate(&snapshot, &spec, reference());

        assert_eq!(result.bucket_labels, ["Jan 2025", "Feb 2025"]);
        assert_eq!(result.nps, [40.0, 60.0]);
        // The March record is outside the window everywhere.
        assert_eq!(result.total_free_customers, 2);
    }

    #[test]
    fn test_division_by_zero_safety() {
        let snapshot = Snapshot {
            cancellations: vec![cancellation("ghost", ChurnReason::Price, at(2025, 1, 10))],
            ..Default::default()
        };
        let result = aggregate(&snapshot, &FilterSpec::default(), reference());
        for series in [
            &result.churn_rate,
            &result.retention_rate,
            &result.conversion_rate,
            &result.revenue_lost,
        ] {
            assert!(series.iter().all(|v| v.is_finite() && *v == 0.0));
        }
    }

    #[test]
    fn test_churn_reason_shares_sum_to_hundred() {
        let snapshot = Snapshot {
            customers: vec![
                customer("c1", Tier::Free, LifecycleStatus::Inactive, at(2025, 1, 1)),
                customer("c2", Tier::Free, LifecycleStatus::Inactive, at(2025, 1, 2)),
                customer("c3", Tier::Free, LifecycleStatus::Inactive, at(2025, 1, 3)),
            ],
            cancellations: vec![
                cancellation("c1", ChurnReason::Price, at(2025, 1, 10)),
                cancellation("c2", ChurnReason::Price, at(2025, 1, 11)),
                cancellation("c3", ChurnReason::Service, at(2025, 1, 12)),
            ],
            ..Default::default()
        };
        let result = aggregate(&snapshot, &FilterSpec::default(), reference());

        assert_eq!(result.churn_reasons.len(), 5);
        let total: f64 = result.churn_reasons.iter().map(|r| r.pct).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_issues_by_project_omits_zero_counts() {
        let ticket = |project: &str, resolved: bool| SupportTicket {
            customer_id: "c1".into(),
            project_ids: vec![project.to_string()],
            opened_at: Some(at(2025, 2, 1)),
            resolved_at: resolved.then(|| at(2025, 2, 3)),
            channels: vec!["email".into()],
        };
        let snapshot = Snapshot {
            support_tickets: vec![ticket("p1", true), ticket("p1", false), ticket("p2", false)],
            projects: vec![
                Project {
                    id: "p1".into(),
                    name: "Alpha".into(),
                },
                Project {
                    id: "p2".into(),
                    name: "Beta".into(),
                },
                Project {
                    id: "p3".into(),
                    name: "Gamma".into(),
                },
            ],
            ..Default::default()
        };
        let result = aggregate(&snapshot, &FilterSpec::default(), reference());

        assert_eq!(result.issues_by_project.len(), 2);
        assert_eq!(result.issues_by_project[0].project_name, "Alpha");
        assert_eq!(result.issues_by_project[0].count, 2);
        assert_eq!(result.resolution_status.resolved, 1);
        assert_eq!(result.resolution_status.unresolved, 2);
    }

    #[test]
    fn test_project_filter_monotonic_over_series() {
        let mut in_project = customer("c1", Tier::Free, LifecycleStatus::Active, at(2025, 1, 5));
        in_project.project_ids = vec!["p1".into()];
        let outside = customer("c2", Tier::Free, LifecycleStatus::Active, at(2025, 1, 9));

        let snapshot = Snapshot {
            customers: vec![in_project, outside],
            metric_samples: vec![nps("c1", 90.0, at(2025, 1, 6)), nps("c2", 10.0, at(2025, 1, 10))],
            ..Default::default()
        };

        let wide = aggregate(&snapshot, &FilterSpec::default(), reference());
        let narrow = aggregate(
            &snapshot,
            &FilterSpec::parse("all", &["p1".to_string()]).unwrap(),
            reference(),
        );

        assert!(narrow.total_free_customers <= wide.total_free_customers);
        assert_eq!(narrow.total_free_customers, 1);
        // Only the in-project sample remains, so January averages to 90.
        assert_eq!(narrow.nps[0], 90.0);
        assert_eq!(wide.nps[0], 50.0);
    }

    #[test]
    fn test_adoption_trend_is_all_zero_stub() {
        let snapshot = Snapshot {
            customers: vec![customer(
                "c1",
                Tier::Free,
                LifecycleStatus::Active,
                at(2025, 1, 1),
            )],
            ..Default::default()
        };
        let result = aggregate(&snapshot, &FilterSpec::default(), reference());
        assert_eq!(result.adoption_trend.len(), 12);
        assert!(result.adoption_trend.iter().all(|v| *v == 0.0));
    }
}
