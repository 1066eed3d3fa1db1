use crate::error::AnalyticsError;
use core_types::{BenchmarkSample, Customer, DistributionStats, Metric, Performer};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::cmp::Ordering;
use uuid::Uuid;

/// Percentile of a sorted slice using linear interpolation between the two
/// closest order statistics (`rank = p * (n - 1)`), not nearest-rank.
pub fn quantile(sorted: &[Decimal], p: Decimal) -> Result<Decimal, AnalyticsError> {
    if sorted.is_empty() {
        return Err(AnalyticsError::NotEnoughData("quantile of an empty set".to_string()));
    }
    if p < Decimal::ZERO || p > Decimal::ONE {
        return Err(AnalyticsError::InvalidArgument("p".to_string(), format!("{p} is outside [0, 1]")));
    }

    let rank = p * Decimal::from(sorted.len() - 1);
    let lower = rank.floor();
    let index = lower
        .to_usize()
        .ok_or_else(|| AnalyticsError::InvalidArgument("rank".to_string(), rank.to_string()))?;
    let fraction = rank - lower;

    let low = sorted[index];
    match sorted.get(index + 1) {
        Some(high) if !fraction.is_zero() => Ok(low + (*high - low) * fraction),
        _ => Ok(low),
    }
}

/// Summary statistics of a set of values. An empty set yields zeros.
pub fn summarize(values: &[Decimal]) -> Result<DistributionStats, AnalyticsError> {
    if values.is_empty() {
        return Ok(DistributionStats::empty());
    }

    let mut sorted = values.to_vec();
    sorted.sort();

    let sum: Decimal = sorted.iter().sum();
    let mean = (sum / Decimal::from(sorted.len())).round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);

    Ok(DistributionStats {
        min: sorted[0],
        p25: quantile(&sorted, dec!(0.25))?,
        median: quantile(&sorted, dec!(0.5))?,
        p75: quantile(&sorted, dec!(0.75))?,
        max: sorted[sorted.len() - 1],
        mean,
        sample_size: sorted.len() as i64,
    })
}

/// Everything a benchmark needs from one comparison set.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkComputation {
    pub stats: DistributionStats,
    pub top_performers: Vec<Performer>,
    pub bottom_performers: Vec<Performer>,
    pub distribution: Vec<BenchmarkSample>,
}

/// Computes distribution statistics and performer lists for `metric` over
/// `customers`. Customers without a value for the metric are left out.
///
/// Ties are broken by customer id so repeated runs over the same data produce
/// identical entries.
pub fn compute_benchmark(
    customers: &[Customer],
    metric: Metric,
    performer_count: usize,
) -> Result<BenchmarkComputation, AnalyticsError> {
    let mut ranked: Vec<(&Customer, Decimal)> = customers
        .iter()
        .filter_map(|c| c.metric_value(metric).map(|v| (c, v)))
        .collect();
    ranked.sort_by(|a, b| ascending(a.1, a.0.customer_id, b.1, b.0.customer_id));

    let values: Vec<Decimal> = ranked.iter().map(|(_, v)| *v).collect();
    let stats = summarize(&values)?;

    let distribution = ranked
        .iter()
        .map(|(c, v)| BenchmarkSample { customer_id: c.customer_id, value: *v })
        .collect();

    let bottom_performers = ranked
        .iter()
        .take(performer_count)
        .map(|(c, v)| performer(c, *v))
        .collect();

    let mut descending = ranked.clone();
    descending.sort_by(|a, b| match b.1.cmp(&a.1) {
        Ordering::Equal => a.0.customer_id.cmp(&b.0.customer_id),
        other => other,
    });
    let top_performers = descending
        .iter()
        .take(performer_count)
        .map(|(c, v)| performer(c, *v))
        .collect();

    Ok(BenchmarkComputation { stats, top_performers, bottom_performers, distribution })
}

fn ascending(a_value: Decimal, a_id: Uuid, b_value: Decimal, b_id: Uuid) -> Ordering {
    a_value.cmp(&b_value).then_with(|| a_id.cmp(&b_id))
}

fn performer(customer: &Customer, value: Decimal) -> Performer {
    Performer {
        customer_id: customer.customer_id,
        name: customer.name.clone(),
        value,
        segment: customer.segment,
    }
}

/// Rank of a value among the peers of one customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PercentileRank {
    pub percentile: i32,
    /// Peers compared against. The customer itself is never counted.
    pub sample_size: i64,
}

/// Percentage of peers whose value is strictly below `value`, rounded half up.
///
/// With no peers the rank is 50 by convention.
pub fn percentile_rank(distribution: &[BenchmarkSample], customer_id: Uuid, value: Decimal) -> PercentileRank {
    let peers = distribution.iter().filter(|s| s.customer_id != customer_id);
    let (below, sample_size) = peers.fold((0i64, 0i64), |(below, total), s| {
        (below + i64::from(s.value < value), total + 1)
    });

    if sample_size == 0 {
        return PercentileRank { percentile: 50, sample_size: 0 };
    }

    let percentile = (below * 100 + sample_size / 2) / sample_size;
    PercentileRank { percentile: percentile as i32, sample_size }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{LifecycleStage, SegmentTier};
    use proptest::prelude::*;

    fn values(raw: &[i64]) -> Vec<Decimal> {
        raw.iter().map(|v| Decimal::from(*v)).collect()
    }

    fn samples(raw: &[i64]) -> Vec<BenchmarkSample> {
        raw.iter()
            .map(|v| BenchmarkSample { customer_id: Uuid::new_v4(), value: Decimal::from(*v) })
            .collect()
    }

    fn scored(id: u128, name: &str, health: i64) -> Customer {
        let mut customer = Customer::new(Uuid::from_u128(id), name, dec!(30000), LifecycleStage::Active);
        customer.health_score = Some(Decimal::from(health));
        customer
    }

    #[test]
    fn quartiles_of_reference_set() {
        let stats = summarize(&values(&[50, 10, 40, 20, 30])).unwrap();
        assert_eq!(stats.min, dec!(10));
        assert_eq!(stats.p25, dec!(20));
        assert_eq!(stats.median, dec!(30));
        assert_eq!(stats.p75, dec!(40));
        assert_eq!(stats.max, dec!(50));
        assert_eq!(stats.mean, dec!(30));
        assert_eq!(stats.sample_size, 5);
    }

    #[test]
    fn interpolates_between_order_statistics() {
        let sorted = values(&[10, 20, 30, 40]);
        // rank 0.75 -> 10 + 0.75 * 10
        assert_eq!(quantile(&sorted, dec!(0.25)).unwrap(), dec!(17.5));
        assert_eq!(quantile(&sorted, dec!(0.5)).unwrap(), dec!(25));
        assert_eq!(quantile(&sorted, dec!(1)).unwrap(), dec!(40));
    }

    #[test]
    fn empty_set_is_all_zero() {
        assert_eq!(summarize(&[]).unwrap(), DistributionStats::empty());
        assert!(quantile(&[], dec!(0.5)).is_err());
    }

    #[test]
    fn rank_counts_strictly_lower_peers() {
        let set = samples(&[10, 20, 30, 40, 50]);
        let outsider = Uuid::new_v4();
        assert_eq!(percentile_rank(&set, outsider, dec!(25)), PercentileRank { percentile: 40, sample_size: 5 });
        assert_eq!(percentile_rank(&set, outsider, dec!(10)).percentile, 0);
        assert_eq!(percentile_rank(&set, outsider, dec!(60)).percentile, 100);
    }

    #[test]
    fn rank_excludes_the_customer_itself() {
        let set = samples(&[10, 20, 30]);
        let me = set[2].customer_id;
        assert_eq!(percentile_rank(&set, me, dec!(30)), PercentileRank { percentile: 100, sample_size: 2 });
    }

    #[test]
    fn lone_customer_ranks_at_fifty() {
        let set = samples(&[42]);
        let me = set[0].customer_id;
        assert_eq!(percentile_rank(&set, me, dec!(42)), PercentileRank { percentile: 50, sample_size: 0 });
    }

    #[test]
    fn performers_break_ties_by_customer_id() {
        let customers = vec![
            scored(3, "c", 80),
            scored(1, "a", 80),
            scored(2, "b", 60),
            scored(4, "d", 90),
        ];
        let result = compute_benchmark(&customers, Metric::HealthScore, 2).unwrap();
        let top: Vec<&str> = result.top_performers.iter().map(|p| p.name.as_str()).collect();
        let bottom: Vec<&str> = result.bottom_performers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(top, vec!["d", "a"]);
        assert_eq!(bottom, vec!["b", "a"]);
        assert_eq!(result.top_performers[0].segment, SegmentTier::MidMarket);
    }

    #[test]
    fn customers_without_a_value_are_skipped() {
        let mut unscored = scored(9, "z", 0);
        unscored.health_score = None;
        let customers = vec![scored(1, "a", 70), unscored];
        let result = compute_benchmark(&customers, Metric::HealthScore, 5).unwrap();
        assert_eq!(result.stats.sample_size, 1);
        assert_eq!(result.distribution.len(), 1);
    }

    proptest! {
        #[test]
        fn quartiles_are_monotonic(raw in prop::collection::vec(-1_000_000i64..1_000_000, 1..200)) {
            let stats = summarize(&values(&raw)).unwrap();
            prop_assert!(stats.min <= stats.p25);
            prop_assert!(stats.p25 <= stats.median);
            prop_assert!(stats.median <= stats.p75);
            prop_assert!(stats.p75 <= stats.max);
        }

        #[test]
        fn rank_stays_within_bounds(raw in prop::collection::vec(0i64..1000, 0..100), probe in 0i64..1000) {
            let rank = percentile_rank(&samples(&raw), Uuid::new_v4(), Decimal::from(probe));
            prop_assert!((0..=100).contains(&rank.percentile));
            prop_assert_eq!(rank.sample_size, raw.len() as i64);
        }
    }
}
