use core_types::{Customer, SegmentStats, SegmentTier};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

/// Point-in-time totals over the live (non-churned) portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioTotals {
    pub total_arr: Decimal,
    pub customer_count: i64,
    pub segment_breakdown: BTreeMap<SegmentTier, SegmentStats>,
}

impl PortfolioTotals {
    /// Aggregates `customers`, skipping any that are churned.
    pub fn from_customers<'a>(customers: impl IntoIterator<Item = &'a Customer>) -> Self {
        let mut total_arr = Decimal::ZERO;
        let mut customer_count = 0i64;
        let mut sums: BTreeMap<SegmentTier, (Decimal, i64)> = BTreeMap::new();

        for customer in customers.into_iter().filter(|c| !c.is_churned()) {
            total_arr += customer.arr;
            customer_count += 1;
            let entry = sums.entry(customer.segment).or_insert((Decimal::ZERO, 0));
            entry.0 += customer.arr;
            entry.1 += 1;
        }

        let segment_breakdown = sums
            .into_iter()
            .map(|(segment, (arr, count))| {
                let avg_arr = (arr / Decimal::from(count)).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
                (segment, SegmentStats { arr, customer_count: count, avg_arr })
            })
            .collect();

        Self { total_arr, customer_count, segment_breakdown }
    }
}
