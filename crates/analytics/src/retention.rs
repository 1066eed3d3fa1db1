use core_types::{MovementType, RevenueMovement};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Movement amounts for one period, split by type.
///
/// Contraction and churn are stored as positive magnitudes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementTotals {
    pub new: Decimal,
    pub reactivation: Decimal,
    pub expansion: Decimal,
    pub contraction: Decimal,
    pub churn: Decimal,
}

impl MovementTotals {
    pub fn from_movements<'a>(movements: impl IntoIterator<Item = &'a RevenueMovement>) -> Self {
        let mut totals = Self::default();
        for movement in movements {
            let change = movement.change_amount();
            match movement.movement_type {
                MovementType::New => totals.new += change,
                MovementType::Reactivation => totals.reactivation += change,
                MovementType::Expansion => totals.expansion += change,
                MovementType::Contraction => totals.contraction += change.abs(),
                MovementType::Churn => totals.churn += change.abs(),
            }
        }
        totals
    }

    /// Reconstructs the ARR base at the start of the period from its closing ARR.
    pub fn back_computed_prior_arr(&self, total_arr: Decimal) -> Decimal {
        total_arr - self.new - self.reactivation - self.expansion + self.contraction + self.churn
    }
}

/// Gross and net revenue retention, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionMetrics {
    pub grr: Decimal,
    pub nrr: Decimal,
}

impl RetentionMetrics {
    /// Computes GRR and NRR against `prior_arr`.
    ///
    /// A non-positive base has nothing to retain, so both ratios are 100.
    pub fn compute(prior_arr: Decimal, totals: &MovementTotals) -> Self {
        if prior_arr <= Decimal::ZERO {
            return Self { grr: dec!(100), nrr: dec!(100) };
        }

        let retained = prior_arr - totals.contraction - totals.churn;
        let grr = retained / prior_arr * dec!(100);
        let nrr = (retained + totals.expansion) / prior_arr * dec!(100);

        Self {
            grr: grr.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            nrr: nrr.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        }
    }
}
