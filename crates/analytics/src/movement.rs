use chrono::{DateTime, Utc};
use core_types::{LifecycleStage, MovementType, RevenueMovement};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Classifies an ARR transition.
///
/// Returns `None` when the ARR did not change. The precedence is fixed:
/// a missing or zero previous ARR is `New` (or `Reactivation` when the stage
/// right before the write was `Churned`), then dropping to zero is `Churn`,
/// then growth is `Expansion`, and everything else is `Contraction`.
pub fn classify_movement(
    previous_arr: Option<Decimal>,
    new_arr: Decimal,
    previous_stage: LifecycleStage,
) -> Option<MovementType> {
    let previous = previous_arr.unwrap_or(Decimal::ZERO);
    if previous == new_arr {
        return None;
    }

    let movement_type = if previous.is_zero() {
        if previous_stage == LifecycleStage::Churned {
            MovementType::Reactivation
        } else {
            MovementType::New
        }
    } else if new_arr.is_zero() && previous > Decimal::ZERO {
        MovementType::Churn
    } else if new_arr > previous {
        MovementType::Expansion
    } else {
        MovementType::Contraction
    };

    Some(movement_type)
}

/// The lifecycle stage a customer lands in after a movement of this type.
pub fn stage_after(movement_type: MovementType, previous_stage: LifecycleStage) -> LifecycleStage {
    match movement_type {
        MovementType::Churn => LifecycleStage::Churned,
        MovementType::Reactivation => LifecycleStage::Active,
        _ => previous_stage,
    }
}

/// Everything needed to turn one observed ARR write into a ledger row.
#[derive(Debug, Clone)]
pub struct ArrTransition {
    pub customer_id: Uuid,
    pub previous_arr: Option<Decimal>,
    pub new_arr: Decimal,
    pub previous_stage: LifecycleStage,
    pub occurred_at: DateTime<Utc>,
    pub recorded_by: String,
    pub reason: Option<String>,
}

impl ArrTransition {
    pub fn classify(&self) -> Option<MovementType> {
        classify_movement(self.previous_arr, self.new_arr, self.previous_stage)
    }

    /// Builds the movement for this transition, or `None` for a no-op write.
    pub fn into_movement(self) -> Option<RevenueMovement> {
        let movement_type = self.classify()?;
        Some(RevenueMovement {
            movement_id: Uuid::new_v4(),
            customer_id: self.customer_id,
            movement_date: self.occurred_at.date_naive(),
            movement_type,
            previous_arr: self.previous_arr.unwrap_or(Decimal::ZERO),
            new_arr: self.new_arr,
            reason: self.reason,
            recorded_by: self.recorded_by,
            created_at: Utc::now(),
        })
    }
}
