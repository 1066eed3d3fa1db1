//! # Pulse Ledger
//!
//! The Movement Recorder. Every ARR-changing write ends up here as exactly one
//! classified, immutable `RevenueMovement`; no-op writes leave no trace.
//!
//! Two entry points feed it:
//! - `write_arr`: the in-process hook. The customer update, stage transition
//!   and ledger append commit as one unit inside the store.
//! - `record_if_changed`: for `ArrChangeEvent`s pushed by the CRM after it has
//!   already committed the write itself. The event is applied to the mirrored
//!   customer through the same atomic write, guarded by the event's prior ARR.

use chrono::{DateTime, NaiveDate, Utc};
use core_types::period::{next_period_start, period_start};
use core_types::{ArrChangeEvent, Customer, RevenueMovement};
use database::{ArrWrite, CustomerStore, LedgerStore, PriorState};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub mod error;

pub use error::LedgerError;

/// Recorder identity stamped on movements drafted from CRM events.
pub const CRM_RECORDER: &str = "crm-sync";

/// The result of one ARR write through the hook.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub customer: Customer,
    pub movement: Option<RevenueMovement>,
}

pub struct MovementRecorder {
    customers: Arc<dyn CustomerStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl MovementRecorder {
    pub fn new(customers: Arc<dyn CustomerStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { customers, ledger }
    }

    /// Writes a customer's ARR and records the implied movement atomically.
    ///
    /// Fails with `InvalidInput` for negative ARR or ARR finer than a cent,
    /// and `NotFound` for an unknown customer; in each case nothing is written.
    pub async fn write_arr(
        &self,
        customer_id: Uuid,
        new_arr: Decimal,
        occurred_at: DateTime<Utc>,
        recorded_by: &str,
        reason: Option<String>,
    ) -> Result<RecordedWrite, LedgerError> {
        validate_arr(new_arr)?;

        let outcome = self
            .customers
            .write_arr(ArrWrite {
                customer_id,
                new_arr,
                occurred_at,
                recorded_by: recorded_by.to_string(),
                reason,
                expected: None,
            })
            .await?;

        match &outcome.movement {
            Some(movement) => tracing::info!(
                customer_id = %customer_id,
                movement_type = %movement.movement_type,
                change = %movement.change_amount(),
                "Recorded revenue movement."
            ),
            None => tracing::debug!(customer_id = %customer_id, "ARR unchanged; no movement recorded."),
        }

        Ok(RecordedWrite { customer: outcome.customer, movement: outcome.movement })
    }

    /// Applies an ARR change the CRM has already committed: the mirrored
    /// customer takes the new ARR, segment and stage, and the implied movement
    /// is appended in the same unit.
    ///
    /// Returns `None` when the ARR did not change. Fails with `Conflict` when
    /// the mirror no longer holds `previous_arr`, so a replayed or out-of-order
    /// event cannot record the same change twice.
    pub async fn record_if_changed(
        &self,
        event: ArrChangeEvent,
        recorded_by: &str,
    ) -> Result<Option<RevenueMovement>, LedgerError> {
        let previous_arr = event.previous_arr.unwrap_or(Decimal::ZERO);
        validate_arr(event.new_arr)?;
        validate_arr(previous_arr)?;

        if previous_arr == event.new_arr {
            tracing::debug!(customer_id = %event.customer_id, "ARR event without a change ignored.");
            if self.customers.get_customer(event.customer_id).await?.is_none() {
                return Err(LedgerError::NotFound(format!("customer {}", event.customer_id)));
            }
            return Ok(None);
        }

        let outcome = self
            .customers
            .write_arr(ArrWrite {
                customer_id: event.customer_id,
                new_arr: event.new_arr,
                occurred_at: event.occurred_at,
                recorded_by: recorded_by.to_string(),
                reason: event.reason,
                expected: Some(PriorState { arr: previous_arr, stage: event.previous_stage }),
            })
            .await?;

        if let Some(movement) = &outcome.movement {
            tracing::info!(
                customer_id = %movement.customer_id,
                movement_type = %movement.movement_type,
                change = %movement.change_amount(),
                "Recorded revenue movement from CRM event."
            );
        }
        Ok(outcome.movement)
    }

    /// Every movement for one customer, oldest first.
    pub async fn movements_for_customer(&self, customer_id: Uuid) -> Result<Vec<RevenueMovement>, LedgerError> {
        Ok(self.ledger.movements_for_customer(customer_id).await?)
    }

    /// Movements dated within the month containing `period`.
    pub async fn movements_in_period(&self, period: NaiveDate) -> Result<Vec<RevenueMovement>, LedgerError> {
        let start = period_start(period);
        let end = next_period_start(start).map_err(|e| LedgerError::InvalidInput(e.to_string()))?;
        Ok(self.ledger.movements_between(start, end).await?)
    }
}

/// ARR is stored to the cent.
const ARR_SCALE: u32 = 2;

fn validate_arr(arr: Decimal) -> Result<(), LedgerError> {
    if arr < Decimal::ZERO {
        return Err(LedgerError::InvalidInput(format!("ARR must not be negative, got {arr}")));
    }
    if arr.normalize().scale() > ARR_SCALE {
        return Err(LedgerError::InvalidInput(format!(
            "ARR must have at most {ARR_SCALE} decimal places, got {arr}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{LifecycleStage, MovementSource, MovementType, SegmentTier};
    use database::InMemoryStore;
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0).unwrap()
    }

    async fn recorder_with(customer: Customer) -> (MovementRecorder, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.insert_customer(customer).await;
        (MovementRecorder::new(store.clone(), store.clone()), store)
    }

    #[tokio::test]
    async fn write_path_records_new_business() {
        let id = Uuid::new_v4();
        let (recorder, _) = recorder_with(Customer::new(id, "Acme", Decimal::ZERO, LifecycleStage::New)).await;

        let written = recorder.write_arr(id, dec!(50000), at(3), "ops", None).await.unwrap();

        let movement = written.movement.unwrap();
        assert_eq!(movement.movement_type, MovementType::New);
        assert_eq!(movement.source(), MovementSource::NewBusiness);
        assert_eq!(written.customer.segment, SegmentTier::MidMarket);
    }

    #[tokio::test]
    async fn write_path_reactivates_churned_customer() {
        let id = Uuid::new_v4();
        let (recorder, store) =
            recorder_with(Customer::new(id, "Acme", Decimal::ZERO, LifecycleStage::Churned)).await;

        let written = recorder.write_arr(id, dec!(30000), at(4), "ops", Some("win-back".into())).await.unwrap();

        assert_eq!(written.movement.unwrap().movement_type, MovementType::Reactivation);
        let stored = store.get_customer(id).await.unwrap().unwrap();
        assert_eq!(stored.lifecycle_stage, LifecycleStage::Active);
    }

    #[tokio::test]
    async fn negative_arr_is_rejected_before_any_write() {
        let id = Uuid::new_v4();
        let (recorder, store) = recorder_with(Customer::new(id, "Acme", dec!(100), LifecycleStage::Active)).await;

        let result = recorder.write_arr(id, dec!(-1), at(5), "ops", None).await;

        assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
        assert_eq!(store.movement_count().await, 0);
    }

    #[tokio::test]
    async fn event_for_unknown_customer_is_not_found() {
        let (recorder, store) =
            recorder_with(Customer::new(Uuid::new_v4(), "Acme", dec!(100), LifecycleStage::Active)).await;
        let event = ArrChangeEvent {
            customer_id: Uuid::new_v4(),
            previous_arr: Some(dec!(100)),
            new_arr: dec!(200),
            previous_stage: LifecycleStage::Active,
            occurred_at: at(6),
            reason: None,
        };

        let result = recorder.record_if_changed(event, CRM_RECORDER).await;

        assert!(matches!(result, Err(LedgerError::NotFound(_))));
        assert_eq!(store.movement_count().await, 0);
    }

    #[tokio::test]
    async fn unchanged_event_records_nothing() {
        let id = Uuid::new_v4();
        let (recorder, store) = recorder_with(Customer::new(id, "Acme", dec!(100), LifecycleStage::Active)).await;
        let event = ArrChangeEvent {
            customer_id: id,
            previous_arr: Some(dec!(100)),
            new_arr: dec!(100),
            previous_stage: LifecycleStage::Active,
            occurred_at: at(6),
            reason: None,
        };

        assert!(recorder.record_if_changed(event, CRM_RECORDER).await.unwrap().is_none());
        assert_eq!(store.movement_count().await, 0);
    }

    #[tokio::test]
    async fn event_contraction_is_appended_with_reason() {
        let id = Uuid::new_v4();
        let (recorder, _) = recorder_with(Customer::new(id, "Acme", dec!(80000), LifecycleStage::Active)).await;
        let event = ArrChangeEvent {
            customer_id: id,
            previous_arr: Some(dec!(80000)),
            new_arr: dec!(60000),
            previous_stage: LifecycleStage::Active,
            occurred_at: at(7),
            reason: Some("seat reduction".to_string()),
        };

        let movement = recorder.record_if_changed(event, CRM_RECORDER).await.unwrap().unwrap();

        assert_eq!(movement.movement_type, MovementType::Contraction);
        assert_eq!(movement.change_amount(), dec!(-20000));
        assert_eq!(movement.recorded_by, CRM_RECORDER);
        let listed = recorder.movements_for_customer(id).await.unwrap();
        assert_eq!(listed, vec![movement]);
    }

    fn event(customer_id: Uuid, previous_arr: Decimal, new_arr: Decimal, day: u32) -> ArrChangeEvent {
        ArrChangeEvent {
            customer_id,
            previous_arr: Some(previous_arr),
            new_arr,
            previous_stage: LifecycleStage::Active,
            occurred_at: at(day),
            reason: None,
        }
    }

    #[tokio::test]
    async fn event_updates_the_mirror_so_a_later_write_is_a_no_op() {
        let id = Uuid::new_v4();
        let (recorder, store) = recorder_with(Customer::new(id, "Acme", Decimal::ZERO, LifecycleStage::New)).await;
        let mut signed = event(id, Decimal::ZERO, dec!(50000), 3);
        signed.previous_stage = LifecycleStage::New;

        let movement = recorder.record_if_changed(signed, CRM_RECORDER).await.unwrap().unwrap();
        assert_eq!(movement.movement_type, MovementType::New);

        let mirror = store.get_customer(id).await.unwrap().unwrap();
        assert_eq!(mirror.arr, dec!(50000));
        assert_eq!(mirror.segment, SegmentTier::MidMarket);

        let written = recorder.write_arr(id, dec!(50000), at(4), "ops", None).await.unwrap();
        assert!(written.movement.is_none());
        assert_eq!(recorder.movements_for_customer(id).await.unwrap(), vec![movement]);
    }

    #[tokio::test]
    async fn churn_event_takes_the_customer_out_of_the_live_set() {
        let id = Uuid::new_v4();
        let (recorder, store) = recorder_with(Customer::new(id, "Acme", dec!(40000), LifecycleStage::Active)).await;

        let movement =
            recorder.record_if_changed(event(id, dec!(40000), Decimal::ZERO, 8), CRM_RECORDER).await.unwrap().unwrap();

        assert_eq!(movement.movement_type, MovementType::Churn);
        let mirror = store.get_customer(id).await.unwrap().unwrap();
        assert_eq!(mirror.lifecycle_stage, LifecycleStage::Churned);
        assert!(store.list_live_customers(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_event_is_a_conflict_and_records_nothing() {
        let id = Uuid::new_v4();
        let (recorder, store) = recorder_with(Customer::new(id, "Acme", dec!(70000), LifecycleStage::Active)).await;

        let result = recorder.record_if_changed(event(id, dec!(60000), dec!(90000), 9), CRM_RECORDER).await;

        assert!(matches!(result, Err(LedgerError::Conflict(_))));
        assert_eq!(store.movement_count().await, 0);
        assert_eq!(store.get_customer(id).await.unwrap().unwrap().arr, dec!(70000));
    }

    #[tokio::test]
    async fn sub_cent_arr_is_rejected_before_any_write() {
        let id = Uuid::new_v4();
        let (recorder, store) = recorder_with(Customer::new(id, "Acme", dec!(50000), LifecycleStage::Active)).await;

        let written = recorder.write_arr(id, dec!(50000.004), at(10), "ops", None).await;
        assert!(matches!(written, Err(LedgerError::InvalidInput(_))));
        let evented = recorder.record_if_changed(event(id, dec!(50000), dec!(50000.005), 10), CRM_RECORDER).await;
        assert!(matches!(evented, Err(LedgerError::InvalidInput(_))));
        assert_eq!(store.movement_count().await, 0);

        // Trailing zeros are still cents.
        let cents = recorder.write_arr(id, dec!(50000.100), at(11), "ops", None).await.unwrap();
        assert_eq!(cents.movement.unwrap().change_amount(), dec!(0.1));
    }

    #[tokio::test]
    async fn period_listing_covers_the_whole_month() {
        let id = Uuid::new_v4();
        let (recorder, _) = recorder_with(Customer::new(id, "Acme", dec!(10), LifecycleStage::Active)).await;
        recorder.write_arr(id, dec!(20), at(1), "ops", None).await.unwrap();
        recorder.write_arr(id, dec!(30), at(31), "ops", None).await.unwrap();

        let mid_month = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert_eq!(recorder.movements_in_period(mid_month).await.unwrap().len(), 2);
        let april = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        assert!(recorder.movements_in_period(april).await.unwrap().is_empty());
    }
}
