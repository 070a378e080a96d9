//! Payment lifecycle manager.
//!
//! Tracks a tenant's rent obligations and reconciles them against the
//! payment gateway: current-obligation projection, gateway order flow,
//! signature verification, and the overdue sweep.

use crate::models::{
    Payment, PaymentFilter, PaymentStatus, PaymentType, PaymentUpdate, PROJECTION_ID,
};
use crate::services::gateway::PaymentGateway;
use crate::services::metrics::record_transition;
use crate::services::store::{DuplicatePeriod, PaymentStore};
use chrono::Utc;
use serde::Serialize;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("payment {0} not found")]
    PaymentNotFound(Uuid),

    #[error("payment {id} is {status:?}; operation not permitted")]
    InvalidState { id: Uuid, status: PaymentStatus },

    #[error("order id does not match the payment's transaction reference")]
    OrderMismatch,

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        let message = err.to_string();
        match err {
            LifecycleError::PaymentNotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            LifecycleError::InvalidState { .. } => AppError::Conflict(anyhow::anyhow!(message)),
            LifecycleError::OrderMismatch => AppError::BadRequest(anyhow::anyhow!(message)),
            LifecycleError::GatewayUnavailable(e) => AppError::BadGateway(e.to_string()),
            LifecycleError::Store(e) if e.downcast_ref::<DuplicatePeriod>().is_some() => {
                AppError::Conflict(e)
            }
            LifecycleError::Store(e) => AppError::DatabaseError(e),
        }
    }
}

/// Late-fee accrual policy. The daily rate is deployment configuration,
/// not a constant.
#[derive(Debug, Clone, Copy)]
pub struct LateFeePolicy {
    pub daily_rate: f64,
}

impl LateFeePolicy {
    /// `max(0, days_overdue * daily_rate)`.
    pub fn fee_for(&self, days_overdue: i64) -> f64 {
        (days_overdue as f64 * self.daily_rate).max(0.0)
    }
}

/// Everything the caller needs to hand to the hosted checkout UI.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOrder {
    /// Persisted payment id; differs from the request id when a
    /// projection was materialized.
    pub payment_id: Uuid,
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub key_id: String,
}

/// The lifecycle manager; generic over the record store and the gateway
/// so tests run against in-memory implementations.
#[derive(Clone)]
pub struct PaymentLifecycle<S, G> {
    store: S,
    gateway: G,
    late_fee: LateFeePolicy,
    currency: String,
}

impl<S: PaymentStore, G: PaymentGateway> PaymentLifecycle<S, G> {
    pub fn new(store: S, gateway: G, late_fee: LateFeePolicy, currency: String) -> Self {
        Self {
            store,
            gateway,
            late_fee,
            currency,
        }
    }

    /// What the tenant currently owes.
    ///
    /// Returns the persisted current-period rent record if one exists,
    /// otherwise a transient projection. Read-only: the projection is
    /// never persisted here. None when the tenant is unknown, inactive,
    /// or has no rent configured.
    pub async fn current_obligation(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<Payment>, LifecycleError> {
        let Some(tenant) = self.store.get_tenant(tenant_id).await? else {
            return Ok(None);
        };
        if !tenant.has_rent_configured() {
            return Ok(None);
        }

        let now = Utc::now();
        let period = crate::models::period_label(now);
        let filter = PaymentFilter::for_period(PaymentType::Rent, &period);
        let mut existing = self.store.query(tenant_id, &filter).await?;
        if let Some(record) = existing.pop() {
            return Ok(Some(record));
        }

        Ok(Some(Payment::projected(&tenant, &self.currency, now)))
    }

    pub async fn list_payments(
        &self,
        tenant_id: Uuid,
        filter: &PaymentFilter,
    ) -> Result<Vec<Payment>, LifecycleError> {
        Ok(self.store.query(tenant_id, filter).await?)
    }

    /// Payments still awaiting money: PENDING and OVERDUE.
    pub async fn list_pending(&self, tenant_id: Uuid) -> Result<Vec<Payment>, LifecycleError> {
        Ok(self
            .store
            .query(tenant_id, &PaymentFilter::outstanding())
            .await?)
    }

    /// Request a gateway order for the payment's amount due and store the
    /// order id as its transaction reference.
    ///
    /// Status is not changed here, with one exception: a FAILED payment
    /// being retried returns to PENDING once the fresh order exists. When
    /// called with the projection sentinel id, the current-period
    /// projection is materialized first so the order has a durable record
    /// to attach to.
    pub async fn process_online_payment(
        &self,
        payment_id: Uuid,
        tenant_id: Uuid,
        property_id: Uuid,
    ) -> Result<CheckoutOrder, LifecycleError> {
        let payment = if payment_id == PROJECTION_ID {
            let Some(obligation) = self.current_obligation(tenant_id).await? else {
                return Err(LifecycleError::PaymentNotFound(payment_id));
            };
            if obligation.is_projection() {
                let mut persisted = obligation;
                let id = self.store.insert(persisted.clone()).await?;
                persisted.id = id;
                tracing::info!(
                    payment_id = %id,
                    tenant_id = %tenant_id,
                    period = %persisted.period,
                    "Materialized projected obligation"
                );
                persisted
            } else {
                obligation
            }
        } else {
            self.store
                .get(payment_id)
                .await?
                .ok_or(LifecycleError::PaymentNotFound(payment_id))?
        };

        // Ownership check; an unowned record is reported as missing.
        if payment.tenant_id != tenant_id || payment.property_id != property_id {
            return Err(LifecycleError::PaymentNotFound(payment.id));
        }

        if !payment.status.is_outstanding() && payment.status != PaymentStatus::Failed {
            return Err(LifecycleError::InvalidState {
                id: payment.id,
                status: payment.status,
            });
        }

        let amount_due = payment.amount_due();
        let amount_minor = (amount_due * 100.0).round() as u64;
        let order = self
            .gateway
            .create_order(amount_minor, &payment.currency, Some(payment.id.to_string()))
            .await
            .map_err(LifecycleError::GatewayUnavailable)?;

        let update = PaymentUpdate {
            transaction_ref: Some(order.order_id.clone()),
            // A failed attempt becomes re-attemptable against the new order.
            status: (payment.status == PaymentStatus::Failed).then_some(PaymentStatus::Pending),
            ..Default::default()
        };
        self.store.update(payment.id, update).await?;
        if payment.status == PaymentStatus::Failed {
            record_transition(PaymentStatus::Pending.as_str(), 1);
        }

        tracing::info!(
            payment_id = %payment.id,
            tenant_id = %tenant_id,
            order_id = %order.order_id,
            amount = amount_due,
            "Gateway order created"
        );

        Ok(CheckoutOrder {
            payment_id: payment.id,
            order_id: order.order_id,
            amount: amount_due,
            currency: payment.currency,
            key_id: self.gateway.key_id(),
        })
    }

    /// Apply a gateway checkout outcome to the payment.
    ///
    /// Returns true when the signature verified and the payment is PAID
    /// (including repeat calls against an already-PAID record, which are
    /// no-ops). Returns false when the signature did not verify: a
    /// PENDING payment moves to FAILED, an OVERDUE one stays OVERDUE.
    pub async fn verify_payment(
        &self,
        payment_id: Uuid,
        order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<bool, LifecycleError> {
        let payment = self
            .store
            .get(payment_id)
            .await?
            .ok_or(LifecycleError::PaymentNotFound(payment_id))?;

        // Never apply a gateway outcome to a record it was not created for.
        if payment.transaction_ref.as_deref() != Some(order_id) {
            tracing::warn!(
                payment_id = %payment_id,
                expected_order_id = ?payment.transaction_ref,
                received_order_id = %order_id,
                "Order id mismatch"
            );
            return Err(LifecycleError::OrderMismatch);
        }

        match payment.status {
            // Already applied; repeat verification is a no-op.
            PaymentStatus::Paid => return Ok(true),
            PaymentStatus::Failed => {
                return Err(LifecycleError::InvalidState {
                    id: payment.id,
                    status: payment.status,
                })
            }
            PaymentStatus::Pending | PaymentStatus::Overdue => {}
        }

        let is_valid = self
            .gateway
            .verify_signature(order_id, gateway_payment_id, signature)
            .map_err(LifecycleError::GatewayUnavailable)?;

        if is_valid {
            // Paid timestamp, gateway payment id, and status land in one
            // write; accrued late fees are preserved.
            let update = PaymentUpdate {
                status: Some(PaymentStatus::Paid),
                paid_at: Some(Utc::now()),
                gateway_payment_id: Some(gateway_payment_id.to_string()),
                ..Default::default()
            };
            self.store.update(payment.id, update).await?;
            record_transition(PaymentStatus::Paid.as_str(), 1);

            tracing::info!(
                payment_id = %payment.id,
                order_id = %order_id,
                from = payment.status.as_str(),
                "Payment verified and marked paid"
            );
            Ok(true)
        } else {
            // An overdue obligation is still outstanding after a bad
            // attempt; only a pending one records the failure.
            if payment.status == PaymentStatus::Pending {
                let update = PaymentUpdate {
                    status: Some(PaymentStatus::Failed),
                    ..Default::default()
                };
                self.store.update(payment.id, update).await?;
                record_transition(PaymentStatus::Failed.as_str(), 1);
            }

            tracing::warn!(
                payment_id = %payment.id,
                order_id = %order_id,
                "Payment verification failed"
            );
            Ok(false)
        }
    }

    /// Batch sweep: move every past-due PENDING payment to OVERDUE with
    /// its accrued late fee. Idempotent; already-OVERDUE records are
    /// untouched. Each write is guarded on the record still being
    /// PENDING, so a payment verified PAID between the scan and the
    /// write keeps its settled state. Returns the number of records
    /// transitioned.
    pub async fn mark_overdue_payments(&self) -> Result<u64, LifecycleError> {
        let now = Utc::now();
        let past_due = self.store.find_pending_due_before(now).await?;
        if past_due.is_empty() {
            return Ok(0);
        }

        let updates: Vec<(Uuid, PaymentUpdate)> = past_due
            .iter()
            .map(|payment| {
                let fee = self.late_fee.fee_for(payment.days_overdue(now));
                (
                    payment.id,
                    PaymentUpdate {
                        status: Some(PaymentStatus::Overdue),
                        late_fee: Some(fee),
                        ..Default::default()
                    },
                )
            })
            .collect();

        let applied = self
            .store
            .batch_transition(PaymentStatus::Pending, updates)
            .await?;
        record_transition(PaymentStatus::Overdue.as_str(), applied);

        tracing::info!(count = applied, "Overdue sweep applied");
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tenant;
    use crate::services::gateway::GatewayOrder;
    use crate::services::store::InMemoryStore;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Gateway double with deterministic signatures.
    #[derive(Clone)]
    struct FakeGateway {
        secret: String,
        unreachable: bool,
        orders_created: Arc<AtomicUsize>,
    }

    impl FakeGateway {
        fn new() -> Self {
            FakeGateway {
                secret: "fake_secret".to_string(),
                unreachable: false,
                orders_created: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn unreachable() -> Self {
            FakeGateway {
                unreachable: true,
                ..Self::new()
            }
        }

        fn sign(&self, order_id: &str, payment_id: &str) -> String {
            format!("sig:{}|{}|{}", order_id, payment_id, self.secret)
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_order(
            &self,
            amount: u64,
            currency: &str,
            _receipt: Option<String>,
        ) -> anyhow::Result<GatewayOrder> {
            if self.unreachable {
                bail!("connection refused");
            }
            let n = self.orders_created.fetch_add(1, Ordering::SeqCst);
            Ok(GatewayOrder {
                order_id: format!("order_{}", n),
                amount,
                currency: currency.to_string(),
            })
        }

        fn verify_signature(
            &self,
            order_id: &str,
            payment_id: &str,
            signature: &str,
        ) -> anyhow::Result<bool> {
            Ok(signature == self.sign(order_id, payment_id))
        }

        fn key_id(&self) -> String {
            "rzp_test_fake".to_string()
        }
    }

    fn lifecycle(
        store: InMemoryStore,
        gateway: FakeGateway,
    ) -> PaymentLifecycle<InMemoryStore, FakeGateway> {
        PaymentLifecycle::new(
            store,
            gateway,
            LateFeePolicy { daily_rate: 50.0 },
            "INR".to_string(),
        )
    }

    fn seeded_tenant(store: &InMemoryStore) -> Tenant {
        let tenant = Tenant::sample();
        store.add_tenant(tenant.clone());
        tenant
    }

    #[tokio::test]
    async fn obligation_is_projected_when_no_record_exists() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let lc = lifecycle(store.clone(), FakeGateway::new());

        let obligation = lc.current_obligation(tenant.id).await.unwrap().unwrap();
        assert!(obligation.is_projection());
        assert_eq!(obligation.status, PaymentStatus::Pending);
        assert_eq!(obligation.amount, 10_000.0);
        assert_eq!(obligation.period, crate::models::period_label(Utc::now()));

        // Projection purity: nothing was persisted.
        let persisted = store
            .query(tenant.id, &PaymentFilter::default())
            .await
            .unwrap();
        assert!(persisted.is_empty());
    }

    #[tokio::test]
    async fn no_obligation_for_unknown_or_rentless_tenant() {
        let store = InMemoryStore::new();
        let lc = lifecycle(store.clone(), FakeGateway::new());

        assert!(lc.current_obligation(Uuid::new_v4()).await.unwrap().is_none());

        let mut no_rent = Tenant::sample();
        no_rent.rent_amount = 0.0;
        store.add_tenant(no_rent.clone());
        assert!(lc.current_obligation(no_rent.id).await.unwrap().is_none());

        let mut inactive = Tenant::sample();
        inactive.is_active = false;
        store.add_tenant(inactive.clone());
        assert!(lc.current_obligation(inactive.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn on_time_payment_flow() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let gateway = FakeGateway::new();
        let lc = lifecycle(store.clone(), gateway.clone());

        let obligation = lc.current_obligation(tenant.id).await.unwrap().unwrap();
        assert!(obligation.is_projection());

        let checkout = lc
            .process_online_payment(obligation.id, tenant.id, tenant.property_id)
            .await
            .unwrap();
        assert_ne!(checkout.payment_id, PROJECTION_ID);
        assert_eq!(checkout.amount, 10_000.0);

        let signature = gateway.sign(&checkout.order_id, "pay_1");
        let paid = lc
            .verify_payment(checkout.payment_id, &checkout.order_id, "pay_1", &signature)
            .await
            .unwrap();
        assert!(paid);

        let payment = store.get(checkout.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.amount, 10_000.0);
        assert_eq!(payment.transaction_ref.as_deref(), Some(checkout.order_id.as_str()));
        assert_eq!(payment.gateway_payment_id.as_deref(), Some("pay_1"));
        assert!(payment.paid_at.is_some());
    }

    #[tokio::test]
    async fn obligation_returns_persisted_record_once_materialized() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let lc = lifecycle(store.clone(), FakeGateway::new());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();

        let obligation = lc.current_obligation(tenant.id).await.unwrap().unwrap();
        assert!(!obligation.is_projection());
        assert_eq!(obligation.id, checkout.payment_id);
    }

    #[tokio::test]
    async fn verification_is_idempotent() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let gateway = FakeGateway::new();
        let lc = lifecycle(store.clone(), gateway.clone());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();
        let signature = gateway.sign(&checkout.order_id, "pay_1");

        assert!(lc
            .verify_payment(checkout.payment_id, &checkout.order_id, "pay_1", &signature)
            .await
            .unwrap());
        let first = store.get(checkout.payment_id).await.unwrap().unwrap();

        // Second call with identical arguments: still true, nothing moves.
        assert!(lc
            .verify_payment(checkout.payment_id, &checkout.order_id, "pay_1", &signature)
            .await
            .unwrap());
        let second = store.get(checkout.payment_id).await.unwrap().unwrap();
        assert_eq!(second.status, PaymentStatus::Paid);
        assert_eq!(second.paid_at, first.paid_at);
    }

    #[tokio::test]
    async fn mismatched_order_is_rejected_without_mutation() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let gateway = FakeGateway::new();
        let lc = lifecycle(store.clone(), gateway.clone());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();

        let signature = gateway.sign("order_bogus", "pay_1");
        let err = lc
            .verify_payment(checkout.payment_id, "order_bogus", "pay_1", &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::OrderMismatch));

        let payment = store.get(checkout.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn failed_verification_marks_pending_failed() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let lc = lifecycle(store.clone(), FakeGateway::new());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();

        let paid = lc
            .verify_payment(checkout.payment_id, &checkout.order_id, "pay_1", "garbage")
            .await
            .unwrap();
        assert!(!paid);

        let payment = store.get(checkout.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(payment.late_fee.is_none());
    }

    #[tokio::test]
    async fn failed_verification_leaves_overdue_outstanding() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let gateway = FakeGateway::new();
        let lc = lifecycle(store.clone(), gateway.clone());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();

        // Push the record past due and sweep it into OVERDUE.
        let mut payment = store.get(checkout.payment_id).await.unwrap().unwrap();
        payment.due_date = Utc::now() - Duration::days(3);
        store.seed_payment(payment);
        lc.mark_overdue_payments().await.unwrap();

        let paid = lc
            .verify_payment(checkout.payment_id, &checkout.order_id, "pay_1", "garbage")
            .await
            .unwrap();
        assert!(!paid);

        let payment = store.get(checkout.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Overdue);

        // The obligation can still be settled afterwards, fee preserved.
        let signature = gateway.sign(&checkout.order_id, "pay_2");
        assert!(lc
            .verify_payment(checkout.payment_id, &checkout.order_id, "pay_2", &signature)
            .await
            .unwrap());
        let payment = store.get(checkout.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.late_fee, Some(150.0));
    }

    #[tokio::test]
    async fn failed_payment_retries_through_new_order() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let gateway = FakeGateway::new();
        let lc = lifecycle(store.clone(), gateway.clone());

        let first = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();
        lc.verify_payment(first.payment_id, &first.order_id, "pay_1", "garbage")
            .await
            .unwrap();
        assert_eq!(
            store.get(first.payment_id).await.unwrap().unwrap().status,
            PaymentStatus::Failed
        );

        // Explicit new order-creation call resets the record to PENDING.
        let retry = lc
            .process_online_payment(first.payment_id, tenant.id, tenant.property_id)
            .await
            .unwrap();
        assert_ne!(retry.order_id, first.order_id);

        let payment = store.get(first.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.transaction_ref.as_deref(), Some(retry.order_id.as_str()));
    }

    #[tokio::test]
    async fn overdue_sweep_accrues_late_fee_and_is_idempotent() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let lc = lifecycle(store.clone(), FakeGateway::new());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();
        let mut payment = store.get(checkout.payment_id).await.unwrap().unwrap();
        payment.due_date = Utc::now() - Duration::days(10);
        store.seed_payment(payment);

        assert_eq!(lc.mark_overdue_payments().await.unwrap(), 1);
        let after_first = store.get(checkout.payment_id).await.unwrap().unwrap();
        assert_eq!(after_first.status, PaymentStatus::Overdue);
        assert_eq!(after_first.late_fee, Some(500.0));

        // Re-running with no time advancing is a no-op.
        assert_eq!(lc.mark_overdue_payments().await.unwrap(), 0);
        let after_second = store.get(checkout.payment_id).await.unwrap().unwrap();
        assert_eq!(after_second.status, after_first.status);
        assert_eq!(after_second.late_fee, after_first.late_fee);
    }

    #[tokio::test]
    async fn sweep_does_not_revert_concurrently_paid_record() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let gateway = FakeGateway::new();
        let lc = lifecycle(store.clone(), gateway.clone());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();
        let mut payment = store.get(checkout.payment_id).await.unwrap().unwrap();
        payment.due_date = Utc::now() - Duration::days(5);
        store.seed_payment(payment);

        // A sweep scans the record while it is still pending...
        let stale_scan = store.find_pending_due_before(Utc::now()).await.unwrap();
        assert_eq!(stale_scan.len(), 1);

        // ...and the tenant settles it before the sweep writes.
        let signature = gateway.sign(&checkout.order_id, "pay_1");
        assert!(lc
            .verify_payment(checkout.payment_id, &checkout.order_id, "pay_1", &signature)
            .await
            .unwrap());

        let stale_updates: Vec<(Uuid, PaymentUpdate)> = stale_scan
            .iter()
            .map(|p| {
                (
                    p.id,
                    PaymentUpdate {
                        status: Some(PaymentStatus::Overdue),
                        late_fee: Some(250.0),
                        ..Default::default()
                    },
                )
            })
            .collect();
        let applied = store
            .batch_transition(PaymentStatus::Pending, stale_updates)
            .await
            .unwrap();
        assert_eq!(applied, 0);

        // The settled record keeps its state; no fee lands on it.
        let payment = store.get(checkout.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert!(payment.late_fee.is_none());
        assert!(payment.paid_at.is_some());
    }

    #[tokio::test]
    async fn sweep_ignores_future_due_dates() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let lc = lifecycle(store.clone(), FakeGateway::new());

        lc.process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();

        // Due date is the first of next month; nothing to sweep.
        assert_eq!(lc.mark_overdue_payments().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn overdue_order_includes_accrued_fee() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let lc = lifecycle(store.clone(), FakeGateway::new());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();
        let mut payment = store.get(checkout.payment_id).await.unwrap().unwrap();
        payment.due_date = Utc::now() - Duration::days(4);
        store.seed_payment(payment);
        lc.mark_overdue_payments().await.unwrap();

        let retry = lc
            .process_online_payment(checkout.payment_id, tenant.id, tenant.property_id)
            .await
            .unwrap();
        assert_eq!(retry.amount, 10_000.0 + 200.0);
    }

    #[tokio::test]
    async fn unreachable_gateway_leaves_payment_untouched() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let lc = lifecycle(store.clone(), FakeGateway::new());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();
        let before = store.get(checkout.payment_id).await.unwrap().unwrap();

        let down = lifecycle(store.clone(), FakeGateway::unreachable());
        let err = down
            .process_online_payment(checkout.payment_id, tenant.id, tenant.property_id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::GatewayUnavailable(_)));

        let after = store.get(checkout.payment_id).await.unwrap().unwrap();
        assert_eq!(after.status, before.status);
        assert_eq!(after.transaction_ref, before.transaction_ref);
    }

    #[tokio::test]
    async fn foreign_tenant_cannot_order_against_payment() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let lc = lifecycle(store.clone(), FakeGateway::new());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();

        let err = lc
            .process_online_payment(checkout.payment_id, Uuid::new_v4(), tenant.property_id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PaymentNotFound(_)));
    }

    #[tokio::test]
    async fn paid_payment_rejects_new_orders() {
        let store = InMemoryStore::new();
        let tenant = seeded_tenant(&store);
        let gateway = FakeGateway::new();
        let lc = lifecycle(store.clone(), gateway.clone());

        let checkout = lc
            .process_online_payment(PROJECTION_ID, tenant.id, tenant.property_id)
            .await
            .unwrap();
        let signature = gateway.sign(&checkout.order_id, "pay_1");
        lc.verify_payment(checkout.payment_id, &checkout.order_id, "pay_1", &signature)
            .await
            .unwrap();

        let err = lc
            .process_online_payment(checkout.payment_id, tenant.id, tenant.property_id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidState {
                status: PaymentStatus::Paid,
                ..
            }
        ));
    }

    #[test]
    fn late_fee_never_negative() {
        let policy = LateFeePolicy { daily_rate: 50.0 };
        assert_eq!(policy.fee_for(-3), 0.0);
        assert_eq!(policy.fee_for(0), 0.0);
        assert_eq!(policy.fee_for(10), 500.0);
    }
}
