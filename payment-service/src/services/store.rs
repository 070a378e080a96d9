//! Record-store boundary for payment documents.

use crate::models::{Payment, PaymentFilter, PaymentStatus, PaymentUpdate, Tenant};
use anyhow::{bail, Result};
use thiserror::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Violation of the one-record-per-(tenant, type, period) rule.
#[derive(Debug, Error)]
#[error("a payment already exists for this tenant, type, and period")]
pub struct DuplicatePeriod;

/// The persistence surface the lifecycle needs. Backed by MongoDB in
/// production ([`super::PaymentRepository`]) and by [`InMemoryStore`] in
/// tests and local runs. The lifecycle re-reads current state through
/// this trait before every transition; it never caches records.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Payment>>;

    async fn query(&self, tenant_id: Uuid, filter: &PaymentFilter) -> Result<Vec<Payment>>;

    /// Insert a new record, assigning and returning its identifier.
    async fn insert(&self, payment: Payment) -> Result<Uuid>;

    async fn update(&self, id: Uuid, update: PaymentUpdate) -> Result<()>;

    /// Apply a set of partial updates as one sweep, each guarded on the
    /// record still holding `expected` status at write time. Records that
    /// moved on since the scan are skipped. Returns the number applied.
    /// Backends without multi-document transactions apply them
    /// sequentially.
    async fn batch_transition(
        &self,
        expected: PaymentStatus,
        updates: Vec<(Uuid, PaymentUpdate)>,
    ) -> Result<u64>;

    /// All PENDING records whose due date precedes `cutoff`.
    async fn find_pending_due_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>>;

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>>;
}

/// DashMap-backed store for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    payments: Arc<DashMap<Uuid, Payment>>,
    tenants: Arc<DashMap<Uuid, Tenant>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id, tenant);
    }

    /// Insert a fixture record as-is, keeping its id.
    pub fn seed_payment(&self, payment: Payment) {
        self.payments.insert(payment.id, payment);
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        Ok(self.payments.get(&id).map(|p| p.value().clone()))
    }

    async fn query(&self, tenant_id: Uuid, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        let mut results: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| entry.tenant_id == tenant_id && filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        results.sort_by(|a, b| b.due_date.cmp(&a.due_date));
        Ok(results)
    }

    async fn insert(&self, mut payment: Payment) -> Result<Uuid> {
        let duplicate = self.payments.iter().any(|entry| {
            entry.tenant_id == payment.tenant_id
                && entry.payment_type == payment.payment_type
                && entry.period == payment.period
        });
        if duplicate {
            return Err(anyhow::Error::new(DuplicatePeriod));
        }
        payment.id = Uuid::new_v4();
        let id = payment.id;
        self.payments.insert(id, payment);
        Ok(id)
    }

    async fn update(&self, id: Uuid, update: PaymentUpdate) -> Result<()> {
        match self.payments.get_mut(&id) {
            Some(mut payment) => {
                update.apply_to(&mut payment, Utc::now());
                Ok(())
            }
            None => bail!("payment {} not found", id),
        }
    }

    async fn batch_transition(
        &self,
        expected: PaymentStatus,
        updates: Vec<(Uuid, PaymentUpdate)>,
    ) -> Result<u64> {
        let mut applied = 0;
        for (id, update) in updates {
            if let Some(mut payment) = self.payments.get_mut(&id) {
                // Status is re-checked under the entry lock.
                if payment.status == expected {
                    update.apply_to(&mut payment, Utc::now());
                    applied += 1;
                }
            }
        }
        Ok(applied)
    }

    async fn find_pending_due_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        Ok(self
            .payments
            .iter()
            .filter(|entry| entry.status == PaymentStatus::Pending && entry.due_date < cutoff)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        Ok(self.tenants.get(&id).map(|t| t.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Payment;

    #[tokio::test]
    async fn second_insert_for_same_period_is_a_duplicate() {
        let store = InMemoryStore::new();
        let tenant = Tenant::sample();
        let payment = Payment::projected(&tenant, "INR", Utc::now());

        store.insert(payment.clone()).await.unwrap();
        let err = store.insert(payment).await.unwrap_err();
        assert!(err.downcast_ref::<DuplicatePeriod>().is_some());
    }
}
