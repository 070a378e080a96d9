use crate::models::{Payment, PaymentFilter, PaymentStatus, PaymentUpdate, Tenant};
use crate::services::store::{DuplicatePeriod, PaymentStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson, Bson, Document};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Collection, Database, IndexModel};
use uuid::Uuid;

/// MongoDB-backed payment store.
#[derive(Clone)]
pub struct PaymentRepository {
    payment_collection: Collection<Payment>,
    tenant_collection: Collection<Tenant>,
}

impl PaymentRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            payment_collection: db.collection("payments"),
            tenant_collection: db.collection("tenants"),
        }
    }

    /// Initialize database indexes.
    pub async fn init_indexes(&self) -> Result<()> {
        // One persisted record per (tenant, obligation type, period).
        let period_unique_index = IndexModel::builder()
            .keys(doc! { "tenant_id": 1, "payment_type": 1, "period": 1 })
            .options(
                IndexOptions::builder()
                    .name("tenant_type_period_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        // Overdue sweep scans on (status, due_date).
        let sweep_index = IndexModel::builder()
            .keys(doc! { "status": 1, "due_date": 1 })
            .options(
                IndexOptions::builder()
                    .name("status_due_date_idx".to_string())
                    .build(),
            )
            .build();

        // Tenant-scoped status queries.
        let tenant_status_index = IndexModel::builder()
            .keys(doc! { "tenant_id": 1, "status": 1 })
            .options(
                IndexOptions::builder()
                    .name("tenant_status_idx".to_string())
                    .build(),
            )
            .build();

        self.payment_collection
            .create_indexes(
                [period_unique_index, sweep_index, tenant_status_index],
                None,
            )
            .await?;

        tracing::info!("Payment indexes initialized");
        Ok(())
    }

    fn filter_document(tenant_id: Uuid, filter: &PaymentFilter) -> Result<Document> {
        let mut document = doc! { "tenant_id": tenant_id.to_string() };

        if let Some(statuses) = &filter.statuses {
            let values = statuses
                .iter()
                .map(to_bson)
                .collect::<Result<Vec<Bson>, _>>()?;
            document.insert("status", doc! { "$in": values });
        }
        if let Some(types) = &filter.payment_types {
            let values = types
                .iter()
                .map(to_bson)
                .collect::<Result<Vec<Bson>, _>>()?;
            document.insert("payment_type", doc! { "$in": values });
        }
        if let Some(period) = &filter.period {
            document.insert("period", period.clone());
        }

        Ok(document)
    }

    fn update_document(update: &PaymentUpdate) -> Result<Document> {
        let mut set = doc! { "updated_at": mongodb::bson::DateTime::now() };

        if let Some(status) = update.status {
            set.insert("status", to_bson(&status)?);
        }
        if let Some(late_fee) = update.late_fee {
            set.insert("late_fee", late_fee);
        }
        if let Some(paid_at) = update.paid_at {
            set.insert("paid_at", mongodb::bson::DateTime::from_chrono(paid_at));
        }
        if let Some(transaction_ref) = &update.transaction_ref {
            set.insert("transaction_ref", transaction_ref.clone());
        }
        if let Some(gateway_payment_id) = &update.gateway_payment_id {
            set.insert("gateway_payment_id", gateway_payment_id.clone());
        }
        if let Some(notes) = &update.notes {
            set.insert("notes", notes.clone());
        }

        Ok(doc! { "$set": set })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) if write_error.code == 11000
    )
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        let filter = doc! { "_id": id.to_string() };
        let payment = self.payment_collection.find_one(filter, None).await?;
        Ok(payment)
    }

    async fn query(&self, tenant_id: Uuid, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        let document = Self::filter_document(tenant_id, filter)?;

        let options = FindOptions::builder()
            .sort(doc! { "due_date": -1 })
            .build();

        let cursor = self
            .payment_collection
            .find(document, Some(options))
            .await?;
        let payments: Vec<Payment> = cursor.try_collect().await?;
        Ok(payments)
    }

    async fn insert(&self, mut payment: Payment) -> Result<Uuid> {
        payment.id = Uuid::new_v4();
        match self.payment_collection.insert_one(&payment, None).await {
            Ok(_) => Ok(payment.id),
            Err(err) if is_duplicate_key(&err) => Err(anyhow::Error::new(DuplicatePeriod)),
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, id: Uuid, update: PaymentUpdate) -> Result<()> {
        let filter = doc! { "_id": id.to_string() };
        let update = Self::update_document(&update)?;
        self.payment_collection
            .update_one(filter, update, None)
            .await?;
        Ok(())
    }

    // The 2.x driver has no multi-document bulk update; the sweep falls
    // back to best-effort sequential writes. The status guard in the
    // filter skips records that transitioned after the scan.
    async fn batch_transition(
        &self,
        expected: PaymentStatus,
        updates: Vec<(Uuid, PaymentUpdate)>,
    ) -> Result<u64> {
        let mut applied = 0;
        for (id, update) in updates {
            let filter = doc! { "_id": id.to_string(), "status": to_bson(&expected)? };
            let update = Self::update_document(&update)?;
            let result = self
                .payment_collection
                .update_one(filter, update, None)
                .await?;
            applied += result.modified_count;
        }
        Ok(applied)
    }

    async fn find_pending_due_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let filter = doc! {
            "status": to_bson(&PaymentStatus::Pending)?,
            "due_date": { "$lt": mongodb::bson::DateTime::from_chrono(cutoff) }
        };
        let cursor = self.payment_collection.find(filter, None).await?;
        let payments: Vec<Payment> = cursor.try_collect().await?;
        Ok(payments)
    }

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        let filter = doc! { "_id": id.to_string() };
        let tenant = self.tenant_collection.find_one(filter, None).await?;
        Ok(tenant)
    }
}
