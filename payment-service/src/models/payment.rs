//! Payment record: one rent (or other) obligation for one tenant in one
//! billing period.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tenant::Tenant;

/// Sentinel identifier for a not-yet-persisted current-period projection.
pub const PROJECTION_ID: Uuid = Uuid::nil();

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Overdue,
    Paid,
    Failed,
}

impl PaymentStatus {
    /// Transitions permitted by the lifecycle. Paid is terminal; Failed
    /// returns to Pending only through an explicit new gateway order.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Overdue)
                | (Pending, Paid)
                | (Pending, Failed)
                | (Overdue, Paid)
                | (Failed, Pending)
        )
    }

    /// Pending and Overdue obligations still await payment.
    pub fn is_outstanding(self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Overdue)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Overdue => "OVERDUE",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(PaymentStatus::Pending),
            "OVERDUE" => Some(PaymentStatus::Overdue),
            "PAID" => Some(PaymentStatus::Paid),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Rent,
    Deposit,
    Utility,
    LateFee,
    Other,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Rent => "rent",
            PaymentType::Deposit => "deposit",
            PaymentType::Utility => "utility",
            PaymentType::LateFee => "late_fee",
            PaymentType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rent" => Some(PaymentType::Rent),
            "deposit" => Some(PaymentType::Deposit),
            "utility" => Some(PaymentType::Utility),
            "late_fee" => Some(PaymentType::LateFee),
            "other" => Some(PaymentType::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub room_id: Option<Uuid>,
    pub amount: f64,
    pub currency: String,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    /// Billing period label, `YYYY-MM`. Unique per (tenant, type) for
    /// persisted records.
    pub period: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub due_date: DateTime<Utc>,
    #[serde(
        default,
        with = "optional_bson_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub paid_at: Option<DateTime<Utc>>,
    pub late_fee: Option<f64>,
    /// Gateway order id from the most recent checkout attempt.
    pub transaction_ref: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub notes: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Transient current-period obligation for a tenant with no persisted
    /// record yet. Carries the projection sentinel id and is never written
    /// by the read path.
    pub fn projected(tenant: &Tenant, currency: &str, now: DateTime<Utc>) -> Self {
        Payment {
            id: PROJECTION_ID,
            tenant_id: tenant.id,
            property_id: tenant.property_id,
            room_id: tenant.room_id,
            amount: tenant.rent_amount,
            currency: currency.to_string(),
            payment_type: PaymentType::Rent,
            status: PaymentStatus::Pending,
            period: period_label(now),
            due_date: first_of_next_month(now),
            paid_at: None,
            late_fee: None,
            transaction_ref: None,
            gateway_payment_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_projection(&self) -> bool {
        self.id == PROJECTION_ID
    }

    /// Base amount plus any accrued late fee.
    pub fn amount_due(&self) -> f64 {
        self.amount + self.late_fee.unwrap_or(0.0)
    }

    /// Whole days past the due date; never negative.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        (now.date_naive() - self.due_date.date_naive())
            .num_days()
            .max(0)
    }
}

/// Billing period label for a point in time.
pub fn period_label(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// First day of the calendar month after `at`, at midnight UTC.
pub fn first_of_next_month(at: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("first of month is a valid timestamp")
}

/// Closed filter over a tenant's payments. Invalid combinations are
/// unrepresentable; there is no open filter dictionary.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub statuses: Option<Vec<PaymentStatus>>,
    pub payment_types: Option<Vec<PaymentType>>,
    pub period: Option<String>,
}

impl PaymentFilter {
    /// Pending and Overdue records.
    pub fn outstanding() -> Self {
        PaymentFilter {
            statuses: Some(vec![PaymentStatus::Pending, PaymentStatus::Overdue]),
            ..Default::default()
        }
    }

    pub fn for_period(payment_type: PaymentType, period: &str) -> Self {
        PaymentFilter {
            payment_types: Some(vec![payment_type]),
            period: Some(period.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, payment: &Payment) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&payment.status) {
                return false;
            }
        }
        if let Some(types) = &self.payment_types {
            if !types.contains(&payment.payment_type) {
                return false;
            }
        }
        if let Some(period) = &self.period {
            if payment.period != *period {
                return false;
            }
        }
        true
    }
}

/// Partial update applied through the record store. Only the fields the
/// lifecycle actually mutates are representable.
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub status: Option<PaymentStatus>,
    pub late_fee: Option<f64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_ref: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub notes: Option<String>,
}

impl PaymentUpdate {
    /// Apply to an in-memory record, bumping `updated_at`.
    pub fn apply_to(&self, payment: &mut Payment, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            payment.status = status;
        }
        if let Some(fee) = self.late_fee {
            payment.late_fee = Some(fee);
        }
        if let Some(paid_at) = self.paid_at {
            payment.paid_at = Some(paid_at);
        }
        if let Some(transaction_ref) = &self.transaction_ref {
            payment.transaction_ref = Some(transaction_ref.clone());
        }
        if let Some(gateway_payment_id) = &self.gateway_payment_id {
            payment.gateway_payment_id = Some(gateway_payment_id.clone());
        }
        if let Some(notes) = &self.notes {
            payment.notes = Some(notes.clone());
        }
        payment.updated_at = now;
    }
}

mod optional_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(bson::DateTime::from_chrono).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Option::<bson::DateTime>::deserialize(deserializer)?;
        Ok(value.map(|v| v.to_chrono()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn paid_is_terminal() {
        for next in [
            PaymentStatus::Pending,
            PaymentStatus::Overdue,
            PaymentStatus::Failed,
            PaymentStatus::Paid,
        ] {
            assert!(!PaymentStatus::Paid.can_transition_to(next));
        }
    }

    #[test]
    fn failed_only_returns_to_pending() {
        assert!(PaymentStatus::Failed.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Paid));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Overdue));
    }

    #[test]
    fn overdue_cannot_fail() {
        assert!(PaymentStatus::Overdue.can_transition_to(PaymentStatus::Paid));
        assert!(!PaymentStatus::Overdue.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Overdue.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn next_month_rolls_over_december() {
        let at = Utc.with_ymd_and_hms(2025, 12, 15, 10, 30, 0).unwrap();
        let due = first_of_next_month(at);
        assert_eq!(due, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn period_label_is_year_month() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 0, 0, 0).unwrap();
        assert_eq!(period_label(at), "2025-03");
    }

    #[test]
    fn days_overdue_never_negative() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let tenant = Tenant::sample();
        let mut payment = Payment::projected(&tenant, "INR", now);
        payment.due_date = Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap();
        assert_eq!(payment.days_overdue(now), 0);

        payment.due_date = Utc.with_ymd_and_hms(2025, 5, 22, 0, 0, 0).unwrap();
        assert_eq!(payment.days_overdue(now), 10);
    }
}
