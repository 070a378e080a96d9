//! Derived payment aggregates.

use serde::Serialize;

use super::payment::{Payment, PaymentStatus};

/// Aggregate over a tenant's (or property's) payment set. Recomputed on
/// demand; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentStats {
    pub total_amount: f64,
    pub paid_amount: f64,
    pub pending_amount: f64,
    pub overdue_amount: f64,
    pub total_late_payments: u64,
    pub total_late_fees: f64,
    pub average_payment_delay_days: f64,
}

impl PaymentStats {
    /// Pure fold over an in-memory payment list. An empty input yields
    /// all-zero stats.
    pub fn compute(payments: &[Payment]) -> Self {
        let mut stats = PaymentStats::default();
        let mut total_delay_days = 0i64;
        let mut paid_count = 0u64;

        for payment in payments {
            stats.total_amount += payment.amount;
            stats.total_late_fees += payment.late_fee.unwrap_or(0.0);

            match payment.status {
                PaymentStatus::Paid => {
                    stats.paid_amount += payment.amount;
                    let delay = payment
                        .paid_at
                        .map(|at| {
                            (at.date_naive() - payment.due_date.date_naive())
                                .num_days()
                                .max(0)
                        })
                        .unwrap_or(0);
                    if delay > 0 {
                        stats.total_late_payments += 1;
                    }
                    total_delay_days += delay;
                    paid_count += 1;
                }
                PaymentStatus::Pending => stats.pending_amount += payment.amount,
                PaymentStatus::Overdue => stats.overdue_amount += payment.amount,
                // Failed amounts count toward the total but no bucket.
                PaymentStatus::Failed => {}
            }
        }

        if paid_count > 0 {
            stats.average_payment_delay_days = total_delay_days as f64 / paid_count as f64;
        }

        stats
    }
}
