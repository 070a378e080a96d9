pub mod payment;
pub mod stats;
pub mod tenant;

pub use payment::{
    first_of_next_month, period_label, Payment, PaymentFilter, PaymentStatus, PaymentType,
    PaymentUpdate, PROJECTION_ID,
};
pub use stats::PaymentStats;
pub use tenant::Tenant;
