pub mod gateway;
pub mod lifecycle;
pub mod metrics;
pub mod razorpay;
pub mod repository;
pub mod store;

pub use gateway::{GatewayOrder, PaymentGateway};
pub use lifecycle::{CheckoutOrder, LateFeePolicy, LifecycleError, PaymentLifecycle};
pub use metrics::{get_metrics, init_metrics};
pub use razorpay::RazorpayClient;
pub use repository::PaymentRepository;
pub use store::{DuplicatePeriod, InMemoryStore, PaymentStore};
