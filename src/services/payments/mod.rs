pub mod gateway;
pub mod stripe;

pub use gateway::{ChargeReceipt, ChargeRequest, PaymentError, PaymentGateway};
pub use stripe::StripeGateway;
