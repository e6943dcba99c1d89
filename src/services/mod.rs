//! Business services. Each service is a cheap-to-clone handle over shared
//! connections and is wired together in `handlers::AppServices`.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod users;
