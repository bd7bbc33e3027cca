//! # Jobtrail Channels
//! Outbound email transports and the delivery adapter the dispatcher talks to.

pub mod delivery;
pub mod email;
pub mod http_api;

pub use delivery::DeliveryAdapter;
pub use email::SmtpMailer;
pub use http_api::HttpApiMailer;
