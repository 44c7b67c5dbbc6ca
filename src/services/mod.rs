//! External collaborators: message delivery, billing, and inbound webhooks.

pub mod billing;
pub mod delivery;
pub mod webhooks;

pub use billing::{BillingProvider, BillingSession, MockBilling, StripeBilling, billing_from_config};
pub use delivery::{DeliveryReceipt, DeliveryRouter, MessageDelivery, MockDelivery, TwilioSmsDelivery};
