//! Overdue invoice recovery.
//!
//! Invoices move through a fixed ladder of escalation stages. Every outbound
//! step is previewed, approved by a human, and recorded as message events and
//! audit entries. The HTTP API in [`api`] is a thin layer over [`recovery`].

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod recovery;
pub mod services;
pub mod settings;

#[cfg(test)]
pub mod testing;
