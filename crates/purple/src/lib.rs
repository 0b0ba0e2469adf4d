//! Library-backed account backend for imbridge.
//!
//! Adapts accounts held by a legacy multi-protocol IM library to the
//! uniform [`imbridge_accounts::BridgeAccount`] contract.

pub mod account;
pub mod error;
pub mod events;
pub mod library;

pub use {
    account::{PurpleAccount, PurpleAccountFactory, purple_protocol},
    error::{Error, Result},
    events::{PurpleEvent, dispatch},
    library::{AccountHandle, PurpleLibrary},
};

/// Count one call into the library.
#[cfg(feature = "metrics")]
fn remote_call(method: &'static str) {
    metrics::counter!("remote_calls_total", "method" => method).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn remote_call(_method: &'static str) {}
