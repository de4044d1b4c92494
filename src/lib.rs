//! Demo wiring for the SubRAV micro-payment-channel toolkit.
//!
//! This crate does not add protocol behavior of its own — every piece of
//! the toolkit lives in a `subrav-*` workspace member. What's here is the
//! glue that turns those crates into two runnable binaries:
//!
//! - `nuwa-payee-demo` — an axum server exposing one billable route behind
//!   [`subrav_http::payee::PaymentLayer`], plus the `nuwa.*` control-plane
//!   routes.
//! - `nuwa-payer-demo` — a CLI client driving [`subrav_payer::PayerClient`]
//!   through [`subrav_http::payer::SubravPayments`] against a running payee.
//!
//! [`support`] holds the demo-only stand-ins (signer, verifier, resolver,
//! DID-Auth, rate provider) that a real deployment would replace with
//! production implementations of the narrow traits each `subrav-*` crate
//! defines.

pub mod support;
