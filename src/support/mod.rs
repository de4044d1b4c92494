//! Shared building blocks for the two demo binaries: demo-only crypto and
//! DID-Auth stand-ins, a fixed-price rate provider, and the ambient
//! logging/shutdown stack. None of this is part of the library surface —
//! it only exists so `nuwa-payee-demo` and `nuwa-payer-demo` have something
//! to run.

pub mod config;
pub mod crypto;
pub mod did_auth;
pub mod rate;
pub mod shutdown;
pub mod telemetry;
