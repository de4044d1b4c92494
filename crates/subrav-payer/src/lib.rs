//! The payer client state machine (spec §4.6): per-host discovery, channel
//! recovery/opening, pending-proposal caching, and the concurrent in-flight
//! request map keyed by `clientTxRef`.

pub mod client;
pub mod state;
pub mod transport;

pub use client::{PayerClient, PayerClientConfig, PaymentInfo, PendingResolution};
pub use state::{InMemoryPayerStateRepository, PayerClientState, PayerStateRepository};
pub use transport::{DidAuthIssuer, PayeeTransport};
