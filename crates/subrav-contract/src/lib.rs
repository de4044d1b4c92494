//! The on-chain contract boundary (spec §4.8). Settlement, chain reads, and
//! hub-balance gating are external collaborators; this crate defines the
//! narrow traits the payee pipeline and claim scheduler call through, plus
//! (behind the `testing` feature) in-memory mocks for exercising them
//! without a real chain.

pub mod contract;
pub mod hub_balance;
#[cfg(feature = "testing")]
pub mod testing;

pub use contract::{
    ChannelReceipt, ClaimReceipt, PaymentChannelContract, SubChannelAuthorization,
};
pub use hub_balance::HubBalanceProvider;
