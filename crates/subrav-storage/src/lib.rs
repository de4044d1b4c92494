//! In-memory repositories for channel metadata, signed RAVs, and pending
//! proposals (spec §4.2). Each trait is narrow and async; the memory
//! implementations use per-key exclusive access (`DashMap`) to uphold
//! I1–I3 under concurrent writers, following the same per-key
//! `Arc<DashMap<Key, Arc<Mutex<..>>>>` shape as the teacher's
//! `PendingNonceManager` (`src/chain/eip155/pending_nonce_manager.rs`).

pub mod channel_repo;
pub mod pending_repo;
pub mod rav_repo;

pub use channel_repo::{ChannelFilter, ChannelRepository, InMemoryChannelRepository, Page, SubChannelPatch};
pub use pending_repo::{InMemoryPendingSubRAVRepository, PendingSubRAVRepository};
pub use rav_repo::{InMemoryRAVRepository, RAVRepository};

/// Composite key identifying one sub-channel (spec §3: `(channelId, vmIdFragment)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubChannelKey {
    pub channel_id: subrav_types::channel::ChannelId,
    pub vm_id_fragment: subrav_types::channel::VmIdFragment,
}

impl SubChannelKey {
    pub fn new(channel_id: subrav_types::channel::ChannelId, vm_id_fragment: subrav_types::channel::VmIdFragment) -> Self {
        SubChannelKey { channel_id, vm_id_fragment }
    }
}
