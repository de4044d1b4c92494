//! The payee-side HTTP adapters: the [`tower::Layer`] driving
//! [`PaymentProcessor`](subrav_payee::PaymentProcessor) around a protected
//! route, and the built-in `nuwa.*` control-plane routes every payee exposes
//! alongside it.

pub mod layer;
pub mod routes;
pub mod usage;

pub use layer::{PaymentLayer, PaymentLayerConfig, PaymentService};
pub use routes::{nuwa_routes, NuwaRoutesState};
pub use usage::UsageRecorder;
