//! The payer-side HTTP/reqwest adapters: a [`PayeeTransport`](subrav_payer::PayeeTransport)
//! talking plain JSON over [`reqwest::Client`], and a
//! [`reqwest_middleware::Middleware`] driving [`PayerClient`](subrav_payer::PayerClient)'s
//! proactive payment handshake around outgoing requests.

pub mod middleware;
pub mod transport;

pub use middleware::{PayerMiddlewareError, SubravPayments};
pub use transport::{HttpPayeeTransport, HttpTransportError};
