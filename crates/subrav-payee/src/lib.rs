//! The payee payment processor and reactive claim scheduler (spec §4.4,
//! §4.5). Two independent pieces wired together only through
//! [`scheduler::ClaimNotifier`]: the processor runs inline with a request,
//! the scheduler runs as a long-lived background worker.

pub mod processor;
pub mod scheduler;

pub use processor::{PaymentProcessor, ProcessorConfig};
pub use scheduler::{ClaimNotifier, ClaimScheduler, NoHubBalanceGate, SchedulerPolicy};
