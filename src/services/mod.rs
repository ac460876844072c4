//! Collaborators behind the HTTP layer: credential checks and request timing.

pub mod credentials;
pub mod perf;

pub use credentials::{Account, CredentialVerifier, StaticAccounts};
pub use perf::{NoopCollector, PerfCollector, PerfSnapshot, PerfStore, TimingEntry};
