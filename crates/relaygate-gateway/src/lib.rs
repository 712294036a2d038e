//! RelayGate dispatch core.
//!
//! Accepts decoded message envelopes and dispatches them to isolated
//! per-platform adapter processes, brokering OAuth2/PNBA auth flows on
//! their behalf. Built from four pieces: the adapter [`registry`], the
//! process [`ipc`] handler, the [`manager`] orchestrator, and the
//! collaborator traits ([`vault`], [`reliability`], [`notify`]) the host
//! wires in.
//!
//! Encryption and platform API clients live outside this crate: envelopes
//! arrive already decoded, ciphertext arrives already decrypted, and the
//! adapters own their platform SDKs.

pub mod config;
pub mod error;
pub mod ipc;
pub mod manager;
pub mod notify;
pub mod registry;
pub mod reliability;
pub mod vault;

pub use config::{load_config, GatewayConfig};
pub use error::{GatewayError, GatewayResult};
pub use ipc::{IpcHandler, ProcessState};
pub use manager::{
    AdapterDiscovery, DispatchOutcome, NoDiscovery, OAuth2Authorization, PnbaExchange,
    RelayManager,
};
pub use notify::{LogNotifier, PublicationNotifier, PublishStatus};
pub use registry::{AdapterManifest, AdapterRegistry, LaunchSpec};
pub use reliability::{ProbeTimes, ReliabilityScorer, WindowScorer};
pub use vault::{mask, InMemoryVault, TokenMetadata, TokenVault};
