//! Peerbook Address Book
//!
//! Remembers which remote endpoints exist, tracks their dial history, and
//! persists that knowledge across restarts so a node can reconnect to a
//! healthy peer set without re-discovering the whole network.
//!
//! ## Modules
//! - `endpoint`: Network endpoint value type and routability rules
//! - `known`: Per-endpoint attempt/success record with its own lock
//! - `book`: The address book itself and its background save task
//! - `persist`: Snapshot document, atomic file writes, and loading
//! - `identity`: Node identity key generation
//! - `config`: Address book configuration
//! - `error`: Error types shared across the crate
//!
//! ## Lock ordering
//! The book-wide lock is always acquired before any record lock. Record
//! methods never touch the book-wide lock, so a dial outcome can be
//! recorded through an `Arc<KnownEndpoint>` handle without blocking
//! structural operations.

pub mod book;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod known;
pub mod persist;

// ------------------------------------------------------------
// Re-exports for workspace-wide use
// ------------------------------------------------------------

pub use book::{AddressBook, SaveOutcome};
pub use config::{
    AddressBookConfig, DEFAULT_FILE_MODE, DEFAULT_SAVE_INTERVAL, MAX_SAVE_INTERVAL,
};
pub use endpoint::Endpoint;
pub use error::AddressBookError;
pub use identity::{Ed25519Identity, IdentityProvider};
pub use known::{ConnectionStats, KnownEndpoint, KnownEndpointSnapshot};
pub use persist::AddressBookFile;
