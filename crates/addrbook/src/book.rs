//! The peer address book.
//!
//! Two tiers of locking:
//! 1. `Shared::state` (book-wide) guards the own-address and peer maps.
//! 2. Each [`KnownEndpoint`] guards its own stats.
//!
//! The book-wide lock is always taken first. Record locks are taken either
//! while the book-wide lock is held (enumeration, snapshotting) or after it
//! has been released (dial outcome reporting). A record lock is never held
//! while waiting for the book-wide lock.
//!
//! Saves additionally go through `Shared::writer`, which is taken before the
//! book-wide lock and held across the file write so that the periodic task
//! and explicit [`AddressBook::save`] calls never interleave their renames.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::AddressBookConfig;
use crate::endpoint::Endpoint;
use crate::error::AddressBookError;
use crate::identity::{Ed25519Identity, IdentityProvider};
use crate::known::{KnownEndpoint, KnownEndpointSnapshot};
use crate::persist::{self, AddressBookFile};

/// Result of a snapshot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The book was empty; the file on disk was left alone.
    Skipped,
    Written { peers: usize },
}

#[derive(Debug, Default)]
struct BookState {
    our_addrs: HashMap<String, Endpoint>,
    peers: HashMap<String, Arc<KnownEndpoint>>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<BookState>,
    writer: Mutex<()>,
    key: String,
    file_path: PathBuf,
    file_mode: u32,
}

impl Shared {
    fn size(&self) -> usize {
        self.state.lock().peers.len()
    }

    fn save(&self) -> Result<SaveOutcome, AddressBookError> {
        let _writer = self.writer.lock();

        let addrs: Vec<KnownEndpointSnapshot> = {
            let state = self.state.lock();
            state.peers.values().map(|known| known.snapshot()).collect()
        };

        if addrs.is_empty() {
            debug!(path = %self.file_path.display(), "Address book empty, skipping save");
            return Ok(SaveOutcome::Skipped);
        }

        let peers = addrs.len();
        let file = AddressBookFile {
            key: self.key.clone(),
            addrs,
        };
        persist::store_snapshot(&self.file_path, &file, self.file_mode)?;
        debug!(path = %self.file_path.display(), peers, "Address book saved");
        Ok(SaveOutcome::Written { peers })
    }

    async fn save_in_background(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        match tokio::task::spawn_blocking(move || shared.save()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                error!(path = %self.file_path.display(), "Failed to save address book: {}", err);
            }
            Err(err) => {
                error!("Address book save task panicked: {}", err);
            }
        }
    }
}

/// Store of known peer endpoints and the node's own listening addresses.
///
/// Loaded from disk on construction, snapshotted periodically by a
/// background task owned by this instance, and flushed on [`stop`].
///
/// [`stop`]: AddressBook::stop
#[derive(Debug)]
pub struct AddressBook {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    save_task: Mutex<Option<JoinHandle<()>>>,
}

impl AddressBook {
    /// Open the book at `path` with default settings.
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self, AddressBookError> {
        Self::open(AddressBookConfig::new(path))
    }

    /// Open the book using an Ed25519 identity key.
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn open(config: AddressBookConfig) -> Result<Self, AddressBookError> {
        Self::open_with_identity(config, &Ed25519Identity)
    }

    /// Open the book, generating identity material with `identity`.
    ///
    /// A key generation failure is logged and the book continues with an
    /// empty key. A snapshot that exists but cannot be read or parsed is
    /// returned as an error; callers should refuse to start.
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn open_with_identity(
        config: AddressBookConfig,
        identity: &dyn IdentityProvider,
    ) -> Result<Self, AddressBookError> {
        let mut key = match identity.generate_key() {
            Ok(bytes) => hex::encode(bytes),
            Err(err) => {
                error!("Identity key generation failed, continuing without key: {}", err);
                String::new()
            }
        };

        let mut state = BookState::default();
        match persist::load_snapshot(&config.file_path) {
            Ok(Some(file)) => {
                key = file.key;
                for snapshot in file.addrs {
                    let known = KnownEndpoint::from_snapshot(snapshot);
                    state.peers.insert(known.key(), Arc::new(known));
                }
                info!(
                    path = %config.file_path.display(),
                    peers = state.peers.len(),
                    "Loaded address book"
                );
            }
            Ok(None) => {
                info!(path = %config.file_path.display(), "No address book found, starting empty");
            }
            Err(err) => {
                error!(path = %config.file_path.display(), "Cannot load address book: {}", err);
                return Err(err);
            }
        }

        let save_interval = config.effective_save_interval();
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            writer: Mutex::new(()),
            key,
            file_path: config.file_path,
            file_mode: config.file_mode,
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(save_routine(
            Arc::clone(&shared),
            save_interval,
            shutdown_rx,
        ));

        Ok(Self {
            shared,
            shutdown,
            save_task: Mutex::new(Some(handle)),
        })
    }

    /// Register one of the node's own listening addresses so it is never
    /// dialled. Evicts it from the peer set if it was learned earlier.
    pub fn add_our_address(&self, addr: Endpoint) {
        let key = addr.key();
        let mut state = self.shared.state.lock();
        info!(addr = %key, "Add our address to book");
        if state.peers.remove(&key).is_some() {
            warn!(addr = %key, "Own address was known as a peer, removed");
        }
        state.our_addrs.insert(key, addr);
    }

    /// Add a peer endpoint. Returns whether a new record was created.
    ///
    /// Non-routable and own addresses are rejected with a warning. Adding an
    /// endpoint that is already known keeps its existing history.
    pub fn add_address(&self, addr: Endpoint) -> bool {
        let key = addr.key();
        let mut state = self.shared.state.lock();

        if !addr.is_routable() {
            warn!(addr = %key, "Cannot add non-routable address");
            return false;
        }
        if state.our_addrs.contains_key(&key) {
            warn!(addr = %key, "Ignoring our own listen address");
            return false;
        }
        if state.peers.contains_key(&key) {
            debug!(addr = %key, "Address already known");
            return false;
        }

        info!(addr = %key, "Add address to book");
        state.peers.insert(key, Arc::new(KnownEndpoint::new(addr)));
        true
    }

    /// Remove the peer keyed by `key`. Returns whether it was present.
    pub fn remove_addr(&self, key: &str) -> bool {
        let mut state = self.shared.state.lock();
        warn!(peer = %key, "Remove address from book");
        state.peers.remove(key).is_some()
    }

    /// Snapshot of every known peer regardless of attempt history.
    pub fn get_peers(&self) -> Vec<KnownEndpointSnapshot> {
        let state = self.shared.state.lock();
        state.peers.values().map(|known| known.snapshot()).collect()
    }

    /// Canonical strings of peers with zero attempts: the dial candidates.
    pub fn get_addrs(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        state
            .peers
            .iter()
            .filter(|(_, known)| known.attempt_count() == 0)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn size(&self) -> usize {
        self.shared.size()
    }

    /// Handle to the live record for `key`, for reporting dial outcomes.
    pub fn peer(&self, key: &str) -> Option<Arc<KnownEndpoint>> {
        self.shared.state.lock().peers.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shared.state.lock().peers.contains_key(key)
    }

    pub fn is_our_address(&self, addr: &Endpoint) -> bool {
        self.shared.state.lock().our_addrs.contains_key(&addr.key())
    }

    pub fn our_addresses(&self) -> Vec<Endpoint> {
        self.shared.state.lock().our_addrs.values().copied().collect()
    }

    /// Record a dial attempt on `key`. Returns false if the peer is unknown.
    pub fn mark_attempt(&self, key: &str) -> bool {
        match self.peer(key) {
            Some(known) => {
                known.mark_attempt();
                true
            }
            None => false,
        }
    }

    /// Record a successful dial on `key`. Returns false if the peer is unknown.
    pub fn mark_success(&self, key: &str) -> bool {
        match self.peer(key) {
            Some(known) => {
                known.mark_success();
                true
            }
            None => false,
        }
    }

    /// Hex-encoded identity key; empty if generation failed and no snapshot
    /// supplied one.
    pub fn identity_key(&self) -> &str {
        &self.shared.key
    }

    /// Identity key for consumers that cannot operate without one.
    pub fn require_identity_key(&self) -> Result<&str, AddressBookError> {
        if self.shared.key.is_empty() {
            return Err(AddressBookError::MissingIdentity);
        }
        Ok(&self.shared.key)
    }

    pub fn file_path(&self) -> &Path {
        &self.shared.file_path
    }

    /// Synchronously snapshot the book to its file.
    pub fn save(&self) -> Result<SaveOutcome, AddressBookError> {
        info!(size = self.size(), "Saving address book to file");
        self.shared.save()
    }

    /// Signal the save task to flush and exit, then wait for it.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let handle = self.save_task.lock().take();
        match handle {
            Some(handle) => {
                if let Err(err) = handle.await {
                    error!("Address book save task failed: {}", err);
                }
            }
            None => debug!("Address book already stopped"),
        }
    }
}

async fn save_routine(
    shared: Arc<Shared>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let start = Instant::now()
        .checked_add(period)
        .unwrap_or_else(Instant::now);
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => shared.save_in_background().await,
            // Fires on stop() and when the book is dropped.
            _ = shutdown.changed() => break,
        }
    }

    shared.save_in_background().await;
    warn!(size = shared.size(), "Address book save task done");
}
