// ABOUTME: In-memory session store mapping account ids to pending or active sessions.
// ABOUTME: Reservations claim an id before connecting and roll back on drop unless committed.

use crate::heartbeat::HeartbeatHandle;
use crate::metrics;
use relaybot_platform::{SharedConnection, UserInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// A logged-in platform account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "profileUrl")]
    pub profile_url: String,
    #[serde(rename = "thumbSrc")]
    pub avatar_url: String,
}

impl Account {
    pub fn from_user_info(id: impl Into<String>, info: UserInfo) -> Self {
        Self {
            id: id.into(),
            display_name: info.name,
            profile_url: info.profile_url,
            avatar_url: info.thumb_src,
        }
    }
}

/// Public view of a store slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    /// Login in flight
    Pending,
    Active(Account),
}

struct ActiveSession {
    account: Account,
    connection: SharedConnection,
    heartbeat: Option<HeartbeatHandle>,
    listener: Option<JoinHandle<()>>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

enum Slot {
    Pending,
    Active(ActiveSession),
}

struct Entry {
    generation: u64,
    slot: Slot,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<String, Entry>,
    next_generation: u64,
}

impl Inner {
    fn active_count(&self) -> usize {
        self.slots
            .values()
            .filter(|e| matches!(e.slot, Slot::Active(_)))
            .count()
    }
}

/// Account id -> session slot. Cloning shares the same store.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<Inner>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `id` for a new login.
    ///
    /// Returns the current slot state when the id is already pending or active.
    pub fn reserve(&self, id: &str) -> Result<Reservation, SlotState> {
        let mut inner = self.lock();
        if let Some(entry) = inner.slots.get(id) {
            return Err(match &entry.slot {
                Slot::Pending => SlotState::Pending,
                Slot::Active(session) => SlotState::Active(session.account.clone()),
            });
        }

        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner.slots.insert(
            id.to_string(),
            Entry {
                generation,
                slot: Slot::Pending,
            },
        );
        tracing::debug!(account_id = %id, generation, "Reserved session slot");

        Ok(Reservation {
            store: self.clone(),
            id: id.to_string(),
            generation,
            committed: false,
        })
    }

    pub fn get(&self, id: &str) -> Option<SlotState> {
        self.lock().slots.get(id).map(|entry| match &entry.slot {
            Slot::Pending => SlotState::Pending,
            Slot::Active(session) => SlotState::Active(session.account.clone()),
        })
    }

    /// Active accounts, ordered by id
    pub fn accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self
            .lock()
            .slots
            .values()
            .filter_map(|entry| match &entry.slot {
                Slot::Active(session) => Some(session.account.clone()),
                Slot::Pending => None,
            })
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        accounts
    }

    pub fn connection(&self, id: &str) -> Option<SharedConnection> {
        match &self.lock().slots.get(id)?.slot {
            Slot::Active(session) => Some(session.connection.clone()),
            Slot::Pending => None,
        }
    }

    /// Number of slots, pending included
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.lock().active_count()
    }

    /// Remove a slot, stopping its heartbeat and listener
    pub fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut inner = self.lock();
            let removed = inner.slots.remove(id);
            metrics::set_active_sessions(inner.active_count());
            removed
        };
        removed.is_some()
    }

    /// Remove `id` only if it still belongs to `generation`
    pub(crate) fn remove_generation(&self, id: &str, generation: u64) -> bool {
        let removed = {
            let mut inner = self.lock();
            match inner.slots.get(id) {
                Some(entry) if entry.generation == generation => {
                    let removed = inner.slots.remove(id);
                    metrics::set_active_sessions(inner.active_count());
                    removed
                }
                _ => None,
            }
        };
        removed.is_some()
    }

    /// Run `f` on the active session for (`id`, `generation`)
    fn with_active<R>(
        &self,
        id: &str,
        generation: u64,
        f: impl FnOnce(&mut ActiveSession) -> R,
    ) -> Option<R> {
        let mut inner = self.lock();
        match inner.slots.get_mut(id) {
            Some(Entry {
                generation: g,
                slot: Slot::Active(session),
            }) if *g == generation => Some(f(session)),
            _ => None,
        }
    }

    /// Remove every slot and log out every active connection
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, Entry)> = {
            let mut inner = self.lock();
            let drained = inner.slots.drain().collect();
            metrics::set_active_sessions(0);
            drained
        };

        tracing::info!(count = drained.len(), "Shutting down sessions");

        for (id, entry) in drained {
            if let Slot::Active(mut session) = entry.slot {
                session.heartbeat.take();
                if let Some(listener) = session.listener.take() {
                    listener.abort();
                }
                if let Err(e) = session.connection.logout().await {
                    tracing::warn!(account_id = %id, error = %e, "Logout failed during shutdown");
                }
            }
        }
    }
}

/// Claim on a store slot held while a login is in flight.
///
/// Dropping an uncommitted reservation removes the slot, which also stops any
/// heartbeat or listener attached to it.
pub struct Reservation {
    store: SessionStore,
    id: String,
    generation: u64,
    committed: bool,
}

impl Reservation {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Promote the slot to active. Returns false if the slot was removed meanwhile.
    pub fn activate(&self, account: Account, connection: SharedConnection) -> bool {
        let mut inner = self.store.lock();
        let activated = match inner.slots.get_mut(&self.id) {
            Some(entry) if entry.generation == self.generation => {
                entry.slot = Slot::Active(ActiveSession {
                    account,
                    connection,
                    heartbeat: None,
                    listener: None,
                });
                true
            }
            _ => false,
        };
        metrics::set_active_sessions(inner.active_count());
        activated
    }

    /// Hand the heartbeat to the slot. It is dropped (stopped) if the slot is gone.
    pub fn attach_heartbeat(&self, handle: HeartbeatHandle) -> bool {
        let mut handle = Some(handle);
        self.store
            .with_active(&self.id, self.generation, |session| {
                session.heartbeat = handle.take();
            })
            .is_some()
    }

    /// Hand the listener task to the slot. It is aborted if the slot is gone.
    pub fn attach_listener(&self, task: JoinHandle<()>) -> bool {
        let mut task = Some(task);
        let attached = self
            .store
            .with_active(&self.id, self.generation, |session| {
                session.listener = task.take();
            })
            .is_some();
        if let Some(task) = task {
            task.abort();
        }
        attached
    }

    /// Keep the slot after this reservation is dropped
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed && self.store.remove_generation(&self.id, self.generation) {
            tracing::debug!(account_id = %self.id, "Rolled back session reservation");
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("committed", &self.committed)
            .finish()
    }
}
