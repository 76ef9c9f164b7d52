//! In-memory user storage owned by a single worker.
//!
//! Every worker holds its own `UserStore`. Local mutations publish the full
//! post-mutation snapshot to the supervisor, and the supervisor's broadcast
//! comes back through [`UserStore::replace_snapshot`], which overwrites the
//! local state wholesale.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::ReplicationMessage;
use crate::user::{User, UserDraft, UserPatch};

/// Ordered list of users plus an optional outbound replication channel.
///
/// # Why a `Vec` instead of a map?
///
/// The snapshot is an ordered sequence: `list()` returns users in insertion
/// order and replicas must agree on that order after a broadcast. Lookups are
/// linear, which is fine for the record counts this service holds.
///
/// # Publishing
///
/// `create`, `update` and `delete` push a `sync` message after they actually
/// change the snapshot. `replace_snapshot` never does; otherwise every
/// broadcast would trigger another one.
#[derive(Default)]
pub struct UserStore {
    users: Vec<User>,
    publisher: Option<UnboundedSender<ReplicationMessage>>,
}

impl UserStore {
    /// Creates a store that never publishes (standalone worker, tests).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that pushes its snapshot into `publisher` after each
    /// local mutation.
    pub fn with_publisher(publisher: UnboundedSender<ReplicationMessage>) -> Self {
        Self {
            users: Vec::new(),
            publisher: Some(publisher),
        }
    }

    pub fn list(&self) -> &[User] {
        &self.users
    }

    pub fn get(&self, id: &Uuid) -> Option<&User> {
        self.users.iter().find(|user| &user.id == id)
    }

    /// Mints a fresh id, appends the user and returns a copy of it.
    pub fn create(&mut self, draft: UserDraft) -> User {
        let mut user = User::mint(draft);
        // Ids stay unique within a snapshot.
        while self.get(&user.id).is_some() {
            user.id = Uuid::new_v4();
        }
        self.users.push(user.clone());
        self.publish();
        user
    }

    /// Applies a sparse patch. Returns `None` without touching anything when
    /// no user has `id`.
    pub fn update(&mut self, id: &Uuid, patch: UserPatch) -> Option<User> {
        let user = self.users.iter_mut().find(|user| &user.id == id)?;
        user.apply(patch);
        let updated = user.clone();
        self.publish();
        Some(updated)
    }

    /// Removes the user with `id`. Unknown ids are a silent no-op.
    pub fn delete(&mut self, id: &Uuid) -> bool {
        let before = self.users.len();
        self.users.retain(|user| &user.id != id);
        let removed = self.users.len() != before;
        if removed {
            self.publish();
        }
        removed
    }

    /// Overwrites the local snapshot with one received from the relay.
    pub fn replace_snapshot(&mut self, snapshot: Vec<User>) {
        self.users = snapshot;
    }

    fn publish(&self) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let message = ReplicationMessage::Sync {
            snapshot: self.users.clone(),
        };
        // Fire-and-forget: a dead link only costs replication, not the request.
        if let Err(error) = publisher.send(message) {
            warn!(?error, "failed to queue snapshot for the supervisor");
        } else {
            debug!(users = self.users.len(), "queued snapshot for the supervisor");
        }
    }
}
