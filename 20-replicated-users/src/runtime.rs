//! Store actor for a single worker.
//!
//! The actor task owns the worker's [`UserStore`] outright. Everything else
//! (HTTP handlers, the replication link) talks to it through a cloneable
//! [`StoreHandle`]:
//!
//! - **HTTP handlers** buffer the request body, then hand method, path and
//!   bytes to the actor, which routes and mutates in one uninterrupted step.
//! - **Replication link** forwards broadcast snapshots, which the actor
//!   applies through the same queue.
//!
//! Because every request is handled to completion before the next one is
//! taken from the queue, two mutations never interleave within a worker.

use std::panic::{self, AssertUnwindSafe};

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::http::Method;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::ApiError;
use crate::router::{self, Reply};
use crate::store::UserStore;
use crate::user::User;

/// Requests processed by the store actor.
enum StoreRequest {
    Dispatch {
        method: Method,
        path: String,
        body: Bytes,
        respond_to: oneshot::Sender<Reply>,
    },
    Replace {
        snapshot: Vec<User>,
    },
    List {
        respond_to: oneshot::Sender<Vec<User>>,
    },
}

/// Handle for sending requests to a running store actor.
#[derive(Clone)]
pub struct StoreHandle {
    request_tx: mpsc::UnboundedSender<StoreRequest>,
}

impl StoreHandle {
    /// Routes one HTTP request against the store and waits for the reply.
    ///
    /// # Errors
    /// Fails only when the actor has stopped.
    pub async fn dispatch(&self, method: Method, path: String, body: Bytes) -> Result<Reply> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.request_tx
            .send(StoreRequest::Dispatch {
                method,
                path,
                body,
                respond_to: resp_tx,
            })
            .context("failed to send dispatch request")?;
        resp_rx.await.context("dispatch response channel closed")
    }

    /// Queues a snapshot received from the supervisor. Does not wait.
    pub fn replace_snapshot(&self, snapshot: Vec<User>) -> Result<()> {
        self.request_tx
            .send(StoreRequest::Replace { snapshot })
            .context("failed to send replace request")
    }

    /// Returns the actor's current snapshot.
    pub async fn list(&self) -> Result<Vec<User>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.request_tx
            .send(StoreRequest::List {
                respond_to: resp_tx,
            })
            .context("failed to send list request")?;
        resp_rx.await.context("list response channel closed")
    }
}

/// Spawns the actor that owns `store`.
///
/// The actor stops once every [`StoreHandle`] has been dropped.
pub fn spawn_store(store: UserStore) -> (StoreHandle, JoinHandle<()>) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_store(store, request_rx));
    (StoreHandle { request_tx }, task)
}

async fn run_store(mut store: UserStore, mut requests: mpsc::UnboundedReceiver<StoreRequest>) {
    while let Some(request) = requests.recv().await {
        match request {
            StoreRequest::Dispatch {
                method,
                path,
                body,
                respond_to,
            } => {
                let reply = route_guarded(|| router::dispatch(&mut store, &method, &path, &body));
                debug!(%method, %path, status = %reply.status, "request routed");
                // The caller may have gone away; nothing to do about it.
                let _ = respond_to.send(reply);
            }
            StoreRequest::Replace { snapshot } => {
                info!(
                    pid = std::process::id(),
                    users = snapshot.len(),
                    "updating users from supervisor broadcast"
                );
                store.replace_snapshot(snapshot);
            }
            StoreRequest::List { respond_to } => {
                let _ = respond_to.send(store.list().to_vec());
            }
        }
    }
    debug!("store actor stopped");
}

/// Runs one routing step inside the actor. A panic becomes a 500 for that
/// request only; the actor keeps serving.
fn route_guarded<F>(route: F) -> Reply
where
    F: FnOnce() -> Reply,
{
    match panic::catch_unwind(AssertUnwindSafe(route)) {
        Ok(reply) => reply,
        Err(_) => {
            error!("routing panicked; replying with an internal error");
            ApiError::Internal.into()
        }
    }
}
