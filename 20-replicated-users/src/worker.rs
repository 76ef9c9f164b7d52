use std::{future::Future, net::SocketAddr};

use anyhow::Result;
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::http;
use crate::replication::ReplicationLink;
use crate::runtime::{StoreHandle, spawn_store};
use crate::store::UserStore;

/// One worker: an HTTP listener, the store actor behind it and, when a
/// supervisor is configured, the replication link.
pub struct Worker {
    listener: TcpListener,
    store: StoreHandle,
    link: Option<ReplicationLink>,
    actor: JoinHandle<()>,
}

impl Worker {
    /// Builds the worker's store and, if `supervisor` is set, connects it to
    /// the relay before any request can be served.
    pub async fn start(listener: TcpListener, supervisor: Option<SocketAddr>) -> Result<Self> {
        let (store, actor, link) = match supervisor {
            Some(relay) => {
                let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
                let (store, actor) = spawn_store(UserStore::with_publisher(outbox_tx));
                let link = ReplicationLink::connect(relay, store.clone(), outbox_rx).await?;
                (store, actor, Some(link))
            }
            None => {
                let (store, actor) = spawn_store(UserStore::new());
                (store, actor, None)
            }
        };

        Ok(Self {
            listener,
            store,
            link,
            actor,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn store(&self) -> StoreHandle {
        self.store.clone()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Worker {
            listener,
            store,
            link,
            actor,
        } = self;
        let mode = if link.is_some() { "replicated" } else { "standalone" };
        info!(pid = std::process::id(), addr = %listener.local_addr()?, mode, "worker serving");

        let result = http::serve(listener, http::app(store), shutdown).await;

        drop(link);
        actor.abort();
        result
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(ctrl_c()).await
    }
}

pub(crate) async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to install ctrl-c handler");
    }
}
