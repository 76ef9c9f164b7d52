//! Worker side of the replication channel.
//!
//! A worker keeps one TCP connection to the supervisor relay. Two tasks share
//! it: the writer drains the store's outbound queue and ships each snapshot,
//! the reader applies every broadcast it receives (its own included) through
//! the [`StoreHandle`].
//!
//! Sends are fire-and-forget. A failed write is logged and the snapshot is
//! dropped; no retry, no report to the HTTP client.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{
    io::BufReader,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::message::ReplicationMessage;
use crate::runtime::StoreHandle;

/// Running link between one worker and the supervisor relay.
pub struct ReplicationLink {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ReplicationLink {
    /// Connects to the relay and starts forwarding in both directions.
    ///
    /// `outbox` is the receiving end of the channel handed to
    /// [`UserStore::with_publisher`](crate::store::UserStore::with_publisher).
    pub async fn connect(
        relay: SocketAddr,
        store: StoreHandle,
        outbox: mpsc::UnboundedReceiver<ReplicationMessage>,
    ) -> Result<Self> {
        let stream = TcpStream::connect(relay)
            .await
            .with_context(|| format!("failed to connect to supervisor relay at {relay}"))?;
        info!(%relay, "connected to supervisor relay");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: tokio::spawn(apply_broadcasts(BufReader::new(reader), store)),
            writer: tokio::spawn(forward_snapshots(writer, outbox)),
        })
    }

    pub fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for ReplicationLink {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn apply_broadcasts(mut reader: BufReader<OwnedReadHalf>, store: StoreHandle) {
    loop {
        match ReplicationMessage::read_from(&mut reader).await {
            Ok(Some(ReplicationMessage::Sync { snapshot })) => {
                if let Err(error) = store.replace_snapshot(snapshot) {
                    debug!(?error, "store stopped; no longer applying broadcasts");
                    return;
                }
            }
            Ok(None) => {
                warn!("supervisor closed the replication channel; serving last snapshot");
                return;
            }
            Err(error) => {
                warn!(?error, "replication channel failed; serving last snapshot");
                return;
            }
        }
    }
}

async fn forward_snapshots(
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::UnboundedReceiver<ReplicationMessage>,
) {
    while let Some(message) = outbox.recv().await {
        if let Err(error) = message.write_to(&mut writer).await {
            warn!(?error, "failed to send snapshot to supervisor");
        }
    }
}
