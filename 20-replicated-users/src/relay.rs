//! Supervisor side of the replication channel.
//!
//! The relay accepts one TCP connection per worker. Every `sync` message read
//! from any worker goes into a single Tokio `broadcast` channel, and every
//! connection drains that channel back to its worker, sender included. A single
//! queue means all workers observe snapshots in the same order the relay
//! received them. The relay keeps no copy of the data.

use std::{future::Future, net::SocketAddr};

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, BufReader},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    select,
    sync::broadcast,
};
use tracing::{debug, info, warn};

use crate::message::ReplicationMessage;

/// Snapshots are full overwrites, so a worker that lags past this many only
/// loses intermediate states.
const FEED_CAPACITY: usize = 128;

pub struct Relay {
    listener: TcpListener,
    feed: broadcast::Sender<ReplicationMessage>,
}

impl Relay {
    pub fn new(listener: TcpListener) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self { listener, feed }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            feed: self.feed.clone(),
        }
    }

    /// Accepts workers until `shutdown` resolves. Connections already open keep
    /// running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let feed = self.feed.clone();
                        tokio::spawn(async move {
                            if let Err(err) = serve_worker(stream, peer, feed).await {
                                warn!(%peer, error = ?err, "worker connection failed");
                            }
                        });
                    }
                    Err(err) => warn!(error = ?err, "failed to accept worker connection"),
                },
            }
        }
    }
}

/// Read-only view of a running relay.
#[derive(Clone)]
pub struct RelayHandle {
    feed: broadcast::Sender<ReplicationMessage>,
}

impl RelayHandle {
    /// Workers currently subscribed to broadcasts.
    pub fn connected_workers(&self) -> usize {
        self.feed.receiver_count()
    }
}

async fn serve_worker(
    stream: TcpStream,
    peer: SocketAddr,
    feed: broadcast::Sender<ReplicationMessage>,
) -> Result<()> {
    let (reader, writer) = stream.into_split();

    // The subscription is what makes a worker count as connected, so it exists
    // before anything this worker sends can be broadcast.
    let inbox = feed.subscribe();
    info!(%peer, connected = feed.receiver_count(), "worker joined relay");

    let delivery = tokio::spawn(deliver_broadcasts(writer, inbox, peer));
    let result = fan_out(&feed, &mut BufReader::new(reader), peer).await;

    delivery.abort();
    info!(%peer, "worker left relay");
    result
}

/// Pushes every snapshot a worker sends into the shared feed.
async fn fan_out<R>(
    feed: &broadcast::Sender<ReplicationMessage>,
    reader: &mut R,
    peer: SocketAddr,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(message) = ReplicationMessage::read_from(reader).await? {
        let ReplicationMessage::Sync { snapshot } = &message;
        debug!(%peer, users = snapshot.len(), "relaying snapshot");
        if feed.send(message).is_err() {
            // Only possible once every subscriber, this worker's included, is gone.
            debug!(%peer, "no workers left to receive snapshot");
        }
    }
    Ok(())
}

async fn deliver_broadcasts(
    mut writer: OwnedWriteHalf,
    mut inbox: broadcast::Receiver<ReplicationMessage>,
    peer: SocketAddr,
) {
    loop {
        match inbox.recv().await {
            Ok(message) => {
                if let Err(err) = message.write_to(&mut writer).await {
                    debug!(%peer, ?err, "failed to deliver snapshot to worker");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(%peer, skipped, "worker lagging behind broadcasts");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{sleep, timeout};
    use uuid::Uuid;

    use super::*;
    use crate::user::User;

    fn snapshot_of(username: &str) -> ReplicationMessage {
        ReplicationMessage::Sync {
            snapshot: vec![User {
                id: Uuid::new_v4(),
                username: username.into(),
                age: 1,
                hobbies: vec![],
            }],
        }
    }

    async fn wait_for(handle: &RelayHandle, expected: usize) {
        timeout(Duration::from_secs(3), async {
            while handle.connected_workers() != expected {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("relay membership");
    }

    #[tokio::test]
    async fn snapshots_reach_every_worker_in_arrival_order() {
        let relay = Relay::new(TcpListener::bind("127.0.0.1:0").await.expect("bind"));
        let addr = relay.local_addr().expect("addr");
        let handle = relay.handle();
        tokio::spawn(relay.run_until(std::future::pending()));

        let (one_rx, mut one_tx) = TcpStream::connect(addr).await.expect("connect").into_split();
        let (two_rx, _two_tx) = TcpStream::connect(addr).await.expect("connect").into_split();
        wait_for(&handle, 2).await;

        let first = snapshot_of("a");
        let second = snapshot_of("b");
        first.write_to(&mut one_tx).await.expect("send first");
        second.write_to(&mut one_tx).await.expect("send second");

        for reader in [one_rx, two_rx] {
            let mut reader = BufReader::new(reader);
            for expected in [&first, &second] {
                let got = ReplicationMessage::read_from(&mut reader)
                    .await
                    .expect("read")
                    .expect("message");
                assert_eq!(&got, expected);
            }
        }
    }

    #[tokio::test]
    async fn membership_follows_open_connections() {
        let relay = Relay::new(TcpListener::bind("127.0.0.1:0").await.expect("bind"));
        let addr = relay.local_addr().expect("addr");
        let handle = relay.handle();
        tokio::spawn(relay.run_until(std::future::pending()));
        assert_eq!(handle.connected_workers(), 0);

        let worker = TcpStream::connect(addr).await.expect("connect");
        wait_for(&handle, 1).await;

        drop(worker);
        wait_for(&handle, 0).await;
    }
}
