use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::user::User;

/// Messages exchanged between workers and the supervisor relay.
///
/// Workers send `sync` after every local mutation and the relay sends the
/// very same message back to every worker, so one type serves both directions.
/// On the wire: `{"op":"sync","snapshot":[...]}`, one message per line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplicationMessage {
    Sync { snapshot: Vec<User> },
}

impl ReplicationMessage {
    /// Reads the next message, skipping blank lines. `Ok(None)` means the peer
    /// closed the stream.
    pub async fn read_from<R>(reader: &mut R) -> io::Result<Option<Self>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_str(line).map(Some).map_err(invalid_data);
        }
        Ok(None)
    }

    /// Writes the message as a single line and flushes.
    pub async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut frame = serde_json::to_string(self).map_err(invalid_data)?;
        frame.push('\n');
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await
    }
}

fn invalid_data(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
