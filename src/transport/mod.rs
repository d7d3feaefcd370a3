//! Line-delimited JSON transport.
//!
//! The host side of the bridge speaks one [`HostMessage`] per line: method
//! calls go out through a writer task fed by a
//! [`ChannelDispatcher`](crate::dispatch::ChannelDispatcher), events come in
//! through [`pump_events`], which emits them on the [`EventBus`].

mod message;

pub use message::HostMessage;

use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_stream::{StreamExt, wrappers::SplitStream};
use tracing::{debug, warn};

use crate::{BridgeError, BridgeResult, event_bus::EventBus, payload};

/// Spawns a task writing every queued message as one JSON line. The task ends
/// when all senders are dropped.
pub fn spawn_writer<W>(writer: W, rx: mpsc::Receiver<HostMessage>) -> JoinHandle<BridgeResult<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(writer_loop(rx, writer))
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<HostMessage>, mut writer: W) -> BridgeResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message)
            .map_err(|e| BridgeError::transport(format!("failed to encode message: {}", e)))?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .map_err(|e| BridgeError::transport(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| BridgeError::transport(e.to_string()))?;
        debug!("Posted {}", message.event_type);
    }
    Ok(())
}

/// Reads host events line by line and emits them on `bus` until the reader is
/// exhausted. Blank lines are skipped; malformed lines are logged and skipped.
/// Returns the number of emitted events.
pub async fn pump_events<R>(reader: R, bus: &EventBus) -> BridgeResult<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = SplitStream::new(tokio::io::AsyncBufReadExt::split(reader, b'\n'));
    let mut emitted = 0;
    while let Some(line) = lines.next().await {
        let line = line.map_err(|e| BridgeError::transport(e.to_string()))?;
        let line = match String::from_utf8(line) {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping host message that is not UTF-8: {}", e);
                continue;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match payload::parse_str::<HostMessage>(line) {
            Ok(message) => {
                bus.emit(message.event_type.as_str(), &message.event_data);
                emitted += 1;
            }
            Err(e) => warn!("Skipping malformed host message: {}", e),
        }
    }
    Ok(emitted)
}
