//! Default [`MessageQueue`] implementation, over a bounded `tokio::sync::mpsc` channel.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::timeout;

use crate::command::Command;
use crate::interface::MessageQueue;

/// A [`MessageQueue`] backed by a bounded multi-producer, single-consumer channel.
///
/// Producer handles share one `Arc<ChannelMessageQueue>` rather than each holding their own
/// `tokio::sync::mpsc::Sender`, so `recv`'s "no sender remains" case only triggers once every
/// `Arc` to this queue is dropped, including the worker's own — in practice, a graceful shutdown
/// still goes through [`crate::command::CommandKind::Terminate`] rather than waiting on that.
pub struct ChannelMessageQueue {
    sender: Sender<Command>,
    receiver: Mutex<Receiver<Command>>,
}

impl ChannelMessageQueue {
    /// Create a new queue with the given bounded capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Get a cloneable sending handle, independent of this queue's single receive side.
    #[must_use]
    pub fn sender(&self) -> Sender<Command> {
        self.sender.clone()
    }
}

#[async_trait]
impl MessageQueue for ChannelMessageQueue {
    async fn send(&self, command: Command, wait: Duration) -> Result<(), Command> {
        // Reserve a slot first, then hand the command to the permit. This keeps `command` in
        // our own stack frame the whole time, so a timed-out reservation hands it straight back
        // instead of racing to reclaim it from a half-completed send.
        match timeout(wait, self.sender.reserve()).await {
            Ok(Ok(permit)) => {
                permit.send(command);
                Ok(())
            }
            Ok(Err(_)) | Err(_) => Err(command),
        }
    }

    async fn recv(&self, wait: Duration) -> Result<Option<Command>, ()> {
        let mut receiver = self.receiver.lock().await;
        match timeout(wait, receiver.recv()).await {
            Ok(Some(command)) => Ok(Some(command)),
            Ok(None) => Err(()),
            Err(_) => Ok(None),
        }
    }
}
