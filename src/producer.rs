//! The producer-facing handle: the thread-safe surface any number of tasks submit commands
//! through.
//!
//! `AgentHandle` never touches the protocol engine or the pending-ack table directly — it only
//! ever allocates a [`Command`] and hands it to the shared [`MessageQueue`]. This is what makes it
//! safe to clone and use concurrently from many tasks while exactly one worker task owns
//! everything downstream of the queue.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::command::{Command, CommandKind, CommandResult, CompletionCallback};
use crate::control_packet::{
    ConnectInfo, PublishInfo, QoS, SubscribeInfo, SubscribeReturnCode, SubscribeTopic,
    UnsubscribeInfo,
};
use crate::error::{AgentError, AgentErrorKind};
use crate::interface::{CommandAllocator, MessageQueue};
use crate::topic::{TopicFilter, TopicName};

/// A cloneable, thread-safe handle producer tasks use to submit commands to one agent worker.
///
/// Cloning an `AgentHandle` clones only the shared `Arc`s underneath it (the queue and the
/// allocator); there is no per-clone state.
pub struct AgentHandle<Q, A>
where
    Q: MessageQueue,
    A: CommandAllocator,
{
    queue: Arc<Q>,
    allocator: Arc<A>,
    send_timeout: Duration,
}

impl<Q, A> Clone for AgentHandle<Q, A>
where
    Q: MessageQueue,
    A: CommandAllocator,
{
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            allocator: Arc::clone(&self.allocator),
            send_timeout: self.send_timeout,
        }
    }
}

impl<Q, A> AgentHandle<Q, A>
where
    Q: MessageQueue,
    A: CommandAllocator + 'static,
{
    /// Build a new handle sharing `queue` and `allocator` with the worker that owns them.
    #[must_use]
    pub fn new(queue: Arc<Q>, allocator: Arc<A>, send_timeout: Duration) -> Self {
        Self {
            queue,
            allocator,
            send_timeout,
        }
    }

    /// Allocate and submit a command. Returns once the command is enqueued, before the worker has
    /// acted on it — `on_complete` is invoked later, from the worker task, with the final result.
    ///
    /// # Errors
    /// `NoMemory` if the allocator has no capacity left; `SendFailed` if the queue is full or
    /// closed past `send_timeout`. In both cases no record survives the call.
    async fn submit(&self, kind: CommandKind, on_complete: CompletionCallback) -> Result<(), AgentError> {
        if !self.allocator.try_reserve() {
            return Err(AgentError::new(AgentErrorKind::NoMemory));
        }
        let allocator = Arc::clone(&self.allocator);
        let wrapped: CompletionCallback = Box::new(move |result| {
            on_complete(result);
            allocator.release();
        });
        if self.queue.send(Command::new(kind, wrapped), self.send_timeout).await.is_err() {
            self.allocator.release();
            return Err(AgentError::new(AgentErrorKind::SendFailed));
        }
        Ok(())
    }

    /// Submit a command and block until its completion callback fires, returning the result
    /// directly instead of going through a caller-supplied callback.
    ///
    /// This is the idiomatic async replacement for the mutex/condition-variable pairing a
    /// synchronous API would need: a `tokio::sync::oneshot` channel plays the role of the
    /// condition variable, and `.await` plays the role of the wait.
    async fn submit_and_await(&self, kind: CommandKind) -> Result<(), AgentError> {
        let (tx, rx) = oneshot::channel();
        let on_complete: CompletionCallback = Box::new(move |result| {
            let _ = tx.send(result);
        });
        self.submit(kind, on_complete).await?;
        match rx.await {
            Ok(result) => result.into_result(),
            Err(_closed) => Err(AgentError::new(AgentErrorKind::RecvFailed)),
        }
    }

    /// Submit a CONNECT.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`].
    pub async fn connect(&self, info: ConnectInfo, on_complete: CompletionCallback) -> Result<(), AgentError> {
        self.submit(CommandKind::Connect(info), on_complete).await
    }

    /// Submit a CONNECT and wait for it to complete.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`], plus `RecvFailed` if the worker drops without completing it.
    pub async fn connect_and_await(&self, info: ConnectInfo) -> Result<(), AgentError> {
        self.submit_and_await(CommandKind::Connect(info)).await
    }

    /// Submit a PUBLISH.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`].
    pub async fn publish(&self, info: PublishInfo, on_complete: CompletionCallback) -> Result<(), AgentError> {
        self.submit(CommandKind::Publish(info), on_complete).await
    }

    /// Submit a PUBLISH and wait for it to complete (immediately for QoS 0).
    ///
    /// # Errors
    /// See [`AgentHandle::submit`], plus `RecvFailed` if the worker drops without completing it.
    pub async fn publish_and_await(&self, info: PublishInfo) -> Result<(), AgentError> {
        self.submit_and_await(CommandKind::Publish(info)).await
    }

    /// Parse `topic` and submit a single-filter PUBLISH, for callers that would rather not build
    /// a [`PublishInfo`] by hand.
    ///
    /// # Errors
    /// `BadParameter` if `topic` is not a valid MQTT topic name; otherwise as
    /// [`AgentHandle::publish`].
    pub async fn publish_str(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: impl Into<Bytes> + Send,
        on_complete: CompletionCallback,
    ) -> Result<(), AgentError> {
        let topic = TopicName::from_string(topic.to_string())
            .map_err(|_| AgentError::new(AgentErrorKind::BadParameter))?;
        self.publish(
            PublishInfo {
                topic,
                qos,
                retain,
                dup: false,
                payload: payload.into(),
            },
            on_complete,
        )
        .await
    }

    /// Submit a SUBSCRIBE.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`].
    pub async fn subscribe(&self, info: SubscribeInfo, on_complete: CompletionCallback) -> Result<(), AgentError> {
        if info.topics.is_empty() {
            return Err(AgentError::new(AgentErrorKind::BadParameter));
        }
        self.submit(CommandKind::Subscribe(info), on_complete).await
    }

    /// Submit a SUBSCRIBE and wait for its SUBACK, returning the broker's per-filter return codes
    /// in the same order as `info.topics`. A code of [`SubscribeReturnCode::Failure`] means the
    /// broker rejected that particular filter even though the packet itself was acknowledged —
    /// callers that care about per-filter acceptance must inspect this, not just the `Ok`.
    ///
    /// # Errors
    /// See [`AgentHandle::subscribe`], plus `RecvFailed` if the worker drops without completing
    /// it.
    pub async fn subscribe_and_await(
        &self,
        info: SubscribeInfo,
    ) -> Result<Vec<SubscribeReturnCode>, AgentError> {
        if info.topics.is_empty() {
            return Err(AgentError::new(AgentErrorKind::BadParameter));
        }
        let (tx, rx) = oneshot::channel();
        let on_complete: CompletionCallback = Box::new(move |result| {
            let _ = tx.send(result);
        });
        self.submit(CommandKind::Subscribe(info), on_complete).await?;
        match rx.await {
            Ok(CommandResult::SubscribeAck(codes)) => Ok(codes),
            Ok(CommandResult::Success) => Ok(Vec::new()),
            Ok(CommandResult::Failure(err)) => Err(err),
            Err(_closed) => Err(AgentError::new(AgentErrorKind::RecvFailed)),
        }
    }

    /// Parse `filter` and submit a single-filter SUBSCRIBE.
    ///
    /// # Errors
    /// `BadParameter` if `filter` is not a valid MQTT topic filter; otherwise as
    /// [`AgentHandle::subscribe`].
    pub async fn subscribe_str(
        &self,
        filter: &str,
        qos: QoS,
        on_complete: CompletionCallback,
    ) -> Result<(), AgentError> {
        let filter = TopicFilter::from_string(filter.to_string())
            .map_err(|_| AgentError::new(AgentErrorKind::BadParameter))?;
        self.subscribe(
            SubscribeInfo {
                topics: vec![SubscribeTopic { filter, qos }],
            },
            on_complete,
        )
        .await
    }

    /// Submit an UNSUBSCRIBE.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`].
    pub async fn unsubscribe(
        &self,
        info: UnsubscribeInfo,
        on_complete: CompletionCallback,
    ) -> Result<(), AgentError> {
        if info.filters.is_empty() {
            return Err(AgentError::new(AgentErrorKind::BadParameter));
        }
        self.submit(CommandKind::Unsubscribe(info), on_complete).await
    }

    /// Submit an UNSUBSCRIBE and wait for its UNSUBACK.
    ///
    /// # Errors
    /// See [`AgentHandle::unsubscribe`], plus `RecvFailed` if the worker drops without completing
    /// it.
    pub async fn unsubscribe_and_await(&self, info: UnsubscribeInfo) -> Result<(), AgentError> {
        if info.filters.is_empty() {
            return Err(AgentError::new(AgentErrorKind::BadParameter));
        }
        self.submit_and_await(CommandKind::Unsubscribe(info)).await
    }

    /// Submit a PINGREQ.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`].
    pub async fn ping(&self, on_complete: CompletionCallback) -> Result<(), AgentError> {
        self.submit(CommandKind::Ping, on_complete).await
    }

    /// Submit a PINGREQ and wait for the PINGRESP.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`], plus `RecvFailed` if the worker drops without completing it.
    pub async fn ping_and_await(&self) -> Result<(), AgentError> {
        self.submit_and_await(CommandKind::Ping).await
    }

    /// Submit a DISCONNECT.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`].
    pub async fn disconnect(&self, on_complete: CompletionCallback) -> Result<(), AgentError> {
        self.submit(CommandKind::Disconnect, on_complete).await
    }

    /// Submit a DISCONNECT and wait for it to complete.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`], plus `RecvFailed` if the worker drops without completing it.
    pub async fn disconnect_and_await(&self) -> Result<(), AgentError> {
        self.submit_and_await(CommandKind::Disconnect).await
    }

    /// Submit a `Terminate`: the worker fails every pending and queued command with `RecvFailed`
    /// and stops its loop after this one completes.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`].
    pub async fn terminate(&self, on_complete: CompletionCallback) -> Result<(), AgentError> {
        self.submit(CommandKind::Terminate, on_complete).await
    }

    /// Submit a `Terminate` and wait for the worker to acknowledge it.
    ///
    /// # Errors
    /// See [`AgentHandle::submit`], plus `RecvFailed` if the worker drops without completing it.
    pub async fn terminate_and_await(&self) -> Result<(), AgentError> {
        self.submit_and_await(CommandKind::Terminate).await
    }
}
