//! The agent worker: owns the protocol engine and pending-ack table exclusively and runs the
//! command loop that is this crate's single point of serialization.
//!
//! [`AgentContext`] is moved wholesale into the task that calls [`AgentContext::run`]; nothing
//! else ever touches its fields, which is what lets the rest of the crate avoid wrapping the
//! engine or the pending-ack table in an `Arc<Mutex<_>>`.

use std::sync::Arc;
use std::time::Duration;

use crate::command::{Command, CommandKind, CommandResult};
use crate::dispatcher::CommandDispatcher;
use crate::error::{AgentError, AgentErrorKind};
use crate::interface::{CommandAllocator, MessageQueue, ProtocolEngine};
use crate::pending_ack::PendingAckTable;
use crate::producer::AgentHandle;
use crate::publish_dispatcher::PublishFanoutDispatcher;

/// Per-connection state owned by one worker task: the protocol engine, the pending-ack table, and
/// the publish fan-out dispatcher, plus the shared handles producers submit work through.
///
/// The protocol engine and message queue are injected as generic type parameters rather than
/// trait objects — the direct realization of what the original design called a compile-time
/// function-table switch, chosen once here instead of re-dispatched through a vtable on every
/// call.
pub struct AgentContext<E, Q, A>
where
    E: ProtocolEngine,
    Q: MessageQueue,
    A: CommandAllocator,
{
    engine: E,
    queue: Arc<Q>,
    allocator: Arc<A>,
    pending: PendingAckTable,
    publishes: PublishFanoutDispatcher,
    max_event_queue_wait_time: Duration,
    terminate: bool,
}

impl<E, Q, A> AgentContext<E, Q, A>
where
    E: ProtocolEngine,
    Q: MessageQueue,
    A: CommandAllocator + 'static,
{
    /// Build a new worker context around `engine`, sharing `queue` and `allocator` with every
    /// [`AgentHandle`] obtained from [`AgentContext::handle`].
    #[must_use]
    pub fn new(
        engine: E,
        queue: Arc<Q>,
        allocator: Arc<A>,
        publishes: PublishFanoutDispatcher,
        max_outstanding_acks: usize,
        max_event_queue_wait_time: Duration,
    ) -> Self {
        Self {
            engine,
            queue,
            allocator,
            pending: PendingAckTable::new(max_outstanding_acks),
            publishes,
            max_event_queue_wait_time,
            terminate: false,
        }
    }

    /// Obtain a producer-facing handle sharing this context's queue and allocator.
    ///
    /// `AgentHandle` is `Clone`; call this once per producer task, or clone the result.
    #[must_use]
    pub fn handle(&self, send_timeout: Duration) -> AgentHandle<Q, A> {
        AgentHandle::new(Arc::clone(&self.queue), Arc::clone(&self.allocator), send_timeout)
    }

    /// Run the command loop until a `Terminate` command is dispatched or the protocol engine
    /// reports a fatal, session-breaking error.
    ///
    /// A clean `Terminate` returns `Ok(())`. A transport failure returns the error that ended the
    /// loop; the caller is expected to reconnect and call [`resume_session`] before calling `run`
    /// again.
    ///
    /// # Errors
    /// Returns the [`AgentError`] that ended the loop.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        loop {
            match self.queue.recv(self.max_event_queue_wait_time).await {
                Ok(Some(command)) => {
                    if let Err(err) = self.handle_command(command).await {
                        cancel_all(&mut self.pending, self.queue.as_ref()).await;
                        return Err(err);
                    }
                }
                Ok(None) => {
                    // No command arrived before the timeout: service the engine for one I/O cycle
                    // anyway, via the same internal `ProcessLoop` command the dispatch table
                    // names. Nothing submitted it and nothing awaits it, so its callback is a
                    // no-op — it exists only so every tick the worker services goes through the
                    // one `handle` path, not a second parallel one.
                    let tick = Command::new(CommandKind::ProcessLoop, Box::new(|_| {}));
                    if let Err(err) = self.handle_command(tick).await {
                        cancel_all(&mut self.pending, self.queue.as_ref()).await;
                        return Err(err);
                    }
                }
                Err(()) => {
                    // Every producer handle has been dropped and the queue is drained: nothing
                    // can submit further work, so there is nothing left for the loop to do.
                    log::info!("message queue closed with no producers remaining; stopping worker");
                    cancel_all(&mut self.pending, self.queue.as_ref()).await;
                    return Ok(());
                }
            }
            if self.terminate {
                return Ok(());
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), AgentError> {
        let Command { kind, on_complete } = command;
        match kind {
            CommandKind::Terminate => {
                cancel_all(&mut self.pending, self.queue.as_ref()).await;
                self.terminate = true;
                on_complete(CommandResult::Success);
                Ok(())
            }
            CommandKind::ProcessLoop => match self.process_loop().await {
                Ok(()) => {
                    on_complete(CommandResult::Success);
                    Ok(())
                }
                Err(err) => {
                    on_complete(CommandResult::Failure(err.clone()));
                    Err(err)
                }
            },
            other => {
                CommandDispatcher::dispatch(
                    Command::new(other, on_complete),
                    &mut self.engine,
                    &mut self.pending,
                )
                .await;
                Ok(())
            }
        }
    }

    /// Service the protocol engine for one I/O cycle, demultiplexing whatever event (if any)
    /// comes back. This is the body of the worker's internal `ProcessLoop` tick (§4.3), split out
    /// from [`AgentContext::handle`] since it needs `&mut self` access to `publishes` and `queue`
    /// that `CommandDispatcher::dispatch` doesn't carry.
    async fn process_loop(&mut self) -> Result<(), AgentError> {
        match self.engine.poll(Duration::ZERO).await {
            Ok(Some(event)) => {
                if let Some(session_present) =
                    crate::demux::demux(event, &mut self.engine, &mut self.pending, &mut self.publishes).await
                {
                    resume_session(
                        session_present,
                        &mut self.engine,
                        &mut self.pending,
                        self.queue.as_ref(),
                    )
                    .await;
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Apply a freshly observed CONNACK's `session_present` flag.
///
/// If the broker retained the session, every QoS>0 publish still in the pending-ack table is
/// resent with its `dup` flag set and re-installed under whatever packet id the engine assigns the
/// resend (see the packet-id note on [`crate::rumqttc_adapter::RumqttcProtocolEngine`] — the
/// default engine cannot be told to reuse the original wire packet id, only to send a fresh
/// PUBLISH for the same payload). Subscribes and unsubscribes are not replayed: the broker either
/// already retained their outcome or there is no wire operation left that could recover it.
///
/// If the broker did not retain the session, every pending entry is failed via [`cancel_all`].
pub async fn resume_session<E, Q>(
    session_present: bool,
    engine: &mut E,
    pending: &mut PendingAckTable,
    queue: &Q,
) where
    E: ProtocolEngine + ?Sized,
    Q: MessageQueue + ?Sized,
{
    if !session_present {
        cancel_all(pending, queue).await;
        return;
    }

    for (old_packet_id, command) in pending.drain_entries() {
        let Command { kind, on_complete } = command;
        match kind {
            CommandKind::Publish(mut info) => {
                info.dup = true;
                match engine.publish(&info).await {
                    Ok(Some(new_packet_id)) => {
                        let resent = Command::new(CommandKind::Publish(info), on_complete);
                        if let Err((err, resent)) = pending.insert(new_packet_id, resent) {
                            log::error!(
                                "failed to reinstall resumed publish (was packet id {old_packet_id}): {err}"
                            );
                            resent.complete(CommandResult::Failure(AgentError::new(
                                AgentErrorKind::NoMemory,
                            )));
                        }
                    }
                    Ok(None) => {
                        log::error!(
                            "resumed QoS>0 publish (was packet id {old_packet_id}) unexpectedly reported no packet id"
                        );
                        Command::new(CommandKind::Publish(info), on_complete).complete(
                            CommandResult::Failure(AgentError::new(AgentErrorKind::IllegalState)),
                        );
                    }
                    Err(err) => {
                        Command::new(CommandKind::Publish(info), on_complete)
                            .complete(CommandResult::Failure(err.into()));
                    }
                }
            }
            other => {
                Command::new(other, on_complete)
                    .complete(CommandResult::Failure(AgentError::new(AgentErrorKind::RecvFailed)));
            }
        }
    }
}

/// Fail every command still in the pending-ack table and every command still queued, each with
/// `RecvFailed`. After this returns, both are empty.
pub async fn cancel_all<Q: MessageQueue + ?Sized>(pending: &mut PendingAckTable, queue: &Q) {
    crate::demux::fail_all_pending(pending);
    loop {
        match queue.recv(Duration::ZERO).await {
            Ok(Some(command)) => {
                command.complete(CommandResult::Failure(AgentError::new(AgentErrorKind::RecvFailed)));
            }
            Ok(None) | Err(()) => break,
        }
    }
}
