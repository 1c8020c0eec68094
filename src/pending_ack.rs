//! The pending-ack table: tracks commands awaiting a broker acknowledgment, keyed by packet
//! identifier.
//!
//! Unlike a FIFO delivery tracker, lookups here need to go straight from "a PUBACK for packet id
//! 42 just arrived" to "the command that sent packet id 42", so this is a capacity-bounded map
//! rather than a queue.

use std::collections::HashMap;

use thiserror::Error;

use crate::command::Command;
use crate::control_packet::PacketIdentifier;

/// Error installing a command into the [`PendingAckTable`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// The table has no free capacity.
    #[error("pending-ack table is at capacity")]
    Full,
    /// A command is already registered under this packet identifier.
    #[error("packet identifier {0} is already pending")]
    AlreadyPending(PacketIdentifier),
}

/// A fixed-capacity table of commands awaiting acknowledgment, indexed by packet identifier.
pub struct PendingAckTable {
    capacity: usize,
    entries: HashMap<PacketIdentifier, Command>,
}

impl PendingAckTable {
    /// Create a table that holds at most `capacity` pending commands at once.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Register `command` as pending acknowledgment under `packet_id`.
    ///
    /// On failure, `command` is handed back unconsumed so the caller can still complete it —
    /// every command's completion callback must run exactly once, even ones that never make it
    /// into the table.
    ///
    /// # Errors
    /// [`InsertError::Full`] if the table is at capacity, or [`InsertError::AlreadyPending`] if
    /// `packet_id` is already in use (a sign of a packet identifier reused before its prior
    /// command completed).
    pub fn insert(
        &mut self,
        packet_id: PacketIdentifier,
        command: Command,
    ) -> Result<(), (InsertError, Command)> {
        if self.entries.contains_key(&packet_id) {
            return Err((InsertError::AlreadyPending(packet_id), command));
        }
        if self.entries.len() >= self.capacity {
            return Err((InsertError::Full, command));
        }
        self.entries.insert(packet_id, command);
        Ok(())
    }

    /// Remove and return the command pending under `packet_id`, if any. This is the terminal
    /// step for an acknowledgment: PUBACK, the second PUBCOMP of a QoS 2 exchange, SUBACK, or
    /// UNSUBACK all resolve through this.
    pub fn remove(&mut self, packet_id: PacketIdentifier) -> Option<Command> {
        self.entries.remove(&packet_id)
    }

    /// Returns true if a command is pending under `packet_id`.
    #[must_use]
    pub fn contains(&self, packet_id: PacketIdentifier) -> bool {
        self.entries.contains_key(&packet_id)
    }

    /// Number of commands currently pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no commands are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every pending command, in no particular order. Used when the worker
    /// terminates and every outstanding command must be failed.
    pub fn drain(&mut self) -> Vec<Command> {
        self.entries.drain().map(|(_, command)| command).collect()
    }

    /// Remove and return every pending command along with the packet identifier it was filed
    /// under, in no particular order. Used by [`crate::agent::resume_session`], which needs the
    /// packet id back to re-install a resent publish under the same key.
    pub fn drain_entries(&mut self) -> Vec<(PacketIdentifier, Command)> {
        self.entries.drain().collect()
    }
}
