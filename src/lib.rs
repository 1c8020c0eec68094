#![warn(missing_docs)]

//! A thread-safety layer around a single-threaded MQTT 3.1.1 client.
//!
//! One worker task (an [`agent::AgentContext`]) owns the [`interface::ProtocolEngine`] and the
//! pending-ack table exclusively and runs the only loop in the crate that ever touches them.
//! Any number of producer tasks submit work through a cloneable [`producer::AgentHandle`],
//! which only ever allocates a [`command::Command`] and hands it across a [`interface::MessageQueue`]
//! — nothing downstream of that queue is ever shared, so there is no lock to take and no
//! contention to reason about beyond the queue itself.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use mqtt_agent_core::agent::AgentContext;
//! use mqtt_agent_core::connection_settings::AgentConnectionSettingsBuilder;
//! use mqtt_agent_core::control_packet::QoS;
//! use mqtt_agent_core::mpsc_queue::ChannelMessageQueue;
//! use mqtt_agent_core::pool::HeapAllocator;
//! use mqtt_agent_core::publish_dispatcher::PublishFanoutDispatcher;
//! use mqtt_agent_core::rumqttc_adapter::RumqttcProtocolEngine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = AgentConnectionSettingsBuilder::default()
//!     .client_id("example-client")
//!     .hostname("localhost")
//!     .build()?;
//! let engine = RumqttcProtocolEngine::new(&settings, 64);
//! let queue = Arc::new(ChannelMessageQueue::new(64));
//! let allocator = Arc::new(HeapAllocator);
//! let (publishes, mut incoming) = PublishFanoutDispatcher::new(64);
//!
//! let mut agent = AgentContext::new(engine, queue, allocator, publishes, 64, Duration::from_secs(1));
//! let handle = agent.handle(Duration::from_secs(5));
//!
//! tokio::spawn(async move { agent.run().await });
//!
//! handle
//!     .publish_str("sensors/temperature", QoS::AtLeastOnce, false, "21.5", Box::new(|_| {}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod command;
pub mod connection_settings;
pub mod control_packet;
pub mod demux;
pub mod dispatcher;
pub mod error;
pub mod interface;
pub mod interface_mocks;
pub mod mpsc_queue;
pub mod pending_ack;
pub mod pool;
pub mod producer;
pub mod publish_dispatcher;
pub mod reconnect_policy;
pub mod rumqttc_adapter;
pub mod topic;

pub use crate::agent::AgentContext;
pub use crate::connection_settings::{
    AgentConnectionSettings, AgentConnectionSettingsBuilder, AgentConnectionSettingsBuilderError,
};
pub use crate::producer::AgentHandle;

#[macro_use]
extern crate derive_builder;
