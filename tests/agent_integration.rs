//! End-to-end tests driving a full [`AgentContext`] worker loop against a [`MockProtocolEngine`],
//! covering the producer/worker contract from the outside the way a real caller would see it.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use mqtt_agent_core::agent::{resume_session, AgentContext};
use mqtt_agent_core::command::{Command, CommandKind, CommandResult};
use mqtt_agent_core::control_packet::{
    ConnectInfo, PublishInfo, QoS, SubscribeInfo, SubscribeReturnCode, SubscribeTopic,
};
use mqtt_agent_core::dispatcher::CommandDispatcher;
use mqtt_agent_core::error::AgentErrorKind;
use mqtt_agent_core::interface::Incoming;
use mqtt_agent_core::interface_mocks::MockProtocolEngine;
use mqtt_agent_core::mpsc_queue::ChannelMessageQueue;
use mqtt_agent_core::pending_ack::PendingAckTable;
use mqtt_agent_core::pool::HeapAllocator;
use mqtt_agent_core::publish_dispatcher::PublishFanoutDispatcher;
use mqtt_agent_core::topic::{TopicFilter, TopicName};

fn publish_info(topic: &str, qos: QoS) -> PublishInfo {
    PublishInfo {
        topic: TopicName::from_str(topic).unwrap(),
        qos,
        retain: false,
        dup: false,
        payload: Bytes::from_static(b"payload"),
    }
}

fn subscribe_info(filter: &str) -> SubscribeInfo {
    SubscribeInfo {
        topics: vec![SubscribeTopic {
            filter: TopicFilter::from_str(filter).unwrap(),
            qos: QoS::AtLeastOnce,
        }],
    }
}

#[tokio::test]
async fn qos1_publish_completes_on_matching_puback() {
    let (engine, injector) = MockProtocolEngine::new();
    let queue = Arc::new(ChannelMessageQueue::new(8));
    let allocator = Arc::new(HeapAllocator);
    let (publishes, _unfiltered) = PublishFanoutDispatcher::new(8);
    let mut agent = AgentContext::new(engine, queue, allocator, publishes, 8, Duration::from_millis(5));
    let handle = agent.handle(Duration::from_secs(1));
    let worker = tokio::spawn(async move { agent.run().await });

    // The mock engine assigns packet id 1 to the first acked publish it sends.
    injector.inject(Incoming::PubAck { packet_id: 1 }).unwrap();

    handle
        .publish_and_await(publish_info("t/a", QoS::AtLeastOnce))
        .await
        .unwrap();

    handle.terminate_and_await().await.unwrap();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn pending_table_full_rejects_with_no_memory() {
    let (engine, _injector) = MockProtocolEngine::new();
    let queue = Arc::new(ChannelMessageQueue::new(8));
    let allocator = Arc::new(HeapAllocator);
    let (publishes, _unfiltered) = PublishFanoutDispatcher::new(8);
    // Capacity 2: the first two subscribes fit, the third does not.
    let mut agent = AgentContext::new(engine, queue, allocator, publishes, 2, Duration::from_millis(5));
    let handle = agent.handle(Duration::from_secs(1));
    let worker = tokio::spawn(async move { agent.run().await });

    handle
        .subscribe(subscribe_info("a/+"), Box::new(|_| {}))
        .await
        .unwrap();
    handle
        .subscribe(subscribe_info("b/+"), Box::new(|_| {}))
        .await
        .unwrap();

    let third = handle.subscribe_and_await(subscribe_info("c/+")).await;
    let err = third.unwrap_err();
    assert!(matches!(err.kind(), AgentErrorKind::NoMemory));

    // The two still-pending subscribes will never get a SUBACK in this test; terminate fails
    // them rather than leaving the worker blocked waiting on acks that will never arrive.
    handle.terminate_and_await().await.unwrap();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn idle_loop_delivers_injected_publish_via_process_loop_tick() {
    let (engine, injector) = MockProtocolEngine::new();
    let queue = Arc::new(ChannelMessageQueue::new(8));
    let allocator = Arc::new(HeapAllocator);
    let (publishes, mut unfiltered) = PublishFanoutDispatcher::new(8);
    let mut agent = AgentContext::new(engine, queue, allocator, publishes, 8, Duration::from_millis(5));
    let handle = agent.handle(Duration::from_secs(1));
    let worker = tokio::spawn(async move { agent.run().await });

    injector
        .inject(Incoming::Publish(mqtt_agent_core::control_packet::IncomingPublish {
            topic: TopicName::from_str("news/weather").unwrap(),
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
            packet_id: None,
            payload: Bytes::from_static(b"sunny"),
        }))
        .unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(1), unfiltered.recv())
        .await
        .expect("publish should be demultiplexed during an idle iteration")
        .unwrap();
    assert_eq!(delivered.topic.as_str(), "news/weather");

    handle.terminate_and_await().await.unwrap();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn per_producer_completion_order_is_preserved() {
    let (engine, _injector) = MockProtocolEngine::new();
    let queue = Arc::new(ChannelMessageQueue::new(32));
    let allocator = Arc::new(HeapAllocator);
    let (publishes, _unfiltered) = PublishFanoutDispatcher::new(8);
    let mut agent = AgentContext::new(engine, queue, allocator, publishes, 32, Duration::from_millis(5));
    let handle_a = agent.handle(Duration::from_secs(1));
    let handle_b = handle_a.clone();
    let terminator = handle_a.clone();
    let worker = tokio::spawn(async move { agent.run().await });

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(u8, u32)>();

    for (producer_id, handle) in [(0u8, handle_a), (1u8, handle_b)] {
        let tx = done_tx.clone();
        for index in 0..5u32 {
            let tx = tx.clone();
            // QoS 0 publishes complete as soon as the worker dispatches them, with no ack needed.
            handle
                .publish(
                    publish_info("fire/and/forget", QoS::AtMostOnce),
                    Box::new(move |_| {
                        let _ = tx.send((producer_id, index));
                    }),
                )
                .await
                .unwrap();
        }
    }
    drop(done_tx);

    let mut seen = [Vec::new(), Vec::new()];
    for _ in 0..10 {
        let (producer_id, index) = done_rx.recv().await.unwrap();
        seen[producer_id as usize].push(index);
    }

    for sequence in &seen {
        assert_eq!(sequence.len(), 5);
        assert!(sequence.windows(2).all(|pair| pair[0] < pair[1]));
    }

    terminator.terminate_and_await().await.unwrap();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn resume_session_present_resends_pending_publishes_with_dup_set() {
    let (mut engine, _injector) = MockProtocolEngine::new();
    let queue = Arc::new(ChannelMessageQueue::new(8));
    let mut pending = PendingAckTable::new(8);

    let mut receivers = Vec::new();
    for (old_pkid, topic) in [(10u16, "a/1"), (11, "a/2"), (12, "a/3")] {
        let (tx, rx) = oneshot::channel();
        let command = Command::new(
            CommandKind::Publish(publish_info(topic, QoS::AtLeastOnce)),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        pending.insert(old_pkid, command).unwrap();
        receivers.push(rx);
    }

    resume_session(true, &mut engine, &mut pending, queue.as_ref()).await;

    // Every resent publish is re-keyed under a freshly assigned packet id (rumqttc gives no way
    // to pin the original one), but all three are still outstanding, still exactly 3 commands,
    // and none of the original callbacks have fired yet.
    assert_eq!(pending.len(), 3);
    for rx in &mut receivers {
        assert!(rx.try_recv().is_err());
    }
}

#[tokio::test]
async fn resume_session_absent_fails_all_pending_with_recv_failed() {
    let (mut engine, _injector) = MockProtocolEngine::new();
    let queue = Arc::new(ChannelMessageQueue::new(8));
    let mut pending = PendingAckTable::new(8);

    let (tx, rx) = oneshot::channel();
    let command = Command::new(
        CommandKind::Publish(publish_info("a/1", QoS::AtLeastOnce)),
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    pending.insert(1, command).unwrap();

    resume_session(false, &mut engine, &mut pending, queue.as_ref()).await;

    assert!(pending.is_empty());
    let result = rx.await.unwrap();
    assert!(matches!(
        result,
        CommandResult::Failure(e) if matches!(e.kind(), AgentErrorKind::RecvFailed)
    ));
}

#[tokio::test]
async fn terminate_fails_pending_entries_and_stops_the_loop() {
    let (engine, _injector) = MockProtocolEngine::new();
    let queue = Arc::new(ChannelMessageQueue::new(8));
    let allocator = Arc::new(HeapAllocator);
    let (publishes, _unfiltered) = PublishFanoutDispatcher::new(8);
    let mut agent = AgentContext::new(engine, queue, allocator, publishes, 8, Duration::from_millis(5));
    let handle = agent.handle(Duration::from_secs(1));
    let worker = tokio::spawn(async move { agent.run().await });

    let mut receivers = Vec::new();
    for filter in ["a/+", "b/+", "c/+", "d/+"] {
        let (tx, rx) = oneshot::channel();
        handle
            .subscribe(
                subscribe_info(filter),
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            )
            .await
            .unwrap();
        receivers.push(rx);
    }

    handle.terminate_and_await().await.unwrap();
    worker.await.unwrap().unwrap();

    for rx in receivers {
        let result = rx.await.unwrap();
        assert!(matches!(
            result,
            CommandResult::Failure(e) if matches!(e.kind(), AgentErrorKind::RecvFailed)
        ));
    }
}

#[tokio::test]
async fn subscribe_and_await_surfaces_per_filter_suback_codes() {
    let (engine, injector) = MockProtocolEngine::new();
    let queue = Arc::new(ChannelMessageQueue::new(8));
    let allocator = Arc::new(HeapAllocator);
    let (publishes, _unfiltered) = PublishFanoutDispatcher::new(8);
    let mut agent = AgentContext::new(engine, queue, allocator, publishes, 8, Duration::from_millis(5));
    let handle = agent.handle(Duration::from_secs(1));
    let worker = tokio::spawn(async move { agent.run().await });

    // The mock engine assigns packet id 1 to the first command it sends.
    injector
        .inject(Incoming::SubAck {
            packet_id: 1,
            return_codes: vec![SubscribeReturnCode::SuccessQoS1, SubscribeReturnCode::Failure],
        })
        .unwrap();

    let codes = handle.subscribe_and_await(subscribe_info("a/+")).await.unwrap();
    assert_eq!(
        codes,
        vec![SubscribeReturnCode::SuccessQoS1, SubscribeReturnCode::Failure]
    );

    handle.terminate_and_await().await.unwrap();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn dispatching_connect_reconfigures_the_engine_with_the_supplied_info() {
    let (mut engine, _injector) = MockProtocolEngine::new();
    let mut pending = PendingAckTable::new(8);

    let info = ConnectInfo {
        client_id: "reconfigured-client".to_string(),
        clean_session: false,
        keep_alive_secs: 42,
        username: Some("alice".to_string()),
        password: Some(b"hunter2".to_vec()),
    };
    let (tx, rx) = oneshot::channel();
    let command = Command::new(
        CommandKind::Connect(info.clone()),
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );

    CommandDispatcher::dispatch(command, &mut engine, &mut pending).await;

    assert!(matches!(rx.await.unwrap(), CommandResult::Success));
    let observed = engine.last_connect().expect("connect should have reached the engine");
    assert_eq!(observed.client_id, info.client_id);
    assert_eq!(observed.clean_session, info.clean_session);
    assert_eq!(observed.keep_alive_secs, info.keep_alive_secs);
    assert_eq!(observed.username, info.username);
    assert_eq!(observed.password, info.password);
}
