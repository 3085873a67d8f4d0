//! 监听、连接、收发与关闭的端到端场景。

mod common;

use std::sync::Arc;

use common::{Acceptor, Collector, Echo, StallingAcceptor, dedicated_loop, drive};
use ripple_core::test_stubs::pipeline::{RecordingInbound, event_log};
use ripple_core::{
    Channel, ChannelState, EventLoop, PipelineMessage, SignalState, TransportAddress, codes,
};
use ripple_transport_local::{LocalChannel, LocalRegistry, LocalServerChannel, LocalTransportOptions};

fn expect_failure(state: SignalState, code: &str) {
    match state {
        SignalState::Failed(error) => assert_eq!(error.code(), code),
        other => panic!("expected failure with {code}, got {other:?}"),
    }
}

/// 起一个已绑定的监听方，被接纳端交给 `setup` 装配后注册到 `child_loop`。
fn listening_server(
    registry: &Arc<LocalRegistry>,
    server_loop: &Arc<EventLoop>,
    child_loop: &Arc<EventLoop>,
    addr: TransportAddress,
    setup: impl Fn(&Arc<LocalChannel>) + Send + Sync + 'static,
) -> (Arc<LocalServerChannel>, Arc<spin::Mutex<Vec<Arc<LocalChannel>>>>) {
    let server = LocalServerChannel::new(Arc::clone(registry));
    let (acceptor, children) = Acceptor::new(Arc::clone(child_loop), setup);
    server
        .core()
        .pipeline()
        .add_inbound_last("acceptor", acceptor)
        .unwrap();
    server.register(Arc::clone(server_loop));
    drive(&[server_loop]);
    let bound = server.bind(addr);
    drive(&[server_loop]);
    assert!(bound.is_completed());
    assert!(server.is_active());
    (server, children)
}

#[test]
fn connect_accept_completes_and_child_activates_first() {
    let registry = LocalRegistry::new();
    let server_loop = dedicated_loop();
    let client_loop = dedicated_loop();
    let child_loop = dedicated_loop();
    let log = event_log();
    let setup_log = Arc::clone(&log);
    let (_server, children) = listening_server(
        &registry,
        &server_loop,
        &child_loop,
        TransportAddress::named("svc"),
        move |child| {
            child
                .core()
                .pipeline()
                .add_inbound_last("probe", RecordingInbound::new("child", Arc::clone(&setup_log)))
                .unwrap();
        },
    );

    let client = LocalChannel::new(Arc::clone(&registry));
    client
        .core()
        .pipeline()
        .add_inbound_last("probe", RecordingInbound::new("client", Arc::clone(&log)))
        .unwrap();
    client.register(Arc::clone(&client_loop));
    drive(&[&client_loop]);

    let connected = client.connect(TransportAddress::named("svc"));
    drive(&[&server_loop, &child_loop, &client_loop]);

    assert!(connected.is_completed());
    assert!(client.is_active());
    let accepted = children.lock();
    assert_eq!(accepted.len(), 1);
    let child = Arc::clone(&accepted[0]);
    drop(accepted);
    assert!(child.is_active());

    let events = log.lock().clone();
    let child_active = events.iter().position(|e| e == "child:active").expect("child active");
    let client_active = events.iter().position(|e| e == "client:active").expect("client active");
    assert!(child_active < client_active);
    assert_eq!(events.iter().filter(|e| *e == "child:active").count(), 1);
    assert_eq!(events.iter().filter(|e| *e == "client:active").count(), 1);

    assert_eq!(client.remote_address(), Some(TransportAddress::named("svc")));
    assert_eq!(child.local_address(), Some(TransportAddress::named("svc")));
    assert!(matches!(
        client.local_address(),
        Some(TransportAddress::Ephemeral(_))
    ));
    assert_eq!(child.remote_address(), client.local_address());
}

#[test]
fn writes_are_delivered_in_submission_order() {
    let registry = LocalRegistry::new();
    let server_loop = dedicated_loop();
    let client_loop = dedicated_loop();
    let (collector_frames_tx, frames) = {
        let (collector, frames) = Collector::new();
        (spin::Mutex::new(Some(collector)), frames)
    };
    let (_server, _children) = listening_server(
        &registry,
        &server_loop,
        &server_loop,
        TransportAddress::named("order"),
        move |child| {
            if let Some(collector) = collector_frames_tx.lock().take() {
                child
                    .core()
                    .pipeline()
                    .add_inbound_last("collect", collector)
                    .unwrap();
            }
        },
    );

    let client = LocalChannel::new(Arc::clone(&registry));
    client.register(Arc::clone(&client_loop));
    drive(&[&client_loop]);
    let connected = client.connect(TransportAddress::named("order"));
    drive(&[&server_loop, &client_loop]);
    assert!(connected.is_completed());

    for payload in [vec![1u8], vec![2u8], vec![3u8]] {
        client.write_and_flush(PipelineMessage::buffer(payload));
    }
    drive(&[&client_loop, &server_loop]);

    assert_eq!(*frames.lock(), vec![vec![1u8], vec![2u8], vec![3u8]]);
}

#[test]
fn echo_round_trip_on_a_single_loop() {
    let registry = LocalRegistry::new();
    let shared_loop = dedicated_loop();
    let (_server, _children) = listening_server(
        &registry,
        &shared_loop,
        &shared_loop,
        TransportAddress::named("echo"),
        |child| {
            child
                .core()
                .pipeline()
                .add_inbound_last("echo", Arc::new(Echo))
                .unwrap();
        },
    );

    let client = LocalChannel::new(Arc::clone(&registry));
    let (collector, frames) = Collector::new();
    client
        .core()
        .pipeline()
        .add_inbound_last("collect", collector)
        .unwrap();
    client.register(Arc::clone(&shared_loop));
    drive(&[&shared_loop]);
    let connected = client.connect(TransportAddress::named("echo"));
    drive(&[&shared_loop]);
    assert!(connected.is_completed());

    client.write_and_flush(PipelineMessage::buffer(b"ping".to_vec()));
    drive(&[&shared_loop]);

    assert_eq!(*frames.lock(), vec![b"ping".to_vec()]);
}

#[test]
fn deep_echo_chain_survives_the_reentrancy_guard() {
    let registry = LocalRegistry::with_options(LocalTransportOptions {
        max_read_stack_depth: 2,
    });
    let shared_loop = dedicated_loop();
    let (_server, _children) = listening_server(
        &registry,
        &shared_loop,
        &shared_loop,
        TransportAddress::named("deep"),
        |child| {
            child
                .core()
                .pipeline()
                .add_inbound_last("echo", Arc::new(Echo))
                .unwrap();
        },
    );

    let client = LocalChannel::new(Arc::clone(&registry));
    let (collector, frames) = Collector::new();
    client
        .core()
        .pipeline()
        .add_inbound_last("collect", collector)
        .unwrap();
    client.register(Arc::clone(&shared_loop));
    drive(&[&shared_loop]);
    let connected = client.connect(TransportAddress::named("deep"));
    drive(&[&shared_loop]);
    assert!(connected.is_completed());

    for i in 0u8..16 {
        client.write_and_flush(PipelineMessage::buffer(vec![i]));
    }
    drive(&[&shared_loop]);

    let received = frames.lock().clone();
    assert_eq!(received.len(), 16);
    assert_eq!(received, (0u8..16).map(|i| vec![i]).collect::<Vec<_>>());
}

#[test]
fn registering_on_an_embedded_loop_is_rejected() {
    use ripple_core::{Clock, ExecutorKind, ManualClock};

    let registry = LocalRegistry::new();
    let embedded = EventLoop::new(
        ExecutorKind::Embedded,
        Arc::new(ManualClock::new()) as Arc<dyn Clock>,
    );
    let client = LocalChannel::new(registry);

    let signal = client.register(embedded);

    expect_failure(signal.state(), codes::EXECUTOR_INCOMPATIBLE);
    assert_eq!(client.state(), ChannelState::Closed);
}

#[test]
fn connect_to_unbound_address_is_refused() {
    let registry = LocalRegistry::new();
    let client_loop = dedicated_loop();
    let client = LocalChannel::new(Arc::clone(&registry));
    client.register(Arc::clone(&client_loop));
    drive(&[&client_loop]);

    let connected = client.connect(TransportAddress::named("nobody"));
    drive(&[&client_loop]);

    expect_failure(connected.state(), codes::CONNECTION_REFUSED);
    assert_eq!(client.state(), ChannelState::Closed);
}

#[test]
fn connect_to_an_endpoint_binding_is_refused() {
    let registry = LocalRegistry::new();
    let event_loop = dedicated_loop();
    let occupant = LocalChannel::new(Arc::clone(&registry));
    occupant.register(Arc::clone(&event_loop));
    drive(&[&event_loop]);
    let bound = occupant.bind(TransportAddress::named("occupied"));
    drive(&[&event_loop]);
    assert!(bound.is_completed());

    let client = LocalChannel::new(Arc::clone(&registry));
    client.register(Arc::clone(&event_loop));
    drive(&[&event_loop]);
    let connected = client.connect(TransportAddress::named("occupied"));
    drive(&[&event_loop]);

    expect_failure(connected.state(), codes::CONNECTION_REFUSED);
    assert_eq!(client.state(), ChannelState::Closed);
}

#[test]
fn double_bind_fails_until_the_first_listener_closes() {
    let registry = LocalRegistry::new();
    let server_loop = dedicated_loop();
    let (first, _children) = listening_server(
        &registry,
        &server_loop,
        &server_loop,
        TransportAddress::named("port"),
        |_child| {},
    );

    let second = LocalServerChannel::new(Arc::clone(&registry));
    second.register(Arc::clone(&server_loop));
    drive(&[&server_loop]);
    let clash = second.bind(TransportAddress::named("port"));
    drive(&[&server_loop]);
    expect_failure(clash.state(), codes::ADDRESS_IN_USE);
    assert_eq!(second.state(), ChannelState::Closed);

    let closed = first.close();
    drive(&[&server_loop]);
    assert!(closed.is_completed());

    let third = LocalServerChannel::new(Arc::clone(&registry));
    third.register(Arc::clone(&server_loop));
    drive(&[&server_loop]);
    let rebound = third.bind(TransportAddress::named("port"));
    drive(&[&server_loop]);
    assert!(rebound.is_completed());
}

#[test]
fn closing_a_channel_with_a_pending_connect_fails_it_as_disconnected() {
    let registry = LocalRegistry::new();
    let server_loop = dedicated_loop();
    let client_loop = dedicated_loop();
    let server = LocalServerChannel::new(Arc::clone(&registry));
    let (acceptor, _children) = StallingAcceptor::new();
    server
        .core()
        .pipeline()
        .add_inbound_last("stall", acceptor)
        .unwrap();
    server.register(Arc::clone(&server_loop));
    drive(&[&server_loop]);
    let bound = server.bind(TransportAddress::named("limbo"));
    drive(&[&server_loop]);
    assert!(bound.is_completed());

    let client = LocalChannel::new(Arc::clone(&registry));
    client.register(Arc::clone(&client_loop));
    drive(&[&client_loop]);
    let connected = client.connect(TransportAddress::named("limbo"));
    drive(&[&server_loop, &client_loop]);
    assert!(connected.is_pending());

    let closed = client.close();
    drive(&[&client_loop, &server_loop]);

    assert!(closed.is_completed());
    expect_failure(connected.state(), codes::DISCONNECTED);
}

#[test]
fn connector_close_reaches_a_child_that_was_never_registered() {
    let registry = LocalRegistry::new();
    let server_loop = dedicated_loop();
    let client_loop = dedicated_loop();
    let server = LocalServerChannel::new(Arc::clone(&registry));
    let (acceptor, children) = StallingAcceptor::new();
    server
        .core()
        .pipeline()
        .add_inbound_last("stall", acceptor)
        .unwrap();
    server.register(Arc::clone(&server_loop));
    drive(&[&server_loop]);
    let bound = server.bind(TransportAddress::named("orphanage"));
    drive(&[&server_loop]);
    assert!(bound.is_completed());

    let client = LocalChannel::new(Arc::clone(&registry));
    client.register(Arc::clone(&client_loop));
    drive(&[&client_loop]);
    client.connect(TransportAddress::named("orphanage"));
    drive(&[&server_loop, &client_loop]);
    let child = children.lock().first().cloned().expect("child synthesized");
    assert_ne!(child.state(), ChannelState::Closed);

    let closed = client.close();
    drive(&[&client_loop, &server_loop]);

    assert!(closed.is_completed());
    assert_eq!(child.state(), ChannelState::Closed);
}

#[test]
fn peer_close_propagates_and_releases_buffered_messages() {
    let registry = LocalRegistry::new();
    let server_loop = dedicated_loop();
    let client_loop = dedicated_loop();
    let (_server, children) = listening_server(
        &registry,
        &server_loop,
        &server_loop,
        TransportAddress::named("teardown"),
        |_child| {},
    );

    let client = LocalChannel::new(Arc::clone(&registry));
    client.core().configure(|config| config.auto_read = false);
    let (collector, frames) = Collector::new();
    client
        .core()
        .pipeline()
        .add_inbound_last("collect", collector)
        .unwrap();
    client.register(Arc::clone(&client_loop));
    drive(&[&client_loop]);
    let connected = client.connect(TransportAddress::named("teardown"));
    drive(&[&server_loop, &client_loop]);
    assert!(connected.is_completed());

    let child = Arc::clone(&children.lock()[0]);
    child.write_and_flush(PipelineMessage::buffer(b"unread".to_vec()));
    drive(&[&server_loop, &client_loop]);
    assert!(frames.lock().is_empty());

    let closed = client.close();
    drive(&[&client_loop, &server_loop]);

    assert!(closed.is_completed());
    assert_eq!(client.state(), ChannelState::Closed);
    assert_eq!(child.state(), ChannelState::Closed);
    assert!(frames.lock().is_empty());
}

#[test]
fn explicit_begin_read_delivers_buffered_messages() {
    let registry = LocalRegistry::new();
    let server_loop = dedicated_loop();
    let client_loop = dedicated_loop();
    let (_server, children) = listening_server(
        &registry,
        &server_loop,
        &server_loop,
        TransportAddress::named("pull"),
        |_child| {},
    );

    let client = LocalChannel::new(Arc::clone(&registry));
    client.core().configure(|config| config.auto_read = false);
    let (collector, frames) = Collector::new();
    client
        .core()
        .pipeline()
        .add_inbound_last("collect", collector)
        .unwrap();
    client.register(Arc::clone(&client_loop));
    drive(&[&client_loop]);
    let connected = client.connect(TransportAddress::named("pull"));
    drive(&[&server_loop, &client_loop]);
    assert!(connected.is_completed());

    let child = Arc::clone(&children.lock()[0]);
    child.write_and_flush(PipelineMessage::buffer(b"held".to_vec()));
    drive(&[&server_loop, &client_loop]);
    assert!(frames.lock().is_empty());

    client.begin_read();
    drive(&[&client_loop]);

    assert_eq!(*frames.lock(), vec![b"held".to_vec()]);
}
