//! 流水线传播契约的端到端验证：方向、显式转发、拦截与装配规则。

use std::sync::Arc;

use ripple_core::test_stubs::channel::StubChannel;
use ripple_core::test_stubs::pipeline::{RecordingInbound, RecordingOutbound, event_log};
use ripple_core::{
    Channel, ChannelState, CoreError, HandlerContext, InboundHandler, PipelineMessage, SignalState,
    codes,
};

#[test]
fn inbound_events_walk_head_to_tail() {
    let channel = StubChannel::new();
    let pipeline = channel.core().pipeline();
    let log = event_log();
    pipeline
        .add_inbound_last("first", RecordingInbound::new("first", Arc::clone(&log)))
        .unwrap();
    pipeline
        .add_inbound_last("second", RecordingInbound::new("second", Arc::clone(&log)))
        .unwrap();

    pipeline.fire_read(PipelineMessage::buffer(vec![1u8]));
    pipeline.fire_read_complete();

    assert_eq!(
        *log.lock(),
        vec!["first:read", "second:read", "first:read_complete", "second:read_complete"]
    );
}

#[test]
fn outbound_operations_walk_tail_to_head() {
    let channel = StubChannel::new();
    channel.activate();
    let pipeline = channel.core().pipeline();
    let log = event_log();
    pipeline
        .add_outbound_last("lower", RecordingOutbound::new("lower", Arc::clone(&log)))
        .unwrap();
    pipeline
        .add_outbound_last("upper", RecordingOutbound::new("upper", Arc::clone(&log)))
        .unwrap();

    let signal = pipeline.write(PipelineMessage::buffer(vec![7u8]));

    assert!(signal.is_completed());
    assert_eq!(*log.lock(), vec!["upper:write", "lower:write"]);
    assert_eq!(channel.take_writes().len(), 1);
}

/// 只消费不转发的 Handler。
struct Swallow;

impl InboundHandler for Swallow {
    fn on_read(&self, _ctx: &HandlerContext<'_>, msg: PipelineMessage) {
        drop(msg);
    }
}

#[test]
fn handler_without_forwarding_intercepts_the_event() {
    let channel = StubChannel::new();
    let pipeline = channel.core().pipeline();
    let log = event_log();
    pipeline.add_inbound_last("swallow", Arc::new(Swallow)).unwrap();
    pipeline
        .add_inbound_last("after", RecordingInbound::new("after", Arc::clone(&log)))
        .unwrap();

    pipeline.fire_read(PipelineMessage::buffer(vec![1u8]));

    assert!(log.lock().is_empty());
    assert!(channel.take_unhandled().is_empty());
}

#[test]
fn unhandled_message_reaches_the_tail_sink() {
    let channel = StubChannel::new();
    let pipeline = channel.core().pipeline();

    pipeline.fire_read(PipelineMessage::user(41u32));

    let unhandled = channel.take_unhandled();
    assert_eq!(unhandled.len(), 1);
    assert_eq!(unhandled[0].downcast_ref::<u32>(), Some(&41));
}

#[test]
fn unhandled_exception_before_activation_closes_the_channel() {
    let channel = StubChannel::new();
    let pipeline = channel.core().pipeline();

    pipeline.fire_exception(CoreError::new(codes::UNHANDLED_EXCEPTION, "decoder blew up"));

    let captured = channel.core().take_last_error().expect("error captured");
    assert_eq!(captured.code(), codes::UNHANDLED_EXCEPTION);
    assert!(channel.core().take_last_error().is_none());
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[test]
fn unhandled_exception_on_an_active_channel_only_parks_the_error() {
    let channel = StubChannel::new();
    channel.activate();
    let pipeline = channel.core().pipeline();

    pipeline.fire_exception(CoreError::new(codes::UNHANDLED_EXCEPTION, "late decode failure"));

    assert!(channel.core().take_last_error().is_some());
    assert_eq!(channel.state(), ChannelState::Active);
}

#[test]
fn duplicate_names_are_rejected() {
    let channel = StubChannel::new();
    let pipeline = channel.core().pipeline();
    let log = event_log();
    pipeline
        .add_inbound_last("dup", RecordingInbound::new("a", Arc::clone(&log)))
        .unwrap();

    let err = pipeline
        .add_inbound_last("dup", RecordingInbound::new("b", log))
        .expect_err("duplicate name");
    assert_eq!(err.code(), codes::DUPLICATE_NAME);
}

#[test]
fn non_reusable_instance_cannot_be_installed_twice() {
    let channel = StubChannel::new();
    let pipeline = channel.core().pipeline();
    let handler = RecordingInbound::new("once", event_log());
    pipeline
        .add_inbound_last("one", Arc::clone(&handler) as Arc<dyn InboundHandler>)
        .unwrap();

    let err = pipeline
        .add_inbound_last("two", handler as Arc<dyn InboundHandler>)
        .expect_err("instance reuse");
    assert_eq!(err.code(), codes::HANDLER_NOT_REUSABLE);
}

#[test]
fn mutations_bump_the_epoch() {
    let channel = StubChannel::new();
    let pipeline = channel.core().pipeline();
    let before = pipeline.epoch();
    pipeline
        .add_inbound_last("h", RecordingInbound::new("h", event_log()))
        .unwrap();
    assert!(pipeline.epoch() > before);
    pipeline.remove("h").unwrap();
    assert_eq!(pipeline.handler_names().len(), 0);
}

#[test]
fn deregister_fails_at_the_head_terminal() {
    let channel = StubChannel::new();
    let pipeline = channel.core().pipeline();

    let signal = pipeline.deregister();

    match signal.state() {
        SignalState::Failed(error) => assert_eq!(error.code(), codes::DEREGISTER_UNSUPPORTED),
        other => panic!("expected failure, got {other:?}"),
    }
}
