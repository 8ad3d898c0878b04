//! Send-side quota and receive-side window handling through the public API.

mod common;

use common::{Command, Harness};
use wschannel::{Data, Frame, Message, TransportEvent, WebSocketConfig};

#[test]
fn receive_window_is_granted_and_replenished() {
    let h = Harness::with_config(WebSocketConfig::default().receive_quota(4096));
    assert_eq!(*h.transport.commands.lock(), vec![Command::FlowControl(4096)]);

    h.open("");
    h.frame(b"abc", Data::Binary, true);
    h.frame(b"", Data::Binary, true);
    assert_eq!(
        *h.transport.commands.lock(),
        vec![Command::FlowControl(4096), Command::FlowControl(3)]
    );
}

#[test]
fn frames_wait_for_send_quota() {
    let h = Harness::new();
    h.open("");

    h.ws.send(vec![1u8; 100], Data::Binary, false).unwrap();
    h.ws.send(vec![2u8; 50], Data::Continue, false).unwrap();
    h.ws.send(vec![3u8; 30], Data::Continue, true).unwrap();
    h.pump();
    assert!(h.transport.frames().is_empty());
    assert_eq!(h.ws.buffered_amount(), 180);

    h.deliver(TransportEvent::FlowControlGranted(120));
    assert_eq!(
        h.transport.frames(),
        vec![
            Frame::message(vec![1u8; 100], Data::Binary, false),
            Frame::message(vec![2u8; 20], Data::Continue, false),
        ]
    );
    assert_eq!(h.ws.buffered_amount(), 60);

    h.deliver(TransportEvent::FlowControlGranted(1000));
    assert_eq!(
        h.transport.frames()[2..],
        [
            Frame::message(vec![2u8; 30], Data::Continue, false),
            Frame::message(vec![3u8; 30], Data::Continue, true),
        ]
    );
    assert_eq!(h.ws.buffered_amount(), 0);
}

#[test]
fn split_message_keeps_its_opcode_on_the_first_piece() {
    let h = Harness::new();
    h.open("");
    h.deliver(TransportEvent::FlowControlGranted(4));

    h.ws.send_message(Message::text("hello")).unwrap();
    h.pump();
    assert_eq!(h.transport.frames(), vec![Frame::message(&b"hell"[..], Data::Text, false)]);

    h.deliver(TransportEvent::FlowControlGranted(4));
    assert_eq!(h.transport.frames()[1], Frame::message(&b"o"[..], Data::Continue, true));
    // Leftover quota is kept for later frames.
    h.ws.send_message(Message::binary(vec![9u8; 3])).unwrap();
    h.pump();
    assert_eq!(h.transport.frames()[2], Frame::message(vec![9u8; 3], Data::Binary, true));
}

#[test]
fn frames_are_queued_before_open() {
    let h = Harness::new();
    h.ws.send_message(Message::text("early")).unwrap();
    h.deliver(TransportEvent::FlowControlGranted(100));
    assert_eq!(h.transport.frames(), vec![Frame::message(&b"early"[..], Data::Text, true)]);
}

#[test]
fn bytes_sent_before_a_rejected_frame_are_released() {
    let h = Harness::new();
    h.open("");
    *h.transport.reject_at.lock() = Some(2);

    h.ws.send(vec![1u8; 10], Data::Binary, false).unwrap();
    h.ws.send(vec![2u8; 10], Data::Continue, true).unwrap();
    h.deliver(TransportEvent::FlowControlGranted(20));
    assert_eq!(h.transport.frames().len(), 1);
    assert_eq!(h.ws.buffered_amount(), 10);

    // The rejected frame kept its quota and goes out on the next drain.
    h.deliver(TransportEvent::FlowControlGranted(0));
    assert_eq!(
        h.transport.frames(),
        vec![
            Frame::message(vec![1u8; 10], Data::Binary, false),
            Frame::message(vec![2u8; 10], Data::Continue, true),
        ]
    );
    assert_eq!(h.ws.buffered_amount(), 0);
}
