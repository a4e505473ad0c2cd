// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[derive(Debug)]
enum Msg {
    Ping(u32),
    Ask { reply: oneshot::Sender<u32> },
}

impl PartialEq for Msg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Msg::Ping(a), Msg::Ping(b)) => a == b,
            _ => false,
        }
    }
}

#[tokio::test]
async fn messages_arrive_in_send_order() {
    let (addr, mut mbox) = mailbox::<Msg>("svc");
    addr.send(Msg::Ping(1)).unwrap();
    addr.send(Msg::Ping(2)).unwrap();

    assert_eq!(mbox.recv().await, Some(Msg::Ping(1)));
    assert_eq!(mbox.recv().await, Some(Msg::Ping(2)));
}

#[tokio::test]
async fn send_to_gone_mailbox_is_a_network_failure() {
    let (addr, mbox) = mailbox::<Msg>("svc");
    drop(mbox);
    let err = addr.send(Msg::Ping(1)).unwrap_err();
    assert!(err.while_sending());
    assert!(!err.is_timeout());
    assert!(addr.is_closed());
}

#[tokio::test(start_paused = true)]
async fn recv_timeout_maps_to_network_timeout() {
    let (_addr, mut mbox) = mailbox::<Msg>("svc");
    let err = mbox.recv_timeout(2.0).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(err.while_receiving());
}

#[tokio::test]
async fn request_reply_round_trip() {
    let (addr, mut mbox) = mailbox::<Msg>("svc");

    let server = tokio::spawn(async move {
        if let Some(Msg::Ask { reply }) = mbox.recv().await {
            let _ = reply.send(42);
        }
    });

    let answer = request(&addr, |reply| Msg::Ask { reply }).await.unwrap();
    assert_eq!(answer, 42);
    server.await.unwrap();
}

#[tokio::test]
async fn dropped_reply_slot_is_a_receive_failure() {
    let (addr, mut mbox) = mailbox::<Msg>("svc");

    let server = tokio::spawn(async move {
        // Drop the reply slot without answering.
        let _ = mbox.recv().await;
    });

    let err = request(&addr, |reply| Msg::Ask { reply }).await.unwrap_err();
    assert!(err.while_receiving());
    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sized_send_with_transport_takes_simulated_time() {
    let clock = SimClock::new();
    let (addr, mut mbox) = mailbox::<Msg>("svc");
    let addr = addr.with_transport(Transport::new(1.0, 1000.0).unwrap(), clock);

    addr.send_sized(Msg::Ping(7), 4000).unwrap();
    let received = mbox.recv().await;
    assert_eq!(received, Some(Msg::Ping(7)));
    // 1s latency + 4000 bytes at 1000 B/s.
    let now = clock.now();
    assert!((4.99..5.1).contains(&now), "now = {now}");
}

#[tokio::test]
async fn sized_send_without_transport_is_immediate() {
    let (addr, mut mbox) = mailbox::<Msg>("svc");
    addr.send_sized(Msg::Ping(7), 1 << 20).unwrap();
    assert_eq!(mbox.try_recv(), Some(Msg::Ping(7)));
}

#[test]
fn transport_validates_parameters() {
    assert!(Transport::new(-1.0, 100.0).is_err());
    assert!(Transport::new(0.0, 0.0).is_err());
    assert!(Transport::new(0.0, 100.0).is_ok());
}
