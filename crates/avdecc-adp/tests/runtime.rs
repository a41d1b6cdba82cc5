// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![cfg(feature = "runtime")]
#![allow(clippy::unreadable_literal)] // Test entity ids

//! Engine hosted on the tokio runtime, with paused time.

mod common;

use avdecc_adp::runtime::{self, ChannelControl, ChannelNetwork, OutboundFrame};
use avdecc_adp::{
    AdpEngine, AdpFrame, ControlMessage, Destination, EntityId, MessageType, NoAcmp, ProtocolMode,
};
use common::{config, controller, init_logger, remote_frame, talker_pdu};
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

const LOCAL: u64 = 0x0001_f2ff_fe00_0c01;

async fn next_frame(rx: &mut Receiver<OutboundFrame>) -> AdpFrame {
    let out = timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("no frame within 30 s")
        .expect("network channel closed");
    assert_eq!(out.port, 0);
    AdpFrame::decode(&out.bytes).unwrap()
}

async fn next_message(rx: &mut Receiver<(Destination, ControlMessage)>) -> (Destination, ControlMessage) {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no control message within 5 s")
        .expect("control channel closed")
}

fn announced(msg: &ControlMessage) -> (u32, EntityId) {
    match msg {
        ControlMessage::Available { total, info } | ControlMessage::Departing { total, info } => {
            (*total, info.entity_id)
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_runtime_advertises_notifies_and_departs() {
    init_logger();
    let mut cfg = config(ProtocolMode::Ieee, vec![controller(LOCAL)]);
    cfg.send_discover_on_start = true;

    let (net, mut frames) = ChannelNetwork::new(64);
    let (ctl, mut messages) = ChannelControl::new(64);
    let engine = AdpEngine::new(cfg, net, ctl, NoAcmp).unwrap();
    let (handle, task) = runtime::spawn(engine);

    let discover = next_frame(&mut frames).await;
    assert_eq!(discover.message_type(), MessageType::Discover);
    assert!(discover.pdu.entity_id.is_wildcard());

    let available = next_frame(&mut frames).await;
    assert_eq!(available.message_type(), MessageType::Available);
    assert_eq!(available.pdu.entity_id, EntityId::new(LOCAL));

    // our own AVAILABLE is received back
    let (dst, msg) = next_message(&mut messages).await;
    assert_eq!(dst, Destination::All);
    assert_eq!(msg.kind(), "AVAILABLE");
    assert_eq!(announced(&msg), (1, EntityId::new(LOCAL)));

    // a remote talker shows up
    let remote = remote_frame(MessageType::Available, 10, talker_pdu(0x7a1c, 1));
    handle.frame(0, remote).await.unwrap();

    let (dst, msg) = next_message(&mut messages).await;
    assert_eq!(dst, Destination::All);
    assert_eq!(msg.kind(), "AVAILABLE");
    assert_eq!(announced(&msg), (2, EntityId::new(0x7a1c)));

    // and can be looked up by a client
    handle
        .control(
            EntityId::new(LOCAL),
            ControlMessage::Discover {
                entity_id: EntityId::new(0x7a1c),
            },
            Destination::Client(3),
        )
        .await
        .unwrap();
    let (dst, msg) = next_message(&mut messages).await;
    assert_eq!(dst, Destination::Client(3));
    assert_eq!(announced(&msg), (2, EntityId::new(0x7a1c)));

    handle.shutdown().await.unwrap();
    let engine = task.await.unwrap();
    assert!(!engine.is_started());

    let mut departing = 0;
    while let Ok(out) = frames.try_recv() {
        let frame = AdpFrame::decode(&out.bytes).unwrap();
        if frame.message_type() == MessageType::Departing {
            departing += 1;
        }
    }
    assert_eq!(departing, 1);

    // and its DEPARTING too
    let (dst, msg) = messages.try_recv().unwrap();
    assert_eq!(dst, Destination::All);
    assert_eq!(msg.kind(), "DEPARTING");
    assert_eq!(announced(&msg), (2, EntityId::new(LOCAL)));
}

#[tokio::test(start_paused = true)]
async fn test_runtime_stops_when_handles_dropped() {
    init_logger();
    let cfg = config(ProtocolMode::Milan, vec![controller(LOCAL)]);

    let (net, _frames) = ChannelNetwork::new(64);
    let (ctl, _messages) = ChannelControl::new(8);
    let engine = AdpEngine::new(cfg, net, ctl, NoAcmp).unwrap();
    let (handle, task) = runtime::spawn(engine);

    handle.set_link_state(0, false).await.unwrap();
    drop(handle);

    let engine = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(!engine.ports()[0].link_up());
    assert!(!engine.is_started());
}
