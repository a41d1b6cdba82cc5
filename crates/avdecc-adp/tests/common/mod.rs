// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared doubles for the engine integration tests.
//!
//! Every seam of the engine is replaced by a recorder, time is explicit.

#![allow(dead_code)]

use avdecc_adp::protocol::{controller_caps, listener_caps, talker_caps};
use avdecc_adp::{
    AcmpHooks, AdpConfig, AdpEngine, AdpFrame, AdpPdu, AvailableIndex, ChannelError, ControlChannel,
    ControlMessage, Destination, EntityConfig, EntityId, InterfaceConfig, ListenerSinkEvent, MacAddr,
    MessageType, NetworkPort, ProtocolMode, Result,
};
use std::time::{Duration, Instant};

pub const REMOTE_MAC: MacAddr = MacAddr::new([0x02, 0xaa, 0x00, 0x00, 0x00, 0x01]);

pub type Engine = AdpEngine<RecordingNetwork, RecordingControl, RecordingAcmp>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Network double decoding every transmitted frame
#[derive(Debug, Default)]
pub struct RecordingNetwork {
    pub joined: Vec<u16>,
    pub frames: Vec<(u16, AdpFrame)>,
}

impl RecordingNetwork {
    /// Transmitted frames of one message type
    pub fn of_type(&self, message_type: MessageType) -> Vec<(u16, AdpFrame)> {
        self.frames
            .iter()
            .filter(|(_, f)| f.message_type() == message_type)
            .copied()
            .collect()
    }
}

impl NetworkPort for RecordingNetwork {
    fn join_multicast(&mut self, port: u16, _group: MacAddr) -> Result<()> {
        self.joined.push(port);
        Ok(())
    }

    fn transmit(&mut self, port: u16, frame: &[u8]) -> Result<()> {
        self.frames.push((port, AdpFrame::decode(frame)?));
        Ok(())
    }
}

/// Control channel double, optionally refusing messages past `limit`
#[derive(Debug, Default)]
pub struct RecordingControl {
    pub messages: Vec<(Destination, ControlMessage)>,
    pub limit: Option<usize>,
}

impl RecordingControl {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.messages.iter().map(|(_, m)| m.kind()).collect()
    }
}

impl ControlChannel for RecordingControl {
    fn send(&mut self, dst: Destination, msg: ControlMessage) -> std::result::Result<(), ChannelError> {
        if self.limit.is_some_and(|limit| self.messages.len() >= limit) {
            return Err(ChannelError::QueueFull);
        }
        self.messages.push((dst, msg));
        Ok(())
    }
}

/// Connection-management double
#[derive(Debug, Default)]
pub struct RecordingAcmp {
    pub talker_left: Vec<(EntityId, EntityId)>,
    pub fast_connect: Vec<(EntityId, EntityId, u16)>,
    pub fast_connect_btb: Vec<(EntityId, EntityId, u16)>,
    pub sink_events: Vec<(EntityId, u16, ListenerSinkEvent)>,
}

impl AcmpHooks for RecordingAcmp {
    fn listener_talker_left(&mut self, listener: EntityId, talker: EntityId) {
        self.talker_left.push((listener, talker));
    }

    fn listener_fast_connect(&mut self, listener: EntityId, talker: EntityId, port: u16) {
        self.fast_connect.push((listener, talker, port));
    }

    fn listener_fast_connect_btb(&mut self, listener: EntityId, talker: EntityId, port: u16) {
        self.fast_connect_btb.push((listener, talker, port));
    }

    fn listener_sink_event(&mut self, listener: EntityId, stream_input: u16, event: ListenerSinkEvent) {
        self.sink_events.push((listener, stream_input, event));
    }
}

pub fn interface(index: u8) -> InterfaceConfig {
    InterfaceConfig::new(format!("eth{}", index), MacAddr::new([0x02, 0, 0, 0, 0, index + 1]))
}

/// Local controller bound to port 0
pub fn controller(id: u64) -> EntityConfig {
    let mut entity = EntityConfig::new(EntityId::new(id), vec![0]);
    entity.controller_capabilities = controller_caps::IMPLEMENTED;
    entity
}

/// Local listener bound to port 0 with `streams` stream inputs
pub fn listener(id: u64, streams: usize) -> EntityConfig {
    let mut entity = EntityConfig::new(EntityId::new(id), vec![0]);
    entity.listener_capabilities = listener_caps::IMPLEMENTED | listener_caps::AUDIO_SINK;
    entity.listener_stream_sinks = streams as u16;
    entity.stream_inputs = vec![avdecc_adp::StreamInputConfig { avb_interface_index: 0 }; streams];
    entity
}

/// Single-port configuration, seeded, no DISCOVER at start
pub fn config(mode: ProtocolMode, entities: Vec<EntityConfig>) -> AdpConfig {
    AdpConfig {
        mode,
        interfaces: vec![interface(0)],
        entities,
        send_discover_on_start: false,
        rng_seed: Some(0x5eed),
        ..AdpConfig::default()
    }
}

pub fn engine(config: AdpConfig) -> Engine {
    init_logger();
    AdpEngine::new(
        config,
        RecordingNetwork::default(),
        RecordingControl::default(),
        RecordingAcmp::default(),
    )
    .unwrap()
}

/// AVAILABLE PDU of a remote talker
pub fn talker_pdu(id: u64, index: u32) -> AdpPdu {
    AdpPdu {
        entity_id: EntityId::new(id),
        entity_model_id: 0x0011_2233_4455_6677,
        talker_stream_sources: 2,
        talker_capabilities: talker_caps::IMPLEMENTED | talker_caps::AUDIO_SOURCE,
        available_index: AvailableIndex(index),
        ..AdpPdu::default()
    }
}

/// Encoded frame sent by the remote station
pub fn remote_frame(message_type: MessageType, valid_time: u8, pdu: AdpPdu) -> Vec<u8> {
    AdpFrame::multicast(REMOTE_MAC, message_type, valid_time, pdu)
        .to_bytes()
        .to_vec()
}

/// Fire every timer up to `now + by`, at its own deadline.
pub fn advance(engine: &mut Engine, now: &mut Instant, by: Duration) {
    let target = *now + by;
    while let Some(deadline) = engine.next_deadline() {
        if deadline > target {
            break;
        }
        *now = (*now).max(deadline);
        engine.poll_timers(*now);
    }
    *now = target;
}

/// Advance in 10 ms steps until `done` holds, at most `limit`.
pub fn advance_until(
    engine: &mut Engine,
    now: &mut Instant,
    limit: Duration,
    mut done: impl FnMut(&Engine) -> bool,
) -> bool {
    let end = *now + limit;
    while *now < end {
        if done(engine) {
            return true;
        }
        advance(engine, now, Duration::from_millis(10));
    }
    done(engine)
}
