// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Advertise state machines.
//!
//! Two profiles, selected once per engine by [`crate::config::ProtocolMode`]:
//!
//! | Module | Profile | Scope |
//! |--------|---------|-------|
//! | [`ieee`] | IEEE 1722.1-2013 Sec.6.2.4/6.2.5 | entity level + interface level |
//! | [`milan`] | MILAN 1.x Sec.9.3 | interface level only |
//!
//! Both run to completion inside one engine call: a handler may arm timers
//! and transmit frames, never wait.

pub mod ieee;
pub mod milan;

use crate::engine::{Port, TimerKind};
use crate::entity::LocalEntity;
use crate::net::NetworkPort;
use crate::protocol::{AdpFrame, MessageType};
use crate::timer::TimerWheel;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Engine resources a state machine handler may touch.
pub(crate) struct AdvertiseCtx<'a, N> {
    pub timers: &'a mut TimerWheel<TimerKind>,
    pub rng: &'a mut fastrand::Rng,
    pub net: &'a mut N,
    pub ports: &'a [Port],
    /// Sent multicast frames, received back by the engine afterwards
    pub loopback: &'a mut VecDeque<(u16, AdpFrame)>,
    pub now: Instant,
}

impl<N: NetworkPort> AdvertiseCtx<'_, N> {
    /// Uniform random delay in `[min_ms, max_ms]`
    pub(crate) fn random_delay(&mut self, min_ms: u64, max_ms: u64) -> Duration {
        Duration::from_millis(self.rng.u64(min_ms..=max_ms.max(min_ms)))
    }

    /// Transmit AVAILABLE or DEPARTING for `entity` on its `binding`-th interface.
    ///
    /// AVAILABLE carries half the entity valid_time (2 s units), DEPARTING
    /// carries zero. The frame is queued for loopback even if the transmit
    /// fails.
    pub(crate) fn send_advertise(
        &mut self,
        entity: &LocalEntity,
        binding: usize,
        message_type: MessageType,
    ) {
        let Some(itf) = entity.interfaces().get(binding) else {
            return;
        };
        let Some(port) = self.ports.get(usize::from(itf.port())) else {
            log::error!(
                "entity({}) no port {} for interface {}",
                entity.id(),
                itf.port(),
                binding
            );
            return;
        };

        let valid_time = match message_type {
            MessageType::Available => entity.valid_time() / 2,
            _ => 0,
        };
        let pdu = entity.build_pdu(binding, port.gptp_domain_number());
        let frame = AdpFrame::multicast(port.mac_address(), message_type, valid_time, pdu);

        let sent = self.net.transmit(itf.port(), &frame.to_bytes());
        self.loopback.push_back((itf.port(), frame));

        if let Err(e) = sent {
            log::error!(
                "entity({}) port({}) couldn't send {}: {}",
                entity.id(),
                itf.port(),
                message_type,
                e
            );
            return;
        }

        log::debug!(
            "entity({}) port({}) sent {} available_index {}",
            entity.id(),
            itf.port(),
            message_type,
            pdu.available_index.get()
        );
    }
}
