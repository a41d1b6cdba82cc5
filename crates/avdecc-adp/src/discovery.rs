// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity Discovery Database (IEEE 1722.1-2013 Sec.6.2.6).
//!
//! One fixed-capacity database per port. Each slot owns an expiry timer
//! created with the database; a slot is only released after its timer has
//! been stopped, so an expiry can never reach a freed or reused slot.
//!
//! # Lifecycle of an entry
//!
//! ```text
//! AVAILABLE (unknown id)   -> slot acquired, controllers notified
//! AVAILABLE (newer index)  -> entry refreshed, controllers notified on change
//! AVAILABLE (stale index)  -> restart: entry put (DEPARTING), fresh slot acquired
//! DEPARTING / expiry       -> entry put (DEPARTING), slot released
//! ```

use crate::acmp::AcmpHooks;
use crate::config::ProtocolMode;
use crate::engine::{AdpEngine, TimerKind};
use crate::error::Result;
use crate::net::NetworkPort;
use crate::notify::{deliver, ControlChannel, ControlMessage, Destination};
use crate::protocol::{AdpPdu, EntityId, EntityInfo, MacAddr};
use crate::timer::{TimerId, TimerWheel};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Slot {
    info: Option<EntityInfo>,
    timer: TimerId,
}

/// Remote entities discovered on one port.
#[derive(Debug)]
pub struct DiscoveryDb {
    port: u16,
    slots: Vec<Slot>,
    len: usize,
}

impl DiscoveryDb {
    /// Create a database of `capacity` slots, with one expiry timer each.
    ///
    /// On timer exhaustion, timers created so far are destroyed again.
    pub(crate) fn new(port: u16, capacity: usize, timers: &mut TimerWheel<TimerKind>) -> Result<Self> {
        let mut slots = Vec::with_capacity(capacity);

        for slot in 0..capacity {
            match timers.create(TimerKind::DiscoveryExpiry { port, slot }) {
                Ok(timer) => slots.push(Slot { info: None, timer }),
                Err(e) => {
                    for created in slots {
                        timers.destroy(created.timer);
                    }
                    log::error!("port({}) discovery timer creation failed", port);
                    return Err(e);
                }
            }
        }

        Ok(Self {
            port,
            slots,
            len: 0,
        })
    }

    /// Release all timers
    pub(crate) fn destroy(&mut self, timers: &mut TimerWheel<TimerKind>) {
        for slot in self.slots.drain(..) {
            timers.destroy(slot.timer);
        }
        self.len = 0;
    }

    /// Port index
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of discovered entities
    pub fn len(&self) -> usize {
        self.len
    }

    /// No entity discovered
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot count
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Look up a discovered entity
    pub fn find(&self, entity_id: EntityId) -> Option<&EntityInfo> {
        self.find_slot(entity_id).and_then(|slot| self.info(slot))
    }

    /// Discovered entities, in slot order
    pub fn iter(&self) -> impl Iterator<Item = &EntityInfo> {
        self.slots.iter().filter_map(|slot| slot.info.as_ref())
    }

    pub(crate) fn find_slot(&self, entity_id: EntityId) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.info
                .as_ref()
                .is_some_and(|info| info.entity_id == entity_id)
        })
    }

    pub(crate) fn info(&self, slot: usize) -> Option<&EntityInfo> {
        self.slots.get(slot).and_then(|s| s.info.as_ref())
    }

    pub(crate) fn timer(&self, slot: usize) -> Option<TimerId> {
        self.slots.get(slot).map(|s| s.timer)
    }

    /// Take a free slot, holding a zeroed entry
    fn acquire(&mut self) -> Option<usize> {
        let Some(slot) = self.slots.iter().position(|s| s.info.is_none()) else {
            log::error!(
                "port({}) no more discovery entries ({} in use)",
                self.port,
                self.len
            );
            return None;
        };

        self.slots[slot].info = Some(EntityInfo::default());
        self.len += 1;
        Some(slot)
    }

    fn store(&mut self, slot: usize, info: EntityInfo) {
        if let Some(entry) = self.slots.get_mut(slot).and_then(|s| s.info.as_mut()) {
            *entry = info;
        }
    }

    /// Free a slot, returning its last entry. The caller stops the timer.
    fn release(&mut self, slot: usize) -> Option<EntityInfo> {
        let info = self.slots.get_mut(slot)?.info.take()?;
        self.len -= 1;
        Some(info)
    }
}

/// Expiry of an entry: twice the advertised valid_time field (2 s units), at least 2 s
fn expiry_timeout(valid_time: u8) -> Duration {
    Duration::from_secs(u64::from(valid_time.max(1)) * 2)
}

impl<N: NetworkPort, C: ControlChannel, A: AcmpHooks> AdpEngine<N, C, A> {
    /// Handle an AVAILABLE received on `port`.
    pub(crate) fn discovery_update(
        &mut self,
        port: u16,
        pdu: &AdpPdu,
        valid_time: u8,
        source: MacAddr,
        now: Instant,
    ) {
        let Some(p) = self.ports.get(usize::from(port)) else {
            return;
        };
        let local_mac = p.mac_address();

        log::info!(
            "port({}) entity: {}, capabilities: {:x}, association ID: {:x} gPTP GM ID: {:016x}, valid time: {} s",
            port,
            pdu.entity_id,
            pdu.entity_capabilities,
            pdu.association_id,
            pdu.gptp_grandmaster_id,
            u32::from(valid_time) * 2
        );

        let slot = match p.discovery.find_slot(pdu.entity_id) {
            None => match self.ports[usize::from(port)].discovery.acquire() {
                Some(slot) => slot,
                None => return,
            },
            Some(slot) => {
                let stored = p
                    .discovery
                    .info(slot)
                    .map(|info| info.available_index)
                    .unwrap_or_default();

                if pdu.available_index.is_newer_than(stored) {
                    slot
                } else {
                    log::info!("port({}) entity: {} power-cycled", port, pdu.entity_id);
                    self.discovery_put(port, slot);

                    match self.ports[usize::from(port)].discovery.acquire() {
                        Some(slot) => slot,
                        None => return,
                    }
                }
            }
        };

        let disc = &self.ports[usize::from(port)].discovery;
        let Some(previous) = disc.info(slot).copied() else {
            return;
        };
        let timer = disc.timer(slot);

        let gm_changed = previous.gptp_grandmaster_id != pdu.gptp_grandmaster_id;
        if gm_changed {
            log::info!(
                "port({}) gPTP GM ID change for entity: {}, former: {:016x}, new: {:016x}",
                port,
                pdu.entity_id,
                previous.gptp_grandmaster_id,
                pdu.gptp_grandmaster_id
            );
        }

        let changed = previous.differs_from(pdu, source);
        let info = EntityInfo::from_pdu(pdu, source, local_mac);
        self.ports[usize::from(port)].discovery.store(slot, info);

        if changed {
            self.notify_local_controller(port, |total| ControlMessage::Available { total, info });
        }

        if let Some(timer) = timer {
            self.timers.start(timer, now, expiry_timeout(valid_time));
        }

        if self.mode == ProtocolMode::Ieee {
            self.ieee_discovery_update(port, &info, gm_changed);
        }
    }

    /// Handle a DEPARTING received on `port`.
    pub(crate) fn discovery_remove(&mut self, port: u16, pdu: &AdpPdu) {
        let Some(slot) = self
            .ports
            .get(usize::from(port))
            .and_then(|p| p.discovery.find_slot(pdu.entity_id))
        else {
            return;
        };

        log::info!("port({}) entity remove: {}", port, pdu.entity_id);
        self.discovery_put(port, slot);
    }

    /// Expiry timer of `slot` fired.
    pub(crate) fn discovery_timeout(&mut self, port: u16, slot: usize) {
        let Some(info) = self
            .ports
            .get(usize::from(port))
            .and_then(|p| p.discovery.info(slot))
        else {
            return;
        };

        log::info!("port({}) entity timeout: {}", port, info.entity_id);
        self.discovery_put(port, slot);
    }

    /// Notify the departure of `slot` and free it.
    fn discovery_put(&mut self, port: u16, slot: usize) {
        let disc = &self.ports[usize::from(port)].discovery;
        let Some(info) = disc.info(slot).copied() else {
            return;
        };
        if let Some(timer) = disc.timer(slot) {
            self.timers.stop(timer);
        }

        // total still counts the departing entry
        self.notify_local_controller(port, |total| ControlMessage::Departing { total, info });

        // only started entities track talkers
        if self.mode == ProtocolMode::Ieee && self.started {
            for entity in self.entities.iter().flatten() {
                self.acmp.listener_talker_left(entity.id(), info.entity_id);
            }
        }

        self.ports[usize::from(port)].discovery.release(slot);
    }

    /// Legacy fast-connect hooks run on every discovery update.
    fn ieee_discovery_update(&mut self, port: u16, info: &EntityInfo, gm_changed: bool) {
        let Some(listener) = self.local_listener(port) else {
            log::debug!(
                "port({}) no local listener entity on this port to do fast-connect",
                port
            );
            return;
        };

        // back-to-back: first media talker discovered that isn't ourself
        if info.is_media_talker() && info.entity_id != listener && self.fast_connect.back_to_back {
            self.acmp.listener_fast_connect_btb(listener, info.entity_id, port);
        }

        if gm_changed && self.fast_connect.enabled {
            for entity in self.entities.iter().flatten().filter(|e| e.on_port(port)) {
                let local_gm = entity
                    .binding(port)
                    .map(|b| entity.interfaces[b].grandmaster_id);
                if local_gm == Some(info.gptp_grandmaster_id) {
                    self.acmp.listener_fast_connect(entity.id(), info.entity_id, port);
                }
            }
        }
    }

    /// Send a database notification to the local controller of `port`.
    fn notify_local_controller(&mut self, port: u16, msg: impl FnOnce(u32) -> ControlMessage) {
        let Some(controller) = self.local_controller(port) else {
            return;
        };
        let total = self.total_discovered(controller);
        let id = controller.id();
        deliver(&mut self.ctl, id, Destination::All, msg(total));
    }
}
