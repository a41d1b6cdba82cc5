// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ADP engine: the context owning ports, local entities and timers.
//!
//! # Lifecycle
//!
//! ```text
//! AdpEngine::new()  -> ports + discovery databases + entities created (nothing sent)
//! start()           -> DISCOVER per port, advertise machines started
//! net_rx() / control_rx() / poll_timers() / set_link_state() / ...
//! shutdown()        -> DEPARTING per active interface, machines back to NOT_STARTED
//! ```
//!
//! Every call runs to completion. The engine never reads a clock, callers
//! pass `now` and drive [`AdpEngine::poll_timers`] from
//! [`AdpEngine::next_deadline`].
//!
//! # Loopback
//!
//! Every multicast frame the engine transmits is also received locally on
//! the same port, with the port MAC as source: local controllers see local
//! entities, and a local DISCOVER is answered by the local entities too.
//! Looped frames are queued and handled once the current handler returns.

use crate::acmp::AcmpHooks;
use crate::advertise::ieee::{self, EntityEvent, IeeeEntity, InterfaceEvent, InterfaceState};
use crate::advertise::milan::{self, MilanEvent, MilanInterface};
use crate::advertise::AdvertiseCtx;
use crate::config::{AdpConfig, EntityConfig, FastConnect, InterfaceConfig, ProtocolMode};
use crate::discovery::DiscoveryDb;
use crate::entity::{EntityAdvertise, InterfaceAdvertiseState, InterfaceMachine, LocalEntity};
use crate::error::{Error, Result};
use crate::listener_sink::{self, ListenerSinkDiscovery, SinkCtx, SinkEvent};
use crate::net::NetworkPort;
use crate::notify::{deliver, ControlChannel, ControlMessage, Destination};
use crate::protocol::{
    AdpFrame, AdpPdu, AvailableIndex, EntityId, EntityInfo, MacAddr, MessageType, ADP_MULTICAST_MAC,
};
use crate::timer::{TimerId, TimerWheel};
use std::collections::VecDeque;
use std::time::Instant;

/// What a timer of the engine's wheel stands for.
///
/// Records are addressed by index (entity slot, binding position, discovery
/// slot); the timer generation guarantees the record still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    EntityDelay { entity: usize },
    EntityReannounce { entity: usize },
    MilanDelay { entity: usize, binding: usize },
    MilanAdvertise { entity: usize, binding: usize },
    DiscoveryExpiry { port: u16, slot: usize },
    ListenerSinkNoAdp { entity: usize, stream: u16 },
}

/// One network interface and its discovery database.
#[derive(Debug)]
pub struct Port {
    index: u16,
    name: String,
    mac: MacAddr,
    gptp_domain_number: u8,
    link_up: bool,
    grandmaster_id: u64,
    pub(crate) discovery: DiscoveryDb,
}

impl Port {
    pub(crate) fn new(
        index: u16,
        cfg: &InterfaceConfig,
        capacity: usize,
        timers: &mut TimerWheel<TimerKind>,
    ) -> Result<Self> {
        Ok(Self {
            index,
            name: cfg.name.clone(),
            mac: cfg.mac_address,
            gptp_domain_number: cfg.gptp_domain_number,
            link_up: cfg.link_up,
            grandmaster_id: cfg.gptp_grandmaster_id,
            discovery: DiscoveryDb::new(index, capacity, timers)?,
        })
    }

    /// Port index
    pub fn index(&self) -> u16 {
        self.index
    }

    /// OS interface name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source MAC of transmitted frames
    pub fn mac_address(&self) -> MacAddr {
        self.mac
    }

    /// Configured gPTP domain
    pub fn gptp_domain_number(&self) -> u8 {
        self.gptp_domain_number
    }

    /// Link operational state
    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// Current gPTP grandmaster
    pub fn grandmaster_id(&self) -> u64 {
        self.grandmaster_id
    }

    /// Remote entities discovered on this port
    pub fn discovery(&self) -> &DiscoveryDb {
        &self.discovery
    }
}

/// The ADP engine.
///
/// Generic over the three seams it talks to: the network (`N`), local
/// applications (`C`) and connection management (`A`).
pub struct AdpEngine<N, C, A> {
    pub(crate) mode: ProtocolMode,
    pub(crate) fast_connect: FastConnect,
    send_discover_on_start: bool,
    max_entities_discovery: usize,
    pub(crate) ports: Vec<Port>,
    pub(crate) entities: Vec<Option<LocalEntity>>,
    pub(crate) timers: TimerWheel<TimerKind>,
    rng: fastrand::Rng,
    net: N,
    pub(crate) ctl: C,
    pub(crate) acmp: A,
    /// Multicast frames sent and not yet received back, with their port
    loopback: VecDeque<(u16, AdpFrame)>,
    pub(crate) started: bool,
}

impl<N: NetworkPort, C: ControlChannel, A: AcmpHooks> AdpEngine<N, C, A> {
    /// Create the engine: validate `config`, open every port, create the
    /// configured entities.
    ///
    /// Fails on invalid configuration, multicast join failure or timer
    /// exhaustion. Nothing is transmitted before [`start`](Self::start).
    pub fn new(config: AdpConfig, net: N, ctl: C, acmp: A) -> Result<Self> {
        config.validate()?;

        let rng = match config.rng_seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };

        let mut engine = Self {
            mode: config.mode,
            fast_connect: config.fast_connect,
            send_discover_on_start: config.send_discover_on_start,
            max_entities_discovery: config.max_entities_discovery,
            ports: Vec::with_capacity(config.interfaces.len()),
            entities: Vec::with_capacity(config.entities.len()),
            timers: TimerWheel::with_capacity(config.max_timers),
            rng,
            net,
            ctl,
            acmp,
            loopback: VecDeque::new(),
            started: false,
        };

        for (index, itf) in config.interfaces.iter().enumerate() {
            engine.open_port(index as u16, itf)?;
        }

        for entity in config.entities {
            engine.create_entity(entity)?;
        }

        log::info!(
            "[adp] engine ready: mode {:?}, {} port(s), {} entity(ies), {} timer(s)",
            engine.mode,
            engine.ports.len(),
            engine.entities.len(),
            engine.timers.allocated()
        );

        Ok(engine)
    }

    fn open_port(&mut self, index: u16, cfg: &InterfaceConfig) -> Result<()> {
        let mut port = Port::new(index, cfg, self.max_entities_discovery, &mut self.timers)?;

        if let Err(e) = self.net.join_multicast(index, ADP_MULTICAST_MAC) {
            log::error!("port({}) multicast join failed: {}", index, e);
            port.discovery.destroy(&mut self.timers);
            return Err(e);
        }

        log::info!(
            "port({}) {} mac {} domain {} discovery capacity {}",
            index,
            cfg.name,
            cfg.mac_address,
            cfg.gptp_domain_number,
            self.max_entities_discovery
        );
        self.ports.push(port);
        Ok(())
    }

    /// Start every entity and send the initial DISCOVER.
    pub fn start(&mut self, now: Instant) {
        if self.started {
            return;
        }
        self.started = true;

        if self.send_discover_on_start {
            for port in 0..self.ports.len() as u16 {
                if let Err(e) = self.send_discover(port, None, now) {
                    log::error!("port({}) initial discover failed: {}", port, e);
                }
            }
        }

        for slot in 0..self.entities.len() {
            self.start_entity(slot, now);
        }
        self.process_loopback(now);
    }

    /// Stop every entity. Each active interface sends one DEPARTING.
    pub fn shutdown(&mut self, now: Instant) {
        if !self.started {
            return;
        }

        for slot in 0..self.entities.len() {
            self.stop_entity(slot, now);
        }
        self.started = false;
        self.process_loopback(now);

        log::info!("[adp] engine stopped");
    }

    /// Add a local entity at runtime. It starts advertising right away if
    /// the engine is started.
    pub fn add_entity(&mut self, config: EntityConfig, now: Instant) -> Result<EntityId> {
        let id = config.entity_id;
        let slot = self.create_entity(config)?;

        if self.started {
            self.start_entity(slot, now);
            self.process_loopback(now);
        }
        Ok(id)
    }

    /// Remove a local entity, sending its DEPARTING first.
    pub fn remove_entity(&mut self, id: EntityId, now: Instant) -> Result<()> {
        let slot = self.slot_of(id).ok_or(Error::UnknownEntity(id))?;

        if self.started {
            self.stop_entity(slot, now);
        }

        if let Some(entity) = self.entities[slot].take() {
            for timer in entity_timers(&entity) {
                self.timers.destroy(timer);
            }
        }
        self.process_loopback(now);

        log::info!("entity({}) removed", id);
        Ok(())
    }

    /// Handle one Ethernet frame received on `port`.
    ///
    /// Malformed frames are returned as codec errors and otherwise ignored.
    pub fn net_rx(&mut self, port: u16, bytes: &[u8], now: Instant) -> Result<()> {
        if usize::from(port) >= self.ports.len() {
            return Err(Error::UnknownInterface(port));
        }

        let frame = AdpFrame::decode(bytes)?;
        self.frame_rx(port, &frame, now);
        self.process_loopback(now);

        Ok(())
    }

    fn frame_rx(&mut self, port: u16, frame: &AdpFrame, now: Instant) {
        let pdu = &frame.pdu;

        log::debug!(
            "port({}) rx {} from {} entity {}",
            port,
            frame.message_type(),
            frame.source,
            pdu.entity_id
        );

        match frame.message_type() {
            MessageType::Available => {
                self.discovery_update(port, pdu, frame.header.valid_time, frame.source, now);
                if self.mode == ProtocolMode::Milan {
                    self.listener_rcv(port, frame, now);
                }
            }
            MessageType::Departing => {
                self.discovery_remove(port, pdu);
                if self.mode == ProtocolMode::Milan {
                    self.listener_rcv(port, frame, now);
                }
            }
            MessageType::Discover => self.discover_rcv(port, pdu.entity_id, now),
        }
    }

    /// Receive the frames queued by local multicast transmits.
    ///
    /// Handling a looped frame may queue more (a DISCOVER answered by an
    /// entity in Waiting), so the queue is drained until empty.
    fn process_loopback(&mut self, now: Instant) {
        while let Some((port, frame)) = self.loopback.pop_front() {
            self.frame_rx(port, &frame, now);
        }
    }

    /// Handle a request from a local application talking to entity `id`.
    ///
    /// Answers go to `dst`, the requesting client.
    pub fn control_rx(&mut self, id: EntityId, msg: ControlMessage, dst: Destination) -> Result<()> {
        if self.slot_of(id).is_none() {
            return Err(Error::UnknownEntity(id));
        }

        log::debug!("entity({}) control rx {} from {}", id, msg.kind(), dst);

        match msg {
            ControlMessage::Discover { entity_id } if entity_id.is_wildcard() => {
                self.dump_discovered(id, dst);
            }
            ControlMessage::Discover { entity_id } => self.lookup_discovered(id, entity_id, dst),
            ControlMessage::Available { info, .. } => self.lookup_discovered(id, info.entity_id, dst),
            other => {
                log::error!("entity({}) unsupported control request {}", id, other.kind());
                deliver(&mut self.ctl, id, dst, ControlMessage::NotFound);
            }
        }

        Ok(())
    }

    /// Fire every timer due at `now`. Returns the number of timers fired.
    pub fn poll_timers(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(kind) = self.timers.pop_expired(now) {
            self.timer_expired(kind, now);
            self.process_loopback(now);
            fired += 1;
        }
        fired
    }

    /// Earliest armed deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Report the operational state of `port`.
    pub fn set_link_state(&mut self, port: u16, up: bool, now: Instant) -> Result<()> {
        let p = self
            .ports
            .get_mut(usize::from(port))
            .ok_or(Error::UnknownInterface(port))?;
        if p.link_up == up {
            return Ok(());
        }
        p.link_up = up;

        log::info!("port({}) link {}", port, if up { "up" } else { "down" });

        for slot in 0..self.entities.len() {
            let Some(binding) = self.binding_of(slot, port) else {
                continue;
            };
            if let Some(entity) = self.entities[slot].as_mut() {
                entity.interfaces[binding].link_up = up;
            }

            match self.mode {
                ProtocolMode::Ieee => {
                    let event = if up {
                        InterfaceEvent::LinkUp
                    } else {
                        InterfaceEvent::LinkDown
                    };
                    self.with_advertise(slot, now, |ctx, e| {
                        ieee::interface_event(ctx, e, binding, event)
                    });
                }
                ProtocolMode::Milan => {
                    let event = if up {
                        MilanEvent::LinkUp
                    } else {
                        MilanEvent::LinkDown
                    };
                    self.with_advertise(slot, now, |ctx, e| {
                        milan::interface_event(ctx, e, binding, event)
                    });
                }
            }
        }
        self.process_loopback(now);

        Ok(())
    }

    /// Report a gPTP grandmaster change on `port`.
    pub fn set_grandmaster(&mut self, port: u16, grandmaster_id: u64, now: Instant) -> Result<()> {
        let p = self
            .ports
            .get_mut(usize::from(port))
            .ok_or(Error::UnknownInterface(port))?;
        if p.grandmaster_id == grandmaster_id {
            return Ok(());
        }

        log::info!(
            "port({}) gPTP GM ID change, former: {:016x}, new: {:016x}",
            port,
            p.grandmaster_id,
            grandmaster_id
        );
        p.grandmaster_id = grandmaster_id;

        for slot in 0..self.entities.len() {
            let Some(binding) = self.binding_of(slot, port) else {
                continue;
            };
            if let Some(entity) = self.entities[slot].as_mut() {
                entity.interfaces[binding].grandmaster_id = grandmaster_id;
            }

            match self.mode {
                ProtocolMode::Ieee => self.with_advertise(slot, now, |ctx, e| {
                    ieee::interface_event(ctx, e, binding, InterfaceEvent::GmChange)
                }),
                ProtocolMode::Milan => self.with_advertise(slot, now, |ctx, e| {
                    milan::interface_event(ctx, e, binding, MilanEvent::GmChange)
                }),
            }
        }
        self.process_loopback(now);

        Ok(())
    }

    /// Bind stream input `stream` of listener `id` to `talker`.
    ///
    /// A stream input already following another talker is reset first.
    pub fn bind_listener_sink(&mut self, id: EntityId, stream: u16, talker: EntityId, now: Instant) -> Result<()> {
        let slot = self.sink_slot(id, stream)?;
        let current = self.entities[slot]
            .as_ref()
            .and_then(|e| e.listener_sinks.get(usize::from(stream)))
            .and_then(|sink| sink.talker);

        if current == Some(talker) {
            return Ok(());
        }
        if current.is_some() {
            self.with_sink(slot, now, |ctx, e| {
                listener_sink::sink_event(ctx, e, stream, SinkEvent::Reset)
            });
        }

        if let Some(sink) = self.entities[slot]
            .as_mut()
            .and_then(|e| e.listener_sinks.get_mut(usize::from(stream)))
        {
            sink.talker = Some(talker);
        }

        log::debug!("entity({}) stream_input({}) bound to talker {}", id, stream, talker);
        Ok(())
    }

    /// Unbind stream input `stream` of listener `id` (issues RESET).
    pub fn unbind_listener_sink(&mut self, id: EntityId, stream: u16, now: Instant) -> Result<()> {
        let slot = self.sink_slot(id, stream)?;

        self.with_sink(slot, now, |ctx, e| {
            listener_sink::sink_event(ctx, e, stream, SinkEvent::Reset)
        });

        if let Some(sink) = self.entities[slot]
            .as_mut()
            .and_then(|e| e.listener_sinks.get_mut(usize::from(stream)))
        {
            sink.talker = None;
        }

        log::debug!("entity({}) stream_input({}) unbound", id, stream);
        Ok(())
    }

    /// Send a DISCOVER on `port`, global when `target` is None.
    ///
    /// Local entities bound to `port` receive it as well.
    pub fn send_discover(&mut self, port: u16, target: Option<EntityId>, now: Instant) -> Result<()> {
        let p = self
            .ports
            .get(usize::from(port))
            .ok_or(Error::UnknownInterface(port))?;

        let target = target.unwrap_or(EntityId::WILDCARD);
        let frame = AdpFrame::multicast(p.mac_address(), MessageType::Discover, 0, AdpPdu::discover(target));
        let sent = self.net.transmit(port, &frame.to_bytes());

        self.loopback.push_back((port, frame));
        self.process_loopback(now);

        sent?;
        log::debug!("port({}) sent DISCOVER for {}", port, target);
        Ok(())
    }

    /// Remote entity `id` as discovered on `port`
    pub fn find_discovered(&self, port: u16, id: EntityId) -> Option<&EntityInfo> {
        self.ports.get(usize::from(port))?.discovery.find(id)
    }

    /// Remote entity `id` on the first port that knows it
    pub fn find_discovered_any(&self, id: EntityId) -> Option<&EntityInfo> {
        self.ports.iter().find_map(|p| p.discovery.find(id))
    }

    /// Number of remote entities discovered on `port`
    pub fn discovered_count(&self, port: u16) -> usize {
        self.ports
            .get(usize::from(port))
            .map_or(0, |p| p.discovery.len())
    }

    /// Local entity `id`
    pub fn entity(&self, id: EntityId) -> Option<&LocalEntity> {
        self.entities.iter().flatten().find(|e| e.id() == id)
    }

    /// All local entities
    pub fn entities(&self) -> impl Iterator<Item = &LocalEntity> {
        self.entities.iter().flatten()
    }

    /// Ports, in configuration order
    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Protocol profile
    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    /// Started and not shut down
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Network seam
    pub fn network(&self) -> &N {
        &self.net
    }

    /// Network seam, mutable
    pub fn network_mut(&mut self) -> &mut N {
        &mut self.net
    }

    /// Control channel towards local applications
    pub fn control(&self) -> &C {
        &self.ctl
    }

    /// Control channel, mutable
    pub fn control_mut(&mut self) -> &mut C {
        &mut self.ctl
    }

    /// Connection management hooks
    pub fn acmp(&self) -> &A {
        &self.acmp
    }

    /// Connection management hooks, mutable
    pub fn acmp_mut(&mut self) -> &mut A {
        &mut self.acmp
    }

    /// First local entity with controller capability bound to `port`
    pub(crate) fn local_controller(&self, port: u16) -> Option<&LocalEntity> {
        self.entities
            .iter()
            .flatten()
            .find(|e| e.is_controller() && e.on_port(port))
    }

    /// First local listener bound to `port`
    pub(crate) fn local_listener(&self, port: u16) -> Option<EntityId> {
        self.local_listener_slot(port)
            .and_then(|slot| self.entities[slot].as_ref())
            .map(LocalEntity::id)
    }

    fn local_listener_slot(&self, port: u16) -> Option<usize> {
        self.entities.iter().position(|e| {
            e.as_ref()
                .is_some_and(|e| e.is_listener() && e.on_port(port))
        })
    }

    /// Discovered entities over every port `entity` is bound to
    pub(crate) fn total_discovered(&self, entity: &LocalEntity) -> u32 {
        entity
            .interfaces
            .iter()
            .filter_map(|itf| self.ports.get(usize::from(itf.port)))
            .map(|p| p.discovery.len() as u32)
            .sum()
    }

    fn slot_of(&self, id: EntityId) -> Option<usize> {
        self.entities
            .iter()
            .position(|e| e.as_ref().is_some_and(|e| e.id() == id))
    }

    fn binding_of(&self, slot: usize, port: u16) -> Option<usize> {
        self.entities.get(slot)?.as_ref()?.binding(port)
    }

    fn sink_slot(&self, id: EntityId, stream: u16) -> Result<usize> {
        let slot = self.slot_of(id).ok_or(Error::UnknownEntity(id))?;
        let has_sink = self.entities[slot]
            .as_ref()
            .is_some_and(|e| usize::from(stream) < e.listener_sinks.len());

        if !has_sink {
            return Err(Error::UnknownStreamInput { entity: id, stream });
        }
        Ok(slot)
    }

    /// Build entity `config` in a free slot, all its timers or none.
    fn create_entity(&mut self, config: EntityConfig) -> Result<usize> {
        config.validate(self.ports.len())?;
        if self.slot_of(config.entity_id).is_some() {
            return Err(Error::DuplicateEntity(config.entity_id));
        }

        let slot = self
            .entities
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.entities.len());

        let mut created = Vec::new();
        let entity = match self.build_entity(slot, config, &mut created) {
            Ok(entity) => entity,
            Err(e) => {
                for timer in created {
                    self.timers.destroy(timer);
                }
                return Err(e);
            }
        };

        log::info!(
            "entity({}) created: {} interface(s), {} stream input(s), valid time {} s",
            entity.id(),
            entity.interfaces.len(),
            entity.listener_sinks.len(),
            entity.valid_time()
        );

        if slot == self.entities.len() {
            self.entities.push(Some(entity));
        } else {
            self.entities[slot] = Some(entity);
        }
        Ok(slot)
    }

    fn build_entity(
        &mut self,
        slot: usize,
        config: EntityConfig,
        created: &mut Vec<TimerId>,
    ) -> Result<LocalEntity> {
        let advertise = match self.mode {
            ProtocolMode::Ieee => {
                let delay = self.create_timer(TimerKind::EntityDelay { entity: slot }, created)?;
                let reannounce = self.create_timer(TimerKind::EntityReannounce { entity: slot }, created)?;
                EntityAdvertise::Ieee(IeeeEntity::new(delay, reannounce))
            }
            ProtocolMode::Milan => EntityAdvertise::Milan,
        };

        let mut interfaces = Vec::with_capacity(config.interfaces.len());
        for (binding, &port) in config.interfaces.iter().enumerate() {
            let (link_up, grandmaster_id) = self
                .ports
                .get(usize::from(port))
                .map(|p| (p.link_up, p.grandmaster_id))
                .ok_or(Error::UnknownInterface(port))?;

            let machine = match self.mode {
                ProtocolMode::Ieee => InterfaceMachine::Ieee(InterfaceState::NotStarted),
                ProtocolMode::Milan => {
                    let delay = self.create_timer(TimerKind::MilanDelay { entity: slot, binding }, created)?;
                    let advertise =
                        self.create_timer(TimerKind::MilanAdvertise { entity: slot, binding }, created)?;
                    InterfaceMachine::Milan(MilanInterface::new(delay, advertise))
                }
            };

            interfaces.push(InterfaceAdvertiseState {
                port,
                link_up,
                grandmaster_id,
                machine,
            });
        }

        let mut listener_sinks = Vec::new();
        if self.mode == ProtocolMode::Milan {
            for (stream, input) in config.stream_inputs.iter().enumerate() {
                let timer = self.create_timer(
                    TimerKind::ListenerSinkNoAdp {
                        entity: slot,
                        stream: stream as u16,
                    },
                    created,
                )?;
                listener_sinks.push(ListenerSinkDiscovery::new(input.avb_interface_index, timer));
            }
        }

        Ok(LocalEntity {
            config,
            available_index: AvailableIndex::ZERO,
            advertise,
            interfaces,
            listener_sinks,
        })
    }

    fn create_timer(&mut self, kind: TimerKind, created: &mut Vec<TimerId>) -> Result<TimerId> {
        let timer = self.timers.create(kind)?;
        created.push(timer);
        Ok(timer)
    }

    fn start_entity(&mut self, slot: usize, now: Instant) {
        match self.mode {
            ProtocolMode::Ieee => {
                self.with_advertise(slot, now, |ctx, e| ieee::entity_event(ctx, e, EntityEvent::Begin));
            }
            ProtocolMode::Milan => {
                self.with_advertise(slot, now, |ctx, e| {
                    for binding in 0..e.interfaces.len() {
                        milan::interface_event(ctx, e, binding, MilanEvent::Start);
                    }
                });
            }
        }
    }

    fn stop_entity(&mut self, slot: usize, now: Instant) {
        match self.mode {
            ProtocolMode::Ieee => {
                self.with_advertise(slot, now, |ctx, e| ieee::entity_event(ctx, e, EntityEvent::Terminate));
            }
            ProtocolMode::Milan => {
                self.with_advertise(slot, now, |ctx, e| {
                    for binding in 0..e.interfaces.len() {
                        milan::interface_event(ctx, e, binding, MilanEvent::Shutdown);
                    }
                });
            }
        }
    }

    /// Run `f` on the entity in `slot` with the advertise resources.
    fn with_advertise<F>(&mut self, slot: usize, now: Instant, f: F)
    where
        F: FnOnce(&mut AdvertiseCtx<'_, N>, &mut LocalEntity),
    {
        let Some(entity) = self.entities.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        let mut ctx = AdvertiseCtx {
            timers: &mut self.timers,
            rng: &mut self.rng,
            net: &mut self.net,
            ports: &self.ports,
            loopback: &mut self.loopback,
            now,
        };
        f(&mut ctx, entity);
    }

    /// Run `f` on the entity in `slot` with the listener-sink resources.
    fn with_sink<F>(&mut self, slot: usize, now: Instant, f: F)
    where
        F: FnOnce(&mut SinkCtx<'_, A>, &mut LocalEntity),
    {
        let Some(entity) = self.entities.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        let mut ctx = SinkCtx {
            timers: &mut self.timers,
            acmp: &mut self.acmp,
            ports: &self.ports,
            now,
        };
        f(&mut ctx, entity);
    }

    fn timer_expired(&mut self, kind: TimerKind, now: Instant) {
        log::debug!("[timer] {:?} expired", kind);

        match kind {
            TimerKind::EntityDelay { entity } => self.with_advertise(entity, now, |ctx, e| {
                ieee::entity_event(ctx, e, EntityEvent::DelayTimeout)
            }),
            TimerKind::EntityReannounce { entity } => self.with_advertise(entity, now, |ctx, e| {
                ieee::entity_event(ctx, e, EntityEvent::ReannounceTimeout)
            }),
            TimerKind::MilanDelay { entity, binding } => self.with_advertise(entity, now, |ctx, e| {
                milan::interface_event(ctx, e, binding, MilanEvent::TmrDelay)
            }),
            TimerKind::MilanAdvertise { entity, binding } => self.with_advertise(entity, now, |ctx, e| {
                milan::interface_event(ctx, e, binding, MilanEvent::TmrAdvertise)
            }),
            TimerKind::DiscoveryExpiry { port, slot } => self.discovery_timeout(port, slot),
            TimerKind::ListenerSinkNoAdp { entity, stream } => self.with_sink(entity, now, |ctx, e| {
                listener_sink::sink_event(ctx, e, stream, SinkEvent::TmrNoAdp)
            }),
        }
    }

    /// DISCOVER received on `port`: wildcard targets every entity bound to it.
    fn discover_rcv(&mut self, port: u16, target: EntityId, now: Instant) {
        if !self.started {
            return;
        }

        for slot in 0..self.entities.len() {
            let Some(entity) = self.entities[slot].as_ref() else {
                continue;
            };
            if !target.is_wildcard() && entity.id() != target {
                continue;
            }
            let Some(binding) = entity.binding(port) else {
                continue;
            };

            match self.mode {
                ProtocolMode::Ieee => self.with_advertise(slot, now, |ctx, e| {
                    ieee::interface_event(ctx, e, binding, InterfaceEvent::RcvDiscover)
                }),
                ProtocolMode::Milan => self.with_advertise(slot, now, |ctx, e| {
                    milan::interface_event(ctx, e, binding, MilanEvent::RcvAdpDiscover)
                }),
            }
        }
    }

    /// Feed an AVAILABLE/DEPARTING to the listener-sink machines following
    /// its sender.
    fn listener_rcv(&mut self, port: u16, frame: &AdpFrame, now: Instant) {
        let Some(slot) = self.local_listener_slot(port) else {
            return;
        };
        let pdu = &frame.pdu;
        let event = match frame.message_type() {
            MessageType::Available => SinkEvent::RcvAvailable {
                pdu,
                valid_time: frame.header.valid_time,
            },
            MessageType::Departing => SinkEvent::RcvDeparting { pdu },
            MessageType::Discover => return,
        };

        self.with_sink(slot, now, |ctx, e| {
            for stream in 0..e.listener_sinks.len() {
                if e.listener_sinks[stream].talker == Some(pdu.entity_id) {
                    listener_sink::sink_event(ctx, e, stream as u16, event);
                }
            }
        });
    }

    /// Answer a bulk discover: one AVAILABLE per entity on every port of `id`.
    fn dump_discovered(&mut self, id: EntityId, dst: Destination) {
        let Some(entity) = self.entity(id) else {
            return;
        };
        let total = self.total_discovered(entity);
        let ports: Vec<u16> = entity.interfaces.iter().map(|itf| itf.port).collect();

        let mut sent = 0u32;
        'ports: for port in ports {
            let Some(p) = self.ports.get(usize::from(port)) else {
                continue;
            };
            for info in p.discovery.iter() {
                let msg = ControlMessage::Available { total, info: *info };
                if !deliver(&mut self.ctl, id, dst, msg) {
                    break 'ports;
                }
                sent += 1;
            }
        }

        if sent == 0 {
            deliver(&mut self.ctl, id, dst, ControlMessage::NotFound);
        } else if sent != total {
            log::error!(
                "entity({}) discovery dump inconsistent: sent {} of {}",
                id,
                sent,
                total
            );
        }
    }

    /// Answer a lookup of `target`: one AVAILABLE per port it is known on.
    fn lookup_discovered(&mut self, id: EntityId, target: EntityId, dst: Destination) {
        let Some(entity) = self.entity(id) else {
            return;
        };
        let total = self.total_discovered(entity);
        let found: Vec<EntityInfo> = entity
            .interfaces
            .iter()
            .filter_map(|itf| self.ports.get(usize::from(itf.port)))
            .filter_map(|p| p.discovery.find(target).copied())
            .collect();

        if found.is_empty() {
            log::debug!("entity({}) lookup of {}: not found", id, target);
            deliver(&mut self.ctl, id, dst, ControlMessage::NotFound);
            return;
        }

        for info in found {
            deliver(&mut self.ctl, id, dst, ControlMessage::Available { total, info });
        }
    }
}

fn entity_timers(entity: &LocalEntity) -> Vec<TimerId> {
    let mut timers = Vec::new();

    if let EntityAdvertise::Ieee(ieee) = &entity.advertise {
        timers.push(ieee.delay_timer);
        timers.push(ieee.reannounce_timer);
    }
    for itf in &entity.interfaces {
        if let InterfaceMachine::Milan(milan) = &itf.machine {
            timers.push(milan.delay_timer);
            timers.push(milan.advertise_timer);
        }
    }
    timers.extend(entity.listener_sinks.iter().map(|sink| sink.timer));

    timers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acmp::NoAcmp;
    use crate::net::NullNetwork;
    use crate::notify::NullControl;

    struct NoMulticast;

    impl NetworkPort for NoMulticast {
        fn join_multicast(&mut self, _port: u16, _group: MacAddr) -> Result<()> {
            Err(Error::Transmit("no multicast".into()))
        }

        fn transmit(&mut self, _port: u16, _frame: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    fn config(mode: ProtocolMode) -> AdpConfig {
        let mut entity = EntityConfig::new(EntityId::new(0x10), vec![0]);
        entity.stream_inputs = vec![crate::config::StreamInputConfig {
            avb_interface_index: 0,
        }];

        AdpConfig {
            mode,
            interfaces: vec![InterfaceConfig::new("eth0", MacAddr::new([2, 0, 0, 0, 0, 1]))],
            max_entities_discovery: 4,
            entities: vec![entity],
            rng_seed: Some(7),
            ..AdpConfig::default()
        }
    }

    #[test]
    fn test_timer_budget_per_mode() {
        let ieee = AdpEngine::new(config(ProtocolMode::Ieee), NullNetwork, NullControl, NoAcmp).unwrap();
        // 4 discovery slots + delay + reannounce
        assert_eq!(ieee.timers.allocated(), 6);

        let milan = AdpEngine::new(config(ProtocolMode::Milan), NullNetwork, NullControl, NoAcmp).unwrap();
        // 4 discovery slots + delay + advertise + one listener sink
        assert_eq!(milan.timers.allocated(), 7);
    }

    #[test]
    fn test_timer_exhaustion_aborts_creation() {
        let mut cfg = config(ProtocolMode::Milan);
        cfg.max_timers = 6;
        assert!(matches!(
            AdpEngine::new(cfg, NullNetwork, NullControl, NoAcmp),
            Err(Error::TimerExhausted)
        ));
    }

    #[test]
    fn test_failed_entity_leaves_no_timer() {
        let mut cfg = config(ProtocolMode::Milan);
        cfg.entities.clear();
        cfg.max_timers = 6;
        let mut engine = AdpEngine::new(cfg, NullNetwork, NullControl, NoAcmp).unwrap();

        let mut entity = EntityConfig::new(EntityId::new(0x20), vec![0]);
        entity.stream_inputs = vec![crate::config::StreamInputConfig {
            avb_interface_index: 0,
        }];
        let now = Instant::now();
        assert!(engine.add_entity(entity.clone(), now).is_err());
        assert_eq!(engine.timers.allocated(), 4);
        assert!(engine.entity(EntityId::new(0x20)).is_none());

        entity.stream_inputs.clear();
        assert_eq!(engine.add_entity(entity, now).unwrap(), EntityId::new(0x20));
        assert_eq!(engine.timers.allocated(), 6);
    }

    #[test]
    fn test_multicast_failure_aborts_creation() {
        assert!(AdpEngine::new(config(ProtocolMode::Ieee), NoMulticast, NullControl, NoAcmp).is_err());
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let mut engine = AdpEngine::new(config(ProtocolMode::Ieee), NullNetwork, NullControl, NoAcmp).unwrap();
        let dup = EntityConfig::new(EntityId::new(0x10), vec![0]);
        assert!(matches!(
            engine.add_entity(dup, Instant::now()),
            Err(Error::DuplicateEntity(_))
        ));
    }

    #[test]
    fn test_removed_entity_slot_is_reused() {
        let mut engine = AdpEngine::new(config(ProtocolMode::Ieee), NullNetwork, NullControl, NoAcmp).unwrap();
        let now = Instant::now();
        engine.start(now);

        engine.remove_entity(EntityId::new(0x10), now).unwrap();
        assert_eq!(engine.timers.allocated(), 4);
        assert!(matches!(
            engine.remove_entity(EntityId::new(0x10), now),
            Err(Error::UnknownEntity(_))
        ));

        engine
            .add_entity(EntityConfig::new(EntityId::new(0x30), vec![0]), now)
            .unwrap();
        assert_eq!(engine.entities.len(), 1);
        assert_eq!(
            engine.entity(EntityId::new(0x30)).and_then(LocalEntity::ieee_state),
            Some(ieee::EntityState::Delay)
        );
    }

    #[test]
    fn test_sink_binding_requires_stream_input() {
        let mut engine = AdpEngine::new(config(ProtocolMode::Ieee), NullNetwork, NullControl, NoAcmp).unwrap();
        let now = Instant::now();
        assert!(matches!(
            engine.bind_listener_sink(EntityId::new(0x10), 0, EntityId::new(0x99), now),
            Err(Error::UnknownStreamInput { .. })
        ));

        let mut engine = AdpEngine::new(config(ProtocolMode::Milan), NullNetwork, NullControl, NoAcmp).unwrap();
        engine
            .bind_listener_sink(EntityId::new(0x10), 0, EntityId::new(0x99), now)
            .unwrap();
        let sink = &engine.entity(EntityId::new(0x10)).unwrap().listener_sinks()[0];
        assert_eq!(sink.talker(), Some(EntityId::new(0x99)));

        engine.unbind_listener_sink(EntityId::new(0x10), 0, now).unwrap();
        let sink = &engine.entity(EntityId::new(0x10)).unwrap().listener_sinks()[0];
        assert_eq!(sink.talker(), None);
    }
}
