// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MILAN listener-sink talker discovery (MILAN 1.x Sec.9.4).
//!
//! One machine per listener stream input. It follows the talker the stream
//! input is bound to and reports to connection management whether that
//! talker is currently visible. The talker is only considered discovered
//! when it runs on the same gPTP grandmaster and domain as the AVB
//! interface of the stream input.

use crate::acmp::{AcmpHooks, ListenerSinkEvent};
use crate::engine::{Port, TimerKind};
use crate::entity::LocalEntity;
use crate::protocol::{AdpPdu, AvailableIndex, EntityId};
use crate::timer::{TimerId, TimerWheel};
use std::fmt;
use std::time::{Duration, Instant};

/// Talker visibility state of a stream input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListenerSinkState {
    #[default]
    NotDiscovered,
    Discovered,
}

impl fmt::Display for ListenerSinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDiscovered => f.write_str("NOT_DISCOVERED"),
            Self::Discovered => f.write_str("DISCOVERED"),
        }
    }
}

/// Listener-sink event
#[derive(Debug, Clone, Copy)]
pub(crate) enum SinkEvent<'a> {
    /// AVAILABLE from the bound talker; `valid_time` is the raw header field
    RcvAvailable { pdu: &'a AdpPdu, valid_time: u8 },
    /// DEPARTING from the bound talker
    RcvDeparting { pdu: &'a AdpPdu },
    /// Discovery timer expired
    TmrNoAdp,
    /// Connection management unbound the stream input
    Reset,
}

impl SinkEvent<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::RcvAvailable { .. } => "RCV_ADP_AVAILABLE",
            Self::RcvDeparting { .. } => "RCV_ADP_DEPARTING",
            Self::TmrNoAdp => "TMR_NO_ADP",
            Self::Reset => "RESET",
        }
    }
}

/// Listener-sink discovery record of one stream input.
#[derive(Debug)]
pub struct ListenerSinkDiscovery {
    pub(crate) avb_interface_index: u16,
    pub(crate) talker: Option<EntityId>,
    pub(crate) state: ListenerSinkState,
    pub(crate) available_index: AvailableIndex,
    pub(crate) interface_index: u16,
    pub(crate) timer: TimerId,
}

impl ListenerSinkDiscovery {
    pub(crate) fn new(avb_interface_index: u16, timer: TimerId) -> Self {
        Self {
            avb_interface_index,
            talker: None,
            state: ListenerSinkState::NotDiscovered,
            available_index: AvailableIndex::ZERO,
            interface_index: 0,
            timer,
        }
    }

    /// Current state
    pub fn state(&self) -> ListenerSinkState {
        self.state
    }

    /// Talker the stream input is bound to
    pub fn talker(&self) -> Option<EntityId> {
        self.talker
    }

    /// AVB_INTERFACE the stream input uses
    pub fn avb_interface_index(&self) -> u16 {
        self.avb_interface_index
    }
}

/// Engine resources the listener-sink machine touches.
pub(crate) struct SinkCtx<'a, A> {
    pub timers: &'a mut TimerWheel<TimerKind>,
    pub acmp: &'a mut A,
    pub ports: &'a [Port],
    pub now: Instant,
}

/// Discovery timeout for a talker advertising `valid_time` (header field)
fn no_adp_timeout(valid_time: u8) -> Duration {
    Duration::from_secs(u64::from(valid_time.max(1)))
}

/// True if `pdu` was sent on the grandmaster and domain of the stream
/// input's AVB interface
fn gptp_matches(entity: &LocalEntity, sink: &ListenerSinkDiscovery, ports: &[Port], pdu: &AdpPdu) -> bool {
    let Some(binding) = entity.interfaces.get(usize::from(sink.avb_interface_index)) else {
        return false;
    };
    let Some(port) = ports.get(usize::from(binding.port)) else {
        return false;
    };

    binding.grandmaster_id == pdu.gptp_grandmaster_id
        && port.gptp_domain_number() == pdu.gptp_domain_number
}

/// Feed one event to the machine of `entity`'s stream input `stream`.
pub(crate) fn sink_event<A: AcmpHooks>(
    ctx: &mut SinkCtx<'_, A>,
    entity: &mut LocalEntity,
    stream: u16,
    event: SinkEvent<'_>,
) {
    let entity_id = entity.id();
    let Some(sink) = entity.listener_sinks.get(usize::from(stream)) else {
        return;
    };
    let from = sink.state;

    let to = match (from, event) {
        (ListenerSinkState::NotDiscovered, SinkEvent::RcvAvailable { pdu, valid_time }) => {
            if !gptp_matches(entity, sink, ctx.ports, pdu) {
                log::debug!(
                    "entity({}) stream_input({}) gPTP configuration doesn't match talker {} (gm {:016x} domain {})",
                    entity_id,
                    stream,
                    pdu.entity_id,
                    pdu.gptp_grandmaster_id,
                    pdu.gptp_domain_number
                );
                from
            } else {
                let sink = &mut entity.listener_sinks[usize::from(stream)];
                sink.available_index = pdu.available_index;
                sink.interface_index = pdu.interface_index;
                ctx.timers.start(sink.timer, ctx.now, no_adp_timeout(valid_time));
                ctx.acmp
                    .listener_sink_event(entity_id, stream, ListenerSinkEvent::TalkerDiscovered);
                ListenerSinkState::Discovered
            }
        }

        (ListenerSinkState::Discovered, SinkEvent::RcvAvailable { pdu, valid_time }) => {
            if sink.interface_index != pdu.interface_index {
                log::debug!(
                    "entity({}) stream_input({}) interface index {} doesn't match current {}",
                    entity_id,
                    stream,
                    pdu.interface_index,
                    sink.interface_index
                );
                return;
            }

            let restarted = !pdu.available_index.is_newer_than(sink.available_index);
            let gptp_ok = gptp_matches(entity, sink, ctx.ports, pdu);
            let timer = sink.timer;

            if restarted {
                ctx.acmp
                    .listener_sink_event(entity_id, stream, ListenerSinkEvent::TalkerDeparted);

                if !gptp_ok {
                    ctx.timers.stop(timer);
                    set_state(entity, stream, from, ListenerSinkState::NotDiscovered, event);
                    return;
                }

                ctx.acmp
                    .listener_sink_event(entity_id, stream, ListenerSinkEvent::TalkerDiscovered);
            }

            entity.listener_sinks[usize::from(stream)].available_index = pdu.available_index;
            ctx.timers.start(timer, ctx.now, no_adp_timeout(valid_time));
            from
        }

        (ListenerSinkState::Discovered, SinkEvent::RcvDeparting { pdu }) => {
            if sink.interface_index != pdu.interface_index {
                log::debug!(
                    "entity({}) stream_input({}) interface index {} doesn't match current {}",
                    entity_id,
                    stream,
                    pdu.interface_index,
                    sink.interface_index
                );
                return;
            }

            ctx.timers.stop(sink.timer);
            ctx.acmp
                .listener_sink_event(entity_id, stream, ListenerSinkEvent::TalkerDeparted);
            ListenerSinkState::NotDiscovered
        }

        (ListenerSinkState::Discovered, SinkEvent::TmrNoAdp) => {
            ctx.acmp
                .listener_sink_event(entity_id, stream, ListenerSinkEvent::TalkerDeparted);
            ListenerSinkState::NotDiscovered
        }

        (ListenerSinkState::Discovered, SinkEvent::Reset) => {
            ctx.timers.stop(sink.timer);
            ListenerSinkState::NotDiscovered
        }

        _ => from,
    };

    set_state(entity, stream, from, to, event);
}

fn set_state(
    entity: &mut LocalEntity,
    stream: u16,
    from: ListenerSinkState,
    to: ListenerSinkState,
    event: SinkEvent<'_>,
) {
    entity.listener_sinks[usize::from(stream)].state = to;

    log::debug!(
        "entity({}) stream_input({}) : event {}, state from {} to {}",
        entity.id(),
        stream,
        event.name(),
        from,
        to
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertise::milan::MilanInterface;
    use crate::config::{EntityConfig, InterfaceConfig};
    use crate::entity::{EntityAdvertise, InterfaceAdvertiseState, InterfaceMachine};
    use crate::protocol::MacAddr;

    #[derive(Default)]
    struct Events(Vec<ListenerSinkEvent>);

    impl AcmpHooks for Events {
        fn listener_sink_event(&mut self, _listener: EntityId, _stream_input: u16, event: ListenerSinkEvent) {
            self.0.push(event);
        }
    }

    const GM: u64 = 0xabcd;
    const TALKER: EntityId = EntityId(0x7a1c);

    struct Harness {
        timers: TimerWheel<TimerKind>,
        acmp: Events,
        ports: Vec<Port>,
        entity: LocalEntity,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            let mut timers = TimerWheel::with_capacity(16);
            let mut cfg = InterfaceConfig::new("eth0", MacAddr::new([2, 0, 0, 0, 0, 1]));
            cfg.gptp_domain_number = 0;
            let ports = vec![Port::new(0, &cfg, 1, &mut timers).unwrap()];

            let delay = timers.create(TimerKind::MilanDelay { entity: 0, binding: 0 }).unwrap();
            let advertise = timers.create(TimerKind::MilanAdvertise { entity: 0, binding: 0 }).unwrap();
            let sink_timer = timers.create(TimerKind::ListenerSinkNoAdp { entity: 0, stream: 0 }).unwrap();

            let mut sink = ListenerSinkDiscovery::new(0, sink_timer);
            sink.talker = Some(TALKER);

            Self {
                timers,
                acmp: Events::default(),
                ports,
                entity: LocalEntity {
                    config: EntityConfig::new(EntityId::new(0x1157), vec![0]),
                    available_index: AvailableIndex::ZERO,
                    advertise: EntityAdvertise::Milan,
                    interfaces: vec![InterfaceAdvertiseState {
                        port: 0,
                        link_up: true,
                        grandmaster_id: GM,
                        machine: InterfaceMachine::Milan(MilanInterface::new(delay, advertise)),
                    }],
                    listener_sinks: vec![sink],
                },
                now: Instant::now(),
            }
        }

        fn event(&mut self, event: SinkEvent<'_>) {
            let mut ctx = SinkCtx {
                timers: &mut self.timers,
                acmp: &mut self.acmp,
                ports: &self.ports,
                now: self.now,
            };
            sink_event(&mut ctx, &mut self.entity, 0, event);
        }

        fn state(&self) -> ListenerSinkState {
            self.entity.listener_sinks[0].state
        }

        fn timer(&self) -> TimerId {
            self.entity.listener_sinks[0].timer
        }
    }

    fn available(index: u32, gm: u64) -> AdpPdu {
        AdpPdu {
            entity_id: TALKER,
            available_index: AvailableIndex(index),
            gptp_grandmaster_id: gm,
            ..AdpPdu::default()
        }
    }

    #[test]
    fn test_discovered_on_gptp_match() {
        let mut h = Harness::new();
        let pdu = available(3, GM);
        h.event(SinkEvent::RcvAvailable { pdu: &pdu, valid_time: 5 });

        assert_eq!(h.state(), ListenerSinkState::Discovered);
        assert_eq!(h.acmp.0, vec![ListenerSinkEvent::TalkerDiscovered]);
        assert_eq!(h.timers.deadline(h.timer()), Some(h.now + Duration::from_secs(5)));
    }

    #[test]
    fn test_gptp_mismatch_is_ignored() {
        let mut h = Harness::new();
        let other_gm = available(3, 0x1111);
        h.event(SinkEvent::RcvAvailable { pdu: &other_gm, valid_time: 5 });
        assert_eq!(h.state(), ListenerSinkState::NotDiscovered);

        let mut other_domain = available(3, GM);
        other_domain.gptp_domain_number = 1;
        h.event(SinkEvent::RcvAvailable { pdu: &other_domain, valid_time: 5 });
        assert_eq!(h.state(), ListenerSinkState::NotDiscovered);
        assert!(h.acmp.0.is_empty());
    }

    #[test]
    fn test_repeated_index_reports_departed_then_discovered() {
        let mut h = Harness::new();
        let first = available(3, GM);
        h.event(SinkEvent::RcvAvailable { pdu: &first, valid_time: 5 });
        let restart = available(3, GM);
        h.event(SinkEvent::RcvAvailable { pdu: &restart, valid_time: 5 });

        assert_eq!(h.state(), ListenerSinkState::Discovered);
        assert_eq!(
            h.acmp.0,
            vec![
                ListenerSinkEvent::TalkerDiscovered,
                ListenerSinkEvent::TalkerDeparted,
                ListenerSinkEvent::TalkerDiscovered,
            ]
        );
    }

    #[test]
    fn test_restart_on_other_grandmaster_drops_talker() {
        let mut h = Harness::new();
        let first = available(10, GM);
        h.event(SinkEvent::RcvAvailable { pdu: &first, valid_time: 5 });
        let restart = available(0, 0x2222);
        h.event(SinkEvent::RcvAvailable { pdu: &restart, valid_time: 5 });

        assert_eq!(h.state(), ListenerSinkState::NotDiscovered);
        assert!(!h.timers.is_running(h.timer()));
        assert_eq!(h.acmp.0.last(), Some(&ListenerSinkEvent::TalkerDeparted));
    }

    #[test]
    fn test_advancing_index_only_rearms_timer() {
        let mut h = Harness::new();
        let first = available(3, GM);
        h.event(SinkEvent::RcvAvailable { pdu: &first, valid_time: 5 });
        h.now += Duration::from_secs(2);
        let next = available(4, GM);
        h.event(SinkEvent::RcvAvailable { pdu: &next, valid_time: 0 });

        assert_eq!(h.acmp.0.len(), 1);
        // valid_time 0 still gets a one second window
        assert_eq!(h.timers.deadline(h.timer()), Some(h.now + Duration::from_secs(1)));
    }

    #[test]
    fn test_other_interface_index_is_ignored() {
        let mut h = Harness::new();
        let first = available(3, GM);
        h.event(SinkEvent::RcvAvailable { pdu: &first, valid_time: 5 });

        let mut departing = available(0, GM);
        departing.interface_index = 1;
        h.event(SinkEvent::RcvDeparting { pdu: &departing });
        assert_eq!(h.state(), ListenerSinkState::Discovered);

        departing.interface_index = 0;
        h.event(SinkEvent::RcvDeparting { pdu: &departing });
        assert_eq!(h.state(), ListenerSinkState::NotDiscovered);
        assert_eq!(h.acmp.0.last(), Some(&ListenerSinkEvent::TalkerDeparted));
    }

    #[test]
    fn test_timeout_and_reset() {
        let mut h = Harness::new();
        let first = available(3, GM);
        h.event(SinkEvent::RcvAvailable { pdu: &first, valid_time: 5 });
        h.event(SinkEvent::TmrNoAdp);
        assert_eq!(h.state(), ListenerSinkState::NotDiscovered);
        assert_eq!(h.acmp.0.len(), 2);

        h.event(SinkEvent::RcvAvailable { pdu: &first, valid_time: 5 });
        h.event(SinkEvent::Reset);
        assert_eq!(h.state(), ListenerSinkState::NotDiscovered);
        assert!(!h.timers.is_running(h.timer()));
        // reset is silent
        assert_eq!(h.acmp.0.len(), 3);
    }
}
