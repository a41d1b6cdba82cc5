// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MILAN advertise state machine (MILAN 1.x Sec.9.3).
//!
//! Interface scoped, no entity-level machine. Every AVAILABLE goes out
//! after a random delay; a DISCOVER or a grandmaster change only re-arms
//! that delay, it never transmits directly.

use super::AdvertiseCtx;
use crate::entity::{InterfaceMachine, LocalEntity};
use crate::net::NetworkPort;
use crate::protocol::{AvailableIndex, MessageType};
use crate::timer::TimerId;
use std::fmt;
use std::time::Duration;

/// Period of TMR_ADVERTISE
pub const ADVERTISE_PERIOD: Duration = Duration::from_millis(5000);

const INITIAL_DELAY_MIN_MS: u64 = 100;
const INITIAL_DELAY_MAX_MS: u64 = 2000;
const DELAY_MIN_MS: u64 = 100;
const DELAY_MAX_MS: u64 = 4000;

/// MILAN interface advertise state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MilanState {
    NotStarted,
    Down,
    Delay,
    Waiting,
}

/// MILAN interface advertise event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MilanEvent {
    Start,
    Shutdown,
    LinkUp,
    LinkDown,
    TmrDelay,
    TmrAdvertise,
    RcvAdpDiscover,
    GmChange,
}

impl fmt::Display for MilanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Down => "DOWN",
            Self::Delay => "DELAY",
            Self::Waiting => "WAITING",
        };
        f.write_str(name)
    }
}

/// Per-interface MILAN record: state and its two timers.
#[derive(Debug)]
pub struct MilanInterface {
    pub(crate) state: MilanState,
    pub(crate) delay_timer: TimerId,
    pub(crate) advertise_timer: TimerId,
}

impl MilanInterface {
    pub(crate) fn new(delay_timer: TimerId, advertise_timer: TimerId) -> Self {
        Self {
            state: MilanState::NotStarted,
            delay_timer,
            advertise_timer,
        }
    }

    /// Current state
    pub fn state(&self) -> MilanState {
        self.state
    }
}

/// Feed one event to the MILAN machine of `entity`'s `binding`-th interface.
pub(crate) fn interface_event<N: NetworkPort>(
    ctx: &mut AdvertiseCtx<'_, N>,
    entity: &mut LocalEntity,
    binding: usize,
    event: MilanEvent,
) {
    let Some(InterfaceMachine::Milan(itf)) = entity.interfaces.get(binding).map(|i| &i.machine)
    else {
        return;
    };
    let (from, delay_timer, advertise_timer) = (itf.state, itf.delay_timer, itf.advertise_timer);
    let link_up = entity.interfaces[binding].link_up;

    let to = match (from, event) {
        (MilanState::NotStarted, MilanEvent::Start) => {
            if link_up {
                let delay = ctx.random_delay(INITIAL_DELAY_MIN_MS, INITIAL_DELAY_MAX_MS);
                ctx.timers.start(delay_timer, ctx.now, delay);
                MilanState::Delay
            } else {
                MilanState::Down
            }
        }

        (MilanState::Down, MilanEvent::LinkUp) => {
            start_delay(ctx, delay_timer);
            MilanState::Delay
        }

        (MilanState::Down, MilanEvent::Shutdown) => MilanState::NotStarted,

        (MilanState::Waiting, MilanEvent::RcvAdpDiscover | MilanEvent::GmChange) => {
            ctx.timers.stop(advertise_timer);
            start_delay(ctx, delay_timer);
            MilanState::Delay
        }

        (MilanState::Waiting, MilanEvent::TmrAdvertise) => {
            start_delay(ctx, delay_timer);
            MilanState::Delay
        }

        (MilanState::Waiting, MilanEvent::LinkDown) => {
            ctx.timers.stop(advertise_timer);
            MilanState::Down
        }

        (MilanState::Waiting, MilanEvent::Shutdown) => {
            ctx.timers.stop(advertise_timer);
            depart(ctx, entity, binding);
            MilanState::NotStarted
        }

        (MilanState::Delay, MilanEvent::TmrDelay) => {
            ctx.send_advertise(entity, binding, MessageType::Available);
            entity.available_index = entity.available_index.next();
            ctx.timers.start(advertise_timer, ctx.now, ADVERTISE_PERIOD);
            MilanState::Waiting
        }

        (MilanState::Delay, MilanEvent::LinkDown) => {
            ctx.timers.stop(delay_timer);
            MilanState::Down
        }

        (MilanState::Delay, MilanEvent::Shutdown) => {
            ctx.timers.stop(delay_timer);
            depart(ctx, entity, binding);
            MilanState::NotStarted
        }

        _ => from,
    };

    if let InterfaceMachine::Milan(itf) = &mut entity.interfaces[binding].machine {
        itf.state = to;
    }

    log::debug!(
        "entity({}) port({}) : event {:?}, state from {} to {}",
        entity.id(),
        entity.interfaces[binding].port,
        event,
        from,
        to
    );
}

fn start_delay<N: NetworkPort>(ctx: &mut AdvertiseCtx<'_, N>, delay_timer: TimerId) {
    let delay = ctx.random_delay(DELAY_MIN_MS, DELAY_MAX_MS);
    ctx.timers.start(delay_timer, ctx.now, delay);
}

fn depart<N: NetworkPort>(ctx: &mut AdvertiseCtx<'_, N>, entity: &mut LocalEntity, binding: usize) {
    // IEEE 1722.1-2013 6.2.1.16
    entity.available_index = AvailableIndex::ZERO;
    ctx.send_advertise(entity, binding, MessageType::Departing);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EntityConfig, InterfaceConfig};
    use crate::engine::{Port, TimerKind};
    use crate::entity::{EntityAdvertise, InterfaceAdvertiseState};
    use crate::error::Result;
    use crate::protocol::{AdpFrame, EntityId, MacAddr};
    use crate::timer::TimerWheel;
    use std::collections::VecDeque;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<AdpFrame>,
    }

    impl NetworkPort for Recorder {
        fn join_multicast(&mut self, _port: u16, _group: MacAddr) -> Result<()> {
            Ok(())
        }

        fn transmit(&mut self, _port: u16, frame: &[u8]) -> Result<()> {
            self.frames.push(AdpFrame::decode(frame)?);
            Ok(())
        }
    }

    struct Harness {
        timers: TimerWheel<TimerKind>,
        rng: fastrand::Rng,
        net: Recorder,
        ports: Vec<Port>,
        entity: LocalEntity,
        loopback: VecDeque<(u16, AdpFrame)>,
        now: Instant,
    }

    impl Harness {
        fn new(link_up: bool) -> Self {
            let mut timers = TimerWheel::with_capacity(16);
            let cfg = InterfaceConfig::new("eth0", MacAddr::new([2, 0, 0, 0, 0, 1]));
            let ports = vec![Port::new(0, &cfg, 1, &mut timers).unwrap()];

            let delay = timers
                .create(TimerKind::MilanDelay { entity: 0, binding: 0 })
                .unwrap();
            let advertise = timers
                .create(TimerKind::MilanAdvertise { entity: 0, binding: 0 })
                .unwrap();

            Self {
                timers,
                rng: fastrand::Rng::with_seed(3),
                net: Recorder::default(),
                ports,
                entity: LocalEntity {
                    config: EntityConfig::new(EntityId::new(0x55), vec![0]),
                    available_index: AvailableIndex::ZERO,
                    advertise: EntityAdvertise::Milan,
                    interfaces: vec![InterfaceAdvertiseState {
                        port: 0,
                        link_up,
                        grandmaster_id: 0,
                        machine: InterfaceMachine::Milan(MilanInterface::new(delay, advertise)),
                    }],
                    listener_sinks: Vec::new(),
                },
                loopback: VecDeque::new(),
                now: Instant::now(),
            }
        }

        fn event(&mut self, event: MilanEvent) {
            let mut ctx = AdvertiseCtx {
                timers: &mut self.timers,
                rng: &mut self.rng,
                net: &mut self.net,
                ports: &self.ports,
                loopback: &mut self.loopback,
                now: self.now,
            };
            interface_event(&mut ctx, &mut self.entity, 0, event);
        }

        fn machine(&self) -> &MilanInterface {
            match &self.entity.interfaces[0].machine {
                InterfaceMachine::Milan(m) => m,
                InterfaceMachine::Ieee(_) => unreachable!(),
            }
        }

        fn delay(&self) -> Option<Duration> {
            self.timers
                .deadline(self.machine().delay_timer)
                .map(|d| d - self.now)
        }
    }

    #[test]
    fn test_start_link_down_goes_down() {
        let mut h = Harness::new(false);
        h.event(MilanEvent::Start);
        assert_eq!(h.machine().state(), MilanState::Down);
        assert!(h.delay().is_none());

        h.entity.interfaces[0].link_up = true;
        h.event(MilanEvent::LinkUp);
        assert_eq!(h.machine().state(), MilanState::Delay);
        let delay = h.delay().unwrap();
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(4000));
    }

    #[test]
    fn test_start_arms_initial_delay() {
        let mut h = Harness::new(true);
        h.event(MilanEvent::Start);
        assert_eq!(h.machine().state(), MilanState::Delay);
        let delay = h.delay().unwrap();
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_timeout_sends_then_increments() {
        let mut h = Harness::new(true);
        h.event(MilanEvent::Start);
        h.event(MilanEvent::TmrDelay);

        assert_eq!(h.machine().state(), MilanState::Waiting);
        assert_eq!(h.net.frames.len(), 1);
        assert_eq!(h.net.frames[0].pdu.available_index, AvailableIndex(0));
        assert_eq!(h.entity.available_index, AvailableIndex(1));
        assert_eq!(
            h.timers.deadline(h.machine().advertise_timer),
            Some(h.now + ADVERTISE_PERIOD)
        );
    }

    #[test]
    fn test_discover_rearms_delay_without_transmit() {
        let mut h = Harness::new(true);
        h.event(MilanEvent::Start);
        h.event(MilanEvent::TmrDelay);
        h.net.frames.clear();

        h.event(MilanEvent::RcvAdpDiscover);

        assert_eq!(h.machine().state(), MilanState::Delay);
        assert!(h.net.frames.is_empty());
        assert!(!h.timers.is_running(h.machine().advertise_timer));
        assert!(h.delay().is_some());
    }

    #[test]
    fn test_link_down_cancels_timers() {
        let mut h = Harness::new(true);
        h.event(MilanEvent::Start);
        h.event(MilanEvent::LinkDown);
        assert_eq!(h.machine().state(), MilanState::Down);
        assert!(h.delay().is_none());
    }

    #[test]
    fn test_shutdown_while_down_is_silent() {
        let mut h = Harness::new(false);
        h.event(MilanEvent::Start);
        h.event(MilanEvent::Shutdown);
        assert_eq!(h.machine().state(), MilanState::NotStarted);
        assert!(h.net.frames.is_empty());

        // link events are ignored until started again
        h.entity.interfaces[0].link_up = true;
        h.event(MilanEvent::LinkUp);
        assert_eq!(h.machine().state(), MilanState::NotStarted);
    }

    #[test]
    fn test_shutdown_sends_departing_with_zero_index() {
        let mut h = Harness::new(true);
        h.event(MilanEvent::Start);
        h.event(MilanEvent::TmrDelay);
        h.event(MilanEvent::Shutdown);

        assert_eq!(h.machine().state(), MilanState::NotStarted);
        let last = h.net.frames.last().unwrap();
        assert_eq!(last.message_type(), MessageType::Departing);
        assert_eq!(last.pdu.available_index, AvailableIndex::ZERO);
        assert_eq!(h.entity.available_index, AvailableIndex::ZERO);
    }
}
