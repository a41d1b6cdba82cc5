// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IEEE 1722.1-2013 advertise state machines (Sec.6.2.4 and 6.2.5).
//!
//! Two nested machines share one event queue:
//!
//! - the **entity** machine owns `available_index` and the delay /
//!   reannounce timers, and fans `Begin`/`Advertise`/`Terminate` out to
//!   every interface;
//! - one **interface** machine per binding transmits the PDUs and escalates
//!   DISCOVER, grandmaster change and link-up back to the entity machine as
//!   an `Advertise` event.
//!
//! Transient states (`Advertise`, `Departing`, `ReceivedDiscover`,
//! `UpdateGm`) leave unconditionally: after every transition the handler
//! reruns itself with [`EntityEvent::Run`] / [`InterfaceEvent::Run`] until
//! the state settles, so one external event can cascade through several
//! states in a single call.

use super::AdvertiseCtx;
use crate::entity::{EntityAdvertise, InterfaceMachine, LocalEntity};
use crate::net::NetworkPort;
use crate::protocol::{AvailableIndex, MessageType};
use crate::timer::TimerId;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Lower bound of the random advertise delay
const DELAY_MIN_MS: u64 = 100;

/// Entity-level advertise state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    NotStarted,
    Delay,
    Advertise,
    Waiting,
}

/// Entity-level advertise event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityEvent {
    /// Unconditional transition re-run
    Run,
    Begin,
    Terminate,
    DelayTimeout,
    ReannounceTimeout,
    /// Forced re-advertise (escalated by an interface)
    Advertise,
}

/// Interface-level advertise state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceState {
    NotStarted,
    Waiting,
    Advertise,
    Departing,
    ReceivedDiscover,
    UpdateGm,
    LinkDown,
}

/// Interface-level advertise event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceEvent {
    /// Unconditional transition re-run
    Run,
    Begin,
    Terminate,
    Advertise,
    RcvDiscover,
    GmChange,
    LinkUp,
    LinkDown,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Delay => "DELAY",
            Self::Advertise => "ADVERTISE",
            Self::Waiting => "WAITING",
        };
        f.write_str(name)
    }
}

impl fmt::Display for InterfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Waiting => "WAITING",
            Self::Advertise => "ADVERTISE",
            Self::Departing => "DEPARTING",
            Self::ReceivedDiscover => "RECEIVED_DISCOVER",
            Self::UpdateGm => "UPDATE_GM",
            Self::LinkDown => "LINK_DOWN",
        };
        f.write_str(name)
    }
}

/// Entity-level record: state and its two timers.
#[derive(Debug)]
pub struct IeeeEntity {
    pub(crate) state: EntityState,
    pub(crate) delay_timer: TimerId,
    pub(crate) reannounce_timer: TimerId,
}

impl IeeeEntity {
    pub(crate) fn new(delay_timer: TimerId, reannounce_timer: TimerId) -> Self {
        Self {
            state: EntityState::NotStarted,
            delay_timer,
            reannounce_timer,
        }
    }
}

/// Upper bound of the random advertise delay: valid_time / 5, at least 1 s
fn delay_max_ms(valid_time: u8) -> u64 {
    u64::from((valid_time / 5).max(1)) * 1000
}

/// Reannounce period: valid_time / 4, at least 1 s
fn reannounce_period(valid_time: u8) -> Duration {
    Duration::from_secs(u64::from((valid_time / 4).max(1)))
}

/// Feed one event to the entity machine of `entity`.
pub(crate) fn entity_event<N: NetworkPort>(
    ctx: &mut AdvertiseCtx<'_, N>,
    entity: &mut LocalEntity,
    event: EntityEvent,
) {
    let mut pending = VecDeque::from([event]);
    drain(ctx, entity, &mut pending);
}

/// Feed one event to the interface machine of `entity`'s `binding`-th interface.
pub(crate) fn interface_event<N: NetworkPort>(
    ctx: &mut AdvertiseCtx<'_, N>,
    entity: &mut LocalEntity,
    binding: usize,
    event: InterfaceEvent,
) {
    let mut pending = VecDeque::new();
    run_interface(ctx, entity, binding, event, &mut pending);
    drain(ctx, entity, &mut pending);
}

fn drain<N: NetworkPort>(
    ctx: &mut AdvertiseCtx<'_, N>,
    entity: &mut LocalEntity,
    pending: &mut VecDeque<EntityEvent>,
) {
    while let Some(event) = pending.pop_front() {
        run_entity(ctx, entity, event, pending);
    }
}

fn entity_state(entity: &LocalEntity) -> Option<EntityState> {
    match &entity.advertise {
        EntityAdvertise::Ieee(ieee) => Some(ieee.state),
        EntityAdvertise::Milan => None,
    }
}

fn run_entity<N: NetworkPort>(
    ctx: &mut AdvertiseCtx<'_, N>,
    entity: &mut LocalEntity,
    event: EntityEvent,
    pending: &mut VecDeque<EntityEvent>,
) {
    let mut event = event;

    loop {
        let Some(from) = entity_state(entity) else {
            return;
        };
        let to = step_entity(ctx, entity, from, event, pending);
        if let EntityAdvertise::Ieee(ieee) = &mut entity.advertise {
            ieee.state = to;
        }

        log::debug!(
            "entity({}) : event {:?}, state from {} to {}",
            entity.id(),
            event,
            from,
            to
        );

        if from == to {
            break;
        }
        event = EntityEvent::Run;
    }
}

fn step_entity<N: NetworkPort>(
    ctx: &mut AdvertiseCtx<'_, N>,
    entity: &mut LocalEntity,
    state: EntityState,
    event: EntityEvent,
    pending: &mut VecDeque<EntityEvent>,
) -> EntityState {
    let EntityAdvertise::Ieee(ieee) = &entity.advertise else {
        return state;
    };
    let (delay_timer, reannounce_timer) = (ieee.delay_timer, ieee.reannounce_timer);

    match (state, event) {
        (EntityState::NotStarted, EntityEvent::Begin) => {
            entity.available_index = AvailableIndex::ZERO;
            fan_out(ctx, entity, InterfaceEvent::Begin, pending);
            start_delay(ctx, entity, delay_timer);
            EntityState::Delay
        }

        (EntityState::Delay, EntityEvent::DelayTimeout) => EntityState::Advertise,

        (EntityState::Delay, EntityEvent::Terminate) => {
            ctx.timers.stop(delay_timer);
            entity.available_index = AvailableIndex::ZERO;
            fan_out(ctx, entity, InterfaceEvent::Terminate, pending);
            EntityState::NotStarted
        }

        (EntityState::Advertise, EntityEvent::Run) => {
            fan_out(ctx, entity, InterfaceEvent::Advertise, pending);
            ctx.timers
                .start(reannounce_timer, ctx.now, reannounce_period(entity.valid_time()));
            EntityState::Waiting
        }

        (EntityState::Waiting, EntityEvent::Advertise | EntityEvent::ReannounceTimeout) => {
            ctx.timers.stop(reannounce_timer);
            entity.available_index = entity.available_index.next();
            start_delay(ctx, entity, delay_timer);
            EntityState::Delay
        }

        (EntityState::Waiting, EntityEvent::Terminate) => {
            ctx.timers.stop(reannounce_timer);
            // IEEE 1722.1-2013 6.2.1.16
            entity.available_index = AvailableIndex::ZERO;
            fan_out(ctx, entity, InterfaceEvent::Terminate, pending);
            EntityState::NotStarted
        }

        _ => state,
    }
}

fn start_delay<N: NetworkPort>(
    ctx: &mut AdvertiseCtx<'_, N>,
    entity: &LocalEntity,
    delay_timer: TimerId,
) {
    let delay = ctx.random_delay(DELAY_MIN_MS, delay_max_ms(entity.valid_time()));
    ctx.timers.start(delay_timer, ctx.now, delay);
}

fn fan_out<N: NetworkPort>(
    ctx: &mut AdvertiseCtx<'_, N>,
    entity: &mut LocalEntity,
    event: InterfaceEvent,
    pending: &mut VecDeque<EntityEvent>,
) {
    for binding in 0..entity.interfaces.len() {
        run_interface(ctx, entity, binding, event, pending);
    }
}

fn interface_state(entity: &LocalEntity, binding: usize) -> Option<InterfaceState> {
    match entity.interfaces.get(binding).map(|itf| &itf.machine) {
        Some(InterfaceMachine::Ieee(state)) => Some(*state),
        _ => None,
    }
}

fn run_interface<N: NetworkPort>(
    ctx: &mut AdvertiseCtx<'_, N>,
    entity: &mut LocalEntity,
    binding: usize,
    event: InterfaceEvent,
    pending: &mut VecDeque<EntityEvent>,
) {
    let mut event = event;

    loop {
        let Some(from) = interface_state(entity, binding) else {
            return;
        };
        let to = step_interface(ctx, entity, binding, from, event, pending);
        entity.interfaces[binding].machine = InterfaceMachine::Ieee(to);

        log::debug!(
            "entity({}) port({}) : event {:?}, state from {} to {}",
            entity.id(),
            entity.interfaces[binding].port,
            event,
            from,
            to
        );

        if from == to {
            break;
        }
        event = InterfaceEvent::Run;
    }
}

fn step_interface<N: NetworkPort>(
    ctx: &mut AdvertiseCtx<'_, N>,
    entity: &LocalEntity,
    binding: usize,
    state: InterfaceState,
    event: InterfaceEvent,
    pending: &mut VecDeque<EntityEvent>,
) -> InterfaceState {
    let link_up = entity.interfaces[binding].link_up;

    match (state, event) {
        (InterfaceState::NotStarted, InterfaceEvent::Begin) => {
            if link_up {
                InterfaceState::Waiting
            } else {
                InterfaceState::LinkDown
            }
        }

        (InterfaceState::Waiting, InterfaceEvent::Terminate) => InterfaceState::Departing,
        (InterfaceState::Waiting, InterfaceEvent::Advertise) => InterfaceState::Advertise,
        (InterfaceState::Waiting, InterfaceEvent::RcvDiscover) => InterfaceState::ReceivedDiscover,
        (InterfaceState::Waiting, InterfaceEvent::GmChange) => InterfaceState::UpdateGm,
        (InterfaceState::Waiting, InterfaceEvent::LinkDown) => InterfaceState::LinkDown,

        (InterfaceState::Advertise, InterfaceEvent::Run) => {
            ctx.send_advertise(entity, binding, MessageType::Available);
            InterfaceState::Waiting
        }

        (InterfaceState::Departing, InterfaceEvent::Run) => {
            ctx.send_advertise(entity, binding, MessageType::Departing);
            InterfaceState::NotStarted
        }

        (InterfaceState::ReceivedDiscover | InterfaceState::UpdateGm, InterfaceEvent::Run) => {
            pending.push_back(EntityEvent::Advertise);
            InterfaceState::Waiting
        }

        (InterfaceState::LinkDown, InterfaceEvent::LinkUp) => {
            pending.push_back(EntityEvent::Advertise);
            InterfaceState::Waiting
        }

        (InterfaceState::LinkDown, InterfaceEvent::Terminate) => InterfaceState::NotStarted,

        _ => state,
    }
}
