// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event injection points into connection management (ACMP).
//!
//! Discovery results feed the connection-management layer: talkers that
//! leave must be torn down on the listener side, rediscovered talkers can be
//! fast-connected, and MILAN listener sinks follow their bound talker's
//! visibility. The engine only raises these events; what ACMP does with them
//! is outside this crate.

use crate::protocol::EntityId;
use std::fmt;

/// Talker visibility change for a MILAN listener sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerSinkEvent {
    /// Bound talker is visible (EVT_TK_DISCOVERED)
    TalkerDiscovered,
    /// Bound talker is gone or restarted (EVT_TK_DEPARTED)
    TalkerDeparted,
}

impl fmt::Display for ListenerSinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TalkerDiscovered => write!(f, "EVT_TK_DISCOVERED"),
            Self::TalkerDeparted => write!(f, "EVT_TK_DEPARTED"),
        }
    }
}

/// Hooks called by the engine into connection management.
///
/// All methods default to no-ops so a host only implements what it uses.
pub trait AcmpHooks {
    /// Remote `talker` left the network (IEEE mode): drop its connections
    /// on local entity `listener`.
    fn listener_talker_left(&mut self, _listener: EntityId, _talker: EntityId) {}

    /// Remote `talker` changed grandmaster to the one of `port`: retry the
    /// fast connect saved on local entity `listener`.
    fn listener_fast_connect(&mut self, _listener: EntityId, _talker: EntityId, _port: u16) {}

    /// Back-to-back fast connect of local `listener` to a newly seen media
    /// `talker` on `port`.
    fn listener_fast_connect_btb(&mut self, _listener: EntityId, _talker: EntityId, _port: u16) {}

    /// MILAN listener-sink state change for `stream_input` of `listener`.
    fn listener_sink_event(
        &mut self,
        _listener: EntityId,
        _stream_input: u16,
        _event: ListenerSinkEvent,
    ) {
    }
}

/// Hooks that ignore every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAcmp;

impl AcmpHooks for NoAcmp {}
