// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control channel towards local applications.
//!
//! Applications (controllers) ask for the discovered entity list with
//! [`ControlMessage::Discover`] and receive one message per remote entity.
//! Database changes are pushed unsolicited to every client.
//!
//! Delivery is at most once: a message the channel cannot take is logged
//! and dropped, the engine never blocks on an application.

use crate::error::ChannelError;
use crate::protocol::{EntityId, EntityInfo};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message exchanged with local applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Request: enumerate all entities (wildcard id) or look up one
    Discover {
        /// Entity to look up, zero for all
        entity_id: EntityId,
    },
    /// Entity visible (answer to Discover, or new/changed entity)
    Available {
        /// Discovered entities over the notifying entity's interfaces
        total: u32,
        /// Entity snapshot
        info: EntityInfo,
    },
    /// Entity gone (DEPARTING, expiry or restart)
    Departing {
        /// Discovered entities over the notifying entity's interfaces
        total: u32,
        /// Last known snapshot
        info: EntityInfo,
    },
    /// Nothing matches the request
    NotFound,
}

impl ControlMessage {
    /// Short message name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discover { .. } => "DISCOVER",
            Self::Available { .. } => "AVAILABLE",
            Self::Departing { .. } => "DEPARTING",
            Self::NotFound => "NOT_FOUND",
        }
    }

    /// Entity the message is about, if any
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            Self::Discover { entity_id } => Some(*entity_id),
            Self::Available { info, .. } | Self::Departing { info, .. } => Some(info.entity_id),
            Self::NotFound => None,
        }
    }
}

/// Recipient of a control message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// Every connected application
    All,
    /// One application (the one that sent the request)
    Client(u32),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Client(id) => write!(f, "client({})", id),
        }
    }
}

/// Outbound side of the application control channel
pub trait ControlChannel {
    /// Queue `msg` for `dst` without blocking
    fn send(&mut self, dst: Destination, msg: ControlMessage) -> Result<(), ChannelError>;
}

/// Control channel with no application attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NullControl;

impl ControlChannel for NullControl {
    fn send(&mut self, _dst: Destination, _msg: ControlMessage) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Send one message, logging (not propagating) a failure.
///
/// Returns true if the channel accepted the message.
pub(crate) fn deliver<C: ControlChannel>(
    ctl: &mut C,
    entity: EntityId,
    dst: Destination,
    msg: ControlMessage,
) -> bool {
    let kind = msg.kind();
    log::debug!("entity({}) control tx {} to {}", entity, kind, dst);

    match ctl.send(dst, msg) {
        Ok(()) => true,
        Err(e) => {
            log::error!(
                "entity({}) control tx {} to {} failed: {}",
                entity,
                kind,
                dst,
                e
            );
            false
        }
    }
}
