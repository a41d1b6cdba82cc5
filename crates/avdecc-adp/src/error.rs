// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the ADP engine.
//!
//! Only initialization, configuration and codec failures surface as `Err`.
//! Runtime resource exhaustion (discovery pool full, control channel full)
//! is logged and the triggering update dropped, see [`crate::discovery`].

use crate::protocol::EntityId;
use thiserror::Error;

/// Result type for ADP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the ADP engine
#[derive(Debug, Error)]
pub enum Error {
    /// Buffer shorter than the structure being encoded/decoded
    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes available
        actual: usize,
    },

    /// AVTP subtype is not ADP
    #[error("invalid AVTP subtype 0x{0:02x}")]
    InvalidSubtype(u8),

    /// ADP message type outside AVAILABLE/DEPARTING/DISCOVER
    #[error("invalid ADP message type {0}")]
    InvalidMessageType(u8),

    /// control_data_length does not match the ADP payload size
    #[error("invalid control data length {0}")]
    InvalidControlDataLength(u16),

    /// Ethernet frame does not carry AVTP
    #[error("invalid ethertype 0x{0:04x}")]
    InvalidEthertype(u16),

    /// Timer facility has no free slot left
    #[error("timer pool exhausted")]
    TimerExhausted,

    /// Interface (port) index not configured
    #[error("unknown interface index {0}")]
    UnknownInterface(u16),

    /// No local entity with this id
    #[error("unknown local entity {0}")]
    UnknownEntity(EntityId),

    /// A local entity with this id already exists
    #[error("duplicate local entity {0}")]
    DuplicateEntity(EntityId),

    /// Local entity has no such listener stream input
    #[error("entity {entity}: unknown stream input {stream}")]
    UnknownStreamInput {
        /// Local entity
        entity: EntityId,
        /// Stream input index
        stream: u16,
    },

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Network layer refused a frame or a multicast join
    #[error("transmit error: {0}")]
    Transmit(String),

    /// I/O error (configuration file access)
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to hand a message to the local application control channel.
///
/// Never retried: notifications are best effort, at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Could not allocate a message descriptor
    #[error("control channel allocation failed")]
    AllocFailed,

    /// Queue towards the application is full
    #[error("control channel queue full")]
    QueueFull,

    /// Application side is gone
    #[error("control channel closed")]
    Closed,
}
