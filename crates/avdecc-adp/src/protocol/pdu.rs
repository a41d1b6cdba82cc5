// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ADP data unit (IEEE 1722.1-2013 Sec.6.2.1)
//!
//! The PDU starts right after the 4-byte AVTP control header. The first
//! 8 bytes (entity_id) sit in the AVTP stream_id position and are not
//! counted by `control_data_length`, which is always 56.

use super::constants::ADP_CONTROL_DATA_LENGTH;
use super::types::{AvailableIndex, EntityId};
use crate::error::{Error, Result};

/// Field offsets inside the PDU
mod offset {
    pub const ENTITY_ID: usize = 0;
    pub const ENTITY_MODEL_ID: usize = 8;
    pub const ENTITY_CAPABILITIES: usize = 16;
    pub const TALKER_STREAM_SOURCES: usize = 20;
    pub const TALKER_CAPABILITIES: usize = 22;
    pub const LISTENER_STREAM_SINKS: usize = 24;
    pub const LISTENER_CAPABILITIES: usize = 26;
    pub const CONTROLLER_CAPABILITIES: usize = 28;
    pub const AVAILABLE_INDEX: usize = 32;
    pub const GPTP_GRANDMASTER_ID: usize = 36;
    pub const GPTP_DOMAIN_NUMBER: usize = 44;
    // 45..48 reserved
    pub const IDENTIFY_CONTROL_INDEX: usize = 48;
    pub const INTERFACE_INDEX: usize = 50;
    pub const ASSOCIATION_ID: usize = 52;
    // 60..64 reserved
}

/// Decoded ADP PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdpPdu {
    /// Advertised entity
    pub entity_id: EntityId,
    /// Entity model (AEM) identifier
    pub entity_model_id: u64,
    /// Entity capabilities bitfield
    pub entity_capabilities: u32,
    /// Number of talker stream sources
    pub talker_stream_sources: u16,
    /// Talker capabilities bitfield
    pub talker_capabilities: u16,
    /// Number of listener stream sinks
    pub listener_stream_sinks: u16,
    /// Listener capabilities bitfield
    pub listener_capabilities: u16,
    /// Controller capabilities bitfield
    pub controller_capabilities: u32,
    /// Re-announcement counter
    pub available_index: AvailableIndex,
    /// gPTP grandmaster seen on the advertising interface
    pub gptp_grandmaster_id: u64,
    /// gPTP domain of the advertising interface
    pub gptp_domain_number: u8,
    /// Identify control descriptor index
    pub identify_control_index: u16,
    /// AVB_INTERFACE descriptor index the PDU was sent from
    pub interface_index: u16,
    /// Association id
    pub association_id: u64,
}

impl AdpPdu {
    /// Size of the PDU (entity_id + control data)
    pub const SIZE: usize = 8 + ADP_CONTROL_DATA_LENGTH as usize;

    /// PDU of a DISCOVER request (all fields zero but the target id)
    pub fn discover(target: EntityId) -> Self {
        Self {
            entity_id: target,
            ..Self::default()
        }
    }

    /// Encode into `buf`, reserved fields zeroed
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                needed: Self::SIZE,
                actual: buf.len(),
            });
        }

        buf[..Self::SIZE].copy_from_slice(&self.to_bytes());
        Ok(Self::SIZE)
    }

    /// Serialize to a fixed-size buffer, reserved fields zeroed
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        put(&mut buf, offset::ENTITY_ID, &self.entity_id.get().to_be_bytes());
        put(&mut buf, offset::ENTITY_MODEL_ID, &self.entity_model_id.to_be_bytes());
        put(&mut buf, offset::ENTITY_CAPABILITIES, &self.entity_capabilities.to_be_bytes());
        put(&mut buf, offset::TALKER_STREAM_SOURCES, &self.talker_stream_sources.to_be_bytes());
        put(&mut buf, offset::TALKER_CAPABILITIES, &self.talker_capabilities.to_be_bytes());
        put(&mut buf, offset::LISTENER_STREAM_SINKS, &self.listener_stream_sinks.to_be_bytes());
        put(&mut buf, offset::LISTENER_CAPABILITIES, &self.listener_capabilities.to_be_bytes());
        put(&mut buf, offset::CONTROLLER_CAPABILITIES, &self.controller_capabilities.to_be_bytes());
        put(&mut buf, offset::AVAILABLE_INDEX, &self.available_index.get().to_be_bytes());
        put(&mut buf, offset::GPTP_GRANDMASTER_ID, &self.gptp_grandmaster_id.to_be_bytes());
        buf[offset::GPTP_DOMAIN_NUMBER] = self.gptp_domain_number;
        put(&mut buf, offset::IDENTIFY_CONTROL_INDEX, &self.identify_control_index.to_be_bytes());
        put(&mut buf, offset::INTERFACE_INDEX, &self.interface_index.to_be_bytes());
        put(&mut buf, offset::ASSOCIATION_ID, &self.association_id.to_be_bytes());

        buf
    }

    /// Decode from `buf`; length is checked once before any field is read
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf: &[u8; Self::SIZE] = buf
            .get(..Self::SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::BufferTooSmall {
                needed: Self::SIZE,
                actual: buf.len(),
            })?;

        Ok(Self {
            entity_id: EntityId::new(be_u64(buf, offset::ENTITY_ID)),
            entity_model_id: be_u64(buf, offset::ENTITY_MODEL_ID),
            entity_capabilities: be_u32(buf, offset::ENTITY_CAPABILITIES),
            talker_stream_sources: be_u16(buf, offset::TALKER_STREAM_SOURCES),
            talker_capabilities: be_u16(buf, offset::TALKER_CAPABILITIES),
            listener_stream_sinks: be_u16(buf, offset::LISTENER_STREAM_SINKS),
            listener_capabilities: be_u16(buf, offset::LISTENER_CAPABILITIES),
            controller_capabilities: be_u32(buf, offset::CONTROLLER_CAPABILITIES),
            available_index: AvailableIndex(be_u32(buf, offset::AVAILABLE_INDEX)),
            gptp_grandmaster_id: be_u64(buf, offset::GPTP_GRANDMASTER_ID),
            gptp_domain_number: buf[offset::GPTP_DOMAIN_NUMBER],
            identify_control_index: be_u16(buf, offset::IDENTIFY_CONTROL_INDEX),
            interface_index: be_u16(buf, offset::INTERFACE_INDEX),
            association_id: be_u64(buf, offset::ASSOCIATION_ID),
        })
    }
}

fn put(buf: &mut [u8], at: usize, bytes: &[u8]) {
    buf[at..at + bytes.len()].copy_from_slice(bytes);
}

fn be_u16(buf: &[u8; AdpPdu::SIZE], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be_u32(buf: &[u8; AdpPdu::SIZE], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_be_bytes(raw)
}

fn be_u64(buf: &[u8; AdpPdu::SIZE], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(raw)
}
