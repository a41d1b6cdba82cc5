// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AVTP control header (common to ADP/AECP/ACMP)

use super::constants::{ADP_VALID_TIME_FIELD_MAX, AVTP_SUBTYPE_ADP};
use crate::error::{Error, Result};
use std::fmt;

/// ADP message type (IEEE 1722.1-2013 Table 6.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// ENTITY_AVAILABLE
    Available = 0,
    /// ENTITY_DEPARTING
    Departing = 1,
    /// ENTITY_DISCOVER
    Discover = 2,
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Available),
            1 => Ok(Self::Departing),
            2 => Ok(Self::Discover),
            other => Err(Error::InvalidMessageType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Available => "ENTITY_AVAILABLE",
            Self::Departing => "ENTITY_DEPARTING",
            Self::Discover => "ENTITY_DISCOVER",
        };
        f.write_str(name)
    }
}

/// AVTP control header (4 bytes)
///
/// ```text
/// 0:      subtype (0xfa)
/// 1:      sv(1) | version(3) | message_type(4)
/// 2...3:  valid_time(5) | control_data_length(11)
/// ```
///
/// `valid_time` is kept in wire units (2 seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvtpControlHeader {
    /// ADP message type
    pub message_type: MessageType,
    /// valid_time status field, units of 2 s
    pub valid_time: u8,
    /// Bytes following the entity_id
    pub control_data_length: u16,
}

impl AvtpControlHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 4;

    /// Encode into `buf`, returns bytes written
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

    /// Serialize to a fixed-size buffer
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let valid_time = self.valid_time.min(ADP_VALID_TIME_FIELD_MAX) as u16;
        let [hi, lo] = ((valid_time << 11) | (self.control_data_length & 0x07ff)).to_be_bytes();

        // sv = 0, version = 0
        [AVTP_SUBTYPE_ADP, self.message_type as u8 & 0x0f, hi, lo]
    }

    /// Decode from `buf`, validating subtype and message type
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                needed: Self::SIZE,
                actual: buf.len(),
            });
        }

        if buf[0] != AVTP_SUBTYPE_ADP {
            return Err(Error::InvalidSubtype(buf[0]));
        }

        let message_type = MessageType::try_from(buf[1] & 0x0f)?;
        let status_length = u16::from_be_bytes([buf[2], buf[3]]);

        Ok(Self {
            message_type,
            valid_time: (status_length >> 11) as u8,
            control_data_length: status_length & 0x07ff,
        })
    }
}
