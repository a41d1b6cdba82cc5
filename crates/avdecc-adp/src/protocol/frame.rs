// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ethernet framing of ADP PDUs.

use super::constants::{ADP_CONTROL_DATA_LENGTH, ADP_MULTICAST_MAC, ETHERTYPE_AVTP};
use super::header::{AvtpControlHeader, MessageType};
use super::pdu::AdpPdu;
use super::types::MacAddr;
use crate::error::{Error, Result};

const ETHERTYPE_VLAN: u16 = 0x8100;
const ETH_HEADER_SIZE: usize = 14;
const VLAN_TAG_SIZE: usize = 4;
const PDU_OFFSET: usize = ETH_HEADER_SIZE + AvtpControlHeader::SIZE;

/// Complete ADP frame as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdpFrame {
    /// Destination MAC (ADP multicast on transmit)
    pub destination: MacAddr,
    /// Source MAC
    pub source: MacAddr,
    /// AVTP control header
    pub header: AvtpControlHeader,
    /// ADP payload
    pub pdu: AdpPdu,
}

impl AdpFrame {
    /// Untagged frame size
    pub const SIZE: usize = ETH_HEADER_SIZE + AvtpControlHeader::SIZE + AdpPdu::SIZE;

    /// Build a multicast frame.
    ///
    /// `valid_time` is in wire units (2 s) and only meaningful for AVAILABLE.
    pub fn multicast(source: MacAddr, message_type: MessageType, valid_time: u8, pdu: AdpPdu) -> Self {
        Self {
            destination: ADP_MULTICAST_MAC,
            source,
            header: AvtpControlHeader {
                message_type,
                valid_time,
                control_data_length: ADP_CONTROL_DATA_LENGTH,
            },
            pdu,
        }
    }

    /// ADP message type
    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    /// Serialize to a fixed-size buffer
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];

        buf[0..6].copy_from_slice(&self.destination.octets());
        buf[6..12].copy_from_slice(&self.source.octets());
        buf[12..ETH_HEADER_SIZE].copy_from_slice(&ETHERTYPE_AVTP.to_be_bytes());
        buf[ETH_HEADER_SIZE..PDU_OFFSET].copy_from_slice(&self.header.to_bytes());
        buf[PDU_OFFSET..].copy_from_slice(&self.pdu.to_bytes());

        buf
    }

    /// Serialize into `buf`, returns bytes written
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

    /// Parse a received frame (optionally 802.1Q tagged)
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ETH_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                needed: ETH_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let mut destination = [0u8; 6];
        destination.copy_from_slice(&buf[0..6]);
        let mut source = [0u8; 6];
        source.copy_from_slice(&buf[6..12]);

        let mut ethertype = u16::from_be_bytes([buf[12], buf[13]]);
        let mut payload = &buf[ETH_HEADER_SIZE..];

        if ethertype == ETHERTYPE_VLAN {
            if payload.len() < VLAN_TAG_SIZE {
                return Err(Error::BufferTooSmall {
                    needed: ETH_HEADER_SIZE + VLAN_TAG_SIZE,
                    actual: buf.len(),
                });
            }
            ethertype = u16::from_be_bytes([payload[2], payload[3]]);
            payload = &payload[VLAN_TAG_SIZE..];
        }

        if ethertype != ETHERTYPE_AVTP {
            return Err(Error::InvalidEthertype(ethertype));
        }

        let header = AvtpControlHeader::decode(payload)?;
        if header.control_data_length < ADP_CONTROL_DATA_LENGTH {
            return Err(Error::InvalidControlDataLength(header.control_data_length));
        }

        let pdu = AdpPdu::decode(&payload[AvtpControlHeader::SIZE..])?;

        Ok(Self {
            destination: MacAddr::new(destination),
            source: MacAddr::new(source),
            header,
            pdu,
        })
    }
}
