// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovered entity snapshot handed to local applications.

use super::constants::talker_caps;
use super::pdu::AdpPdu;
use super::types::{AvailableIndex, EntityId, MacAddr};
use serde::{Deserialize, Serialize};

/// Remote entity information (IEEE 1722.1-2013 Sec.6.2.1 and 6.2.6.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity_id: EntityId,
    pub entity_model_id: u64,
    pub entity_capabilities: u32,
    pub talker_stream_sources: u16,
    pub talker_capabilities: u16,
    pub listener_stream_sinks: u16,
    pub listener_capabilities: u16,
    pub controller_capabilities: u32,
    pub gptp_grandmaster_id: u64,
    pub gptp_domain_number: u8,
    pub identify_control_index: u16,
    pub interface_index: u16,
    pub available_index: AvailableIndex,
    pub association_id: u64,
    /// Source MAC of the last AVAILABLE
    pub mac_address: MacAddr,
    /// MAC of the local interface the entity was seen on
    pub local_mac_address: MacAddr,
}

impl EntityInfo {
    /// Snapshot of a received AVAILABLE
    pub fn from_pdu(pdu: &AdpPdu, source: MacAddr, local: MacAddr) -> Self {
        Self {
            entity_id: pdu.entity_id,
            entity_model_id: pdu.entity_model_id,
            entity_capabilities: pdu.entity_capabilities,
            talker_stream_sources: pdu.talker_stream_sources,
            talker_capabilities: pdu.talker_capabilities,
            listener_stream_sinks: pdu.listener_stream_sinks,
            listener_capabilities: pdu.listener_capabilities,
            controller_capabilities: pdu.controller_capabilities,
            gptp_grandmaster_id: pdu.gptp_grandmaster_id,
            gptp_domain_number: pdu.gptp_domain_number,
            identify_control_index: pdu.identify_control_index,
            interface_index: pdu.interface_index,
            available_index: pdu.available_index,
            association_id: pdu.association_id,
            mac_address: source,
            local_mac_address: local,
        }
    }

    /// True if `pdu`/`source` carry a semantically different advertisement.
    ///
    /// `available_index` is excluded: it changes on every re-announcement.
    pub fn differs_from(&self, pdu: &AdpPdu, source: MacAddr) -> bool {
        self.entity_id != pdu.entity_id
            || self.entity_model_id != pdu.entity_model_id
            || self.entity_capabilities != pdu.entity_capabilities
            || self.talker_stream_sources != pdu.talker_stream_sources
            || self.talker_capabilities != pdu.talker_capabilities
            || self.listener_stream_sinks != pdu.listener_stream_sinks
            || self.listener_capabilities != pdu.listener_capabilities
            || self.controller_capabilities != pdu.controller_capabilities
            || self.gptp_grandmaster_id != pdu.gptp_grandmaster_id
            || self.gptp_domain_number != pdu.gptp_domain_number
            || self.identify_control_index != pdu.identify_control_index
            || self.interface_index != pdu.interface_index
            || self.association_id != pdu.association_id
            || self.mac_address != source
    }

    /// Advertises an implemented audio or video talker
    pub fn is_media_talker(&self) -> bool {
        self.talker_capabilities & talker_caps::IMPLEMENTED != 0
            && self.talker_capabilities & (talker_caps::AUDIO_SOURCE | talker_caps::VIDEO_SOURCE) != 0
    }
}
