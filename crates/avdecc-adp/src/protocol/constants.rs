// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IEEE 1722 / 1722.1 constants used by ADP.

use super::types::MacAddr;

/// AVTP ethertype
pub const ETHERTYPE_AVTP: u16 = 0x22f0;

/// AVTP control subtype for ADP (IEEE 1722-2016 Table 6)
pub const AVTP_SUBTYPE_ADP: u8 = 0xfa;

/// ADP/ACMP multicast destination (IEEE 1722.1-2013 Annex B)
pub const ADP_MULTICAST_MAC: MacAddr = MacAddr::new([0x91, 0xe0, 0xf0, 0x01, 0x00, 0x00]);

/// control_data_length carried by every ADPDU (bytes after entity_id)
pub const ADP_CONTROL_DATA_LENGTH: u16 = 56;

/// Largest value of the 5-bit valid_time status field (units of 2 s)
pub const ADP_VALID_TIME_FIELD_MAX: u8 = 31;

/// Entity capabilities bits (IEEE 1722.1-2013 Table 6.2)
pub mod entity_caps {
    /// Entity firmware upgrade mode
    pub const EFU_MODE: u32 = 1 << 0;
    /// Address access supported
    pub const ADDRESS_ACCESS_SUPPORTED: u32 = 1 << 1;
    /// Gateway entity
    pub const GATEWAY_ENTITY: u32 = 1 << 2;
    /// AEM supported
    pub const AEM_SUPPORTED: u32 = 1 << 3;
    /// Legacy AV/C
    pub const LEGACY_AVC: u32 = 1 << 4;
    /// association_id supported
    pub const ASSOCIATION_ID_SUPPORTED: u32 = 1 << 5;
    /// association_id valid
    pub const ASSOCIATION_ID_VALID: u32 = 1 << 6;
    /// Vendor unique supported
    pub const VENDOR_UNIQUE_SUPPORTED: u32 = 1 << 7;
    /// Class A supported
    pub const CLASS_A_SUPPORTED: u32 = 1 << 8;
    /// Class B supported
    pub const CLASS_B_SUPPORTED: u32 = 1 << 9;
    /// gPTP supported
    pub const GPTP_SUPPORTED: u32 = 1 << 10;
    /// identify_control_index valid
    pub const AEM_IDENTIFY_CONTROL_INDEX_VALID: u32 = 1 << 14;
    /// interface_index valid
    pub const AEM_INTERFACE_INDEX_VALID: u32 = 1 << 15;
    /// General controller ignore
    pub const GENERAL_CONTROLLER_IGNORE: u32 = 1 << 16;
    /// Entity not ready
    pub const ENTITY_NOT_READY: u32 = 1 << 17;
}

/// Talker capabilities bits
pub mod talker_caps {
    /// Talker implemented
    pub const IMPLEMENTED: u16 = 1 << 0;
    /// Other source
    pub const OTHER_SOURCE: u16 = 1 << 9;
    /// Control source
    pub const CONTROL_SOURCE: u16 = 1 << 10;
    /// Media clock source
    pub const MEDIA_CLOCK_SOURCE: u16 = 1 << 11;
    /// SMPTE source
    pub const SMPTE_SOURCE: u16 = 1 << 12;
    /// MIDI source
    pub const MIDI_SOURCE: u16 = 1 << 13;
    /// Audio source
    pub const AUDIO_SOURCE: u16 = 1 << 14;
    /// Video source
    pub const VIDEO_SOURCE: u16 = 1 << 15;
}

/// Listener capabilities bits
pub mod listener_caps {
    /// Listener implemented
    pub const IMPLEMENTED: u16 = 1 << 0;
    /// Other sink
    pub const OTHER_SINK: u16 = 1 << 9;
    /// Control sink
    pub const CONTROL_SINK: u16 = 1 << 10;
    /// Media clock sink
    pub const MEDIA_CLOCK_SINK: u16 = 1 << 11;
    /// SMPTE sink
    pub const SMPTE_SINK: u16 = 1 << 12;
    /// MIDI sink
    pub const MIDI_SINK: u16 = 1 << 13;
    /// Audio sink
    pub const AUDIO_SINK: u16 = 1 << 14;
    /// Video sink
    pub const VIDEO_SINK: u16 = 1 << 15;
}

/// Controller capabilities bits
pub mod controller_caps {
    /// Controller implemented
    pub const IMPLEMENTED: u32 = 1 << 0;
}
