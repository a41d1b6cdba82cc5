// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ADP wire codec: AVTP control header, ADPDU, Ethernet framing.

pub mod constants;
pub mod frame;
pub mod header;
pub mod info;
pub mod pdu;
pub mod types;

pub use constants::{
    controller_caps, entity_caps, listener_caps, talker_caps, ADP_CONTROL_DATA_LENGTH,
    ADP_MULTICAST_MAC, AVTP_SUBTYPE_ADP, ETHERTYPE_AVTP,
};
pub use frame::AdpFrame;
pub use header::{AvtpControlHeader, MessageType};
pub use info::EntityInfo;
pub use pdu::AdpPdu;
pub use types::{AvailableIndex, EntityId, MacAddr};
