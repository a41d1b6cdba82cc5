// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identifier and counter types shared by the codec and the state machines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 64-bit AVDECC entity identifier (EUI-64).
///
/// Zero is the wildcard used by global DISCOVER requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Wildcard id (discover all)
    pub const WILDCARD: Self = Self(0);

    /// Create a new entity id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    pub const fn get(self) -> u64 {
        self.0
    }

    /// True for the zero/wildcard id
    pub const fn is_wildcard(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// 48-bit IEEE 802 MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Create from raw octets
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Group (multicast) bit set
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split([':', '-']);

        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(|| format!("MAC address too short: {}", s))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| format!("invalid MAC address octet '{}' in {}", part, s))?;
        }

        if parts.next().is_some() {
            return Err(format!("MAC address too long: {}", s));
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

/// ADP `available_index` counter.
///
/// Incremented on every re-announcement and compared with serial-number
/// arithmetic: `a` is newer than `b` when `(a - b) mod 2^32`, read as a signed
/// 32-bit value, is strictly positive. A distance of exactly 2^31 is therefore
/// *not* newer and counts as a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailableIndex(pub u32);

impl AvailableIndex {
    /// Index announced right after (re)start
    pub const ZERO: Self = Self(0);

    /// Raw value
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Next value, wrapping at 2^32
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Serial-number comparison: strictly after `previous`
    pub const fn is_newer_than(self, previous: Self) -> bool {
        (self.0.wrapping_sub(previous.0) as i32) > 0
    }
}

impl fmt::Display for AvailableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
