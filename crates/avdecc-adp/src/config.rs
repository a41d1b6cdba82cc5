// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ADP engine configuration.
//!
//! Loaded once at engine start; nothing here is re-read at runtime.

use crate::error::{Error, Result};
use crate::protocol::{controller_caps, listener_caps, EntityId, MacAddr};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Smallest accepted valid_time (seconds)
pub const VALID_TIME_MIN: u8 = 2;
/// Largest valid_time representable in the 5-bit wire field (seconds)
pub const VALID_TIME_MAX: u8 = 62;

/// Advertise protocol profile, global to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// IEEE 1722.1-2013 entity + interface advertise state machines
    #[default]
    Ieee,
    /// MILAN interface advertise state machine and listener-sink discovery
    Milan,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdpConfig {
    /// Protocol profile
    #[serde(default)]
    pub mode: ProtocolMode,

    /// Network interfaces (ports), indexed by position
    pub interfaces: Vec<InterfaceConfig>,

    /// Discovery pool capacity per interface
    #[serde(default = "default_max_entities_discovery")]
    pub max_entities_discovery: usize,

    /// Capacity of the timer facility
    #[serde(default = "default_max_timers")]
    pub max_timers: usize,

    /// Local entities to advertise
    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    /// Legacy fast-connect flags (IEEE mode)
    #[serde(default)]
    pub fast_connect: FastConnect,

    /// Send a global DISCOVER on every interface at start
    #[serde(default = "default_true")]
    pub send_discover_on_start: bool,

    /// Seed for randomized advertise delays (random when unset)
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

/// One network interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// OS name, informational
    #[serde(default)]
    pub name: String,

    /// Source MAC for transmitted frames
    pub mac_address: MacAddr,

    /// Configured gPTP domain
    #[serde(default)]
    pub gptp_domain_number: u8,

    /// Initial link state
    #[serde(default = "default_true")]
    pub link_up: bool,

    /// Initial gPTP grandmaster id
    #[serde(default)]
    pub gptp_grandmaster_id: u64,
}

/// One local entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub entity_id: EntityId,
    #[serde(default)]
    pub entity_model_id: u64,
    #[serde(default)]
    pub entity_capabilities: u32,
    #[serde(default)]
    pub talker_stream_sources: u16,
    #[serde(default)]
    pub talker_capabilities: u16,
    #[serde(default)]
    pub listener_stream_sinks: u16,
    #[serde(default)]
    pub listener_capabilities: u16,
    #[serde(default)]
    pub controller_capabilities: u32,
    #[serde(default)]
    pub identify_control_index: u16,
    #[serde(default)]
    pub association_id: u64,

    /// Advertisement validity in seconds
    #[serde(default = "default_valid_time")]
    pub valid_time: u8,

    /// Ports the entity is advertised on; position is the AVB_INTERFACE index
    pub interfaces: Vec<u16>,

    /// Listener stream inputs (MILAN listener-sink discovery)
    #[serde(default)]
    pub stream_inputs: Vec<StreamInputConfig>,
}

/// Listener stream input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StreamInputConfig {
    /// AVB_INTERFACE index (position in [`EntityConfig::interfaces`])
    pub avb_interface_index: u16,
}

/// Legacy fast-connect flags forwarded to connection management.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastConnect {
    /// Reconnect known talkers when the grandmaster changes
    #[serde(default)]
    pub enabled: bool,

    /// Back-to-back fast connect on talker discovery
    #[serde(default)]
    pub back_to_back: bool,
}

fn default_max_entities_discovery() -> usize {
    16
}

fn default_max_timers() -> usize {
    256
}

fn default_valid_time() -> u8 {
    VALID_TIME_MAX
}

fn default_true() -> bool {
    true
}

impl Default for AdpConfig {
    fn default() -> Self {
        Self {
            mode: ProtocolMode::default(),
            interfaces: Vec::new(),
            max_entities_discovery: default_max_entities_discovery(),
            max_timers: default_max_timers(),
            entities: Vec::new(),
            fast_connect: FastConnect::default(),
            send_discover_on_start: true,
            rng_seed: None,
        }
    }
}

impl InterfaceConfig {
    /// Interface with default gPTP settings and link up
    pub fn new(name: impl Into<String>, mac_address: MacAddr) -> Self {
        Self {
            name: name.into(),
            mac_address,
            gptp_domain_number: 0,
            link_up: true,
            gptp_grandmaster_id: 0,
        }
    }
}

impl EntityConfig {
    /// Entity bound to `interfaces` with no capabilities set
    pub fn new(entity_id: EntityId, interfaces: Vec<u16>) -> Self {
        Self {
            entity_id,
            entity_model_id: 0,
            entity_capabilities: 0,
            talker_stream_sources: 0,
            talker_capabilities: 0,
            listener_stream_sinks: 0,
            listener_capabilities: 0,
            controller_capabilities: 0,
            identify_control_index: 0,
            association_id: 0,
            valid_time: default_valid_time(),
            interfaces,
            stream_inputs: Vec::new(),
        }
    }

    /// Controller capability implemented
    pub fn is_controller(&self) -> bool {
        self.controller_capabilities & controller_caps::IMPLEMENTED != 0
    }

    /// Listener capability implemented
    pub fn is_listener(&self) -> bool {
        self.listener_capabilities & listener_caps::IMPLEMENTED != 0
    }

    /// Validate against an engine with `interface_count` ports.
    pub fn validate(&self, interface_count: usize) -> Result<()> {
        if self.entity_id.is_wildcard() {
            return Err(Error::Config("entity_id cannot be 0".into()));
        }
        if !(VALID_TIME_MIN..=VALID_TIME_MAX).contains(&self.valid_time) {
            return Err(Error::Config(format!(
                "entity {}: valid_time {} outside {}..={}",
                self.entity_id, self.valid_time, VALID_TIME_MIN, VALID_TIME_MAX
            )));
        }
        if self.interfaces.is_empty() {
            return Err(Error::Config(format!(
                "entity {}: no interface bound",
                self.entity_id
            )));
        }

        let mut ports = HashSet::new();
        for &port in &self.interfaces {
            if usize::from(port) >= interface_count {
                return Err(Error::UnknownInterface(port));
            }
            if !ports.insert(port) {
                return Err(Error::Config(format!(
                    "entity {}: port {} bound twice",
                    self.entity_id, port
                )));
            }
        }

        for input in &self.stream_inputs {
            if usize::from(input.avb_interface_index) >= self.interfaces.len() {
                return Err(Error::Config(format!(
                    "entity {}: stream input bound to missing AVB_INTERFACE {}",
                    self.entity_id, input.avb_interface_index
                )));
            }
        }

        Ok(())
    }
}

impl AdpConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.interfaces.is_empty() {
            return Err(Error::Config("at least one interface is required".into()));
        }
        if self.max_entities_discovery == 0 {
            return Err(Error::Config(
                "max_entities_discovery cannot be 0".into(),
            ));
        }
        if self.max_timers == 0 {
            return Err(Error::Config("max_timers cannot be 0".into()));
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            entity.validate(self.interfaces.len())?;
            if !seen.insert(entity.entity_id) {
                return Err(Error::DuplicateEntity(entity.entity_id));
            }
        }

        Ok(())
    }
}
