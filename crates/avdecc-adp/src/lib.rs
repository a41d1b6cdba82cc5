// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # avdecc-adp - AVDECC Discovery Protocol engine
//!
//! IEEE 1722.1-2013 ADP: advertises local entities on their network
//! interfaces and keeps a database of the remote entities seen there.
//! Two advertise profiles are supported, selected once per engine:
//! IEEE 1722.1 (entity + interface state machines, legacy fast connect)
//! and MILAN (interface state machine, listener-sink talker discovery).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avdecc_adp::{AdpConfig, AdpEngine, EntityConfig, EntityId, InterfaceConfig, MacAddr};
//! use avdecc_adp::{NoAcmp, NullControl, NullNetwork};
//! use std::time::Instant;
//!
//! fn main() -> avdecc_adp::Result<()> {
//!     let config = AdpConfig {
//!         interfaces: vec![InterfaceConfig::new("eth0", MacAddr::new([2, 0, 0, 0, 0, 1]))],
//!         entities: vec![EntityConfig::new(EntityId::new(0x0001_f2ff_fe00_0001), vec![0])],
//!         ..AdpConfig::default()
//!     };
//!
//!     let mut engine = AdpEngine::new(config, NullNetwork, NullControl, NoAcmp)?;
//!     engine.start(Instant::now());
//!
//!     // feed frames with net_rx(), drive timers with poll_timers()
//!     engine.poll_timers(Instant::now());
//!     engine.shutdown(Instant::now());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------------+
//! |  runtime (tokio task)  |  or any caller driving the engine        |
//! +-------------------------------------------------------------------+
//! |                            AdpEngine                              |
//! |  advertise::{ieee, milan} | discovery | listener_sink | notify    |
//! +-------------------------------------------------------------------+
//! |  protocol (wire codec)    | timer (single wheel)                  |
//! +-------------------------------------------------------------------+
//! |  NetworkPort  |  ControlChannel (applications)  |  AcmpHooks      |
//! +-------------------------------------------------------------------+
//! ```
//!
//! ## Features
//!
//! - `runtime` (default): tokio single-task host, see [`runtime`]

pub mod acmp;
pub mod advertise;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod entity;
pub mod error;
pub mod listener_sink;
pub mod net;
pub mod notify;
pub mod protocol;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod timer;

pub use acmp::{AcmpHooks, ListenerSinkEvent, NoAcmp};
pub use advertise::ieee::{EntityState, InterfaceState};
pub use advertise::milan::MilanState;
pub use config::{AdpConfig, EntityConfig, FastConnect, InterfaceConfig, ProtocolMode, StreamInputConfig};
pub use discovery::DiscoveryDb;
pub use engine::{AdpEngine, Port};
pub use entity::{InterfaceAdvertiseState, LocalEntity};
pub use error::{ChannelError, Error, Result};
pub use listener_sink::{ListenerSinkDiscovery, ListenerSinkState};
pub use net::{NetworkPort, NullNetwork};
pub use notify::{ControlChannel, ControlMessage, Destination, NullControl};
pub use protocol::{AdpFrame, AdpPdu, AvailableIndex, EntityId, EntityInfo, MacAddr, MessageType};
