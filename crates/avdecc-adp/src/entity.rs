// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local (advertised) entities and their per-interface advertise records.

use crate::advertise::ieee::{IeeeEntity, InterfaceState};
use crate::advertise::milan::{MilanInterface, MilanState};
use crate::config::EntityConfig;
use crate::listener_sink::ListenerSinkDiscovery;
use crate::protocol::{AdpPdu, AvailableIndex, EntityId};

/// Entity-level advertise record, one variant per protocol profile.
#[derive(Debug)]
pub(crate) enum EntityAdvertise {
    Ieee(IeeeEntity),
    /// MILAN keeps all its state per interface
    Milan,
}

/// Interface-level advertise state machine.
#[derive(Debug)]
pub enum InterfaceMachine {
    /// IEEE 1722.1 interface state
    Ieee(InterfaceState),
    /// MILAN interface state and timers
    Milan(MilanInterface),
}

/// Advertise record of one (entity, interface) binding.
#[derive(Debug)]
pub struct InterfaceAdvertiseState {
    pub(crate) port: u16,
    pub(crate) link_up: bool,
    pub(crate) grandmaster_id: u64,
    pub(crate) machine: InterfaceMachine,
}

impl InterfaceAdvertiseState {
    /// Port this binding advertises on
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Link operational state as last reported
    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// Current gPTP grandmaster of the port
    pub fn grandmaster_id(&self) -> u64 {
        self.grandmaster_id
    }

    /// IEEE interface state (None in MILAN mode)
    pub fn ieee_state(&self) -> Option<InterfaceState> {
        match &self.machine {
            InterfaceMachine::Ieee(state) => Some(*state),
            InterfaceMachine::Milan(_) => None,
        }
    }

    /// MILAN interface state (None in IEEE mode)
    pub fn milan_state(&self) -> Option<MilanState> {
        match &self.machine {
            InterfaceMachine::Ieee(_) => None,
            InterfaceMachine::Milan(milan) => Some(milan.state),
        }
    }
}

/// An entity advertised by this stack.
///
/// Owned by the engine; only its own advertise state machines mutate it.
#[derive(Debug)]
pub struct LocalEntity {
    pub(crate) config: EntityConfig,
    pub(crate) available_index: AvailableIndex,
    pub(crate) advertise: EntityAdvertise,
    pub(crate) interfaces: Vec<InterfaceAdvertiseState>,
    pub(crate) listener_sinks: Vec<ListenerSinkDiscovery>,
}

impl LocalEntity {
    /// Entity id
    pub fn id(&self) -> EntityId {
        self.config.entity_id
    }

    /// Static configuration
    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    /// available_index of the next AVAILABLE
    pub fn available_index(&self) -> AvailableIndex {
        self.available_index
    }

    /// Advertisement validity (seconds)
    pub fn valid_time(&self) -> u8 {
        self.config.valid_time
    }

    /// Interface bindings, in AVB_INTERFACE order
    pub fn interfaces(&self) -> &[InterfaceAdvertiseState] {
        &self.interfaces
    }

    /// Listener-sink discovery records, in stream input order
    pub fn listener_sinks(&self) -> &[ListenerSinkDiscovery] {
        &self.listener_sinks
    }

    /// AVB_INTERFACE index of the binding on `port`
    pub fn binding(&self, port: u16) -> Option<usize> {
        self.interfaces.iter().position(|itf| itf.port == port)
    }

    /// Bound to `port`
    pub fn on_port(&self, port: u16) -> bool {
        self.binding(port).is_some()
    }

    /// Has a controller role
    pub fn is_controller(&self) -> bool {
        self.config.is_controller()
    }

    /// Has a listener role
    pub fn is_listener(&self) -> bool {
        self.config.is_listener()
    }

    /// IEEE entity-level state (None in MILAN mode)
    pub fn ieee_state(&self) -> Option<crate::advertise::ieee::EntityState> {
        match &self.advertise {
            EntityAdvertise::Ieee(ieee) => Some(ieee.state),
            EntityAdvertise::Milan => None,
        }
    }

    /// PDU advertising this entity on its `binding`-th interface
    pub(crate) fn build_pdu(&self, binding: usize, gptp_domain_number: u8) -> AdpPdu {
        let c = &self.config;
        let grandmaster = self
            .interfaces
            .get(binding)
            .map_or(0, |itf| itf.grandmaster_id);

        AdpPdu {
            entity_id: c.entity_id,
            entity_model_id: c.entity_model_id,
            entity_capabilities: c.entity_capabilities,
            talker_stream_sources: c.talker_stream_sources,
            talker_capabilities: c.talker_capabilities,
            listener_stream_sinks: c.listener_stream_sinks,
            listener_capabilities: c.listener_capabilities,
            controller_capabilities: c.controller_capabilities,
            available_index: self.available_index,
            gptp_grandmaster_id: grandmaster,
            gptp_domain_number,
            identify_control_index: c.identify_control_index,
            interface_index: binding as u16,
            association_id: c.association_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::listener_caps;

    fn entity() -> LocalEntity {
        let mut config = EntityConfig::new(EntityId::new(0x42), vec![2, 0]);
        config.listener_capabilities = listener_caps::IMPLEMENTED;
        config.association_id = 0x77;

        LocalEntity {
            config,
            available_index: AvailableIndex(5),
            advertise: EntityAdvertise::Milan,
            interfaces: vec![
                InterfaceAdvertiseState {
                    port: 2,
                    link_up: true,
                    grandmaster_id: 0xaaaa,
                    machine: InterfaceMachine::Ieee(InterfaceState::Waiting),
                },
                InterfaceAdvertiseState {
                    port: 0,
                    link_up: false,
                    grandmaster_id: 0xbbbb,
                    machine: InterfaceMachine::Ieee(InterfaceState::LinkDown),
                },
            ],
            listener_sinks: Vec::new(),
        }
    }

    #[test]
    fn test_binding_lookup() {
        let e = entity();
        assert_eq!(e.binding(2), Some(0));
        assert_eq!(e.binding(0), Some(1));
        assert_eq!(e.binding(1), None);
        assert!(e.is_listener());
        assert!(!e.is_controller());
    }

    #[test]
    fn test_build_pdu_uses_binding() {
        let e = entity();
        let pdu = e.build_pdu(1, 4);
        assert_eq!(pdu.entity_id, EntityId::new(0x42));
        assert_eq!(pdu.interface_index, 1);
        assert_eq!(pdu.gptp_grandmaster_id, 0xbbbb);
        assert_eq!(pdu.gptp_domain_number, 4);
        assert_eq!(pdu.available_index, AvailableIndex(5));
        assert_eq!(pdu.association_id, 0x77);
    }
}
