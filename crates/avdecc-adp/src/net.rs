// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network port abstraction.
//!
//! The engine never owns a socket. Everything it puts on the wire goes
//! through [`NetworkPort`], which a host implements on top of a raw
//! Ethernet socket, a driver queue or (see [`crate::runtime`]) a channel.
//!
//! Frames handed to [`NetworkPort::transmit`] are complete untagged
//! Ethernet frames ([`crate::protocol::AdpFrame::SIZE`] bytes).

use crate::error::Result;
use crate::protocol::MacAddr;

/// Frame transmit side of the network layer
pub trait NetworkPort {
    /// Subscribe `port` to a multicast group
    ///
    /// Called once per interface during engine init. A failure aborts
    /// engine creation.
    fn join_multicast(&mut self, port: u16, group: MacAddr) -> Result<()>;

    /// Send one Ethernet frame on `port`
    ///
    /// # Arguments
    ///
    /// * `port` - Interface index
    /// * `frame` - Complete Ethernet frame
    ///
    /// Best effort: the engine logs failures and never retries, periodic
    /// re-announcement is the retry mechanism.
    fn transmit(&mut self, port: u16, frame: &[u8]) -> Result<()>;
}

/// Null network (for testing)
///
/// Accepts every join and discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNetwork;

impl NetworkPort for NullNetwork {
    fn join_multicast(&mut self, _port: u16, _group: MacAddr) -> Result<()> {
        Ok(())
    }

    fn transmit(&mut self, _port: u16, _frame: &[u8]) -> Result<()> {
        Ok(())
    }
}
