// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tokio host for the engine.
//!
//! One task owns the [`AdpEngine`] and is the only one touching it. Other
//! tasks talk to it through a [`RuntimeHandle`]; the task sleeps until the
//! next timer deadline or the next command, whichever comes first.
//!
//! ```ignore
//! let (net, mut frames) = ChannelNetwork::new(64);
//! let (ctl, mut messages) = ChannelControl::new(64);
//! let engine = AdpEngine::new(config, net, ctl, NoAcmp)?;
//! let (handle, task) = runtime::spawn(engine);
//!
//! handle.frame(0, rx_bytes).await?;
//! handle.shutdown().await?;
//! let engine = task.await?;
//! ```

use crate::acmp::AcmpHooks;
use crate::engine::AdpEngine;
use crate::error::{ChannelError, Error, Result};
use crate::net::NetworkPort;
use crate::notify::{ControlChannel, ControlMessage, Destination};
use crate::protocol::{EntityId, MacAddr};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Depth of the command queue towards the engine task
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Request to the engine task.
#[derive(Debug)]
pub enum Command {
    /// Ethernet frame received on `port`
    Frame { port: u16, bytes: Vec<u8> },
    /// Request from a local application
    Control {
        entity: EntityId,
        msg: ControlMessage,
        dst: Destination,
    },
    /// Link operational state change
    LinkState { port: u16, up: bool },
    /// gPTP grandmaster change
    Grandmaster { port: u16, grandmaster_id: u64 },
    BindListenerSink {
        entity: EntityId,
        stream: u16,
        talker: EntityId,
    },
    UnbindListenerSink { entity: EntityId, stream: u16 },
    /// Transmit a DISCOVER (global when `target` is None)
    Discover { port: u16, target: Option<EntityId> },
    /// Send DEPARTING everywhere and stop the task
    Shutdown,
}

/// Cloneable handle to a running engine task.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Command>,
}

impl RuntimeHandle {
    /// Queue a command, waiting for room in the queue
    pub async fn send(&self, cmd: Command) -> std::result::Result<(), ChannelError> {
        self.tx.send(cmd).await.map_err(|_| ChannelError::Closed)
    }

    /// Hand a received Ethernet frame to the engine
    pub async fn frame(&self, port: u16, bytes: Vec<u8>) -> std::result::Result<(), ChannelError> {
        self.send(Command::Frame { port, bytes }).await
    }

    /// Forward a request from a local application
    pub async fn control(
        &self,
        entity: EntityId,
        msg: ControlMessage,
        dst: Destination,
    ) -> std::result::Result<(), ChannelError> {
        self.send(Command::Control { entity, msg, dst }).await
    }

    /// Report a link state change on `port`
    pub async fn set_link_state(&self, port: u16, up: bool) -> std::result::Result<(), ChannelError> {
        self.send(Command::LinkState { port, up }).await
    }

    /// Report a gPTP grandmaster change on `port`
    pub async fn set_grandmaster(
        &self,
        port: u16,
        grandmaster_id: u64,
    ) -> std::result::Result<(), ChannelError> {
        self.send(Command::Grandmaster {
            port,
            grandmaster_id,
        })
        .await
    }

    /// Follow `talker` on a listener stream input
    pub async fn bind_listener_sink(
        &self,
        entity: EntityId,
        stream: u16,
        talker: EntityId,
    ) -> std::result::Result<(), ChannelError> {
        self.send(Command::BindListenerSink {
            entity,
            stream,
            talker,
        })
        .await
    }

    /// Stop following the talker of a listener stream input
    pub async fn unbind_listener_sink(
        &self,
        entity: EntityId,
        stream: u16,
    ) -> std::result::Result<(), ChannelError> {
        self.send(Command::UnbindListenerSink { entity, stream }).await
    }

    /// Send a DISCOVER on `port`, global when `target` is None
    pub async fn discover(
        &self,
        port: u16,
        target: Option<EntityId>,
    ) -> std::result::Result<(), ChannelError> {
        self.send(Command::Discover { port, target }).await
    }

    /// Ask the task to shut the engine down and exit
    pub async fn shutdown(&self) -> std::result::Result<(), ChannelError> {
        self.send(Command::Shutdown).await
    }
}

/// Start `engine` on its own task.
///
/// The task returns the engine once shut down, or once every handle has
/// been dropped.
pub fn spawn<N, C, A>(engine: AdpEngine<N, C, A>) -> (RuntimeHandle, JoinHandle<AdpEngine<N, C, A>>)
where
    N: NetworkPort + Send + 'static,
    C: ControlChannel + Send + 'static,
    A: AcmpHooks + Send + 'static,
{
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let task = tokio::spawn(run(engine, rx));
    (RuntimeHandle { tx }, task)
}

/// Engine time follows the tokio clock, so paused test time drives it too.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn run<N, C, A>(mut engine: AdpEngine<N, C, A>, mut rx: mpsc::Receiver<Command>) -> AdpEngine<N, C, A>
where
    N: NetworkPort,
    C: ControlChannel,
    A: AcmpHooks,
{
    engine.start(now());
    log::info!("[adp] runtime started");

    loop {
        let deadline = engine.next_deadline();

        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Shutdown) | None => break,
                Some(cmd) => {
                    if let Err(e) = execute(&mut engine, cmd, now()) {
                        log::warn!("[adp] command failed: {}", e);
                    }
                }
            },
            _ = sleep_until(deadline) => {
                engine.poll_timers(now());
            }
        }
    }

    engine.shutdown(now());
    log::info!("[adp] runtime stopped");
    engine
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

fn execute<N, C, A>(engine: &mut AdpEngine<N, C, A>, cmd: Command, now: Instant) -> Result<()>
where
    N: NetworkPort,
    C: ControlChannel,
    A: AcmpHooks,
{
    match cmd {
        Command::Frame { port, bytes } => engine.net_rx(port, &bytes, now),
        Command::Control { entity, msg, dst } => engine.control_rx(entity, msg, dst),
        Command::LinkState { port, up } => engine.set_link_state(port, up, now),
        Command::Grandmaster {
            port,
            grandmaster_id,
        } => engine.set_grandmaster(port, grandmaster_id, now),
        Command::BindListenerSink {
            entity,
            stream,
            talker,
        } => engine.bind_listener_sink(entity, stream, talker, now),
        Command::UnbindListenerSink { entity, stream } => {
            engine.unbind_listener_sink(entity, stream, now)
        }
        Command::Discover { port, target } => engine.send_discover(port, target, now),
        Command::Shutdown => Ok(()),
    }
}

/// Frame queued for transmission by [`ChannelNetwork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub port: u16,
    pub bytes: Vec<u8>,
}

/// Network seam backed by a bounded channel; the receiving side does the
/// actual socket I/O.
#[derive(Debug, Clone)]
pub struct ChannelNetwork {
    tx: mpsc::Sender<OutboundFrame>,
}

impl ChannelNetwork {
    pub fn new(depth: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }
}

impl NetworkPort for ChannelNetwork {
    fn join_multicast(&mut self, port: u16, group: MacAddr) -> Result<()> {
        log::debug!("port({}) join multicast {}", port, group);
        Ok(())
    }

    fn transmit(&mut self, port: u16, frame: &[u8]) -> Result<()> {
        self.tx
            .try_send(OutboundFrame {
                port,
                bytes: frame.to_vec(),
            })
            .map_err(|e| Error::Transmit(e.to_string()))
    }
}

/// Control seam backed by a bounded channel.
///
/// A full queue is reported as [`ChannelError::QueueFull`] and the message
/// is dropped.
#[derive(Debug, Clone)]
pub struct ChannelControl {
    tx: mpsc::Sender<(Destination, ControlMessage)>,
}

impl ChannelControl {
    pub fn new(depth: usize) -> (Self, mpsc::Receiver<(Destination, ControlMessage)>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }
}

impl ControlChannel for ChannelControl {
    fn send(&mut self, dst: Destination, msg: ControlMessage) -> std::result::Result<(), ChannelError> {
        self.tx.try_send((dst, msg)).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::QueueFull,
            TrySendError::Closed(_) => ChannelError::Closed,
        })
    }
}
