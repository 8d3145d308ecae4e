/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Client lifecycle events and their delivery to registered listeners.
 */

use crate::config::ClientEventListener;
use crate::error::MqttError;
use crate::mqtt::*;

use log::*;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// An event emitted by the client every time it starts a connection attempt.
#[derive(Debug)]
pub struct ConnectingEvent {}

impl Display for ConnectingEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectingEvent {{ }}")
    }
}

/// An event emitted by the client after a successful CONNECT/CONNACK handshake.
#[derive(Debug)]
pub struct ConnectedEvent {

    /// CONNACK the server answered the connection attempt with
    pub connack: ConnackPacket,
}

impl Display for ConnectedEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectedEvent {{ {} }}", self.connack)
    }
}

/// An event emitted by the client whenever a connection (or connection attempt) ends, for any
/// reason.
#[derive(Debug)]
pub struct DisconnectedEvent {

    /// Whether the connection had completed its handshake before it ended
    pub was_connected: bool,

    /// High-level reason for why the connection was shut down
    pub error: MqttError,

    /// If the connection was shut down due to the receipt of a server-sent DISCONNECT packet,
    /// then that packet is found here.
    pub disconnect: Option<DisconnectPacket>,
}

impl Display for DisconnectedEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisconnectedEvent {{ was_connected: {}, {}", self.was_connected, self.error)?;
        if let Some(disconnect) = &self.disconnect {
            write!(f, ", {} }}", disconnect)
        } else {
            write!(f, ", None }}")
        }
    }
}

/// Union of all the different events emitted by the client.
#[derive(Debug)]
#[non_exhaustive]
pub enum ClientEvent {

    /// A connection attempt has started
    Connecting(ConnectingEvent),

    /// A connection attempt completed its handshake successfully
    Connected(ConnectedEvent),

    /// A connection or connection attempt ended
    Disconnected(DisconnectedEvent),
}

impl Display for ClientEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientEvent::Connecting(event) => { write!(f, "{}", event) }
            ClientEvent::Connected(event) => { write!(f, "{}", event) }
            ClientEvent::Disconnected(event) => { write!(f, "{}", event) }
        }
    }
}

/// Opaque structure that represents the identity of a client event listener.  Returned by
/// adding a listener and used to remove that same listener if needed.
#[derive(Debug, Eq, PartialEq)]
pub struct ListenerHandle {
    id: u64
}

type ListenerTable = Arc<Mutex<Vec<(u64, ClientEventListener)>>>;

/// Owns the listener table and the task that delivers events to it.
pub(crate) struct EventDispatcher {
    listeners: ListenerTable,
    next_listener_id: AtomicU64,
    sender: UnboundedSender<Arc<ClientEvent>>,
}

impl EventDispatcher {

    pub(crate) fn new(runtime: &Handle) -> Self {
        let listeners : ListenerTable = Arc::new(Mutex::new(Vec::new()));
        let (sender, receiver) = unbounded_channel();

        runtime.spawn(event_delivery_loop(receiver, listeners.clone()));

        EventDispatcher {
            listeners,
            next_listener_id: AtomicU64::new(1),
            sender,
        }
    }

    pub(crate) fn add_listener(&self, listener: ClientEventListener) -> ListenerHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).push((id, listener));

        ListenerHandle { id }
    }

    pub(crate) fn remove_listener(&self, handle: ListenerHandle) {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).retain(|(id, _)| *id != handle.id);
    }

    /// Queues an event for delivery.  Never invokes a listener on the caller's stack.
    pub(crate) fn emit(&self, event: ClientEvent) {
        debug!("Emitting client event: {}", event);

        if self.sender.send(Arc::new(event)).is_err() {
            warn!("Event delivery task is gone; dropping client event");
        }
    }
}

async fn event_delivery_loop(mut receiver: UnboundedReceiver<Arc<ClientEvent>>, listeners: ListenerTable) {
    while let Some(event) = receiver.recv().await {
        let snapshot : Vec<ClientEventListener> = listeners.lock().unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            deliver_event(&listener, event.clone());
        }
    }

    debug!("Event delivery task exiting");
}

fn deliver_event(listener: &ClientEventListener, event: Arc<ClientEvent>) {
    match listener {
        ClientEventListener::Channel(channel) => {
            if channel.send(event).is_err() {
                debug!("Event listener channel closed; event not delivered");
            }
        }
        ClientEventListener::Callback(callback) => {
            if catch_unwind(AssertUnwindSafe(|| (callback)(event))).is_err() {
                warn!("Client event listener callback panicked");
            }
        }
    }
}
