/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Connection-scoped machinery behind `MqttClient`: the shared client core, the per-connection
context, the receive and keep alive tasks, and connection teardown.
 */

use crate::alias::InboundAliasResolver;
use crate::client::*;
use crate::client::dispatcher::*;
use crate::client::events::EventDispatcher;
use crate::client::packet_id::PacketIdentifierProvider;
use crate::config::*;
use crate::decode::PacketReader;
use crate::encode::Encoder;
use crate::error::{MqttError, MqttResult};
use crate::logging::log_packet;
use crate::mqtt::*;
use crate::mqtt::disconnect::validate_disconnect_packet_outbound;
use crate::validate::validate_packet_outbound;

use log::*;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{split, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which background task (if any) is running a teardown.  A task never aborts or joins itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TaskRole {
    Receive,
    KeepAlive,
}

enum LoopOutcome {
    Continue,
    Stop,
    Fault(MqttError),
}

struct PacketWriter {
    encoder: Encoder,
    stream: WriteHalf<Box<dyn AsyncTransport>>,
}

#[derive(Default)]
struct ConnectionTasks {
    closed: bool,
    handles: Vec<(TaskRole, JoinHandle<()>)>,
}

/// Everything that lives exactly as long as one transport connection.
pub(crate) struct ConnectionContext {
    id: u64,
    version: ProtocolVersion,
    options: Arc<MqttClientOptions>,
    writer: tokio::sync::Mutex<PacketWriter>,
    last_packet_sent: Mutex<Instant>,
    teardown_gate: AtomicBool,
    teardown_complete: watch::Sender<bool>,
    tasks: Mutex<ConnectionTasks>,
    ping_lock: tokio::sync::Mutex<()>,
}

impl ConnectionContext {

    fn new(id: u64, options: Arc<MqttClientOptions>, stream: WriteHalf<Box<dyn AsyncTransport>>) -> Self {
        let (teardown_complete, _) = watch::channel(false);

        ConnectionContext {
            id,
            version: options.protocol_version,
            options,
            writer: tokio::sync::Mutex::new(PacketWriter {
                encoder: Encoder::new(),
                stream
            }),
            last_packet_sent: Mutex::new(Instant::now()),
            teardown_gate: AtomicBool::new(false),
            teardown_complete,
            tasks: Mutex::new(ConnectionTasks::default()),
            ping_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Encodes and writes a single packet.  Validation failures leave the connection untouched;
    /// write failures do not.
    async fn send(&self, packet: &MqttPacket) -> MqttResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = &mut *guard;

        let frame = writer.encoder.encode(packet, self.version)?;
        log_packet("Sending packet: ", packet);

        writer.stream.write_all(frame).await.map_err(MqttError::new_transport_error)?;
        writer.stream.flush().await.map_err(MqttError::new_transport_error)?;

        *lock(&self.last_packet_sent) = Instant::now();

        Ok(())
    }

    fn time_since_last_send(&self) -> Duration {
        lock(&self.last_packet_sent).elapsed()
    }

    fn attach_task(&self, role: TaskRole, handle: JoinHandle<()>) {
        let mut tasks = lock(&self.tasks);
        if tasks.closed {
            debug!("connection {} - aborting {:?} task attached after close", self.id, role);
            handle.abort();
            return;
        }

        tasks.handles.push((role, handle));
    }

    fn close_tasks(&self) -> Vec<(TaskRole, JoinHandle<()>)> {
        let mut tasks = lock(&self.tasks);
        tasks.closed = true;
        std::mem::take(&mut tasks.handles)
    }

    fn claim_teardown(&self) -> bool {
        self.teardown_gate.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    async fn wait_for_teardown(&self) {
        let mut receiver = self.teardown_complete.subscribe();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }

            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Client state that outlives individual connections.
pub(crate) struct ClientCore {
    state: AtomicU8,
    packet_ids: PacketIdentifierProvider,
    dispatcher: ResponseDispatcher,
    connection: Mutex<Option<Arc<ConnectionContext>>>,
    next_connection_id: AtomicU64,
    handlers: Mutex<Vec<(u64, MessageHandler)>>,
    next_handler_id: AtomicU64,
    qos2_received: Mutex<HashSet<u16>>,
    runtime: Handle,
    pub(crate) events: EventDispatcher,
}

impl ClientCore {

    pub(crate) fn new(runtime: &Handle) -> Self {
        ClientCore {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            packet_ids: PacketIdentifierProvider::new(),
            dispatcher: ResponseDispatcher::new(),
            connection: Mutex::new(None),
            next_connection_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
            next_handler_id: AtomicU64::new(1),
            qos2_received: Mutex::new(HashSet::new()),
            runtime: runtime.clone(),
            events: EventDispatcher::new(runtime),
        }
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition_state(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    fn swap_state(&self, to: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.state.swap(to as u8, Ordering::AcqRel))
    }

    fn current_connection(&self) -> Option<Arc<ConnectionContext>> {
        lock(&self.connection).clone()
    }

    fn established_connection(&self) -> MqttResult<Arc<ConnectionContext>> {
        let state = self.connection_state();
        if state != ConnectionState::Connected {
            return Err(not_connected_error(state));
        }

        self.current_connection().ok_or_else(|| not_connected_error(state))
    }

    fn clear_connection(&self, id: u64) {
        let mut connection = lock(&self.connection);
        if connection.as_ref().is_some_and(|current| current.id == id) {
            *connection = None;
        }
    }

    pub(crate) fn add_message_handler(&self, handler: MessageHandler) -> MessageHandlerHandle {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers).push((id, handler));

        MessageHandlerHandle { id }
    }

    pub(crate) fn remove_message_handler(&self, handle: MessageHandlerHandle) {
        lock(&self.handlers).retain(|(id, _)| *id != handle.id);
    }

    /// Aborts the background tasks of the current connection without any protocol exchange.
    pub(crate) fn abandon_connection(&self) {
        if let Some(connection) = lock(&self.connection).take() {
            info!("client - abandoning connection {}", connection.id);
            for (_, handle) in connection.close_tasks() {
                handle.abort();
            }
        }
    }

    pub(crate) async fn connect(self: &Arc<Self>, options: MqttClientOptions) -> ConnectResult {
        if !self.transition_state(ConnectionState::Disconnected, ConnectionState::Connecting) {
            let state = self.connection_state();
            info!("client - connect - rejected in state {}", state);
            return Err(MqttError::new_invalid_state(format!("connect is not allowed while {}", state)));
        }

        self.events.emit(ClientEvent::Connecting(ConnectingEvent{}));
        self.packet_ids.reset();
        self.dispatcher.clear();

        let options = Arc::new(options);
        let timeout = options.communication_timeout;
        let version = options.protocol_version;

        let connect = MqttPacket::Connect(options.connect_options.to_connect_packet(version));
        if let Err(error) = validate_packet_outbound(&connect, version) {
            return Err(self.abandon_connect(error));
        }

        let transport = match tokio::time::timeout(timeout, options.channel.open()).await {
            Ok(Ok(transport)) => { transport }
            Ok(Err(error)) => {
                info!("client - connect - transport connection failed: {}", error);
                return Err(self.abandon_connect(error));
            }
            Err(_) => {
                info!("client - connect - transport connection timed out");
                return Err(self.abandon_connect(MqttError::new_communication_timed_out("transport connection")));
            }
        };

        info!("client - connect - transport connection established");
        let (reader, writer) = split(transport);
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(ConnectionContext::new(connection_id, options.clone(), writer));
        *lock(&self.connection) = Some(connection.clone());

        let (ready_sender, ready_receiver) = oneshot::channel();
        let alias_maximum = if version.is_mqtt5() { options.connect_options.topic_alias_maximum.unwrap_or(0) } else { 0 };
        let inbound_maximum = if version.is_mqtt5() { options.connect_options.maximum_packet_size_bytes } else { None };
        let packet_reader = PacketReader::new(reader, version).with_maximum_packet_size(inbound_maximum);
        let receive_task = self.runtime.spawn(receive_loop(self.clone(), connection.clone(), packet_reader, InboundAliasResolver::new(alias_maximum), ready_sender));
        connection.attach_task(TaskRole::Receive, receive_task);

        let handshake_result = match ready_receiver.await {
            Ok(()) => { self.complete_handshake(&connection, connect, timeout).await }
            Err(_) => { Err(MqttError::new_internal_state_error("receive task exited before signalling ready")) }
        };

        match handshake_result {
            Ok(connack) => { Ok(connack) }
            Err(error) => {
                self.clone().teardown(connection, error.clone(), None).await;
                Err(error)
            }
        }
    }

    async fn complete_handshake(self: &Arc<Self>, connection: &Arc<ConnectionContext>, connect: MqttPacket, timeout: Duration) -> ConnectResult {
        let awaiter = self.dispatcher.register(CorrelationKey::new(0, PacketType::Connack))?;
        connection.send(&connect).await?;

        let connack = match awaiter.wait(timeout).await? {
            MqttPacket::Connack(connack) => { connack }
            _ => { return Err(MqttError::new_internal_state_error("non-connack packet resolved the connack waiter")); }
        };

        if !connack.reason_code.is_success() {
            info!("client - connect - connection refused with reason code {:?}", connack.reason_code);
            return Err(MqttError::new_connection_refused(connack));
        }

        if !connack.session_present {
            lock(&self.qos2_received).clear();
        }

        let keep_alive_seconds = match connack.server_keep_alive {
            Some(server_keep_alive) if server_keep_alive > 0 => { server_keep_alive }
            _ => { connection.options.connect_options.keep_alive_interval_seconds }
        };

        if keep_alive_seconds > 0 {
            let interval = connection.options.keep_alive_send_interval
                .filter(|interval| !interval.is_zero())
                .unwrap_or(Duration::from_millis(keep_alive_seconds as u64 * 750));

            debug!("client - connect - keep alive of {} seconds, pinging after {:?} of idle time", keep_alive_seconds, interval);
            let keep_alive_task = self.runtime.spawn(keep_alive_loop(self.clone(), connection.clone(), interval));
            connection.attach_task(TaskRole::KeepAlive, keep_alive_task);
        }

        if !self.transition_state(ConnectionState::Connecting, ConnectionState::Connected) {
            return Err(MqttError::new_connection_closed("connection closed before the handshake completed"));
        }

        info!("client - connect - connection {} established", connection.id);
        self.events.emit(ClientEvent::Connected(ConnectedEvent { connack: connack.clone() }));

        Ok(connack)
    }

    fn abandon_connect(&self, error: MqttError) -> MqttError {
        self.state.store(ConnectionState::Disconnected as u8, Ordering::Release);
        self.events.emit(ClientEvent::Disconnected(DisconnectedEvent {
            was_connected: false,
            error: error.clone(),
            disconnect: None,
        }));

        error
    }

    pub(crate) async fn disconnect(self: &Arc<Self>, options: DisconnectOptions) -> MqttResult<()> {
        let Some(connection) = self.current_connection() else {
            debug!("client - disconnect - no connection to close");
            return Ok(());
        };

        let disconnect = options.disconnect.unwrap_or_default();
        validate_disconnect_packet_outbound(&disconnect, connection.version)?;

        if !connection.claim_teardown() {
            debug!("client - disconnect - teardown already in progress");
            connection.wait_for_teardown().await;
            return Ok(());
        }

        if self.connection_state() == ConnectionState::Connected {
            let timeout = options.timeout.unwrap_or(connection.options.communication_timeout);
            match tokio::time::timeout(timeout, connection.send(&MqttPacket::Disconnect(disconnect))).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => { info!("client - disconnect - failed to send DISCONNECT: {}", error); }
                Err(_) => { info!("client - disconnect - timed out sending DISCONNECT"); }
            }
        }

        self.finish_teardown(connection, MqttError::new_user_initiated_disconnect(), None).await;

        Ok(())
    }

    /// Closes a connection exactly once.  Later callers wait until the first one is done.
    pub(crate) async fn teardown(self: Arc<Self>, connection: Arc<ConnectionContext>, error: MqttError, caller: Option<TaskRole>) {
        if !connection.claim_teardown() {
            connection.wait_for_teardown().await;
            return;
        }

        self.finish_teardown(connection, error, caller).await;
    }

    async fn finish_teardown(&self, connection: Arc<ConnectionContext>, error: MqttError, caller: Option<TaskRole>) {
        let was_connected = self.swap_state(ConnectionState::Disconnecting) == ConnectionState::Connected;
        info!("client - connection {} closing: {}", connection.id, error);

        let mut aborted = Vec::new();
        for (role, handle) in connection.close_tasks() {
            if Some(role) == caller {
                continue;
            }

            handle.abort();
            aborted.push(handle);
        }

        self.dispatcher.fail_all(error.clone());

        let timeout = connection.options.communication_timeout;
        let shutdown = async {
            let mut writer = connection.writer.lock().await;
            writer.stream.shutdown().await
        };

        match tokio::time::timeout(timeout, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(shutdown_error)) => { debug!("client - connection {} - stream shutdown failed: {}", connection.id, shutdown_error); }
            Err(_) => { warn!("client - connection {} - stream shutdown timed out", connection.id); }
        }

        if tokio::time::timeout(timeout, futures::future::join_all(aborted)).await.is_err() {
            warn!("client - connection {} - background tasks did not stop in time", connection.id);
        }

        self.clear_connection(connection.id);
        self.state.store(ConnectionState::Disconnected as u8, Ordering::Release);
        connection.teardown_complete.send_replace(true);
        info!("client - connection {} closed", connection.id);

        let disconnect = match &error {
            MqttError::ServerSideDisconnect(context) => { Some(context.disconnect().clone()) }
            _ => { None }
        };

        self.events.emit(ClientEvent::Disconnected(DisconnectedEvent {
            was_connected,
            error,
            disconnect,
        }));
    }

    /// Sends an operation's packet.  A transport failure closes the connection in the background.
    async fn send_or_teardown(self: &Arc<Self>, connection: &Arc<ConnectionContext>, packet: &MqttPacket) -> MqttResult<()> {
        let result = connection.send(packet).await;
        if let Err(error @ MqttError::TransportError(_)) = &result {
            self.runtime.spawn(self.clone().teardown(connection.clone(), error.clone(), None));
        }

        result
    }

    pub(crate) async fn publish(self: &Arc<Self>, message: ApplicationMessage, options: PublishOptions) -> PublishResult {
        let connection = self.established_connection()?;
        let timeout = options.timeout.unwrap_or(connection.options.communication_timeout);
        let qos = message.qos;

        if qos == QualityOfService::AtMostOnce {
            let publish = MqttPacket::Publish(PublishPacket { packet_id: 0, duplicate: false, message });
            self.send_or_teardown(&connection, &publish).await?;
            return Ok(PublishResponse::Qos0);
        }

        let packet_id = self.packet_ids.next();
        let first_response_type = if qos == QualityOfService::AtLeastOnce { PacketType::Puback } else { PacketType::Pubrec };
        let awaiter = self.dispatcher.register(CorrelationKey::new(packet_id, first_response_type))?;

        let publish = MqttPacket::Publish(PublishPacket { packet_id, duplicate: false, message });
        self.send_or_teardown(&connection, &publish).await?;

        let pubrec = match awaiter.wait(timeout).await? {
            MqttPacket::Puback(puback) => { return Ok(PublishResponse::Qos1(puback)); }
            MqttPacket::Pubrec(pubrec) => { pubrec }
            _ => { return Err(MqttError::new_internal_state_error("unexpected packet resolved a publish waiter")); }
        };

        if !pubrec.reason_code.is_success() {
            debug!("client - publish - qos2 publish {} ended by failing PUBREC", packet_id);
            return Ok(PublishResponse::Qos2(Qos2Response { pubrec, pubcomp: None }));
        }

        let awaiter = self.dispatcher.register(CorrelationKey::new(packet_id, PacketType::Pubcomp))?;
        let pubrel = MqttPacket::Pubrel(PubrelPacket { packet_id, ..Default::default() });
        self.send_or_teardown(&connection, &pubrel).await?;

        match awaiter.wait(timeout).await? {
            MqttPacket::Pubcomp(pubcomp) => { Ok(PublishResponse::Qos2(Qos2Response { pubrec, pubcomp: Some(pubcomp) })) }
            _ => { Err(MqttError::new_internal_state_error("unexpected packet resolved a pubcomp waiter")) }
        }
    }

    pub(crate) async fn subscribe(self: &Arc<Self>, subscriptions: Vec<Subscription>, options: SubscribeOptions) -> SubscribeResult {
        let connection = self.established_connection()?;
        let timeout = options.timeout.unwrap_or(connection.options.communication_timeout);
        let requested = subscriptions.len();

        let packet_id = self.packet_ids.next();
        let awaiter = self.dispatcher.register(CorrelationKey::new(packet_id, PacketType::Suback))?;
        let subscribe = MqttPacket::Subscribe(SubscribePacket {
            packet_id,
            subscriptions,
            subscription_identifier: options.subscription_identifier,
            user_properties: options.user_properties,
        });
        self.send_or_teardown(&connection, &subscribe).await?;

        let suback = match awaiter.wait(timeout).await? {
            MqttPacket::Suback(suback) => { suback }
            _ => { return Err(MqttError::new_internal_state_error("unexpected packet resolved a suback waiter")); }
        };

        if suback.reason_codes.len() != requested {
            error!("client - subscribe - SUBACK carries {} reason codes for {} subscriptions", suback.reason_codes.len(), requested);
            let error = MqttError::new_protocol_violation("SUBACK reason code count does not match SUBSCRIBE");
            self.runtime.spawn(self.clone().teardown(connection, error.clone(), None));
            return Err(error);
        }

        Ok(suback)
    }

    pub(crate) async fn unsubscribe(self: &Arc<Self>, topic_filters: Vec<String>, options: UnsubscribeOptions) -> UnsubscribeResult {
        let connection = self.established_connection()?;
        let timeout = options.timeout.unwrap_or(connection.options.communication_timeout);
        let requested = topic_filters.len();

        let packet_id = self.packet_ids.next();
        let awaiter = self.dispatcher.register(CorrelationKey::new(packet_id, PacketType::Unsuback))?;
        let unsubscribe = MqttPacket::Unsubscribe(UnsubscribePacket {
            packet_id,
            topic_filters,
            user_properties: options.user_properties,
        });
        self.send_or_teardown(&connection, &unsubscribe).await?;

        let unsuback = match awaiter.wait(timeout).await? {
            MqttPacket::Unsuback(unsuback) => { unsuback }
            _ => { return Err(MqttError::new_internal_state_error("unexpected packet resolved an unsuback waiter")); }
        };

        if connection.version.is_mqtt5() && unsuback.reason_codes.len() != requested {
            error!("client - unsubscribe - UNSUBACK carries {} reason codes for {} topic filters", unsuback.reason_codes.len(), requested);
            let error = MqttError::new_protocol_violation("UNSUBACK reason code count does not match UNSUBSCRIBE");
            self.runtime.spawn(self.clone().teardown(connection, error.clone(), None));
            return Err(error);
        }

        Ok(unsuback)
    }

    pub(crate) async fn ping(self: &Arc<Self>, options: PingOptions) -> MqttResult<()> {
        let connection = self.established_connection()?;
        let timeout = options.timeout.unwrap_or(connection.options.communication_timeout);

        let result = self.ping_on(&connection, timeout).await;
        if let Err(error @ MqttError::TransportError(_)) = &result {
            self.runtime.spawn(self.clone().teardown(connection, error.clone(), None));
        }

        result
    }

    /// Pings are serialized per connection so that only one waiter ever holds the PINGRESP key.
    async fn ping_on(&self, connection: &ConnectionContext, timeout: Duration) -> MqttResult<()> {
        let _ping_guard = connection.ping_lock.lock().await;

        let awaiter = self.dispatcher.register(CorrelationKey::new(0, PacketType::Pingresp))?;
        connection.send(&MqttPacket::Pingreq(PingreqPacket {})).await?;
        awaiter.wait(timeout).await?;

        Ok(())
    }

    pub(crate) async fn acknowledge(self: &Arc<Self>, acknowledgement: PendingAcknowledgement) -> MqttResult<()> {
        let connection = self.established_connection()?;
        if connection.id != acknowledgement.connection_id {
            info!("client - acknowledge - packet id {} belongs to a closed connection", acknowledgement.packet_id);
            return Err(MqttError::new_invalid_state("acknowledgement belongs to a previous connection"));
        }

        let packet = match acknowledgement.qos {
            QualityOfService::AtMostOnce => { return Ok(()); }
            QualityOfService::AtLeastOnce => {
                MqttPacket::Puback(PubackPacket { packet_id: acknowledgement.packet_id, ..Default::default() })
            }
            QualityOfService::ExactlyOnce => {
                MqttPacket::Pubrec(PubrecPacket { packet_id: acknowledgement.packet_id, ..Default::default() })
            }
        };

        self.send_or_teardown(&connection, &packet).await
    }

    pub(crate) async fn send_extended_authentication_data(self: &Arc<Self>, auth: AuthPacket) -> MqttResult<()> {
        let Some(connection) = self.current_connection() else {
            return Err(not_connected_error(self.connection_state()));
        };

        if !connection.version.is_mqtt5() {
            return Err(MqttError::new_invalid_state(format!("extended authentication is not supported by MQTT {}", connection.version)));
        }

        self.send_or_teardown(&connection, &MqttPacket::Auth(auth)).await
    }

    async fn handle_inbound_packet(&self, connection: &ConnectionContext, aliases: &mut InboundAliasResolver, packet: MqttPacket) -> LoopOutcome {
        match packet {
            MqttPacket::Publish(publish) => {
                self.handle_inbound_publish(connection, aliases, publish).await
            }
            MqttPacket::Pubrel(pubrel) => {
                let reason_code =
                    if lock(&self.qos2_received).remove(&pubrel.packet_id) {
                        PubcompReasonCode::Success
                    } else {
                        warn!("client - receive - PUBREL for untracked packet id {}", pubrel.packet_id);
                        PubcompReasonCode::PacketIdentifierNotFound
                    };

                let pubcomp = PubcompPacket { packet_id: pubrel.packet_id, reason_code, ..Default::default() };
                reply_outcome(connection.send(&MqttPacket::Pubcomp(pubcomp)).await)
            }
            MqttPacket::Pingreq(_) => {
                reply_outcome(connection.send(&MqttPacket::Pingresp(PingrespPacket {})).await)
            }
            MqttPacket::Pubrec(pubrec) => {
                let packet_id = pubrec.packet_id;
                match self.dispatcher.resolve(MqttPacket::Pubrec(pubrec)) {
                    Ok(()) => { LoopOutcome::Continue }
                    Err(_) => {
                        warn!("client - receive - PUBREC for unknown packet id {}; releasing it", packet_id);
                        let pubrel = PubrelPacket { packet_id, reason_code: PubrelReasonCode::PacketIdentifierNotFound, ..Default::default() };
                        reply_outcome(connection.send(&MqttPacket::Pubrel(pubrel)).await)
                    }
                }
            }
            MqttPacket::Disconnect(disconnect) => {
                info!("client - receive - server sent DISCONNECT with reason code {:?}", disconnect.reason_code);
                LoopOutcome::Fault(MqttError::new_server_side_disconnect(disconnect))
            }
            MqttPacket::Auth(auth) => {
                self.handle_inbound_auth(connection, auth).await
            }
            MqttPacket::Connect(_) | MqttPacket::Subscribe(_) | MqttPacket::Unsubscribe(_) => {
                error!("client - receive - server sent a client-only packet");
                LoopOutcome::Fault(MqttError::new_protocol_violation("server sent a packet only clients may send"))
            }
            MqttPacket::Connack(_) | MqttPacket::Puback(_) | MqttPacket::Pubcomp(_) | MqttPacket::Suback(_) |
            MqttPacket::Unsuback(_) | MqttPacket::Pingresp(_) => {
                if let Err(error) = self.dispatcher.resolve(packet) {
                    warn!("client - receive - dropping response: {}", error);
                }

                LoopOutcome::Continue
            }
        }
    }

    async fn handle_inbound_publish(&self, connection: &ConnectionContext, aliases: &mut InboundAliasResolver, mut publish: PublishPacket) -> LoopOutcome {
        if connection.version.is_mqtt5() {
            if let Err(error) = aliases.resolve(&mut publish.message) {
                return LoopOutcome::Fault(error);
            }
        }

        let packet_id = publish.packet_id;
        let qos = publish.message.qos;

        if qos == QualityOfService::ExactlyOnce && !lock(&self.qos2_received).insert(packet_id) {
            debug!("client - receive - qos2 packet id {} already received; acknowledging without redelivery", packet_id);
            let pubrec = PubrecPacket { packet_id, ..Default::default() };
            return reply_outcome(connection.send(&MqttPacket::Pubrec(pubrec)).await);
        }

        let received = ReceivedMessage {
            message: publish.message,
            packet_id,
            duplicate: publish.duplicate,
            connection_id: connection.id,
        };

        let disposition = self.deliver(&received);

        match (qos, disposition) {
            (QualityOfService::AtMostOnce, _) | (_, MessageDisposition::Defer) => { LoopOutcome::Continue }
            (QualityOfService::AtLeastOnce, MessageDisposition::Reject) => { LoopOutcome::Continue }
            (QualityOfService::ExactlyOnce, MessageDisposition::Reject) => {
                lock(&self.qos2_received).remove(&packet_id);
                LoopOutcome::Continue
            }
            (QualityOfService::AtLeastOnce, MessageDisposition::Accept) => {
                let puback = PubackPacket { packet_id, ..Default::default() };
                reply_outcome(connection.send(&MqttPacket::Puback(puback)).await)
            }
            (QualityOfService::ExactlyOnce, MessageDisposition::Accept) => {
                let pubrec = PubrecPacket { packet_id, ..Default::default() };
                reply_outcome(connection.send(&MqttPacket::Pubrec(pubrec)).await)
            }
        }
    }

    /// Runs every handler in registration order and combines their answers: any Reject wins,
    /// then any Defer, otherwise Accept.
    fn deliver(&self, received: &ReceivedMessage) -> MessageDisposition {
        let handlers : Vec<MessageHandler> = lock(&self.handlers).iter().map(|(_, handler)| handler.clone()).collect();

        let mut combined = MessageDisposition::Accept;
        for handler in handlers {
            let disposition = match catch_unwind(AssertUnwindSafe(|| (handler)(received))) {
                Ok(disposition) => { disposition }
                Err(_) => {
                    warn!("client - receive - message handler panicked on packet id {}", received.packet_id);
                    MessageDisposition::Reject
                }
            };

            combined = match (combined, disposition) {
                (MessageDisposition::Reject, _) | (_, MessageDisposition::Reject) => { MessageDisposition::Reject }
                (MessageDisposition::Defer, _) | (_, MessageDisposition::Defer) => { MessageDisposition::Defer }
                _ => { MessageDisposition::Accept }
            };
        }

        combined
    }

    async fn handle_inbound_auth(&self, connection: &ConnectionContext, auth: AuthPacket) -> LoopOutcome {
        let Some(handler) = connection.options.extended_authentication_handler.clone() else {
            warn!("client - receive - AUTH received without an extended authentication handler");
            return LoopOutcome::Continue;
        };

        match catch_unwind(AssertUnwindSafe(|| (handler)(&auth))) {
            Ok(Some(response)) => { reply_outcome(connection.send(&MqttPacket::Auth(response)).await) }
            Ok(None) => { LoopOutcome::Continue }
            Err(_) => {
                warn!("client - receive - extended authentication handler panicked");
                LoopOutcome::Continue
            }
        }
    }
}

fn reply_outcome(result: MqttResult<()>) -> LoopOutcome {
    match result {
        Ok(()) => { LoopOutcome::Continue }
        Err(error) => { LoopOutcome::Fault(error) }
    }
}

async fn receive_loop(core: Arc<ClientCore>, connection: Arc<ConnectionContext>, mut reader: PacketReader<ReadHalf<Box<dyn AsyncTransport>>>, mut aliases: InboundAliasResolver, ready: oneshot::Sender<()>) {
    let _ = ready.send(());

    loop {
        let outcome = match reader.read_packet().await {
            Ok(Some(packet)) => { core.handle_inbound_packet(&connection, &mut aliases, packet).await }
            Ok(None) => { LoopOutcome::Stop }
            Err(error) => { LoopOutcome::Fault(error) }
        };

        match outcome {
            LoopOutcome::Continue => {}
            LoopOutcome::Stop => {
                info!("client - receive - connection {} closed by peer", connection.id);
                core.teardown(connection, MqttError::new_connection_closed("network stream closed"), Some(TaskRole::Receive)).await;
                return;
            }
            LoopOutcome::Fault(error) => {
                info!("client - receive - connection {} failed: {}", connection.id, error);
                core.dispatcher.fail_all(error.clone());
                core.teardown(connection, error, Some(TaskRole::Receive)).await;
                return;
            }
        }
    }
}

async fn keep_alive_loop(core: Arc<ClientCore>, connection: Arc<ConnectionContext>, interval: Duration) {
    loop {
        let idle = connection.time_since_last_send();
        if idle < interval {
            sleep(interval - idle).await;
            continue;
        }

        debug!("client - keep alive - connection {} idle for {:?}, pinging", connection.id, idle);
        if let Err(error) = core.ping_on(&connection, connection.options.communication_timeout).await {
            info!("client - keep alive - ping failed on connection {}: {}", connection.id, error);
            core.teardown(connection, error, Some(TaskRole::KeepAlive)).await;
            return;
        }
    }
}
