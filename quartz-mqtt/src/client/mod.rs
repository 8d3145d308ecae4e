/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing the public MQTT client and associated types necessary to invoke operations on it.
 */

mod connection;
pub(crate) mod dispatcher;
mod events;
pub(crate) mod packet_id;

pub use events::*;

use crate::config::*;
use crate::error::{MqttError, MqttResult};
use crate::mqtt::*;

use connection::ClientCore;
use log::*;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Additional client options applicable to an MQTT Publish operation
#[derive(Debug, Default, Clone)]
pub struct PublishOptions {
    pub(crate) timeout: Option<Duration>,
}

impl PublishOptions {

    /// Creates a new builder for PublishOptions
    pub fn builder() -> PublishOptionsBuilder {
        PublishOptionsBuilder::new()
    }
}

/// Builder type for the set of additional client options applicable to an MQTT Publish operation
#[derive(Default)]
pub struct PublishOptionsBuilder {
    options: PublishOptions
}

impl PublishOptionsBuilder {

    /// Creates a new PublishOptionsBuilder with default values
    pub fn new() -> Self {
        PublishOptionsBuilder {
            ..Default::default()
        }
    }

    /// Sets how long each step of the acknowledgement exchange may take.  Has no effect on QoS0
    /// publishes.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Creates a new PublishOptions object from what was configured on the builder.
    pub fn build(self) -> PublishOptions {
        self.options
    }
}

/// Outcome of a QoS2 publish whose first acknowledgement arrived.
#[derive(Debug, Eq, PartialEq)]
pub struct Qos2Response {

    /// The PUBREC the server answered the publish with
    pub pubrec: PubrecPacket,

    /// The PUBCOMP that completed the exchange.  `None` when the PUBREC carried a failing
    /// reason code, which ends the exchange early.
    pub pubcomp: Option<PubcompPacket>,
}

impl Display for Qos2Response {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match &self.pubcomp {
            Some(pubcomp) => { write!(f, "Qos2Response ( {}, {} )", self.pubrec, pubcomp) }
            None => { write!(f, "Qos2Response ( {}, None )", self.pubrec) }
        }
    }
}

/// Union type that encapsulates the non-error ways that a Publish operation can complete with.
#[derive(Debug, Eq, PartialEq)]
pub enum PublishResponse {

    /// Indicates that a QoS0 Publish operation was successfully written to the wire.  This does
    /// not mean the Publish actually reached the server.
    Qos0,

    /// Indicates that a QoS1 Publish operation was completed via Puback receipt.  Check the reason
    /// code in the Puback for protocol-level success/failure.
    Qos1(PubackPacket),

    /// Indicates that a QoS2 Publish operation was completed via Ack packet receipt.  Check the
    /// reason codes in the packets for protocol-level success/failure.
    Qos2(Qos2Response),
}

impl Display for PublishResponse {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PublishResponse::Qos0 => {
                write!(f, "PublishResponse Qos0")
            }
            PublishResponse::Qos1(puback) => {
                write!(f, "PublishResponse Qos1 ( {} )", puback)
            }
            PublishResponse::Qos2(qos2response) => {
                write!(f, "PublishResponse Qos2 ( {} )", qos2response)
            }
        }
    }
}

/// Result type for the final outcome of a Publish operation
pub type PublishResult = MqttResult<PublishResponse>;

/// Additional client options applicable to an MQTT Subscribe operation
#[derive(Debug, Default, Clone)]
pub struct SubscribeOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) subscription_identifier: Option<u32>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

impl SubscribeOptions {

    /// Creates a new builder for SubscribeOptions
    pub fn builder() -> SubscribeOptionsBuilder {
        SubscribeOptionsBuilder::new()
    }
}

/// Builder type for the set of additional client options applicable to an MQTT Subscribe operation
#[derive(Default)]
pub struct SubscribeOptionsBuilder {
    options: SubscribeOptions
}

impl SubscribeOptionsBuilder {

    /// Creates a new SubscribeOptionsBuilder with default values
    pub fn new() -> Self {
        SubscribeOptionsBuilder {
            ..Default::default()
        }
    }

    /// Sets the time allowed for the SUBACK to arrive
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets an MQTT5 subscription identifier that the server attaches to every publish matched
    /// by these subscriptions
    pub fn with_subscription_identifier(mut self, subscription_identifier: u32) -> Self {
        self.options.subscription_identifier = Some(subscription_identifier);
        self
    }

    /// Sets MQTT5 user properties to include with the SUBSCRIBE packet
    pub fn with_user_properties(mut self, user_properties: Vec<UserProperty>) -> Self {
        self.options.user_properties = Some(user_properties);
        self
    }

    /// Creates a new SubscribeOptions object from what was configured on the builder.
    pub fn build(self) -> SubscribeOptions {
        self.options
    }
}

/// Result type for the final outcome of a Subscribe operation
pub type SubscribeResult = MqttResult<SubackPacket>;

/// Additional client options applicable to an MQTT Unsubscribe operation
#[derive(Debug, Default, Clone)]
pub struct UnsubscribeOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

impl UnsubscribeOptions {

    /// Creates a new builder for UnsubscribeOptions
    pub fn builder() -> UnsubscribeOptionsBuilder {
        UnsubscribeOptionsBuilder::new()
    }
}

/// Builder type for the set of additional client options applicable to an MQTT Unsubscribe operation
#[derive(Default)]
pub struct UnsubscribeOptionsBuilder {
    options: UnsubscribeOptions
}

impl UnsubscribeOptionsBuilder {

    /// Creates a new UnsubscribeOptionsBuilder with default values
    pub fn new() -> Self {
        UnsubscribeOptionsBuilder {
            ..Default::default()
        }
    }

    /// Sets the time allowed for the UNSUBACK to arrive
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets MQTT5 user properties to include with the UNSUBSCRIBE packet
    pub fn with_user_properties(mut self, user_properties: Vec<UserProperty>) -> Self {
        self.options.user_properties = Some(user_properties);
        self
    }

    /// Creates a new UnsubscribeOptions object from what was configured on the builder.
    pub fn build(self) -> UnsubscribeOptions {
        self.options
    }
}

/// Result type for the final outcome of an Unsubscribe operation
pub type UnsubscribeResult = MqttResult<UnsubackPacket>;

/// Additional client options applicable to a ping
#[derive(Debug, Default, Clone)]
pub struct PingOptions {
    pub(crate) timeout: Option<Duration>,
}

impl PingOptions {

    /// Creates a ping options value with the given response timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        PingOptions {
            timeout: Some(timeout)
        }
    }
}

/// Additional client options applicable to a user-initiated disconnect
#[derive(Debug, Default, Clone)]
pub struct DisconnectOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) disconnect: Option<DisconnectPacket>,
}

impl DisconnectOptions {

    /// Creates a new builder for DisconnectOptions
    pub fn builder() -> DisconnectOptionsBuilder {
        DisconnectOptionsBuilder::new()
    }
}

/// Builder type for user-initiated disconnect options
#[derive(Default)]
pub struct DisconnectOptionsBuilder {
    options: DisconnectOptions
}

impl DisconnectOptionsBuilder {

    /// Creates a new DisconnectOptionsBuilder with default values
    pub fn new() -> Self {
        DisconnectOptionsBuilder {
            ..Default::default()
        }
    }

    /// Bounds how long the client waits to write the DISCONNECT packet
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets the DISCONNECT packet to send.  A normal-disconnection packet is sent otherwise.
    pub fn with_disconnect_packet(mut self, disconnect: DisconnectPacket) -> Self {
        self.options.disconnect = Some(disconnect);
        self
    }

    /// Creates a new DisconnectOptions object from what was configured on the builder.
    pub fn build(self) -> DisconnectOptions {
        self.options
    }
}

/// Result type for a connection attempt
pub type ConnectResult = MqttResult<ConnackPacket>;

/// Lifecycle state of the client's connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ConnectionState {

    /// No connection exists or is being established
    Disconnected = 0,

    /// A connection attempt is in progress
    Connecting = 1,

    /// The CONNECT/CONNACK handshake completed and operations may be submitted
    Connected = 2,

    /// A connection is being torn down
    Disconnecting = 3,
}

impl ConnectionState {
    pub(crate) fn from_u8(value: u8) -> ConnectionState {
        match value {
            1 => { ConnectionState::Connecting }
            2 => { ConnectionState::Connected }
            3 => { ConnectionState::Disconnecting }
            _ => { ConnectionState::Disconnected }
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => { write!(f, "Disconnected") }
            ConnectionState::Connecting => { write!(f, "Connecting") }
            ConnectionState::Connected => { write!(f, "Connected") }
            ConnectionState::Disconnecting => { write!(f, "Disconnecting") }
        }
    }
}

/// Token that completes a deferred acknowledgement through [`MqttClient::acknowledge`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PendingAcknowledgement {
    pub(crate) packet_id: u16,
    pub(crate) qos: QualityOfService,
    pub(crate) connection_id: u64,
}

/// An application message delivered by the server.
#[derive(Debug)]
pub struct ReceivedMessage {
    pub(crate) message: ApplicationMessage,
    pub(crate) packet_id: u16,
    pub(crate) duplicate: bool,
    pub(crate) connection_id: u64,
}

impl ReceivedMessage {

    /// Returns the delivered message, with any topic alias already resolved
    pub fn message(&self) -> &ApplicationMessage { &self.message }

    /// Returns the packet id the message was delivered with; zero for QoS0
    pub fn packet_id(&self) -> u16 { self.packet_id }

    /// Returns whether the server flagged this delivery as a retry
    pub fn duplicate(&self) -> bool { self.duplicate }

    /// Returns the token needed to acknowledge this message later, if a handler answers with
    /// [`MessageDisposition::Defer`].  QoS0 messages are never acknowledged.
    pub fn pending_acknowledgement(&self) -> Option<PendingAcknowledgement> {
        if self.message.qos == QualityOfService::AtMostOnce {
            return None;
        }

        Some(PendingAcknowledgement {
            packet_id: self.packet_id,
            qos: self.message.qos,
            connection_id: self.connection_id,
        })
    }
}

impl Display for ReceivedMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReceivedMessage {{ packet_id:{} duplicate:{}{} }}", self.packet_id, self.duplicate, self.message)
    }
}

/// What a message handler wants done with the acknowledgement of a received message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageDisposition {

    /// Acknowledge immediately
    Accept,

    /// Never acknowledge; the server will redeliver on a later session
    Reject,

    /// The application acknowledges later through [`MqttClient::acknowledge`]
    Defer,
}

/// Callback that receives every inbound application message
pub type MessageHandler = Arc<dyn Fn(&ReceivedMessage) -> MessageDisposition + Send + Sync>;

/// Opaque identity of a registered message handler
#[derive(Debug, Eq, PartialEq)]
pub struct MessageHandlerHandle {
    pub(crate) id: u64
}

/// A network client that speaks MQTT 3.1, 3.1.1 or 5 over a single connection at a time.
///
/// The client never reconnects on its own.  Every operation is an `async` function that
/// completes with the server's response or an error; operations may be invoked concurrently
/// from any number of tasks by sharing the client behind an `Arc`.
///
/// Background work (the receive loop, keep alive and event delivery) runs on the tokio runtime
/// the client was created with.
pub struct MqttClient {
    core: Arc<ClientCore>
}

impl MqttClient {

    /// Creates a new, disconnected client whose background tasks run on the given runtime
    pub fn new(runtime: &Handle) -> Self {
        MqttClient {
            core: Arc::new(ClientCore::new(runtime))
        }
    }

    /// Opens a transport through the configured channel and performs the CONNECT/CONNACK
    /// handshake.  Fails with `InvalidState` unless the client is disconnected.
    pub async fn connect(&self, options: MqttClientOptions) -> ConnectResult {
        info!("client - connect invoked");
        self.core.connect(options).await
    }

    /// Sends a DISCONNECT (if the connection completed its handshake) and closes the connection.
    /// Does nothing when there is no connection.
    pub async fn disconnect(&self, options: DisconnectOptions) -> MqttResult<()> {
        info!("client - disconnect invoked");
        self.core.disconnect(options).await
    }

    /// Publishes a message and waits for the acknowledgement exchange its QoS requires.
    pub async fn publish(&self, message: ApplicationMessage, options: PublishOptions) -> PublishResult {
        debug!("client - publish invoked");
        self.core.publish(message, options).await
    }

    /// Subscribes to one or more topic filters.  The SUBACK carries one reason code per filter.
    pub async fn subscribe(&self, subscriptions: Vec<Subscription>, options: SubscribeOptions) -> SubscribeResult {
        debug!("client - subscribe invoked");
        self.core.subscribe(subscriptions, options).await
    }

    /// Removes one or more subscriptions.
    pub async fn unsubscribe(&self, topic_filters: Vec<String>, options: UnsubscribeOptions) -> UnsubscribeResult {
        debug!("client - unsubscribe invoked");
        self.core.unsubscribe(topic_filters, options).await
    }

    /// Sends a PINGREQ and waits for the PINGRESP.
    pub async fn ping(&self, options: PingOptions) -> MqttResult<()> {
        debug!("client - ping invoked");
        self.core.ping(options).await
    }

    /// Sends the acknowledgement of a message whose handlers deferred it.  Fails if the message
    /// arrived on a connection that no longer exists.
    pub async fn acknowledge(&self, acknowledgement: PendingAcknowledgement) -> MqttResult<()> {
        debug!("client - acknowledge invoked for packet id {}", acknowledgement.packet_id);
        self.core.acknowledge(acknowledgement).await
    }

    /// Sends an AUTH packet to continue or restart an extended authentication exchange.  MQTT5
    /// only.
    pub async fn send_extended_authentication_data(&self, auth: AuthPacket) -> MqttResult<()> {
        debug!("client - send_extended_authentication_data invoked");
        self.core.send_extended_authentication_data(auth).await
    }

    /// Returns the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.core.connection_state()
    }

    /// Adds a listener that receives every client lifecycle event from now on
    pub fn add_event_listener(&self, listener: ClientEventListener) -> ListenerHandle {
        self.core.events.add_listener(listener)
    }

    /// Removes a previously added event listener
    pub fn remove_event_listener(&self, handle: ListenerHandle) {
        self.core.events.remove_listener(handle)
    }

    /// Adds a handler that sees every inbound application message.  Handlers run in
    /// registration order on the client's receive task and must not block.
    pub fn add_message_handler(&self, handler: MessageHandler) -> MessageHandlerHandle {
        self.core.add_message_handler(handler)
    }

    /// Removes a previously added message handler
    pub fn remove_message_handler(&self, handle: MessageHandlerHandle) {
        self.core.remove_message_handler(handle)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        self.core.abandon_connection();
    }
}

/// Fails if the operation needs a connection that does not exist
pub(crate) fn not_connected_error(state: ConnectionState) -> MqttError {
    debug!("client - operation rejected in state {}", state);
    MqttError::new_not_connected()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_acknowledgement_only_for_qos1_and_qos2() {
        let mut received = ReceivedMessage {
            message: ApplicationMessage::builder("a/b", QualityOfService::AtMostOnce).build(),
            packet_id: 0,
            duplicate: false,
            connection_id: 3,
        };

        assert_eq!(None, received.pending_acknowledgement());

        received.message = ApplicationMessage::builder("a/b", QualityOfService::ExactlyOnce).build();
        received.packet_id = 12;
        assert_eq!(Some(PendingAcknowledgement { packet_id: 12, qos: QualityOfService::ExactlyOnce, connection_id: 3 }), received.pending_acknowledgement());
    }

    #[test]
    fn connection_state_u8_conversion() {
        for state in [ConnectionState::Disconnected, ConnectionState::Connecting, ConnectionState::Connected, ConnectionState::Disconnecting] {
            assert_eq!(state, ConnectionState::from_u8(state as u8));
        }
    }
}
