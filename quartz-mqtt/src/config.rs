/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing types for configuring an MQTT client.
 */

use crate::client::ClientEvent;
use crate::error::{MqttError, MqttResult};
use crate::mqtt::*;

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;

pub(crate) const DEFAULT_KEEP_ALIVE_SECONDS : u16 = 60;
pub(crate) const DEFAULT_COMMUNICATION_TIMEOUT : Duration = Duration::from_secs(10);

/// Configuration options that determine the field values of the CONNECT packet the client sends
/// on each connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectOptions {

    pub(crate) keep_alive_interval_seconds: u16,

    pub(crate) clean_start: bool,

    pub(crate) client_id: String,

    pub(crate) username: Option<String>,

    pub(crate) password: Option<Vec<u8>>,

    pub(crate) session_expiry_interval_seconds: Option<u32>,

    pub(crate) request_response_information: Option<bool>,

    pub(crate) request_problem_information: Option<bool>,

    pub(crate) receive_maximum: Option<u16>,

    pub(crate) topic_alias_maximum: Option<u16>,

    pub(crate) maximum_packet_size_bytes: Option<u32>,

    pub(crate) authentication_method: Option<String>,

    pub(crate) authentication_data: Option<Vec<u8>>,

    pub(crate) will_delay_interval_seconds: Option<u32>,

    pub(crate) will: Option<ApplicationMessage>,

    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

impl ConnectOptions {

    /// Creates a new builder for ConnectOptions
    pub fn builder() -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::new()
    }

    pub(crate) fn to_connect_packet(&self, protocol_version: ProtocolVersion) -> ConnectPacket {
        ConnectPacket {
            protocol_version,
            keep_alive_interval_seconds: self.keep_alive_interval_seconds,
            clean_start: self.clean_start,
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            session_expiry_interval_seconds: self.session_expiry_interval_seconds,
            request_response_information: self.request_response_information,
            request_problem_information: self.request_problem_information,
            receive_maximum: self.receive_maximum,
            topic_alias_maximum: self.topic_alias_maximum,
            maximum_packet_size_bytes: self.maximum_packet_size_bytes,
            authentication_method: self.authentication_method.clone(),
            authentication_data: self.authentication_data.clone(),
            will_delay_interval_seconds: self.will_delay_interval_seconds,
            will: self.will.clone(),
            user_properties: self.user_properties.clone(),
        }
    }

    /// Returns the MQTT client id currently configured in these options
    pub fn client_id(&self) -> &str { self.client_id.as_str() }

    /// Returns the keep alive interval, in seconds, requested in the CONNECT packet
    pub fn keep_alive_interval_seconds(&self) -> u16 { self.keep_alive_interval_seconds }

    /// Returns whether the client asks the server to discard any existing session
    pub fn clean_start(&self) -> bool { self.clean_start }
}

impl Default for ConnectOptions {

    /// Creates a ConnectOptions object with default values: a clean session, an empty client
    /// id (server-assigned on 3.1.1 and 5) and a non-zero keep alive.
    fn default() -> Self {
        ConnectOptions {
            keep_alive_interval_seconds: DEFAULT_KEEP_ALIVE_SECONDS,
            clean_start: true,
            client_id: String::new(),
            username: None,
            password: None,
            session_expiry_interval_seconds: None,
            request_response_information: None,
            request_problem_information: None,
            receive_maximum: None,
            topic_alias_maximum: None,
            maximum_packet_size_bytes: None,
            authentication_method: None,
            authentication_data: None,
            will_delay_interval_seconds: None,
            will: None,
            user_properties: None,
        }
    }
}

/// A builder for connection-related options on the client.
#[derive(Debug, Default)]
pub struct ConnectOptionsBuilder {
    options: ConnectOptions
}

impl ConnectOptionsBuilder {

    /// Creates a new builder object for ConnectOptions
    pub fn new() -> Self {
        ConnectOptionsBuilder {
            ..Default::default()
        }
    }

    /// Sets the maximum time interval, in seconds, that is permitted to elapse between the point at which the client
    /// finishes transmitting one MQTT packet and the point it starts sending the next.  The client will use
    /// PINGREQ packets to maintain this property.
    ///
    /// If the responding MQTT5 CONNACK contains a non-zero server keep alive, that value is used instead.
    /// A final value of zero disables keep alive entirely.
    pub fn with_keep_alive_interval_seconds(&mut self, keep_alive: u16) -> &mut Self {
        self.options.keep_alive_interval_seconds = keep_alive;
        self
    }

    /// Sets whether the server should discard any existing session state (clean session on MQTT 3.x).
    pub fn with_clean_start(&mut self, clean_start: bool) -> &mut Self {
        self.options.clean_start = clean_start;
        self
    }

    /// Sets a unique string identifying the client to the server.
    ///
    /// MQTT 3.1 requires a client id between 1 and 23 characters.  MQTT 3.1.1 only accepts an
    /// empty client id together with a clean session.
    pub fn with_client_id(&mut self, client_id: &str) -> &mut Self {
        self.options.client_id = client_id.to_string();
        self
    }

    /// Sets a string value that the server may use for client authentication and authorization.
    pub fn with_username(&mut self, username: &str) -> &mut Self {
        self.options.username = Some(username.to_string());
        self
    }

    /// Sets opaque binary data that the server may use for client authentication and authorization.
    /// MQTT 3.x requires a username whenever a password is set.
    pub fn with_password(&mut self, password: &[u8]) -> &mut Self {
        self.options.password = Some(password.to_vec());
        self
    }

    /// Sets the time interval, in seconds, that the client requests the server to persist this connection's MQTT session state
    /// for.  MQTT5 only.
    pub fn with_session_expiry_interval_seconds(&mut self, session_expiry_interval_seconds: u32) -> &mut Self {
        self.options.session_expiry_interval_seconds = Some(session_expiry_interval_seconds);
        self
    }

    /// Sets whether or not the server should send response information in the subsequent CONNACK.  MQTT5 only.
    pub fn with_request_response_information(&mut self, request_response_information: bool) -> &mut Self {
        self.options.request_response_information = Some(request_response_information);
        self
    }

    /// Sets whether or not the server may send reason strings and user properties on packets other than
    /// PUBLISH, CONNACK and DISCONNECT.  MQTT5 only.
    pub fn with_request_problem_information(&mut self, request_problem_information: bool) -> &mut Self {
        self.options.request_problem_information = Some(request_problem_information);
        self
    }

    /// Sets the maximum number of in-flight QoS 1 and 2 messages the client is willing to handle.
    /// MQTT5 only; zero is not a legal value.
    pub fn with_receive_maximum(&mut self, receive_maximum: u16) -> &mut Self {
        self.options.receive_maximum = Some(receive_maximum);
        self
    }

    /// Sets the maximum topic alias value the client accepts on incoming publishes.  An inbound
    /// alias above this value is a protocol error.  If not set, the client accepts no inbound
    /// aliases.  MQTT5 only.
    pub fn with_topic_alias_maximum(&mut self, topic_alias_maximum: u16) -> &mut Self {
        self.options.topic_alias_maximum = Some(topic_alias_maximum);
        self
    }

    /// Sets the maximum packet size the client is willing to receive.  MQTT5 only.
    pub fn with_maximum_packet_size_bytes(&mut self, maximum_packet_size_bytes: u32) -> &mut Self {
        self.options.maximum_packet_size_bytes = Some(maximum_packet_size_bytes);
        self
    }

    /// Sets the extended authentication method name.  AUTH packets the server sends during or
    /// after the handshake are passed to the extended authentication handler configured on
    /// [`MqttClientOptions`].  MQTT5 only.
    pub fn with_authentication_method(&mut self, authentication_method: &str) -> &mut Self {
        self.options.authentication_method = Some(authentication_method.to_string());
        self
    }

    /// Sets the initial extended authentication data.  Requires an authentication method.  MQTT5 only.
    pub fn with_authentication_data(&mut self, authentication_data: &[u8]) -> &mut Self {
        self.options.authentication_data = Some(authentication_data.to_vec());
        self
    }

    /// Sets the time interval, in seconds, that the server should wait before publishing the will.  MQTT5 only.
    pub fn with_will_delay_interval_seconds(&mut self, will_delay_interval_seconds: u32) -> &mut Self {
        self.options.will_delay_interval_seconds = Some(will_delay_interval_seconds);
        self
    }

    /// Configures a message to be published by the server when the connection is lost without a
    /// DISCONNECT.
    pub fn with_will(&mut self, will: ApplicationMessage) -> &mut Self {
        self.options.will = Some(will);
        self
    }

    /// Sets the MQTT5 user properties to include with all CONNECT packets.
    pub fn with_user_properties(&mut self, user_properties: Vec<UserProperty>) -> &mut Self {
        self.options.user_properties = Some(user_properties);
        self
    }

    /// Builds a new ConnectOptions object
    pub fn build(&self) -> ConnectOptions {
        self.options.clone()
    }
}

/// A bidirectional byte stream the client can speak MQTT over.
pub trait AsyncTransport : AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncTransport for T where T : AsyncRead + AsyncWrite + Send + Unpin {}

/// Return type of a connection factory invocation
pub type ConnectionFactoryReturnType = Pin<Box<dyn Future<Output = MqttResult<Box<dyn AsyncTransport>>> + Send>>;

/// Produces a fresh transport for each connection attempt.  Failures should be reported as
/// `MqttError::TransportError`.
pub type ConnectionFactory = Arc<dyn Fn() -> ConnectionFactoryReturnType + Send + Sync>;

/// How the client reaches the server.
#[derive(Clone)]
#[non_exhaustive]
pub enum ChannelOptions {

    /// A plain TCP connection to the given host and port
    Tcp {

        /// host name or address of the server
        endpoint: String,

        /// port of the server
        port: u16
    },

    /// A user-supplied transport, for example a TLS stream or an in-memory pipe
    Custom(ConnectionFactory),
}

impl ChannelOptions {

    pub(crate) async fn open(&self) -> MqttResult<Box<dyn AsyncTransport>> {
        match self {
            ChannelOptions::Tcp { endpoint, port } => {
                let stream = TcpStream::connect((endpoint.as_str(), *port)).await.map_err(MqttError::new_transport_error)?;
                stream.set_nodelay(true)?;

                Ok(Box::new(stream))
            }
            ChannelOptions::Custom(factory) => {
                (factory)().await
            }
        }
    }
}

impl Debug for ChannelOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelOptions::Tcp { endpoint, port } => { write!(f, "Tcp {{ endpoint: {}, port: {} }}", endpoint, port) }
            ChannelOptions::Custom(_) => { write!(f, "Custom(...)") }
        }
    }
}

/// Callback invoked with every AUTH packet the server sends.  Returning a packet sends it back
/// to the server; returning `None` sends nothing.
pub type ExtendedAuthenticationHandler = Arc<dyn Fn(&AuthPacket) -> Option<AuthPacket> + Send + Sync>;

/// Callback function invoked with every emitted client event
pub type ClientEventCallback = dyn Fn(Arc<ClientEvent>) + Send + Sync;

/// Destination for client lifecycle events.  Events are delivered in emission order, to
/// listeners in registration order, from a task owned by the client.
#[derive(Clone)]
pub enum ClientEventListener {

    /// Events are pushed into an unbounded channel
    Channel(UnboundedSender<Arc<ClientEvent>>),

    /// Events are passed to a callback.  Panics inside the callback are caught and logged.
    Callback(Arc<ClientEventCallback>),
}

/// A structure that holds client-level behavioral configuration
#[derive(Clone)]
pub struct MqttClientOptions {
    pub(crate) protocol_version: ProtocolVersion,

    pub(crate) connect_options: ConnectOptions,

    pub(crate) channel: ChannelOptions,

    pub(crate) communication_timeout: Duration,

    pub(crate) keep_alive_send_interval: Option<Duration>,

    pub(crate) extended_authentication_handler: Option<ExtendedAuthenticationHandler>,
}

impl MqttClientOptions {

    /// Creates a new builder for client options that connect through the given channel
    pub fn builder(channel: ChannelOptions) -> MqttClientOptionsBuilder {
        MqttClientOptionsBuilder::new(channel)
    }

    /// Returns the protocol version the client will speak
    pub fn protocol_version(&self) -> ProtocolVersion { self.protocol_version }

    /// Returns the default timeout used by every operation that does not set its own
    pub fn communication_timeout(&self) -> Duration { self.communication_timeout }
}

impl Debug for MqttClientOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MqttClientOptions {{ ")?;
        write!(f, "protocol_version: {}, ", self.protocol_version)?;
        write!(f, "connect_options: {:?}, ", self.connect_options)?;
        write!(f, "channel: {:?}, ", self.channel)?;
        write!(f, "communication_timeout: {:?}, ", self.communication_timeout)?;
        write!(f, "keep_alive_send_interval: {:?}, ", self.keep_alive_send_interval)?;
        if self.extended_authentication_handler.is_some() {
            write!(f, "extended_authentication_handler: Some(...) ")?;
        } else {
            write!(f, "extended_authentication_handler: None ")?;
        }

        write!(f, "}}")
    }
}

/// A builder for client-level behavior configuration options
#[derive(Debug)]
pub struct MqttClientOptionsBuilder {
    options: MqttClientOptions
}

impl MqttClientOptionsBuilder {

    /// Creates a new builder object for MqttClientOptions
    pub fn new(channel: ChannelOptions) -> Self {
        MqttClientOptionsBuilder {
            options: MqttClientOptions {
                protocol_version: ProtocolVersion::Mqtt311,
                connect_options: ConnectOptions::default(),
                channel,
                communication_timeout: DEFAULT_COMMUNICATION_TIMEOUT,
                keep_alive_send_interval: None,
                extended_authentication_handler: None,
            }
        }
    }

    /// Configures the MQTT protocol version.  Defaults to 3.1.1.
    pub fn with_protocol_version(&mut self, protocol_version: ProtocolVersion) -> &mut Self {
        self.options.protocol_version = protocol_version;
        self
    }

    /// Configures the values of the CONNECT packet
    pub fn with_connect_options(&mut self, connect_options: ConnectOptions) -> &mut Self {
        self.options.connect_options = connect_options;
        self
    }

    /// Configures how long the client waits on the transport, on each response, and on
    /// background joins during shutdown.  Defaults to ten seconds.
    pub fn with_communication_timeout(&mut self, communication_timeout: Duration) -> &mut Self {
        self.options.communication_timeout = communication_timeout;
        self
    }

    /// Overrides how much idle time triggers a keep alive ping.  By default a ping is sent after
    /// three quarters of the negotiated keep alive interval has passed without any traffic.
    pub fn with_keep_alive_send_interval(&mut self, keep_alive_send_interval: Duration) -> &mut Self {
        self.options.keep_alive_send_interval = Some(keep_alive_send_interval);
        self
    }

    /// Configures the handler for server-sent AUTH packets.  MQTT5 only.
    pub fn with_extended_authentication_handler(&mut self, handler: ExtendedAuthenticationHandler) -> &mut Self {
        self.options.extended_authentication_handler = Some(handler);
        self
    }

    /// Builds a new set of client options
    pub fn build(&self) -> MqttClientOptions {
        self.options.clone()
    }
}
