/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing a set of structured data types that model MQTT control packets across
protocol versions 3.1, 3.1.1, and 5.

Reason codes use the MQTT5 encoding values.  MQTT 3.x return codes are mapped onto the
closest MQTT5 equivalent when decoded.
 */

use std::fmt;

pub(crate) mod auth;
pub(crate) mod connack;
pub(crate) mod connect;
pub(crate) mod disconnect;
pub(crate) mod pingreq;
pub(crate) mod pingresp;
pub(crate) mod puback;
pub(crate) mod pubcomp;
pub(crate) mod publish;
pub(crate) mod pubrec;
pub(crate) mod pubrel;
pub(crate) mod suback;
pub(crate) mod subscribe;
pub(crate) mod unsuback;
pub(crate) mod unsubscribe;
pub(crate) mod utils;

/// Version of the MQTT protocol spoken on a connection.  Selected once per connection and
/// used for both directions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ProtocolVersion {

    /// MQTT 3.1; protocol name "MQIsdp", level 3
    Mqtt31,

    /// MQTT 3.1.1; protocol name "MQTT", level 4
    #[default]
    Mqtt311,

    /// MQTT 5; protocol name "MQTT", level 5
    Mqtt5,
}

impl ProtocolVersion {

    /// Returns the protocol name carried in the CONNECT variable header
    pub fn protocol_name(&self) -> &'static str {
        match self {
            ProtocolVersion::Mqtt31 => { "MQIsdp" }
            _ => { "MQTT" }
        }
    }

    /// Returns the protocol level byte carried in the CONNECT variable header
    pub fn protocol_level(&self) -> u8 {
        match self {
            ProtocolVersion::Mqtt31 => { 3 }
            ProtocolVersion::Mqtt311 => { 4 }
            ProtocolVersion::Mqtt5 => { 5 }
        }
    }

    /// Returns true for MQTT 5
    pub fn is_mqtt5(&self) -> bool {
        *self == ProtocolVersion::Mqtt5
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Mqtt31 => { write!(f, "3.1") }
            ProtocolVersion::Mqtt311 => { write!(f, "3.1.1") }
            ProtocolVersion::Mqtt5 => { write!(f, "5.0") }
        }
    }
}

/// MQTT message delivery quality of service.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum QualityOfService {

    /// Fire and forget.  No acknowledgement, no retry.
    #[default]
    AtMostOnce = 0,

    /// Acknowledged with a PUBACK; the message may arrive more than once.
    AtLeastOnce = 1,

    /// Acknowledged with the PUBREC/PUBREL/PUBCOMP handshake; the message arrives exactly once.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QualityOfService {
    type Error = crate::error::MqttError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        utils::convert_u8_to_quality_of_service(value)
    }
}

/// Optional MQTT5 property describing a PUBLISH payload's format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PayloadFormatIndicator {

    /// Arbitrary binary data
    #[default]
    Bytes = 0,

    /// Well-formed utf-8 text
    Utf8 = 1,
}

/// Controls whether retained messages are sent in response to a subscription (MQTT5 only).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RetainHandlingType {

    /// Always send matching retained messages
    #[default]
    SendOnSubscribe = 0,

    /// Send matching retained messages only if the subscription did not already exist
    SendOnSubscribeIfNew = 1,

    /// Never send retained messages because of this subscription
    DontSend = 2,
}

/// Result of a connection attempt as reported by the server in CONNACK.
///
/// MQTT 3.x return codes 1 through 5 map to UnsupportedProtocolVersion, ClientIdentifierNotValid,
/// ServerUnavailable, BadUsernameOrPassword and NotAuthorized respectively.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConnectReasonCode {

    /// The connection was accepted.
    #[default]
    Success = 0,

    /// Unspecified failure.
    UnspecifiedError = 128,

    /// The CONNECT packet could not be parsed.
    MalformedPacket = 129,

    /// The CONNECT packet violated the protocol.
    ProtocolError = 130,

    /// The CONNECT was valid but the server would not accept it.
    ImplementationSpecificError = 131,

    /// The server does not speak the requested protocol version.
    UnsupportedProtocolVersion = 132,

    /// The client identifier is not allowed.
    ClientIdentifierNotValid = 133,

    /// Credentials were rejected.
    BadUsernameOrPassword = 134,

    /// The client is not authorized to connect.
    NotAuthorized = 135,

    /// The server is not available.
    ServerUnavailable = 136,

    /// The server is too busy; try again later.
    ServerBusy = 137,

    /// The client has been banned.
    Banned = 138,

    /// The authentication method is not supported.
    BadAuthenticationMethod = 140,

    /// The will topic was not accepted.
    TopicNameInvalid = 144,

    /// The CONNECT packet was too large.
    PacketTooLarge = 149,

    /// A server quota was exceeded.
    QuotaExceeded = 151,

    /// The will payload did not match its payload format indicator.
    PayloadFormatInvalid = 153,

    /// The will requested retain but the server does not support retained messages.
    RetainNotSupported = 154,

    /// The will qos is not supported.
    QosNotSupported = 155,

    /// Temporarily use another server.
    UseAnotherServer = 156,

    /// Permanently use another server.
    ServerMoved = 157,

    /// Connection rate limit exceeded.
    ConnectionRateExceeded = 159,
}

impl ConnectReasonCode {
    /// Returns whether or not the reason code represents a successful connect
    pub fn is_success(&self) -> bool {
        matches!(self, ConnectReasonCode::Success)
    }
}

/// Reason code inside PUBACK packets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PubackReasonCode {

    /// The publish was accepted.
    #[default]
    Success = 0,

    /// The publish was accepted but nobody is subscribed to it.
    NoMatchingSubscribers = 16,

    /// Unspecified failure.
    UnspecifiedError = 128,

    /// The publish was valid but the receiver would not accept it.
    ImplementationSpecificError = 131,

    /// The publish was not authorized.
    NotAuthorized = 135,

    /// The topic was not accepted.
    TopicNameInvalid = 144,

    /// The packet identifier is already in use.
    PacketIdentifierInUse = 145,

    /// A quota was exceeded.
    QuotaExceeded = 151,

    /// The payload did not match its payload format indicator.
    PayloadFormatInvalid = 153,
}

impl PubackReasonCode {
    /// Returns whether or not the reason code represents a successful publish
    pub fn is_success(&self) -> bool {
        matches!(self, PubackReasonCode::Success | PubackReasonCode::NoMatchingSubscribers)
    }
}

/// Reason code inside PUBREC packets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PubrecReasonCode {

    /// The publish was accepted.
    #[default]
    Success = 0,

    /// The publish was accepted but nobody is subscribed to it.
    NoMatchingSubscribers = 16,

    /// Unspecified failure.
    UnspecifiedError = 128,

    /// The publish was valid but the receiver would not accept it.
    ImplementationSpecificError = 131,

    /// The publish was not authorized.
    NotAuthorized = 135,

    /// The topic was not accepted.
    TopicNameInvalid = 144,

    /// The packet identifier is already in use.
    PacketIdentifierInUse = 145,

    /// A quota was exceeded.
    QuotaExceeded = 151,

    /// The payload did not match its payload format indicator.
    PayloadFormatInvalid = 153,
}

impl PubrecReasonCode {
    /// Returns whether or not the reason code represents a successful publish
    pub fn is_success(&self) -> bool {
        matches!(self, PubrecReasonCode::Success | PubrecReasonCode::NoMatchingSubscribers)
    }
}

/// Reason code inside PUBREL packets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PubrelReasonCode {

    /// The PUBREC was accepted.
    #[default]
    Success = 0,

    /// The PUBREC's packet id is not an in-progress QoS 2 delivery.
    PacketIdentifierNotFound = 146,
}

impl PubrelReasonCode {
    /// Returns whether the reason code represents a successful pubrec
    pub fn is_success(&self) -> bool {
        matches!(self, PubrelReasonCode::Success)
    }
}

/// Reason code inside PUBCOMP packets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PubcompReasonCode {

    /// The PUBREL was accepted; the QoS 2 delivery is complete.
    #[default]
    Success = 0,

    /// The PUBREL's packet id is not an in-progress QoS 2 delivery.
    PacketIdentifierNotFound = 146,
}

impl PubcompReasonCode {
    /// Returns whether the reason code represents a successful pubrel
    pub fn is_success(&self) -> bool {
        matches!(self, PubcompReasonCode::Success)
    }
}

/// Reason code inside DISCONNECT packets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DisconnectReasonCode {

    /// Normal shutdown; the will is not published.
    #[default]
    NormalDisconnection = 0,

    /// The client wants the server to publish the will anyway.
    DisconnectWithWillMessage = 4,

    /// Unspecified failure.
    UnspecifiedError = 128,

    /// A malformed packet was received.
    MalformedPacket = 129,

    /// An unexpected or out-of-order packet was received.
    ProtocolError = 130,

    /// A valid packet could not be processed.
    ImplementationSpecificError = 131,

    /// The operation was not authorized.
    NotAuthorized = 135,

    /// The server is busy.
    ServerBusy = 137,

    /// The server is shutting down.
    ServerShuttingDown = 139,

    /// No packet arrived within 1.5 keep alive intervals.
    KeepAliveTimeout = 141,

    /// Another connection took over the session.
    SessionTakenOver = 142,

    /// The topic filter was malformed or not accepted.
    TopicFilterInvalid = 143,

    /// The topic name was malformed or not accepted.
    TopicNameInvalid = 144,

    /// More QoS 1/2 publishes were in flight than the receive maximum allows.
    ReceiveMaximumExceeded = 147,

    /// A topic alias exceeded the negotiated maximum.
    TopicAliasInvalid = 148,

    /// A packet exceeded the negotiated maximum size.
    PacketTooLarge = 149,

    /// The message rate is too high.
    MessageRateTooHigh = 150,

    /// A quota was exceeded.
    QuotaExceeded = 151,

    /// Administrative action closed the connection.
    AdministrativeAction = 152,

    /// A payload did not match its payload format indicator.
    PayloadFormatInvalid = 153,

    /// Retained messages are not supported.
    RetainNotSupported = 154,

    /// The requested qos is not supported.
    QosNotSupported = 155,

    /// Temporarily use another server.
    UseAnotherServer = 156,

    /// Permanently use another server.
    ServerMoved = 157,

    /// Shared subscriptions are not supported.
    SharedSubscriptionsNotSupported = 158,

    /// Connection rate limit exceeded.
    ConnectionRateExceeded = 159,

    /// The maximum connect time was exceeded.
    MaximumConnectTime = 160,

    /// Subscription identifiers are not supported.
    SubscriptionIdentifiersNotSupported = 161,

    /// Wildcard subscriptions are not supported.
    WildcardSubscriptionsNotSupported = 162,
}

impl DisconnectReasonCode {
    /// Returns whether or not the reason code represents a normal shutdown
    pub fn is_success(&self) -> bool {
        matches!(self, DisconnectReasonCode::NormalDisconnection | DisconnectReasonCode::DisconnectWithWillMessage)
    }
}

/// Per-filter result inside SUBACK packets.  MQTT 3.x return codes use the same values
/// for the three granted variants and 0x80 (UnspecifiedError) for failure.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SubackReasonCode {

    /// Subscribed; maximum delivery qos 0.
    #[default]
    GrantedQos0 = 0,

    /// Subscribed; maximum delivery qos 1.
    GrantedQos1 = 1,

    /// Subscribed; maximum delivery qos 2.
    GrantedQos2 = 2,

    /// Unspecified failure.
    UnspecifiedError = 128,

    /// The subscription was valid but not accepted.
    ImplementationSpecificError = 131,

    /// The subscription was not authorized.
    NotAuthorized = 135,

    /// The topic filter was not valid.
    TopicFilterInvalid = 143,

    /// The packet identifier is already in use.
    PacketIdentifierInUse = 145,

    /// A quota was exceeded.
    QuotaExceeded = 151,

    /// Shared subscriptions are not supported.
    SharedSubscriptionsNotSupported = 158,

    /// Subscription identifiers are not supported.
    SubscriptionIdentifiersNotSupported = 161,

    /// Wildcard subscriptions are not supported.
    WildcardSubscriptionsNotSupported = 162,
}

impl SubackReasonCode {
    /// Returns whether or not the reason code represents a successful subscription
    pub fn is_success(&self) -> bool {
        matches!(self, SubackReasonCode::GrantedQos0 | SubackReasonCode::GrantedQos1 | SubackReasonCode::GrantedQos2)
    }

    /// Returns the granted qos of a successful subscription
    pub fn granted_qos(&self) -> Option<QualityOfService> {
        match self {
            SubackReasonCode::GrantedQos0 => { Some(QualityOfService::AtMostOnce) }
            SubackReasonCode::GrantedQos1 => { Some(QualityOfService::AtLeastOnce) }
            SubackReasonCode::GrantedQos2 => { Some(QualityOfService::ExactlyOnce) }
            _ => { None }
        }
    }
}

/// Per-filter result inside MQTT5 UNSUBACK packets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum UnsubackReasonCode {

    /// The subscription was removed.
    #[default]
    Success = 0,

    /// No matching subscription existed.
    NoSubscriptionExisted = 17,

    /// Unspecified failure.
    UnspecifiedError = 128,

    /// The unsubscribe was valid but not accepted.
    ImplementationSpecificError = 131,

    /// The unsubscribe was not authorized.
    NotAuthorized = 135,

    /// The topic filter was not valid.
    TopicFilterInvalid = 143,

    /// The packet identifier is already in use.
    PacketIdentifierInUse = 145,
}

impl UnsubackReasonCode {
    /// Returns whether or not the reason code represents a successful unsubscribe
    pub fn is_success(&self) -> bool {
        matches!(self, UnsubackReasonCode::Success | UnsubackReasonCode::NoSubscriptionExisted)
    }
}

/// Reason code inside MQTT5 AUTH packets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AuthenticateReasonCode {

    /// The authentication exchange succeeded.
    #[default]
    Success = 0,

    /// Continue the authentication exchange.
    ContinueAuthentication = 24,

    /// Start a re-authentication exchange.
    ReAuthenticate = 25,
}

/// A name-value pair of utf-8 strings attached to MQTT5 packets.  Names need not be unique.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserProperty {

    /// User property name
    pub name: String,

    /// User property value
    pub value: String,
}

impl UserProperty {

    /// Creates a new user property
    pub fn new(name: &str, value: &str) -> Self {
        UserProperty {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// An application message: what gets published and what gets delivered.
///
/// Immutable once built.  The same type is used for outbound publishes, inbound deliveries
/// and will messages.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApplicationMessage {
    pub(crate) topic: String,
    pub(crate) qos: QualityOfService,
    pub(crate) retain: bool,
    pub(crate) payload: Vec<u8>,
    pub(crate) payload_format: Option<PayloadFormatIndicator>,
    pub(crate) message_expiry_interval_seconds: Option<u32>,
    pub(crate) topic_alias: Option<u16>,
    pub(crate) response_topic: Option<String>,
    pub(crate) correlation_data: Option<Vec<u8>>,
    pub(crate) subscription_identifiers: Option<Vec<u32>>,
    pub(crate) content_type: Option<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

impl ApplicationMessage {

    /// Creates a new builder for an ApplicationMessage
    pub fn builder(topic: &str, qos: QualityOfService) -> ApplicationMessageBuilder {
        ApplicationMessageBuilder::new(topic, qos)
    }

    /// Returns the topic the message is published to
    pub fn topic(&self) -> &str { self.topic.as_str() }

    /// Returns the delivery quality of service
    pub fn qos(&self) -> QualityOfService { self.qos }

    /// Returns true if this is a retained message
    pub fn retain(&self) -> bool { self.retain }

    /// Returns the payload; may be empty
    pub fn payload(&self) -> &[u8] { self.payload.as_slice() }

    /// Returns the MQTT5 payload format indicator
    pub fn payload_format(&self) -> Option<PayloadFormatIndicator> { self.payload_format }

    /// Returns the MQTT5 message expiry interval
    pub fn message_expiry_interval_seconds(&self) -> Option<u32> { self.message_expiry_interval_seconds }

    /// Returns the MQTT5 topic alias
    pub fn topic_alias(&self) -> Option<u16> { self.topic_alias }

    /// Returns the MQTT5 response topic
    pub fn response_topic(&self) -> Option<&str> { self.response_topic.as_deref() }

    /// Returns the MQTT5 correlation data
    pub fn correlation_data(&self) -> Option<&[u8]> { self.correlation_data.as_deref() }

    /// Returns the identifiers of the subscriptions an inbound message matched
    pub fn subscription_identifiers(&self) -> Option<&[u32]> { self.subscription_identifiers.as_deref() }

    /// Returns the MQTT5 content type
    pub fn content_type(&self) -> Option<&str> { self.content_type.as_deref() }

    /// Returns the MQTT5 user properties
    pub fn user_properties(&self) -> Option<&[UserProperty]> { self.user_properties.as_deref() }
}

/// Builder type for ApplicationMessage instances
pub struct ApplicationMessageBuilder {
    message: ApplicationMessage
}

impl ApplicationMessageBuilder {
    pub(crate) fn new(topic: &str, qos: QualityOfService) -> Self {
        ApplicationMessageBuilder {
            message: ApplicationMessage {
                topic: topic.to_string(),
                qos,
                ..Default::default()
            }
        }
    }

    /// Sets the message payload
    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.message.payload = payload.to_vec();
        self
    }

    /// Sets the retain flag
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.message.retain = retain;
        self
    }

    /// Sets the MQTT5 payload format indicator
    pub fn with_payload_format(mut self, payload_format: PayloadFormatIndicator) -> Self {
        self.message.payload_format = Some(payload_format);
        self
    }

    /// Sets the MQTT5 message expiry interval
    pub fn with_message_expiry_interval_seconds(mut self, message_expiry_interval_seconds: u32) -> Self {
        self.message.message_expiry_interval_seconds = Some(message_expiry_interval_seconds);
        self
    }

    /// Sets the MQTT5 topic alias
    pub fn with_topic_alias(mut self, topic_alias: u16) -> Self {
        self.message.topic_alias = Some(topic_alias);
        self
    }

    /// Sets the MQTT5 response topic
    pub fn with_response_topic(mut self, response_topic: &str) -> Self {
        self.message.response_topic = Some(response_topic.to_string());
        self
    }

    /// Sets the MQTT5 correlation data
    pub fn with_correlation_data(mut self, correlation_data: &[u8]) -> Self {
        self.message.correlation_data = Some(correlation_data.to_vec());
        self
    }

    /// Sets the MQTT5 content type
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.message.content_type = Some(content_type.to_string());
        self
    }

    /// Sets the MQTT5 user properties
    pub fn with_user_properties(mut self, user_properties: Vec<UserProperty>) -> Self {
        self.message.user_properties = Some(user_properties);
        self
    }

    /// Builds a new ApplicationMessage.  Consumes the builder in the process.
    pub fn build(self) -> ApplicationMessage {
        self.message
    }
}

/// A single topic filter within a SUBSCRIBE packet.  The no-local, retain-as-published and
/// retain handling options are only encoded for MQTT5.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Subscription {
    pub(crate) topic_filter: String,
    pub(crate) qos: QualityOfService,
    pub(crate) no_local: bool,
    pub(crate) retain_as_published: bool,
    pub(crate) retain_handling_type: RetainHandlingType,
}

impl Subscription {

    /// Creates a new Subscription with default MQTT5 options
    pub fn new(topic_filter: &str, qos: QualityOfService) -> Self {
        Subscription {
            topic_filter: topic_filter.to_string(),
            qos,
            ..Default::default()
        }
    }

    /// Creates a new builder for a Subscription
    pub fn builder(topic_filter: &str, qos: QualityOfService) -> SubscriptionBuilder {
        SubscriptionBuilder {
            subscription: Subscription::new(topic_filter, qos)
        }
    }

    /// Returns the topic filter to subscribe to
    pub fn topic_filter(&self) -> &str { self.topic_filter.as_str() }

    /// Returns the maximum qos the subscriber will accept
    pub fn qos(&self) -> QualityOfService { self.qos }

    /// Returns whether the server should skip messages this client published itself
    pub fn no_local(&self) -> bool { self.no_local }

    /// Returns whether the retain flag is kept on forwarded messages
    pub fn retain_as_published(&self) -> bool { self.retain_as_published }

    /// Returns how retained messages are handled for this subscription
    pub fn retain_handling_type(&self) -> RetainHandlingType { self.retain_handling_type }
}

/// Builder type for Subscription instances
pub struct SubscriptionBuilder {
    subscription: Subscription
}

impl SubscriptionBuilder {

    /// Sets the MQTT5 no-local option
    pub fn with_no_local(mut self, no_local: bool) -> Self {
        self.subscription.no_local = no_local;
        self
    }

    /// Sets the MQTT5 retain-as-published option
    pub fn with_retain_as_published(mut self, retain_as_published: bool) -> Self {
        self.subscription.retain_as_published = retain_as_published;
        self
    }

    /// Sets the MQTT5 retain handling option
    pub fn with_retain_handling_type(mut self, retain_handling_type: RetainHandlingType) -> Self {
        self.subscription.retain_handling_type = retain_handling_type;
        self
    }

    /// Builds a new Subscription.  Consumes the builder in the process.
    pub fn build(self) -> Subscription {
        self.subscription
    }
}

/// AUTH packet (MQTT5 only).  Used for extended authentication exchanges.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthPacket {
    pub(crate) reason_code: AuthenticateReasonCode,
    pub(crate) authentication_method: Option<String>,
    pub(crate) authentication_data: Option<Vec<u8>>,
    pub(crate) reason_string: Option<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

impl AuthPacket {

    /// Creates a new AUTH packet
    pub fn new(reason_code: AuthenticateReasonCode, authentication_method: &str, authentication_data: Option<&[u8]>) -> Self {
        AuthPacket {
            reason_code,
            authentication_method: Some(authentication_method.to_string()),
            authentication_data: authentication_data.map(|data| data.to_vec()),
            ..Default::default()
        }
    }

    /// Returns the step of the authentication exchange this packet represents
    pub fn reason_code(&self) -> AuthenticateReasonCode { self.reason_code }

    /// Returns the authentication method of the exchange
    pub fn authentication_method(&self) -> Option<&str> { self.authentication_method.as_deref() }

    /// Returns method-specific authentication data
    pub fn authentication_data(&self) -> Option<&[u8]> { self.authentication_data.as_deref() }

    /// Returns additional diagnostic information
    pub fn reason_string(&self) -> Option<&str> { self.reason_string.as_deref() }

    /// Returns the MQTT5 user properties
    pub fn user_properties(&self) -> Option<&[UserProperty]> { self.user_properties.as_deref() }
}

/// CONNACK packet; the server's answer to a connection attempt.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConnackPacket {
    pub(crate) session_present: bool,
    pub(crate) reason_code: ConnectReasonCode,
    pub(crate) session_expiry_interval: Option<u32>,
    pub(crate) receive_maximum: Option<u16>,
    pub(crate) maximum_qos: Option<QualityOfService>,
    pub(crate) retain_available: Option<bool>,
    pub(crate) maximum_packet_size: Option<u32>,
    pub(crate) assigned_client_identifier: Option<String>,
    pub(crate) topic_alias_maximum: Option<u16>,
    pub(crate) reason_string: Option<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
    pub(crate) wildcard_subscriptions_available: Option<bool>,
    pub(crate) subscription_identifiers_available: Option<bool>,
    pub(crate) shared_subscriptions_available: Option<bool>,
    pub(crate) server_keep_alive: Option<u16>,
    pub(crate) response_information: Option<String>,
    pub(crate) server_reference: Option<String>,
    pub(crate) authentication_method: Option<String>,
    pub(crate) authentication_data: Option<Vec<u8>>,
}

impl ConnackPacket {

    /// Returns true if the server resumed an existing session
    pub fn session_present(&self) -> bool { self.session_present }

    /// Returns the result of the connection attempt
    pub fn reason_code(&self) -> ConnectReasonCode { self.reason_code }

    /// Returns the session expiry interval the server will use, if it overrides the client's
    pub fn session_expiry_interval(&self) -> Option<u32> { self.session_expiry_interval }

    /// Returns the number of in-flight QoS 1/2 publishes the server is willing to handle
    pub fn receive_maximum(&self) -> Option<u16> { self.receive_maximum }

    /// Returns the maximum qos the server supports
    pub fn maximum_qos(&self) -> Option<QualityOfService> { self.maximum_qos }

    /// Returns whether the server supports retained messages
    pub fn retain_available(&self) -> Option<bool> { self.retain_available }

    /// Returns the largest packet, in bytes, the server accepts
    pub fn maximum_packet_size(&self) -> Option<u32> { self.maximum_packet_size }

    /// Returns the client id the server assigned, if the CONNECT did not carry one
    pub fn assigned_client_identifier(&self) -> Option<&str> { self.assigned_client_identifier.as_deref() }

    /// Returns the highest topic alias the server accepts
    pub fn topic_alias_maximum(&self) -> Option<u16> { self.topic_alias_maximum }

    /// Returns additional diagnostic information
    pub fn reason_string(&self) -> Option<&str> { self.reason_string.as_deref() }

    /// Returns the MQTT5 user properties
    pub fn user_properties(&self) -> Option<&[UserProperty]> { self.user_properties.as_deref() }

    /// Returns whether wildcard subscriptions are supported
    pub fn wildcard_subscriptions_available(&self) -> Option<bool> { self.wildcard_subscriptions_available }

    /// Returns whether subscription identifiers are supported
    pub fn subscription_identifiers_available(&self) -> Option<bool> { self.subscription_identifiers_available }

    /// Returns whether shared subscriptions are supported
    pub fn shared_subscriptions_available(&self) -> Option<bool> { self.shared_subscriptions_available }

    /// Returns the keep alive interval, in seconds, the server wants the client to use instead
    /// of its own
    pub fn server_keep_alive(&self) -> Option<u16> { self.server_keep_alive }

    /// Returns the MQTT5 response information
    pub fn response_information(&self) -> Option<&str> { self.response_information.as_deref() }

    /// Returns an alternate server the client may use
    pub fn server_reference(&self) -> Option<&str> { self.server_reference.as_deref() }

    /// Returns the authentication method of the exchange that produced this CONNACK
    pub fn authentication_method(&self) -> Option<&str> { self.authentication_method.as_deref() }

    /// Returns authentication data of the exchange that produced this CONNACK
    pub fn authentication_data(&self) -> Option<&[u8]> { self.authentication_data.as_deref() }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct ConnectPacket {
    pub(crate) protocol_version: ProtocolVersion,
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

/// DISCONNECT packet.  Only carries fields under MQTT5.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DisconnectPacket {
    pub(crate) reason_code: DisconnectReasonCode,
    pub(crate) session_expiry_interval_seconds: Option<u32>,
    pub(crate) reason_string: Option<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
    pub(crate) server_reference: Option<String>,
}

impl DisconnectPacket {

    /// Creates a new builder for a DisconnectPacket.
    pub fn builder() -> DisconnectPacketBuilder {
        DisconnectPacketBuilder {
            packet: DisconnectPacket::default()
        }
    }

    /// Returns why the sender is closing the connection
    pub fn reason_code(&self) -> DisconnectReasonCode { self.reason_code }

    /// Returns a change to the negotiated session expiry interval
    pub fn session_expiry_interval_seconds(&self) -> Option<u32> { self.session_expiry_interval_seconds }

    /// Returns additional diagnostic information
    pub fn reason_string(&self) -> Option<&str> { self.reason_string.as_deref() }

    /// Returns the MQTT5 user properties
    pub fn user_properties(&self) -> Option<&[UserProperty]> { self.user_properties.as_deref() }

    /// Returns an alternate server the client may use
    pub fn server_reference(&self) -> Option<&str> { self.server_reference.as_deref() }
}

/// Builder type for DisconnectPacket instances
pub struct DisconnectPacketBuilder {
    packet: DisconnectPacket
}

impl DisconnectPacketBuilder {

    /// Sets the disconnect reason code
    pub fn with_reason_code(mut self, reason_code: DisconnectReasonCode) -> Self {
        self.packet.reason_code = reason_code;
        self
    }

    /// Sets a new session expiry interval
    pub fn with_session_expiry_interval_seconds(mut self, session_expiry_interval_seconds: u32) -> Self {
        self.packet.session_expiry_interval_seconds = Some(session_expiry_interval_seconds);
        self
    }

    /// Sets the reason string
    pub fn with_reason_string(mut self, reason_string: &str) -> Self {
        self.packet.reason_string = Some(reason_string.to_string());
        self
    }

    /// Sets the MQTT5 user properties
    pub fn with_user_properties(mut self, user_properties: Vec<UserProperty>) -> Self {
        self.packet.user_properties = Some(user_properties);
        self
    }

    /// Builds a new DisconnectPacket.  Consumes the builder in the process.
    pub fn build(self) -> DisconnectPacket {
        self.packet
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct PingreqPacket {}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct PingrespPacket {}

/// PUBACK packet; the acknowledgement of a QoS 1 publish.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PubackPacket {
    pub(crate) packet_id: u16,
    pub(crate) reason_code: PubackReasonCode,
    pub(crate) reason_string: Option<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

impl PubackPacket {

    /// Returns the packet id of the acknowledged publish
    pub fn packet_id(&self) -> u16 { self.packet_id }

    /// Returns the result of the publish
    pub fn reason_code(&self) -> PubackReasonCode { self.reason_code }

    /// Returns additional diagnostic information
    pub fn reason_string(&self) -> Option<&str> { self.reason_string.as_deref() }

    /// Returns the MQTT5 user properties
    pub fn user_properties(&self) -> Option<&[UserProperty]> { self.user_properties.as_deref() }
}

/// PUBREC packet; the first acknowledgement of a QoS 2 publish.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PubrecPacket {
    pub(crate) packet_id: u16,
    pub(crate) reason_code: PubrecReasonCode,
    pub(crate) reason_string: Option<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

impl PubrecPacket {

    /// Returns the packet id of the acknowledged publish
    pub fn packet_id(&self) -> u16 { self.packet_id }

    /// Returns the result of the publish
    pub fn reason_code(&self) -> PubrecReasonCode { self.reason_code }

    /// Returns additional diagnostic information
    pub fn reason_string(&self) -> Option<&str> { self.reason_string.as_deref() }

    /// Returns the MQTT5 user properties
    pub fn user_properties(&self) -> Option<&[UserProperty]> { self.user_properties.as_deref() }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct PubrelPacket {
    pub(crate) packet_id: u16,
    pub(crate) reason_code: PubrelReasonCode,
    pub(crate) reason_string: Option<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

/// PUBCOMP packet; the final acknowledgement of a QoS 2 publish.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PubcompPacket {
    pub(crate) packet_id: u16,
    pub(crate) reason_code: PubcompReasonCode,
    pub(crate) reason_string: Option<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

impl PubcompPacket {

    /// Returns the packet id of the completed publish
    pub fn packet_id(&self) -> u16 { self.packet_id }

    /// Returns the result of the final step of the delivery
    pub fn reason_code(&self) -> PubcompReasonCode { self.reason_code }

    /// Returns additional diagnostic information
    pub fn reason_string(&self) -> Option<&str> { self.reason_string.as_deref() }

    /// Returns the MQTT5 user properties
    pub fn user_properties(&self) -> Option<&[UserProperty]> { self.user_properties.as_deref() }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct PublishPacket {
    pub(crate) packet_id: u16,
    pub(crate) duplicate: bool,
    pub(crate) message: ApplicationMessage,
}

/// SUBACK packet; one reason code per requested filter, in request order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubackPacket {
    pub(crate) packet_id: u16,
    pub(crate) reason_string: Option<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
    pub(crate) reason_codes: Vec<SubackReasonCode>,
}

impl SubackPacket {

    /// Returns the packet id of the acknowledged subscribe
    pub fn packet_id(&self) -> u16 { self.packet_id }

    /// Returns additional diagnostic information
    pub fn reason_string(&self) -> Option<&str> { self.reason_string.as_deref() }

    /// Returns the MQTT5 user properties
    pub fn user_properties(&self) -> Option<&[UserProperty]> { self.user_properties.as_deref() }

    /// Returns one result per topic filter of the subscribe
    pub fn reason_codes(&self) -> &[SubackReasonCode] { self.reason_codes.as_slice() }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct SubscribePacket {
    pub(crate) packet_id: u16,
    pub(crate) subscriptions: Vec<Subscription>,
    pub(crate) subscription_identifier: Option<u32>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

/// UNSUBACK packet.  Reason codes are only present under MQTT5.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UnsubackPacket {
    pub(crate) packet_id: u16,
    pub(crate) reason_string: Option<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
    pub(crate) reason_codes: Vec<UnsubackReasonCode>,
}

impl UnsubackPacket {

    /// Returns the packet id of the acknowledged unsubscribe
    pub fn packet_id(&self) -> u16 { self.packet_id }

    /// Returns additional diagnostic information
    pub fn reason_string(&self) -> Option<&str> { self.reason_string.as_deref() }

    /// Returns the MQTT5 user properties
    pub fn user_properties(&self) -> Option<&[UserProperty]> { self.user_properties.as_deref() }

    /// Returns one result per topic filter of the unsubscribe; always empty for MQTT 3.x
    pub fn reason_codes(&self) -> &[UnsubackReasonCode] { self.reason_codes.as_slice() }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct UnsubscribePacket {
    pub(crate) packet_id: u16,
    pub(crate) topic_filters: Vec<String>,
    pub(crate) user_properties: Option<Vec<UserProperty>>,
}

/// Tagged union of every MQTT control packet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum MqttPacket {
    Connect(ConnectPacket),
    Connack(ConnackPacket),
    Publish(PublishPacket),
    Puback(PubackPacket),
    Pubrec(PubrecPacket),
    Pubrel(PubrelPacket),
    Pubcomp(PubcompPacket),
    Subscribe(SubscribePacket),
    Suback(SubackPacket),
    Unsubscribe(UnsubscribePacket),
    Unsuback(UnsubackPacket),
    Pingreq(PingreqPacket),
    Pingresp(PingrespPacket),
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl MqttPacket {

    pub(crate) fn packet_type(&self) -> PacketType {
        utils::mqtt_packet_to_packet_type(self)
    }

    /// Packet id used for correlation; zero for packets that never carry one.
    pub(crate) fn packet_id(&self) -> u16 {
        match self {
            MqttPacket::Publish(publish) => { publish.packet_id }
            MqttPacket::Puback(puback) => { puback.packet_id }
            MqttPacket::Pubrec(pubrec) => { pubrec.packet_id }
            MqttPacket::Pubrel(pubrel) => { pubrel.packet_id }
            MqttPacket::Pubcomp(pubcomp) => { pubcomp.packet_id }
            MqttPacket::Subscribe(subscribe) => { subscribe.packet_id }
            MqttPacket::Suback(suback) => { suback.packet_id }
            MqttPacket::Unsubscribe(unsubscribe) => { unsubscribe.packet_id }
            MqttPacket::Unsuback(unsuback) => { unsuback.packet_id }
            _ => { 0 }
        }
    }
}

/// An enum indicating the kind of MQTT packet
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// CONNECT
    Connect,

    /// CONNACK
    Connack,

    /// PUBLISH
    Publish,

    /// PUBACK
    Puback,

    /// PUBREC
    Pubrec,

    /// PUBREL
    Pubrel,

    /// PUBCOMP
    Pubcomp,

    /// SUBSCRIBE
    Subscribe,

    /// SUBACK
    Suback,

    /// UNSUBSCRIBE
    Unsubscribe,

    /// UNSUBACK
    Unsuback,

    /// PINGREQ
    Pingreq,

    /// PINGRESP
    Pingresp,

    /// DISCONNECT
    Disconnect,

    /// AUTH (MQTT5 only)
    Auth,
}

impl PacketType {

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            PacketType::Connect => { "ConnectPacket" }
            PacketType::Connack => { "ConnackPacket" }
            PacketType::Publish => { "PublishPacket" }
            PacketType::Puback => { "PubackPacket" }
            PacketType::Pubrec => { "PubrecPacket" }
            PacketType::Pubrel => { "PubrelPacket" }
            PacketType::Pubcomp => { "PubcompPacket" }
            PacketType::Subscribe => { "SubscribePacket" }
            PacketType::Suback => { "SubackPacket" }
            PacketType::Unsubscribe => { "UnsubscribePacket" }
            PacketType::Unsuback => { "UnsubackPacket" }
            PacketType::Pingreq => { "PingreqPacket" }
            PacketType::Pingresp => { "PingrespPacket" }
            PacketType::Disconnect => { "DisconnectPacket" }
            PacketType::Auth => { "AuthPacket" }
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
