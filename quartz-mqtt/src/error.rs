/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
A module containing the core crate error enumeration, context structures, and conversion
definitions.
 */

use crate::mqtt::{ConnackPacket, ConnectReasonCode, DisconnectPacket, PacketType};

use std::error::Error;
use std::fmt;
use std::sync::Arc;

type ErrorSource = Arc<dyn Error + Send + Sync + 'static>;

fn make_source(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> ErrorSource {
    Arc::from(source.into())
}

/// Additional details about a ProtocolViolation error variant
#[derive(Clone, Debug)]
pub struct ProtocolViolationContext {
    source: ErrorSource
}

/// Additional details about a CommunicationTimedOut error variant
#[derive(Clone, Debug)]
pub struct CommunicationTimedOutContext {

    /// what the client was waiting on when the timeout elapsed
    pub waiting_on: &'static str,
}

/// Additional details about a TransportError error variant
#[derive(Clone, Debug)]
pub struct TransportErrorContext {
    source: ErrorSource
}

/// Additional details about a ConnectionRefused error variant
#[derive(Clone, Debug)]
pub struct ConnectionRefusedContext {

    /// reason code the server used to refuse the connection
    pub reason_code: ConnectReasonCode,

    connack: Box<ConnackPacket>,
}

impl ConnectionRefusedContext {

    /// Returns the CONNACK packet that refused the connection attempt
    pub fn connack(&self) -> &ConnackPacket { &self.connack }
}

/// Additional details about an AlreadyPending error variant
#[derive(Clone, Debug)]
pub struct AlreadyPendingContext {

    /// packet id of the conflicting correlation key
    pub packet_id: u16,

    /// response packet type of the conflicting correlation key
    pub packet_type: PacketType,
}

/// Additional details about an UnhandledPacket error variant
#[derive(Clone, Debug)]
pub struct UnhandledPacketContext {

    /// packet id of the packet that nothing was waiting for
    pub packet_id: u16,

    /// type of the packet that nothing was waiting for
    pub packet_type: PacketType,
}

/// Additional details about a ServerSideDisconnect error variant
#[derive(Clone, Debug)]
pub struct ServerSideDisconnectContext {
    disconnect: Box<DisconnectPacket>,
}

impl ServerSideDisconnectContext {

    /// Returns the DISCONNECT packet the server sent
    pub fn disconnect(&self) -> &DisconnectPacket { &self.disconnect }
}

/// Additional details about a ConnectionClosed error variant
#[derive(Clone, Debug)]
pub struct ConnectionClosedContext {
    source: ErrorSource
}

/// Additional details about a UserInitiatedDisconnect error variant
#[derive(Clone, Debug)]
pub struct UserInitiatedDisconnectContext {
}

/// Additional details about a NotConnected error variant
#[derive(Clone, Debug)]
pub struct NotConnectedContext {
}

/// Additional details about an InvalidState error variant
#[derive(Clone, Debug)]
pub struct InvalidStateContext {
    source: ErrorSource
}

/// Additional details about an OperationCancelled error variant
#[derive(Clone, Debug)]
pub struct OperationCancelledContext {
}

/// Additional details about an InboundTopicAliasNotValid error variant
#[derive(Clone, Debug)]
pub struct InboundTopicAliasNotValidContext {
    source: ErrorSource
}

/// Additional details about a StdIoError error variant
#[derive(Clone, Debug)]
pub struct StdIoErrorContext {
    source: ErrorSource
}

/// Additional details about an InternalStateError error variant
#[derive(Clone, Debug)]
pub struct InternalStateErrorContext {
    source: ErrorSource
}

/// Basic error type for the entire quartz-mqtt crate.
///
/// Errors are cheap to clone; a single connection failure is handed to every operation
/// that was waiting on the connection.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum MqttError {

    /// A packet (inbound or outbound) is malformed or carries a field combination that is
    /// illegal for the negotiated protocol version.  Fatal to the connection when detected
    /// on the receive path.
    ProtocolViolation(ProtocolViolationContext),

    /// A correlated response did not arrive within the operation's timeout.  Only the
    /// keep alive path treats this as fatal to the connection.
    CommunicationTimedOut(CommunicationTimedOutContext),

    /// The underlying byte stream failed.  Always fatal to the connection.
    TransportError(TransportErrorContext),

    /// The server answered the CONNECT with a failing reason code.
    ConnectionRefused(ConnectionRefusedContext),

    /// An attempt was made to wait on a correlation key that something else is already
    /// waiting on.  Always indicates a bug.
    AlreadyPending(AlreadyPendingContext),

    /// A response packet arrived that nothing was waiting for.
    UnhandledPacket(UnhandledPacketContext),

    /// The server closed the connection with a DISCONNECT packet.
    ServerSideDisconnect(ServerSideDisconnectContext),

    /// The connection was closed while the operation was in progress; source contains
    /// further details.
    ConnectionClosed(ConnectionClosedContext),

    /// The connection was shut down by a call to `disconnect()`.  Does not indicate an actual
    /// failure.
    UserInitiatedDisconnect(UserInitiatedDisconnectContext),

    /// An operation that requires an established connection was submitted while the client
    /// was not connected.
    NotConnected(NotConnectedContext),

    /// An operation was invoked while the client was in a state that does not allow it (for
    /// example, connecting twice).
    InvalidState(InvalidStateContext),

    /// The operation's response channel was dropped without a result.
    OperationCancelled(OperationCancelledContext),

    /// An inbound publish referenced a topic alias that is unknown or out of range.
    InboundTopicAliasNotValid(InboundTopicAliasNotValidContext),

    /// Generic error wrapping std::io::Error
    StdIoError(StdIoErrorContext),

    /// Error emitted by the client when something happens that should never happen.  Always indicates
    /// a bug in the client.
    InternalStateError(InternalStateErrorContext),
}

impl MqttError {

    pub(crate) fn new_protocol_violation(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        MqttError::ProtocolViolation(
            ProtocolViolationContext {
                source : make_source(source)
            }
        )
    }

    pub(crate) fn new_communication_timed_out(waiting_on: &'static str) -> Self {
        MqttError::CommunicationTimedOut(
            CommunicationTimedOutContext {
                waiting_on
            }
        )
    }

    /// Constructs a new TransportError variant from an existing error.  Typically this should be
    /// an error surfacing from a connection factory.
    pub fn new_transport_error(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        MqttError::TransportError(
            TransportErrorContext {
                source : make_source(source)
            }
        )
    }

    pub(crate) fn new_connection_refused(connack: ConnackPacket) -> Self {
        MqttError::ConnectionRefused(
            ConnectionRefusedContext {
                reason_code: connack.reason_code,
                connack: Box::new(connack)
            }
        )
    }

    pub(crate) fn new_already_pending(packet_id: u16, packet_type: PacketType) -> Self {
        MqttError::AlreadyPending(
            AlreadyPendingContext {
                packet_id,
                packet_type
            }
        )
    }

    pub(crate) fn new_unhandled_packet(packet_id: u16, packet_type: PacketType) -> Self {
        MqttError::UnhandledPacket(
            UnhandledPacketContext {
                packet_id,
                packet_type
            }
        )
    }

    pub(crate) fn new_server_side_disconnect(disconnect: DisconnectPacket) -> Self {
        MqttError::ServerSideDisconnect(
            ServerSideDisconnectContext {
                disconnect: Box::new(disconnect)
            }
        )
    }

    pub(crate) fn new_connection_closed(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        MqttError::ConnectionClosed(
            ConnectionClosedContext {
                source : make_source(source)
            }
        )
    }

    pub(crate) fn new_user_initiated_disconnect() -> Self {
        MqttError::UserInitiatedDisconnect(
            UserInitiatedDisconnectContext {
            }
        )
    }

    pub(crate) fn new_not_connected() -> Self {
        MqttError::NotConnected(
            NotConnectedContext {
            }
        )
    }

    pub(crate) fn new_invalid_state(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        MqttError::InvalidState(
            InvalidStateContext {
                source : make_source(source)
            }
        )
    }

    pub(crate) fn new_operation_cancelled() -> Self {
        MqttError::OperationCancelled(
            OperationCancelledContext {
            }
        )
    }

    pub(crate) fn new_inbound_topic_alias_not_valid(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        MqttError::InboundTopicAliasNotValid(
            InboundTopicAliasNotValidContext {
                source : make_source(source)
            }
        )
    }

    /// Constructs a StdIoError variant from an existing error.  Typically this should be a
    /// std::io::Error
    #[doc(hidden)]
    pub fn new_std_io_error(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        MqttError::StdIoError(
            StdIoErrorContext {
                source : make_source(source)
            }
        )
    }

    pub(crate) fn new_internal_state_error(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        MqttError::InternalStateError(
            InternalStateErrorContext {
                source : make_source(source)
            }
        )
    }

    /// Returns true if the error leaves the connection unusable
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(self,
            MqttError::CommunicationTimedOut(_) |
            MqttError::ConnectionRefused(_) |
            MqttError::AlreadyPending(_) |
            MqttError::UnhandledPacket(_) |
            MqttError::NotConnected(_) |
            MqttError::InvalidState(_)
        )
    }
}

impl Error for MqttError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MqttError::ProtocolViolation(context) => {
                Some(context.source.as_ref())
            }
            MqttError::TransportError(context) => {
                Some(context.source.as_ref())
            }
            MqttError::ConnectionClosed(context) => {
                Some(context.source.as_ref())
            }
            MqttError::InvalidState(context) => {
                Some(context.source.as_ref())
            }
            MqttError::InboundTopicAliasNotValid(context) => {
                Some(context.source.as_ref())
            }
            MqttError::StdIoError(context) => {
                Some(context.source.as_ref())
            }
            MqttError::InternalStateError(context) => {
                Some(context.source.as_ref())
            }
            _ => { None }
        }
    }
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MqttError::ProtocolViolation(context) => {
                write!(f, "mqtt protocol violation: {}", context.source)
            }
            MqttError::CommunicationTimedOut(context) => {
                write!(f, "timed out waiting on {}", context.waiting_on)
            }
            MqttError::TransportError(_) => {
                write!(f, "transport error; source contains further details")
            }
            MqttError::ConnectionRefused(context) => {
                write!(f, "connection refused by server with reason code {:?}", context.reason_code)
            }
            MqttError::AlreadyPending(context) => {
                write!(f, "a {} with packet id {} is already being waited on", context.packet_type, context.packet_id)
            }
            MqttError::UnhandledPacket(context) => {
                write!(f, "received {} with packet id {} at an unexpected time", context.packet_type, context.packet_id)
            }
            MqttError::ServerSideDisconnect(context) => {
                write!(f, "server closed the connection with reason code {:?}", context.disconnect.reason_code)
            }
            MqttError::ConnectionClosed(_) => {
                write!(f, "client connection was closed; source contains further details")
            }
            MqttError::UserInitiatedDisconnect(_) => {
                write!(f, "connection was shut down by user action")
            }
            MqttError::NotConnected(_) => {
                write!(f, "the client is not connected")
            }
            MqttError::InvalidState(context) => {
                write!(f, "operation not allowed in the client's current state: {}", context.source)
            }
            MqttError::OperationCancelled(_) => {
                write!(f, "the operation was cancelled before a result was available")
            }
            MqttError::InboundTopicAliasNotValid(_) => {
                write!(f, "topic alias value on incoming publish is not valid")
            }
            MqttError::StdIoError(_) => {
                write!(f, "generic error wrapper for std::io::Error when no more specialized error is appropriate; source contains further details")
            }
            MqttError::InternalStateError(_) => {
                write!(f, "client reached an invalid internal state; almost certainly a client bug")
            }
        }
    }
}

impl From<std::io::Error> for MqttError {
    fn from(error: std::io::Error) -> Self {
        MqttError::new_transport_error(error)
    }
}

impl From<core::str::Utf8Error> for MqttError {
    fn from(err: core::str::Utf8Error) -> Self {
        MqttError::new_protocol_violation(err)
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for MqttError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        MqttError::new_operation_cancelled()
    }
}

/// Crate-wide result type for functions that can fail
pub type MqttResult<T> = Result<T, MqttError>;
