/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Miscellaneous wire constants and integer to enum conversion functions.
 */

use crate::error::{MqttError, MqttResult};
use crate::mqtt::*;

use log::*;

pub(crate) const PACKET_TYPE_CONNECT: u8 = 1;
pub(crate) const PACKET_TYPE_CONNACK: u8 = 2;
pub(crate) const PACKET_TYPE_PUBLISH: u8 = 3;
pub(crate) const PACKET_TYPE_PUBACK: u8 = 4;
pub(crate) const PACKET_TYPE_PUBREC: u8 = 5;
pub(crate) const PACKET_TYPE_PUBREL: u8 = 6;
pub(crate) const PACKET_TYPE_PUBCOMP: u8 = 7;
pub(crate) const PACKET_TYPE_SUBSCRIBE: u8 = 8;
pub(crate) const PACKET_TYPE_SUBACK: u8 = 9;
pub(crate) const PACKET_TYPE_UNSUBSCRIBE: u8 = 10;
pub(crate) const PACKET_TYPE_UNSUBACK: u8 = 11;
pub(crate) const PACKET_TYPE_PINGREQ: u8 = 12;
pub(crate) const PACKET_TYPE_PINGRESP: u8 = 13;
pub(crate) const PACKET_TYPE_DISCONNECT: u8 = 14;
pub(crate) const PACKET_TYPE_AUTH: u8 = 15;

pub(crate) const PROPERTY_KEY_PAYLOAD_FORMAT_INDICATOR: u8 = 1;
pub(crate) const PROPERTY_KEY_MESSAGE_EXPIRY_INTERVAL: u8 = 2;
pub(crate) const PROPERTY_KEY_CONTENT_TYPE: u8 = 3;
pub(crate) const PROPERTY_KEY_RESPONSE_TOPIC: u8 = 8;
pub(crate) const PROPERTY_KEY_CORRELATION_DATA: u8 = 9;
pub(crate) const PROPERTY_KEY_SUBSCRIPTION_IDENTIFIER: u8 = 11;
pub(crate) const PROPERTY_KEY_SESSION_EXPIRY_INTERVAL: u8 = 17;
pub(crate) const PROPERTY_KEY_ASSIGNED_CLIENT_IDENTIFIER: u8 = 18;
pub(crate) const PROPERTY_KEY_SERVER_KEEP_ALIVE: u8 = 19;
pub(crate) const PROPERTY_KEY_AUTHENTICATION_METHOD: u8 = 21;
pub(crate) const PROPERTY_KEY_AUTHENTICATION_DATA: u8 = 22;
pub(crate) const PROPERTY_KEY_REQUEST_PROBLEM_INFORMATION: u8 = 23;
pub(crate) const PROPERTY_KEY_WILL_DELAY_INTERVAL: u8 = 24;
pub(crate) const PROPERTY_KEY_REQUEST_RESPONSE_INFORMATION: u8 = 25;
pub(crate) const PROPERTY_KEY_RESPONSE_INFORMATION: u8 = 26;
pub(crate) const PROPERTY_KEY_SERVER_REFERENCE: u8 = 28;
pub(crate) const PROPERTY_KEY_REASON_STRING: u8 = 31;
pub(crate) const PROPERTY_KEY_RECEIVE_MAXIMUM: u8 = 33;
pub(crate) const PROPERTY_KEY_TOPIC_ALIAS_MAXIMUM: u8 = 34;
pub(crate) const PROPERTY_KEY_TOPIC_ALIAS: u8 = 35;
pub(crate) const PROPERTY_KEY_MAXIMUM_QOS: u8 = 36;
pub(crate) const PROPERTY_KEY_RETAIN_AVAILABLE: u8 = 37;
pub(crate) const PROPERTY_KEY_USER_PROPERTY: u8 = 38;
pub(crate) const PROPERTY_KEY_MAXIMUM_PACKET_SIZE: u8 = 39;
pub(crate) const PROPERTY_KEY_WILDCARD_SUBSCRIPTIONS_AVAILABLE: u8 = 40;
pub(crate) const PROPERTY_KEY_SUBSCRIPTION_IDENTIFIERS_AVAILABLE: u8 = 41;
pub(crate) const PROPERTY_KEY_SHARED_SUBSCRIPTIONS_AVAILABLE: u8 = 42;

pub(crate) const PUBLISH_PACKET_FIXED_HEADER_DUPLICATE_FLAG : u8 = 8;
pub(crate) const PUBLISH_PACKET_FIXED_HEADER_RETAIN_FLAG : u8 = 1;
pub(crate) const QOS_MASK : u8 = 3;

pub(crate) const CONNECT_PACKET_CLEAN_START_FLAG_MASK : u8 = 1 << 1;
pub(crate) const CONNECT_PACKET_HAS_WILL_FLAG_MASK : u8 = 1 << 2;
pub(crate) const CONNECT_PACKET_WILL_QOS_FLAG_SHIFT : u8 = 3;
pub(crate) const CONNECT_PACKET_WILL_RETAIN_FLAG_MASK : u8 = 1 << 5;
pub(crate) const CONNECT_PACKET_HAS_PASSWORD_FLAG_MASK : u8 = 1 << 6;
pub(crate) const CONNECT_PACKET_HAS_USERNAME_FLAG_MASK : u8 = 1 << 7;

pub(crate) const CONNACK_SESSION_PRESENT_FLAG_MASK : u8 = 1;

pub(crate) const CONNECT_FIRST_BYTE : u8 = PACKET_TYPE_CONNECT << 4;
pub(crate) const CONNACK_FIRST_BYTE : u8 = PACKET_TYPE_CONNACK << 4;
pub(crate) const PUBACK_FIRST_BYTE : u8 = PACKET_TYPE_PUBACK << 4;
pub(crate) const PUBREC_FIRST_BYTE : u8 = PACKET_TYPE_PUBREC << 4;
pub(crate) const PUBREL_FIRST_BYTE : u8 = (PACKET_TYPE_PUBREL << 4) | (0x02u8);
pub(crate) const PUBCOMP_FIRST_BYTE : u8 = PACKET_TYPE_PUBCOMP << 4;
pub(crate) const SUBSCRIBE_FIRST_BYTE : u8 = (PACKET_TYPE_SUBSCRIBE << 4) | (0x02u8);
pub(crate) const SUBACK_FIRST_BYTE : u8 = PACKET_TYPE_SUBACK << 4;
pub(crate) const UNSUBSCRIBE_FIRST_BYTE : u8 = (PACKET_TYPE_UNSUBSCRIBE << 4) | (0x02u8);
pub(crate) const UNSUBACK_FIRST_BYTE : u8 = PACKET_TYPE_UNSUBACK << 4;
pub(crate) const PINGREQ_FIRST_BYTE : u8 = PACKET_TYPE_PINGREQ << 4;
pub(crate) const PINGRESP_FIRST_BYTE : u8 = PACKET_TYPE_PINGRESP << 4;
pub(crate) const DISCONNECT_FIRST_BYTE : u8 = PACKET_TYPE_DISCONNECT << 4;
pub(crate) const AUTH_FIRST_BYTE : u8 = PACKET_TYPE_AUTH << 4;

pub(crate) const SUBSCRIPTION_OPTIONS_NO_LOCAL_MASK : u8 = 1u8 << 2;
pub(crate) const SUBSCRIPTION_OPTIONS_RETAIN_AS_PUBLISHED_MASK : u8 = 1u8 << 3;
pub(crate) const SUBSCRIPTION_OPTIONS_RETAIN_HANDLING_SHIFT : u8 = 4;

pub(crate) const MQTT31_MAXIMUM_CLIENT_ID_LENGTH : usize = 23;

macro_rules! define_u8_to_enum_conversion {
    ($function_name: ident, $enum_type: ident, $label: expr, [ $( $variant: ident ),+ ]) => {
        pub(crate) fn $function_name(value: u8) -> MqttResult<$enum_type> {
            $(
                if value == $enum_type::$variant as u8 {
                    return Ok($enum_type::$variant);
                }
            )+

            error!("Packet Decode - invalid {} value: {}", $label, value);
            Err(MqttError::new_protocol_violation(format!("invalid {} value: {}", $label, value)))
        }
    };
}

define_u8_to_enum_conversion!(convert_u8_to_quality_of_service, QualityOfService, "qos",
    [AtMostOnce, AtLeastOnce, ExactlyOnce]);

define_u8_to_enum_conversion!(convert_u8_to_payload_format_indicator, PayloadFormatIndicator, "payload format indicator",
    [Bytes, Utf8]);

define_u8_to_enum_conversion!(convert_u8_to_retain_handling_type, RetainHandlingType, "retain handling type",
    [SendOnSubscribe, SendOnSubscribeIfNew, DontSend]);

define_u8_to_enum_conversion!(convert_u8_to_connect_reason_code, ConnectReasonCode, "connect reason code",
    [Success, UnspecifiedError, MalformedPacket, ProtocolError, ImplementationSpecificError, UnsupportedProtocolVersion,
     ClientIdentifierNotValid, BadUsernameOrPassword, NotAuthorized, ServerUnavailable, ServerBusy, Banned,
     BadAuthenticationMethod, TopicNameInvalid, PacketTooLarge, QuotaExceeded, PayloadFormatInvalid,
     RetainNotSupported, QosNotSupported, UseAnotherServer, ServerMoved, ConnectionRateExceeded]);

define_u8_to_enum_conversion!(convert_u8_to_puback_reason_code, PubackReasonCode, "puback reason code",
    [Success, NoMatchingSubscribers, UnspecifiedError, ImplementationSpecificError, NotAuthorized, TopicNameInvalid,
     PacketIdentifierInUse, QuotaExceeded, PayloadFormatInvalid]);

define_u8_to_enum_conversion!(convert_u8_to_pubrec_reason_code, PubrecReasonCode, "pubrec reason code",
    [Success, NoMatchingSubscribers, UnspecifiedError, ImplementationSpecificError, NotAuthorized, TopicNameInvalid,
     PacketIdentifierInUse, QuotaExceeded, PayloadFormatInvalid]);

define_u8_to_enum_conversion!(convert_u8_to_pubrel_reason_code, PubrelReasonCode, "pubrel reason code",
    [Success, PacketIdentifierNotFound]);

define_u8_to_enum_conversion!(convert_u8_to_pubcomp_reason_code, PubcompReasonCode, "pubcomp reason code",
    [Success, PacketIdentifierNotFound]);

define_u8_to_enum_conversion!(convert_u8_to_disconnect_reason_code, DisconnectReasonCode, "disconnect reason code",
    [NormalDisconnection, DisconnectWithWillMessage, UnspecifiedError, MalformedPacket, ProtocolError,
     ImplementationSpecificError, NotAuthorized, ServerBusy, ServerShuttingDown, KeepAliveTimeout, SessionTakenOver,
     TopicFilterInvalid, TopicNameInvalid, ReceiveMaximumExceeded, TopicAliasInvalid, PacketTooLarge,
     MessageRateTooHigh, QuotaExceeded, AdministrativeAction, PayloadFormatInvalid, RetainNotSupported,
     QosNotSupported, UseAnotherServer, ServerMoved, SharedSubscriptionsNotSupported, ConnectionRateExceeded,
     MaximumConnectTime, SubscriptionIdentifiersNotSupported, WildcardSubscriptionsNotSupported]);

define_u8_to_enum_conversion!(convert_u8_to_suback_reason_code, SubackReasonCode, "suback reason code",
    [GrantedQos0, GrantedQos1, GrantedQos2, UnspecifiedError, ImplementationSpecificError, NotAuthorized,
     TopicFilterInvalid, PacketIdentifierInUse, QuotaExceeded, SharedSubscriptionsNotSupported,
     SubscriptionIdentifiersNotSupported, WildcardSubscriptionsNotSupported]);

define_u8_to_enum_conversion!(convert_u8_to_suback_return_code_311, SubackReasonCode, "suback return code",
    [GrantedQos0, GrantedQos1, GrantedQos2, UnspecifiedError]);

define_u8_to_enum_conversion!(convert_u8_to_unsuback_reason_code, UnsubackReasonCode, "unsuback reason code",
    [Success, NoSubscriptionExisted, UnspecifiedError, ImplementationSpecificError, NotAuthorized,
     TopicFilterInvalid, PacketIdentifierInUse]);

define_u8_to_enum_conversion!(convert_u8_to_authenticate_reason_code, AuthenticateReasonCode, "authenticate reason code",
    [Success, ContinueAuthentication, ReAuthenticate]);

/// Maps an MQTT 3.x CONNACK return code onto the MQTT5 reason code space
pub(crate) fn convert_connect_return_code_311_to_reason_code(value: u8) -> MqttResult<ConnectReasonCode> {
    match value {
        0 => { Ok(ConnectReasonCode::Success) }
        1 => { Ok(ConnectReasonCode::UnsupportedProtocolVersion) }
        2 => { Ok(ConnectReasonCode::ClientIdentifierNotValid) }
        3 => { Ok(ConnectReasonCode::ServerUnavailable) }
        4 => { Ok(ConnectReasonCode::BadUsernameOrPassword) }
        5 => { Ok(ConnectReasonCode::NotAuthorized) }
        _ => {
            error!("Packet Decode - invalid connect return code value: {}", value);
            Err(MqttError::new_protocol_violation(format!("invalid connect return code value: {}", value)))
        }
    }
}

/// Maps an MQTT5 connect reason code onto the six MQTT 3.x return codes
pub(crate) fn convert_reason_code_to_connect_return_code_311(reason_code: ConnectReasonCode) -> MqttResult<u8> {
    match reason_code {
        ConnectReasonCode::Success => { Ok(0) }
        ConnectReasonCode::UnsupportedProtocolVersion => { Ok(1) }
        ConnectReasonCode::ClientIdentifierNotValid => { Ok(2) }
        ConnectReasonCode::ServerUnavailable => { Ok(3) }
        ConnectReasonCode::BadUsernameOrPassword => { Ok(4) }
        ConnectReasonCode::NotAuthorized => { Ok(5) }
        _ => {
            Err(MqttError::new_protocol_violation(format!("connect reason code {:?} has no MQTT 3.x equivalent", reason_code)))
        }
    }
}

pub(crate) fn convert_u8_to_packet_type(packet_type: u8) -> Option<PacketType> {
    match packet_type {
        PACKET_TYPE_CONNECT => { Some(PacketType::Connect) }
        PACKET_TYPE_CONNACK => { Some(PacketType::Connack) }
        PACKET_TYPE_PUBLISH => { Some(PacketType::Publish) }
        PACKET_TYPE_PUBACK => { Some(PacketType::Puback) }
        PACKET_TYPE_PUBREC => { Some(PacketType::Pubrec) }
        PACKET_TYPE_PUBREL => { Some(PacketType::Pubrel) }
        PACKET_TYPE_PUBCOMP => { Some(PacketType::Pubcomp) }
        PACKET_TYPE_SUBSCRIBE => { Some(PacketType::Subscribe) }
        PACKET_TYPE_SUBACK => { Some(PacketType::Suback) }
        PACKET_TYPE_UNSUBSCRIBE => { Some(PacketType::Unsubscribe) }
        PACKET_TYPE_UNSUBACK => { Some(PacketType::Unsuback) }
        PACKET_TYPE_PINGREQ => { Some(PacketType::Pingreq) }
        PACKET_TYPE_PINGRESP => { Some(PacketType::Pingresp) }
        PACKET_TYPE_DISCONNECT => { Some(PacketType::Disconnect) }
        PACKET_TYPE_AUTH => { Some(PacketType::Auth) }
        _ => { None }
    }
}

pub(crate) fn mqtt_packet_to_packet_type(packet: &MqttPacket) -> PacketType {
    match packet {
        MqttPacket::Connect(_) => { PacketType::Connect }
        MqttPacket::Connack(_) => { PacketType::Connack }
        MqttPacket::Publish(_) => { PacketType::Publish}
        MqttPacket::Puback(_) => { PacketType::Puback }
        MqttPacket::Pubrec(_) => { PacketType::Pubrec }
        MqttPacket::Pubrel(_) => { PacketType::Pubrel }
        MqttPacket::Pubcomp(_) => { PacketType::Pubcomp }
        MqttPacket::Subscribe(_) => { PacketType::Subscribe }
        MqttPacket::Suback(_) => { PacketType::Suback }
        MqttPacket::Unsubscribe(_) => { PacketType::Unsubscribe }
        MqttPacket::Unsuback(_) => { PacketType::Unsuback }
        MqttPacket::Pingreq(_) => { PacketType::Pingreq }
        MqttPacket::Pingresp(_) => { PacketType::Pingresp }
        MqttPacket::Disconnect(_) => { PacketType::Disconnect }
        MqttPacket::Auth(_) => { PacketType::Auth }
    }
}

pub(crate) fn mqtt_packet_to_str(packet: &MqttPacket) -> &'static str {
    match packet {
        MqttPacket::Connect(_) => { "CONNECT" }
        MqttPacket::Connack(_) => { "CONNACK" }
        MqttPacket::Publish(_) => { "PUBLISH" }
        MqttPacket::Puback(_) => { "PUBACK" }
        MqttPacket::Pubrec(_) => { "PUBREC" }
        MqttPacket::Pubrel(_) => { "PUBREL" }
        MqttPacket::Pubcomp(_) => { "PUBCOMP" }
        MqttPacket::Subscribe(_) => { "SUBSCRIBE" }
        MqttPacket::Suback(_) => { "SUBACK" }
        MqttPacket::Unsubscribe(_) => { "UNSUBSCRIBE" }
        MqttPacket::Unsuback(_) => { "UNSUBACK" }
        MqttPacket::Pingreq(_) => { "PINGREQ" }
        MqttPacket::Pingresp(_) => { "PINGRESP" }
        MqttPacket::Disconnect(_) => { "DISCONNECT" }
        MqttPacket::Auth(_) => { "AUTH" }
    }
}
