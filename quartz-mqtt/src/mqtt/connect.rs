/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::decode::detect_protocol_version;
use crate::decode::utils::*;
use crate::encode::utils::*;
use crate::error::{MqttError, MqttResult};
use crate::logging::*;
use crate::mqtt::*;
use crate::mqtt::utils::*;
use crate::validate::utils::*;

use log::*;
use std::fmt;

const CONNECT_PACKET_RESERVED_FLAG_MASK : u8 = 1;

fn compute_connect_flags(packet: &ConnectPacket) -> u8 {
    let mut flags: u8 = 0;
    if packet.clean_start {
        flags |= CONNECT_PACKET_CLEAN_START_FLAG_MASK;
    }

    if let Some(will) = &packet.will {
        flags |= CONNECT_PACKET_HAS_WILL_FLAG_MASK;
        flags |= (will.qos as u8) << CONNECT_PACKET_WILL_QOS_FLAG_SHIFT;
        if will.retain {
            flags |= CONNECT_PACKET_WILL_RETAIN_FLAG_MASK;
        }
    }

    if packet.password.is_some() {
        flags |= CONNECT_PACKET_HAS_PASSWORD_FLAG_MASK;
    }

    if packet.username.is_some() {
        flags |= CONNECT_PACKET_HAS_USERNAME_FLAG_MASK;
    }

    flags
}

fn write_connect_properties(packet: &ConnectPacket, dest: &mut Vec<u8>) -> MqttResult<()> {
    encode_properties(dest, |properties| {
        encode_optional_u32_property(PROPERTY_KEY_SESSION_EXPIRY_INTERVAL, packet.session_expiry_interval_seconds, properties);
        encode_optional_u16_property(PROPERTY_KEY_RECEIVE_MAXIMUM, packet.receive_maximum, properties);
        encode_optional_u32_property(PROPERTY_KEY_MAXIMUM_PACKET_SIZE, packet.maximum_packet_size_bytes, properties);
        encode_optional_u16_property(PROPERTY_KEY_TOPIC_ALIAS_MAXIMUM, packet.topic_alias_maximum, properties);
        encode_optional_bool_property(PROPERTY_KEY_REQUEST_RESPONSE_INFORMATION, packet.request_response_information, properties);
        encode_optional_bool_property(PROPERTY_KEY_REQUEST_PROBLEM_INFORMATION, packet.request_problem_information, properties);
        encode_user_properties(&packet.user_properties, properties)?;
        encode_optional_string_property(PROPERTY_KEY_AUTHENTICATION_METHOD, &packet.authentication_method, properties)?;
        encode_optional_bytes_property(PROPERTY_KEY_AUTHENTICATION_DATA, &packet.authentication_data, properties)
    })
}

fn write_will_properties(packet: &ConnectPacket, will: &ApplicationMessage, dest: &mut Vec<u8>) -> MqttResult<()> {
    encode_properties(dest, |properties| {
        encode_optional_u32_property(PROPERTY_KEY_WILL_DELAY_INTERVAL, packet.will_delay_interval_seconds, properties);
        encode_optional_u8_property(PROPERTY_KEY_PAYLOAD_FORMAT_INDICATOR, will.payload_format.map(|format| format as u8), properties);
        encode_optional_u32_property(PROPERTY_KEY_MESSAGE_EXPIRY_INTERVAL, will.message_expiry_interval_seconds, properties);
        encode_optional_string_property(PROPERTY_KEY_CONTENT_TYPE, &will.content_type, properties)?;
        encode_optional_string_property(PROPERTY_KEY_RESPONSE_TOPIC, &will.response_topic, properties)?;
        encode_optional_bytes_property(PROPERTY_KEY_CORRELATION_DATA, &will.correlation_data, properties)?;
        encode_user_properties(&will.user_properties, properties)
    })
}

pub(crate) fn write_connect_packet(packet: &ConnectPacket, version: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
    encode_length_prefixed_string(version.protocol_name(), dest)?;
    encode_u8(version.protocol_level(), dest);
    encode_u8(compute_connect_flags(packet), dest);
    encode_u16(packet.keep_alive_interval_seconds, dest);

    if version.is_mqtt5() {
        write_connect_properties(packet, dest)?;
    }

    encode_length_prefixed_string(&packet.client_id, dest)?;

    if let Some(will) = &packet.will {
        if version.is_mqtt5() {
            write_will_properties(packet, will, dest)?;
        }

        encode_length_prefixed_string(&will.topic, dest)?;
        encode_length_prefixed_bytes(&will.payload, dest)?;
    }

    if let Some(username) = &packet.username {
        encode_length_prefixed_string(username, dest)?;
    }

    if let Some(password) = &packet.password {
        encode_length_prefixed_bytes(password, dest)?;
    }

    Ok(CONNECT_FIRST_BYTE)
}

fn decode_connect_properties(property_bytes: &[u8], packet : &mut ConnectPacket) -> MqttResult<()> {
    let mut mutable_property_bytes = property_bytes;

    while !mutable_property_bytes.is_empty() {
        let property_key = mutable_property_bytes[0];
        mutable_property_bytes = &mutable_property_bytes[1..];

        match property_key {
            PROPERTY_KEY_SESSION_EXPIRY_INTERVAL => { mutable_property_bytes = decode_optional_u32(mutable_property_bytes, &mut packet.session_expiry_interval_seconds)?; }
            PROPERTY_KEY_RECEIVE_MAXIMUM => { mutable_property_bytes = decode_optional_u16(mutable_property_bytes, &mut packet.receive_maximum)?; }
            PROPERTY_KEY_MAXIMUM_PACKET_SIZE => { mutable_property_bytes = decode_optional_u32(mutable_property_bytes, &mut packet.maximum_packet_size_bytes)?; }
            PROPERTY_KEY_TOPIC_ALIAS_MAXIMUM => { mutable_property_bytes = decode_optional_u16(mutable_property_bytes, &mut packet.topic_alias_maximum)?; }
            PROPERTY_KEY_REQUEST_RESPONSE_INFORMATION => { mutable_property_bytes = decode_optional_u8_as_bool(mutable_property_bytes, &mut packet.request_response_information)?; }
            PROPERTY_KEY_REQUEST_PROBLEM_INFORMATION => { mutable_property_bytes = decode_optional_u8_as_bool(mutable_property_bytes, &mut packet.request_problem_information)?; }
            PROPERTY_KEY_USER_PROPERTY => { mutable_property_bytes = decode_user_property(mutable_property_bytes, &mut packet.user_properties)?; }
            PROPERTY_KEY_AUTHENTICATION_METHOD => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut packet.authentication_method)?; }
            PROPERTY_KEY_AUTHENTICATION_DATA => { mutable_property_bytes = decode_optional_length_prefixed_bytes(mutable_property_bytes, &mut packet.authentication_data)?; }
            _ => {
                return Err(fail_on_unknown_property(property_key, "Connect"));
            }
        }
    }

    Ok(())
}

fn decode_will_properties(property_bytes: &[u8], will: &mut ApplicationMessage, packet : &mut ConnectPacket) -> MqttResult<()> {
    let mut mutable_property_bytes = property_bytes;

    while !mutable_property_bytes.is_empty() {
        let property_key = mutable_property_bytes[0];
        mutable_property_bytes = &mutable_property_bytes[1..];

        match property_key {
            PROPERTY_KEY_WILL_DELAY_INTERVAL => { mutable_property_bytes = decode_optional_u32(mutable_property_bytes, &mut packet.will_delay_interval_seconds)?; }
            PROPERTY_KEY_PAYLOAD_FORMAT_INDICATOR => { mutable_property_bytes = decode_optional_u8_as_enum(mutable_property_bytes, &mut will.payload_format, convert_u8_to_payload_format_indicator)?; }
            PROPERTY_KEY_MESSAGE_EXPIRY_INTERVAL => { mutable_property_bytes = decode_optional_u32(mutable_property_bytes, &mut will.message_expiry_interval_seconds)?; }
            PROPERTY_KEY_CONTENT_TYPE => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut will.content_type)?; }
            PROPERTY_KEY_RESPONSE_TOPIC => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut will.response_topic)?; }
            PROPERTY_KEY_CORRELATION_DATA => { mutable_property_bytes = decode_optional_length_prefixed_bytes(mutable_property_bytes, &mut will.correlation_data)?; }
            PROPERTY_KEY_USER_PROPERTY => { mutable_property_bytes = decode_user_property(mutable_property_bytes, &mut will.user_properties)?; }
            _ => {
                return Err(fail_on_unknown_property(property_key, "Connect Will"));
            }
        }
    }

    Ok(())
}

/// Decodes a CONNECT body.  The protocol version is taken from the packet itself rather than the
/// connection, since a server does not know it until the CONNECT arrives.
pub(crate) fn decode_connect_packet(packet_body: &[u8]) -> MqttResult<MqttPacket> {
    let version = detect_protocol_version(packet_body)?;

    let mut packet = ConnectPacket {
        protocol_version: version,
        ..Default::default()
    };

    let mut mutable_body = packet_body;

    let mut protocol_name = String::new();
    mutable_body = decode_length_prefixed_string(mutable_body, &mut protocol_name)?;

    let mut protocol_level : u8 = 0;
    mutable_body = decode_u8(mutable_body, &mut protocol_level)?;

    let mut connect_flags : u8 = 0;
    mutable_body = decode_u8(mutable_body, &mut connect_flags)?;
    if (connect_flags & CONNECT_PACKET_RESERVED_FLAG_MASK) != 0 {
        error!("ConnectPacket Decode - reserved connect flag set");
        return Err(MqttError::new_protocol_violation("connect reserved flag set"));
    }

    packet.clean_start = (connect_flags & CONNECT_PACKET_CLEAN_START_FLAG_MASK) != 0;
    let has_will = (connect_flags & CONNECT_PACKET_HAS_WILL_FLAG_MASK) != 0;
    let will_retain = (connect_flags & CONNECT_PACKET_WILL_RETAIN_FLAG_MASK) != 0;
    let will_qos = convert_u8_to_quality_of_service((connect_flags >> CONNECT_PACKET_WILL_QOS_FLAG_SHIFT) & QOS_MASK)?;

    if !has_will && (will_retain || will_qos != QualityOfService::AtMostOnce) {
        error!("ConnectPacket Decode - will flags set without a will");
        return Err(MqttError::new_protocol_violation("will flags set without a will"));
    }

    mutable_body = decode_u16(mutable_body, &mut packet.keep_alive_interval_seconds)?;

    if version.is_mqtt5() {
        let (properties, remaining) = decode_property_block(mutable_body, "Connect")?;
        decode_connect_properties(properties, &mut packet)?;
        mutable_body = remaining;
    }

    mutable_body = decode_length_prefixed_string(mutable_body, &mut packet.client_id)?;

    if has_will {
        let mut will = ApplicationMessage {
            qos: will_qos,
            retain: will_retain,
            ..Default::default()
        };

        if version.is_mqtt5() {
            let (properties, remaining) = decode_property_block(mutable_body, "Connect")?;
            decode_will_properties(properties, &mut will, &mut packet)?;
            mutable_body = remaining;
        }

        mutable_body = decode_length_prefixed_string(mutable_body, &mut will.topic)?;
        mutable_body = decode_length_prefixed_bytes(mutable_body, &mut will.payload)?;

        packet.will = Some(will);
    }

    if (connect_flags & CONNECT_PACKET_HAS_USERNAME_FLAG_MASK) != 0 {
        let mut username = String::new();
        mutable_body = decode_length_prefixed_string(mutable_body, &mut username)?;
        packet.username = Some(username);
    }

    if (connect_flags & CONNECT_PACKET_HAS_PASSWORD_FLAG_MASK) != 0 {
        let mut password = Vec::new();
        mutable_body = decode_length_prefixed_bytes(mutable_body, &mut password)?;
        packet.password = Some(password);
    }

    expect_fully_consumed(mutable_body, "Connect")?;

    Ok(MqttPacket::Connect(packet))
}

fn validate_client_id(packet: &ConnectPacket, version: ProtocolVersion) -> MqttResult<()> {
    match version {
        ProtocolVersion::Mqtt31 => {
            if packet.client_id.is_empty() || packet.client_id.chars().count() > MQTT31_MAXIMUM_CLIENT_ID_LENGTH {
                return Err(validation_failure("Connect", "MQTT 3.1 client ids must be between 1 and 23 characters"));
            }
        }
        ProtocolVersion::Mqtt311 => {
            if packet.client_id.is_empty() && !packet.clean_start {
                return Err(validation_failure("Connect", "an empty client id requires a clean session"));
            }
        }
        ProtocolVersion::Mqtt5 => {}
    }

    validate_string_length(&packet.client_id, "Connect", "client_id")
}

fn validate_will(will: &ApplicationMessage, version: ProtocolVersion) -> MqttResult<()> {
    if !is_valid_topic(&will.topic) {
        return Err(validation_failure("Connect", "will topic is empty or not a valid topic"));
    }

    if will.payload.len() > MAXIMUM_BINARY_PROPERTY_LENGTH {
        return Err(validation_failure("Connect", "will payload too long"));
    }

    validate_optional_string_length(&will.content_type, "Connect", "will content_type")?;
    validate_optional_string_length(&will.response_topic, "Connect", "will response_topic")?;
    validate_optional_binary_length(&will.correlation_data, "Connect", "will correlation_data")?;
    validate_user_properties(&will.user_properties, version, "Connect")?;

    Ok(())
}

pub(crate) fn validate_connect_packet_outbound(packet: &ConnectPacket, version: ProtocolVersion) -> MqttResult<()> {
    if packet.protocol_version != version {
        return Err(validation_failure("Connect", "packet protocol version does not match the connection"));
    }

    validate_client_id(packet, version)?;

    if !version.is_mqtt5() && packet.password.is_some() && packet.username.is_none() {
        return Err(validation_failure("Connect", "a password requires a username"));
    }

    if packet.receive_maximum == Some(0) {
        return Err(validation_failure("Connect", "receive maximum may not be zero"));
    }

    if packet.maximum_packet_size_bytes == Some(0) {
        return Err(validation_failure("Connect", "maximum packet size may not be zero"));
    }

    if packet.authentication_data.is_some() && packet.authentication_method.is_none() {
        return Err(validation_failure("Connect", "authentication data requires an authentication method"));
    }

    validate_optional_string_length(&packet.username, "Connect", "username")?;
    validate_optional_binary_length(&packet.password, "Connect", "password")?;
    validate_optional_string_length(&packet.authentication_method, "Connect", "authentication_method")?;
    validate_optional_binary_length(&packet.authentication_data, "Connect", "authentication_data")?;
    validate_user_properties(&packet.user_properties, version, "Connect")?;

    if let Some(will) = &packet.will {
        validate_will(will, version)?;
    }

    Ok(())
}

impl fmt::Display for ConnectPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConnectPacket {{")?;
        log_primitive_value!(self.protocol_version, f, "protocol_version");
        log_string!(self.client_id, f, "client_id");
        log_primitive_value!(self.keep_alive_interval_seconds, f, "keep_alive_interval_seconds");
        log_primitive_value!(self.clean_start, f, "clean_start");
        log_optional_string_sensitive!(self.username, f, "username");
        log_optional_binary_data_sensitive!(self.password, f, "password");
        log_optional_primitive_value!(self.session_expiry_interval_seconds, f, "session_expiry_interval_seconds", value);
        log_optional_primitive_value!(self.request_response_information, f, "request_response_information", value);
        log_optional_primitive_value!(self.request_problem_information, f, "request_problem_information", value);
        log_optional_primitive_value!(self.receive_maximum, f, "receive_maximum", value);
        log_optional_primitive_value!(self.topic_alias_maximum, f, "topic_alias_maximum", value);
        log_optional_primitive_value!(self.maximum_packet_size_bytes, f, "maximum_packet_size_bytes", value);
        log_optional_string!(self.authentication_method, f, "authentication_method", value);
        log_optional_binary_data_sensitive!(self.authentication_data, f, "authentication_data");
        log_user_properties!(self.user_properties, f, "user_properties", value);
        log_optional_primitive_value!(self.will_delay_interval_seconds, f, "will_delay_interval_seconds", value);
        if let Some(will) = &self.will {
            write!(f, " will: {{{} }}", will)?;
        }

        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::decode::testing::*;
    use crate::validate::testing::*;

    fn create_connect_packet(version: ProtocolVersion) -> ConnectPacket {
        ConnectPacket {
            protocol_version: version,
            keep_alive_interval_seconds: 1200,
            clean_start: true,
            client_id: "MyClient".to_string(),
            username: Some("Myself".to_string()),
            password: Some("Secret".as_bytes().to_vec()),
            ..Default::default()
        }
    }

    fn create_all_properties_connect_packet() -> ConnectPacket {
        ConnectPacket {
            protocol_version: ProtocolVersion::Mqtt5,
            keep_alive_interval_seconds: 3600,
            clean_start: false,
            client_id: "AllPropertiesClient".to_string(),
            username: Some("admin".to_string()),
            password: Some("Don't look".as_bytes().to_vec()),
            session_expiry_interval_seconds: Some(0x1234ABCD),
            request_response_information: Some(true),
            request_problem_information: Some(false),
            receive_maximum: Some(1000),
            topic_alias_maximum: Some(2),
            maximum_packet_size_bytes: Some(128 * 1024),
            authentication_method: Some("Kerberos".to_string()),
            authentication_data: Some("Joe Mama".as_bytes().to_vec()),
            will_delay_interval_seconds: Some(1u32 << 24),
            will: Some(ApplicationMessage::builder("in/rememberance", QualityOfService::ExactlyOnce)
                .with_retain(true)
                .with_payload("I'll be back".as_bytes())
                .with_payload_format(PayloadFormatIndicator::Utf8)
                .with_message_expiry_interval_seconds(65536)
                .with_content_type("barbecue")
                .with_response_topic("side/dish")
                .with_correlation_data("ribs".as_bytes())
                .with_user_properties(create_user_properties())
                .build()),
            user_properties: Some(vec!(UserProperty::new("Gimme", "Money"))),
        }
    }

    #[test]
    fn connect_round_trip_encode_decode_basic() {
        for version in [ProtocolVersion::Mqtt31, ProtocolVersion::Mqtt311, ProtocolVersion::Mqtt5] {
            let packet = create_connect_packet(version);
            assert!(do_round_trip_encode_decode_test(&MqttPacket::Connect(packet), version));
        }
    }

    #[test]
    fn connect_round_trip_encode_decode_will_311() {
        let mut packet = create_connect_packet(ProtocolVersion::Mqtt311);
        packet.will = Some(ApplicationMessage::builder("last/words", QualityOfService::AtLeastOnce)
            .with_payload("goodbye".as_bytes())
            .with_retain(true)
            .build());

        assert!(do_round_trip_encode_decode_test(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt311));
    }

    #[test]
    fn connect_round_trip_encode_decode_all_properties() {
        let packet = create_all_properties_connect_packet();
        assert!(do_round_trip_encode_decode_test(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt5));
    }

    #[test]
    fn connect_31_uses_legacy_protocol_name() {
        let packet = create_connect_packet(ProtocolVersion::Mqtt31);
        let encoded = encode_packet_for_test(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt31);

        assert_eq!(&[0u8, 6, b'M', b'Q', b'I', b's', b'd', b'p', 3], &encoded[2..11]);
    }

    #[test]
    fn connect_decode_failure_reserved_flag() {
        let packet = create_connect_packet(ProtocolVersion::Mqtt311);

        let set_reserved_flag = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();

            // fixed header (2) + protocol name (6) + level (1)
            clone[9] |= CONNECT_PACKET_RESERVED_FLAG_MASK;
            clone
        };

        do_mutated_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt311, set_reserved_flag);
    }

    #[test]
    fn connect_decode_failure_bad_protocol_level() {
        let packet = create_connect_packet(ProtocolVersion::Mqtt311);

        let corrupt_level = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone[8] = 6;
            clone
        };

        do_mutated_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt311, corrupt_level);
    }

    #[test]
    fn connect_decode_failure_will_qos_3() {
        let mut packet = create_connect_packet(ProtocolVersion::Mqtt311);
        packet.will = Some(ApplicationMessage::builder("will", QualityOfService::AtMostOnce).build());

        let set_will_qos_3 = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone[9] |= 3 << CONNECT_PACKET_WILL_QOS_FLAG_SHIFT;
            clone
        };

        do_mutated_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt311, set_will_qos_3);
    }

    #[test]
    fn connect_validate_failure_password_without_username() {
        let mut packet = create_connect_packet(ProtocolVersion::Mqtt311);
        packet.username = None;
        verify_validation_failure(&MqttPacket::Connect(packet.clone()), ProtocolVersion::Mqtt311);

        packet.protocol_version = ProtocolVersion::Mqtt5;
        assert!(crate::validate::validate_packet_outbound(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt5).is_ok());
    }

    #[test]
    fn connect_validate_failure_client_id_rules() {
        let mut packet = create_connect_packet(ProtocolVersion::Mqtt311);
        packet.client_id = String::new();
        packet.clean_start = false;
        verify_validation_failure(&MqttPacket::Connect(packet.clone()), ProtocolVersion::Mqtt311);

        packet.clean_start = true;
        assert!(crate::validate::validate_packet_outbound(&MqttPacket::Connect(packet.clone()), ProtocolVersion::Mqtt311).is_ok());

        packet.protocol_version = ProtocolVersion::Mqtt31;
        verify_validation_failure(&MqttPacket::Connect(packet.clone()), ProtocolVersion::Mqtt31);

        packet.client_id = "a".repeat(24);
        verify_validation_failure(&MqttPacket::Connect(packet.clone()), ProtocolVersion::Mqtt31);

        packet.client_id = "a".repeat(23);
        assert!(crate::validate::validate_packet_outbound(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt31).is_ok());
    }

    #[test]
    fn connect_validate_failure_will_topic() {
        let mut packet = create_connect_packet(ProtocolVersion::Mqtt5);
        packet.will = Some(ApplicationMessage::builder("", QualityOfService::AtMostOnce).build());
        verify_validation_failure(&MqttPacket::Connect(packet.clone()), ProtocolVersion::Mqtt5);

        packet.will = Some(ApplicationMessage::builder("will/#", QualityOfService::AtMostOnce).build());
        verify_validation_failure(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt5);
    }

    #[test]
    fn connect_validate_failure_user_properties_311() {
        let mut packet = create_all_properties_connect_packet();
        packet.protocol_version = ProtocolVersion::Mqtt311;
        verify_validation_failure(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt311);
    }

    #[test]
    fn connect_validate_failure_version_mismatch() {
        let packet = create_connect_packet(ProtocolVersion::Mqtt5);
        verify_validation_failure(&MqttPacket::Connect(packet), ProtocolVersion::Mqtt311);
    }
}
