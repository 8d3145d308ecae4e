/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::decode::utils::*;
use crate::encode::utils::*;
use crate::error::{MqttError, MqttResult};
use crate::logging::*;
use crate::mqtt::*;
use crate::mqtt::utils::*;
use crate::validate::utils::*;

use log::*;
use std::fmt;

pub(crate) fn write_connack_packet(packet: &ConnackPacket, version: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
    // MQTT 3.1 has no session present flag
    let session_present = packet.session_present && version != ProtocolVersion::Mqtt31;
    encode_u8(if session_present { CONNACK_SESSION_PRESENT_FLAG_MASK } else { 0 }, dest);

    if !version.is_mqtt5() {
        encode_u8(convert_reason_code_to_connect_return_code_311(packet.reason_code)?, dest);
        return Ok(CONNACK_FIRST_BYTE);
    }

    encode_u8(packet.reason_code as u8, dest);
    encode_properties(dest, |properties| {
        encode_optional_u32_property(PROPERTY_KEY_SESSION_EXPIRY_INTERVAL, packet.session_expiry_interval, properties);
        encode_optional_u16_property(PROPERTY_KEY_RECEIVE_MAXIMUM, packet.receive_maximum, properties);
        encode_optional_u8_property(PROPERTY_KEY_MAXIMUM_QOS, packet.maximum_qos.map(|qos| qos as u8), properties);
        encode_optional_bool_property(PROPERTY_KEY_RETAIN_AVAILABLE, packet.retain_available, properties);
        encode_optional_u32_property(PROPERTY_KEY_MAXIMUM_PACKET_SIZE, packet.maximum_packet_size, properties);
        encode_optional_string_property(PROPERTY_KEY_ASSIGNED_CLIENT_IDENTIFIER, &packet.assigned_client_identifier, properties)?;
        encode_optional_u16_property(PROPERTY_KEY_TOPIC_ALIAS_MAXIMUM, packet.topic_alias_maximum, properties);
        encode_optional_string_property(PROPERTY_KEY_REASON_STRING, &packet.reason_string, properties)?;
        encode_user_properties(&packet.user_properties, properties)?;
        encode_optional_bool_property(PROPERTY_KEY_WILDCARD_SUBSCRIPTIONS_AVAILABLE, packet.wildcard_subscriptions_available, properties);
        encode_optional_bool_property(PROPERTY_KEY_SUBSCRIPTION_IDENTIFIERS_AVAILABLE, packet.subscription_identifiers_available, properties);
        encode_optional_bool_property(PROPERTY_KEY_SHARED_SUBSCRIPTIONS_AVAILABLE, packet.shared_subscriptions_available, properties);
        encode_optional_u16_property(PROPERTY_KEY_SERVER_KEEP_ALIVE, packet.server_keep_alive, properties);
        encode_optional_string_property(PROPERTY_KEY_RESPONSE_INFORMATION, &packet.response_information, properties)?;
        encode_optional_string_property(PROPERTY_KEY_SERVER_REFERENCE, &packet.server_reference, properties)?;
        encode_optional_string_property(PROPERTY_KEY_AUTHENTICATION_METHOD, &packet.authentication_method, properties)?;
        encode_optional_bytes_property(PROPERTY_KEY_AUTHENTICATION_DATA, &packet.authentication_data, properties)
    })?;

    Ok(CONNACK_FIRST_BYTE)
}

fn decode_connack_properties(property_bytes: &[u8], packet : &mut ConnackPacket) -> MqttResult<()> {
    let mut mutable_property_bytes = property_bytes;

    while !mutable_property_bytes.is_empty() {
        let property_key = mutable_property_bytes[0];
        mutable_property_bytes = &mutable_property_bytes[1..];

        match property_key {
            PROPERTY_KEY_SESSION_EXPIRY_INTERVAL => { mutable_property_bytes = decode_optional_u32(mutable_property_bytes, &mut packet.session_expiry_interval)?; }
            PROPERTY_KEY_RECEIVE_MAXIMUM => { mutable_property_bytes = decode_optional_u16(mutable_property_bytes, &mut packet.receive_maximum)?; }
            PROPERTY_KEY_MAXIMUM_QOS => { mutable_property_bytes = decode_optional_u8_as_enum(mutable_property_bytes, &mut packet.maximum_qos, convert_u8_to_quality_of_service)?; }
            PROPERTY_KEY_RETAIN_AVAILABLE => { mutable_property_bytes = decode_optional_u8_as_bool(mutable_property_bytes, &mut packet.retain_available)?; }
            PROPERTY_KEY_MAXIMUM_PACKET_SIZE => { mutable_property_bytes = decode_optional_u32(mutable_property_bytes, &mut packet.maximum_packet_size)?; }
            PROPERTY_KEY_ASSIGNED_CLIENT_IDENTIFIER => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut packet.assigned_client_identifier)?; }
            PROPERTY_KEY_TOPIC_ALIAS_MAXIMUM => { mutable_property_bytes = decode_optional_u16(mutable_property_bytes, &mut packet.topic_alias_maximum)?; }
            PROPERTY_KEY_REASON_STRING => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut packet.reason_string)?; }
            PROPERTY_KEY_USER_PROPERTY => { mutable_property_bytes = decode_user_property(mutable_property_bytes, &mut packet.user_properties)?; }
            PROPERTY_KEY_WILDCARD_SUBSCRIPTIONS_AVAILABLE => { mutable_property_bytes = decode_optional_u8_as_bool(mutable_property_bytes, &mut packet.wildcard_subscriptions_available)?; }
            PROPERTY_KEY_SUBSCRIPTION_IDENTIFIERS_AVAILABLE => { mutable_property_bytes = decode_optional_u8_as_bool(mutable_property_bytes, &mut packet.subscription_identifiers_available)?; }
            PROPERTY_KEY_SHARED_SUBSCRIPTIONS_AVAILABLE => { mutable_property_bytes = decode_optional_u8_as_bool(mutable_property_bytes, &mut packet.shared_subscriptions_available)?; }
            PROPERTY_KEY_SERVER_KEEP_ALIVE => { mutable_property_bytes = decode_optional_u16(mutable_property_bytes, &mut packet.server_keep_alive)?; }
            PROPERTY_KEY_RESPONSE_INFORMATION => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut packet.response_information)?; }
            PROPERTY_KEY_SERVER_REFERENCE => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut packet.server_reference)?; }
            PROPERTY_KEY_AUTHENTICATION_METHOD => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut packet.authentication_method)?; }
            PROPERTY_KEY_AUTHENTICATION_DATA => { mutable_property_bytes = decode_optional_length_prefixed_bytes(mutable_property_bytes, &mut packet.authentication_data)?; }
            _ => {
                return Err(fail_on_unknown_property(property_key, "Connack"));
            }
        }
    }

    Ok(())
}

pub(crate) fn decode_connack_packet(packet_body: &[u8], version: ProtocolVersion) -> MqttResult<MqttPacket> {
    let mut packet = ConnackPacket::default();
    let mut mutable_body = packet_body;

    let mut flags : u8 = 0;
    mutable_body = decode_u8(mutable_body, &mut flags)?;
    if (flags & !CONNACK_SESSION_PRESENT_FLAG_MASK) != 0 {
        error!("ConnackPacket Decode - reserved acknowledge flags set");
        return Err(MqttError::new_protocol_violation("connack reserved flags set"));
    }

    packet.session_present = (flags & CONNACK_SESSION_PRESENT_FLAG_MASK) != 0;

    if version.is_mqtt5() {
        mutable_body = decode_u8_as_enum(mutable_body, &mut packet.reason_code, convert_u8_to_connect_reason_code)?;
        let (properties, remaining) = decode_property_block(mutable_body, "Connack")?;
        decode_connack_properties(properties, &mut packet)?;
        mutable_body = remaining;
    } else {
        mutable_body = decode_u8_as_enum(mutable_body, &mut packet.reason_code, convert_connect_return_code_311_to_reason_code)?;
    }

    expect_fully_consumed(mutable_body, "Connack")?;

    Ok(MqttPacket::Connack(packet))
}

pub(crate) fn validate_connack_packet_outbound(packet: &ConnackPacket, version: ProtocolVersion) -> MqttResult<()> {
    validate_optional_string_length(&packet.assigned_client_identifier, "Connack", "assigned_client_identifier")?;
    validate_optional_string_length(&packet.reason_string, "Connack", "reason_string")?;
    validate_optional_string_length(&packet.response_information, "Connack", "response_information")?;
    validate_optional_string_length(&packet.server_reference, "Connack", "server_reference")?;
    validate_optional_string_length(&packet.authentication_method, "Connack", "authentication_method")?;
    validate_optional_binary_length(&packet.authentication_data, "Connack", "authentication_data")?;
    validate_user_properties(&packet.user_properties, version, "Connack")?;

    Ok(())
}

impl fmt::Display for ConnackPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConnackPacket {{")?;
        log_primitive_value!(self.session_present, f, "session_present");
        log_enum!(self.reason_code, f, "reason_code");
        log_optional_primitive_value!(self.session_expiry_interval, f, "session_expiry_interval", value);
        log_optional_primitive_value!(self.receive_maximum, f, "receive_maximum", value);
        log_optional_enum!(self.maximum_qos, f, "maximum_qos", value);
        log_optional_primitive_value!(self.retain_available, f, "retain_available", value);
        log_optional_primitive_value!(self.maximum_packet_size, f, "maximum_packet_size", value);
        log_optional_string!(self.assigned_client_identifier, f, "assigned_client_identifier", value);
        log_optional_primitive_value!(self.topic_alias_maximum, f, "topic_alias_maximum", value);
        log_optional_string!(self.reason_string, f, "reason_string", value);
        log_user_properties!(self.user_properties, f, "user_properties", value);
        log_optional_primitive_value!(self.wildcard_subscriptions_available, f, "wildcard_subscriptions_available", value);
        log_optional_primitive_value!(self.subscription_identifiers_available, f, "subscription_identifiers_available", value);
        log_optional_primitive_value!(self.shared_subscriptions_available, f, "shared_subscriptions_available", value);
        log_optional_primitive_value!(self.server_keep_alive, f, "server_keep_alive", value);
        log_optional_string!(self.response_information, f, "response_information", value);
        log_optional_string!(self.server_reference, f, "server_reference", value);
        log_optional_string!(self.authentication_method, f, "authentication_method", value);
        log_optional_binary_data_sensitive!(self.authentication_data, f, "authentication_data");
        write!(f, " }}")
    }
}
