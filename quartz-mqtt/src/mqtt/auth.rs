/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::decode::utils::*;
use crate::encode::utils::*;
use crate::error::MqttResult;
use crate::logging::*;
use crate::mqtt::*;
use crate::mqtt::utils::*;
use crate::validate::utils::*;

use std::fmt;

fn has_auth_properties(packet: &AuthPacket) -> bool {
    packet.authentication_method.is_some() ||
        packet.authentication_data.is_some() ||
        packet.reason_string.is_some() ||
        packet.user_properties.is_some()
}

pub(crate) fn write_auth_packet(packet: &AuthPacket, _: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
    if !has_auth_properties(packet) && packet.reason_code == AuthenticateReasonCode::Success {
        return Ok(AUTH_FIRST_BYTE);
    }

    encode_u8(packet.reason_code as u8, dest);
    encode_properties(dest, |properties| {
        encode_optional_string_property(PROPERTY_KEY_AUTHENTICATION_METHOD, &packet.authentication_method, properties)?;
        encode_optional_bytes_property(PROPERTY_KEY_AUTHENTICATION_DATA, &packet.authentication_data, properties)?;
        encode_optional_string_property(PROPERTY_KEY_REASON_STRING, &packet.reason_string, properties)?;
        encode_user_properties(&packet.user_properties, properties)
    })?;

    Ok(AUTH_FIRST_BYTE)
}

fn decode_auth_properties(property_bytes: &[u8], packet : &mut AuthPacket) -> MqttResult<()> {
    let mut mutable_property_bytes = property_bytes;

    while !mutable_property_bytes.is_empty() {
        let property_key = mutable_property_bytes[0];
        mutable_property_bytes = &mutable_property_bytes[1..];

        match property_key {
            PROPERTY_KEY_AUTHENTICATION_METHOD => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut packet.authentication_method)?; }
            PROPERTY_KEY_AUTHENTICATION_DATA => { mutable_property_bytes = decode_optional_length_prefixed_bytes(mutable_property_bytes, &mut packet.authentication_data)?; }
            PROPERTY_KEY_REASON_STRING => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut packet.reason_string)?; }
            PROPERTY_KEY_USER_PROPERTY => { mutable_property_bytes = decode_user_property(mutable_property_bytes, &mut packet.user_properties)?; }
            _ => {
                return Err(fail_on_unknown_property(property_key, "Auth"));
            }
        }
    }

    Ok(())
}

/// Only reachable on MQTT5 connections; the fixed header check rejects AUTH everywhere else.
pub(crate) fn decode_auth_packet(packet_body: &[u8]) -> MqttResult<MqttPacket> {
    let mut packet = AuthPacket::default();

    let mut mutable_body = packet_body;
    if !mutable_body.is_empty() {
        mutable_body = decode_u8_as_enum(mutable_body, &mut packet.reason_code, convert_u8_to_authenticate_reason_code)?;
        if !mutable_body.is_empty() {
            let (properties, remaining) = decode_property_block(mutable_body, "Auth")?;
            decode_auth_properties(properties, &mut packet)?;
            mutable_body = remaining;
        }
    }

    expect_fully_consumed(mutable_body, "Auth")?;

    Ok(MqttPacket::Auth(packet))
}

pub(crate) fn validate_auth_packet_outbound(packet: &AuthPacket, version: ProtocolVersion) -> MqttResult<()> {
    if !version.is_mqtt5() {
        return Err(validation_failure("Auth", &format!("AUTH packets are not supported by MQTT {}", version)));
    }

    validate_optional_string_length(&packet.authentication_method, "Auth", "authentication_method")?;
    validate_optional_binary_length(&packet.authentication_data, "Auth", "authentication_data")?;
    validate_optional_string_length(&packet.reason_string, "Auth", "reason_string")?;
    validate_user_properties(&packet.user_properties, version, "Auth")?;

    Ok(())
}

impl fmt::Display for AuthPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AuthPacket {{")?;
        log_enum!(self.reason_code, f, "reason_code");
        log_optional_string!(self.authentication_method, f, "authentication_method", value);
        log_optional_binary_data_sensitive!(self.authentication_data, f, "authentication_data");
        log_optional_string!(self.reason_string, f, "reason_string", value);
        log_user_properties!(self.user_properties, f, "user_properties", value);
        write!(f, " }}")
    }
}
