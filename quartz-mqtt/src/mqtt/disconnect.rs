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

fn has_disconnect_properties(packet: &DisconnectPacket) -> bool {
    packet.session_expiry_interval_seconds.is_some() ||
        packet.reason_string.is_some() ||
        packet.server_reference.is_some() ||
        packet.user_properties.is_some()
}

/// MQTT 3.x disconnects have no body.  MQTT5 drops the reason code and the property block when
/// both are at their defaults.
pub(crate) fn write_disconnect_packet(packet: &DisconnectPacket, version: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
    if !version.is_mqtt5() {
        return Ok(DISCONNECT_FIRST_BYTE);
    }

    let has_properties = has_disconnect_properties(packet);
    if !has_properties && packet.reason_code == DisconnectReasonCode::NormalDisconnection {
        return Ok(DISCONNECT_FIRST_BYTE);
    }

    encode_u8(packet.reason_code as u8, dest);

    if has_properties {
        encode_properties(dest, |properties| {
            encode_optional_u32_property(PROPERTY_KEY_SESSION_EXPIRY_INTERVAL, packet.session_expiry_interval_seconds, properties);
            encode_optional_string_property(PROPERTY_KEY_REASON_STRING, &packet.reason_string, properties)?;
            encode_optional_string_property(PROPERTY_KEY_SERVER_REFERENCE, &packet.server_reference, properties)?;
            encode_user_properties(&packet.user_properties, properties)
        })?;
    }

    Ok(DISCONNECT_FIRST_BYTE)
}

fn decode_disconnect_properties(property_bytes: &[u8], packet : &mut DisconnectPacket) -> MqttResult<()> {
    let mut mutable_property_bytes = property_bytes;

    while !mutable_property_bytes.is_empty() {
        let property_key = mutable_property_bytes[0];
        mutable_property_bytes = &mutable_property_bytes[1..];

        match property_key {
            PROPERTY_KEY_SESSION_EXPIRY_INTERVAL => { mutable_property_bytes = decode_optional_u32(mutable_property_bytes, &mut packet.session_expiry_interval_seconds)?; }
            PROPERTY_KEY_REASON_STRING => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut packet.reason_string)?; }
            PROPERTY_KEY_USER_PROPERTY => { mutable_property_bytes = decode_user_property(mutable_property_bytes, &mut packet.user_properties)?; }
            PROPERTY_KEY_SERVER_REFERENCE => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut packet.server_reference)?; }
            _ => {
                return Err(fail_on_unknown_property(property_key, "Disconnect"));
            }
        }
    }

    Ok(())
}

pub(crate) fn decode_disconnect_packet(packet_body: &[u8], version: ProtocolVersion) -> MqttResult<MqttPacket> {
    let mut packet = DisconnectPacket::default();

    let mut mutable_body = packet_body;
    if version.is_mqtt5() && !mutable_body.is_empty() {
        mutable_body = decode_u8_as_enum(mutable_body, &mut packet.reason_code, convert_u8_to_disconnect_reason_code)?;
        if !mutable_body.is_empty() {
            let (properties, remaining) = decode_property_block(mutable_body, "Disconnect")?;
            decode_disconnect_properties(properties, &mut packet)?;
            mutable_body = remaining;
        }
    }

    expect_fully_consumed(mutable_body, "Disconnect")?;

    Ok(MqttPacket::Disconnect(packet))
}

pub(crate) fn validate_disconnect_packet_outbound(packet: &DisconnectPacket, version: ProtocolVersion) -> MqttResult<()> {
    validate_optional_string_length(&packet.reason_string, "Disconnect", "reason_string")?;
    validate_optional_string_length(&packet.server_reference, "Disconnect", "server_reference")?;
    validate_user_properties(&packet.user_properties, version, "Disconnect")?;

    Ok(())
}

impl fmt::Display for DisconnectPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DisconnectPacket {{")?;
        log_enum!(self.reason_code, f, "reason_code");
        log_optional_primitive_value!(self.session_expiry_interval_seconds, f, "session_expiry_interval_seconds", value);
        log_optional_string!(self.reason_string, f, "reason_string", value);
        log_optional_string!(self.server_reference, f, "server_reference", value);
        log_user_properties!(self.user_properties, f, "user_properties", value);
        write!(f, " }}")
    }
}
