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

pub(crate) fn write_unsuback_packet(packet: &UnsubackPacket, version: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
    encode_u16(packet.packet_id, dest);

    if version.is_mqtt5() {
        encode_ack_properties(&packet.reason_string, &packet.user_properties, dest)?;

        for reason_code in &packet.reason_codes {
            encode_u8(*reason_code as u8, dest);
        }
    }

    Ok(UNSUBACK_FIRST_BYTE)
}

pub(crate) fn decode_unsuback_packet(packet_body: &[u8], version: ProtocolVersion) -> MqttResult<MqttPacket> {
    let mut packet = UnsubackPacket::default();

    let mut mutable_body = decode_u16(packet_body, &mut packet.packet_id)?;

    if !version.is_mqtt5() {
        expect_fully_consumed(mutable_body, "Unsuback")?;
        return Ok(MqttPacket::Unsuback(packet));
    }

    let (properties, remaining) = decode_property_block(mutable_body, "Unsuback")?;
    decode_ack_properties(properties, &mut packet.reason_string, &mut packet.user_properties, "Unsuback")?;
    mutable_body = remaining;

    if mutable_body.is_empty() {
        error!("UnsubackPacket Decode - no reason codes");
        return Err(MqttError::new_protocol_violation("unsuback packet without reason codes"));
    }

    packet.reason_codes.reserve(mutable_body.len());
    for reason_code_byte in mutable_body {
        packet.reason_codes.push(convert_u8_to_unsuback_reason_code(*reason_code_byte)?);
    }

    Ok(MqttPacket::Unsuback(packet))
}

pub(crate) fn validate_unsuback_packet_outbound(packet: &UnsubackPacket, version: ProtocolVersion) -> MqttResult<()> {
    validate_packet_id_non_zero(packet.packet_id, "Unsuback")?;

    if version.is_mqtt5() && packet.reason_codes.is_empty() {
        return Err(validation_failure("Unsuback", "empty reason code list"));
    }

    validate_optional_string_length(&packet.reason_string, "Unsuback", "reason_string")?;
    validate_user_properties(&packet.user_properties, version, "Unsuback")?;

    Ok(())
}

impl fmt::Display for UnsubackPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UnsubackPacket {{")?;
        log_primitive_value!(self.packet_id, f, "packet_id");
        log_optional_string!(self.reason_string, f, "reason_string", value);
        log_user_properties!(self.user_properties, f, "user_properties", value);
        if !self.reason_codes.is_empty() {
            write!(f, " reason_codes:{:?}", self.reason_codes)?;
        }
        write!(f, " }}")
    }
}
