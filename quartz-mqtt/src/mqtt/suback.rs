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

const SUBACK_311_FAILURE_RETURN_CODE : u8 = 0x80;

fn convert_suback_reason_code_to_311_return_code(reason_code: SubackReasonCode) -> u8 {
    if reason_code.is_success() {
        reason_code as u8
    } else {
        SUBACK_311_FAILURE_RETURN_CODE
    }
}

pub(crate) fn write_suback_packet(packet: &SubackPacket, version: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
    encode_u16(packet.packet_id, dest);

    if version.is_mqtt5() {
        encode_ack_properties(&packet.reason_string, &packet.user_properties, dest)?;

        for reason_code in &packet.reason_codes {
            encode_u8(*reason_code as u8, dest);
        }
    } else {
        for reason_code in &packet.reason_codes {
            encode_u8(convert_suback_reason_code_to_311_return_code(*reason_code), dest);
        }
    }

    Ok(SUBACK_FIRST_BYTE)
}

pub(crate) fn decode_suback_packet(packet_body: &[u8], version: ProtocolVersion) -> MqttResult<MqttPacket> {
    let mut packet = SubackPacket::default();

    let mut mutable_body = decode_u16(packet_body, &mut packet.packet_id)?;

    let converter : fn(u8) -> MqttResult<SubackReasonCode> = if version.is_mqtt5() {
        let (properties, remaining) = decode_property_block(mutable_body, "Suback")?;
        decode_ack_properties(properties, &mut packet.reason_string, &mut packet.user_properties, "Suback")?;
        mutable_body = remaining;

        convert_u8_to_suback_reason_code
    } else {
        convert_u8_to_suback_return_code_311
    };

    if mutable_body.is_empty() {
        error!("SubackPacket Decode - no reason codes");
        return Err(MqttError::new_protocol_violation("suback packet without reason codes"));
    }

    packet.reason_codes.reserve(mutable_body.len());
    for reason_code_byte in mutable_body {
        packet.reason_codes.push(converter(*reason_code_byte)?);
    }

    Ok(MqttPacket::Suback(packet))
}

pub(crate) fn validate_suback_packet_outbound(packet: &SubackPacket, version: ProtocolVersion) -> MqttResult<()> {
    validate_packet_id_non_zero(packet.packet_id, "Suback")?;

    if packet.reason_codes.is_empty() {
        return Err(validation_failure("Suback", "empty reason code list"));
    }

    validate_optional_string_length(&packet.reason_string, "Suback", "reason_string")?;
    validate_user_properties(&packet.user_properties, version, "Suback")?;

    Ok(())
}

impl fmt::Display for SubackPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SubackPacket {{")?;
        log_primitive_value!(self.packet_id, f, "packet_id");
        log_optional_string!(self.reason_string, f, "reason_string", value);
        log_user_properties!(self.user_properties, f, "user_properties", value);
        write!(f, " reason_codes:{:?}", self.reason_codes)?;
        write!(f, " }}")
    }
}
