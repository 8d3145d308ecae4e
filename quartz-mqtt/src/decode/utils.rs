/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Slice-threading primitive readers.  Every reader takes the unread remainder of a packet body,
stores what it decoded into an out parameter, and returns the new remainder.
 */

use crate::error::{MqttError, MqttResult};
use crate::mqtt::UserProperty;

use log::*;

#[derive(Eq, PartialEq, Debug)]
pub(crate) enum DecodeVliResult<'a> {
    InsufficientData,
    Value(u32, &'a[u8]), /* (decoded value, remaining bytes) */
}

pub(crate) fn decode_vli(buffer: &[u8]) -> MqttResult<DecodeVliResult> {
    let mut value: u32 = 0;
    let mut shift: u32 = 0;

    for (i, byte) in buffer.iter().take(4).enumerate() {
        value |= ((byte & 0x7F) as u32) << shift;
        shift += 7;

        if (byte & 0x80) == 0 {
            return Ok(DecodeVliResult::Value(value, &buffer[(i + 1)..]));
        }
    }

    if buffer.len() < 4 {
        return Ok(DecodeVliResult::InsufficientData);
    }

    error!("Packet Decode - invalid variable length integer");
    Err(MqttError::new_protocol_violation("variable length integer has more than four bytes"))
}

pub(crate) fn decode_vli_into_mutable<'a>(buffer: &'a[u8], value: &mut usize) -> MqttResult<&'a[u8]> {
    match decode_vli(buffer)? {
        DecodeVliResult::InsufficientData => {
            error!("Packet Decode - truncated variable length integer");
            Err(MqttError::new_protocol_violation("truncated variable length integer"))
        }
        DecodeVliResult::Value(vli, remaining_slice) => {
            *value = vli as usize;
            Ok(remaining_slice)
        }
    }
}

fn split_length_prefixed_value<'a>(bytes: &'a[u8], value_label: &str) -> MqttResult<(&'a[u8], &'a[u8])> {
    if bytes.len() < 2 {
        error!("Packet Decode - {} value does not have a full length prefix", value_label);
        return Err(MqttError::new_protocol_violation("length-prefixed value is truncated"));
    }

    let value_length = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let remaining = &bytes[2..];
    if value_length > remaining.len() {
        error!("Packet Decode - {} value has length larger than remaining packet bytes", value_label);
        return Err(MqttError::new_protocol_violation("length-prefixed value is truncated"));
    }

    Ok((&remaining[..value_length], &remaining[value_length..]))
}

fn convert_utf8(bytes: &[u8]) -> MqttResult<String> {
    match std::str::from_utf8(bytes) {
        Ok(value) => { Ok(value.to_string()) }
        Err(err) => {
            error!("Packet Decode - invalid utf-8");
            Err(err.into())
        }
    }
}

pub(crate) fn decode_length_prefixed_string<'a>(bytes: &'a[u8], value: &mut String) -> MqttResult<&'a[u8]> {
    let (value_bytes, remaining) = split_length_prefixed_value(bytes, "Utf-8 string")?;
    *value = convert_utf8(value_bytes)?;
    Ok(remaining)
}

pub(crate) fn decode_optional_length_prefixed_string<'a>(bytes: &'a[u8], value: &mut Option<String>) -> MqttResult<&'a[u8]> {
    if value.is_some() {
        error!("Packet Decode - Invalid duplicate optional string property");
        return Err(MqttError::new_protocol_violation("duplicate string property"));
    }

    let (value_bytes, remaining) = split_length_prefixed_value(bytes, "Utf-8 string")?;
    *value = Some(convert_utf8(value_bytes)?);
    Ok(remaining)
}

pub(crate) fn decode_length_prefixed_bytes<'a>(bytes: &'a[u8], value: &mut Vec<u8>) -> MqttResult<&'a[u8]> {
    let (value_bytes, remaining) = split_length_prefixed_value(bytes, "Binary data")?;
    *value = value_bytes.to_vec();
    Ok(remaining)
}

pub(crate) fn decode_optional_length_prefixed_bytes<'a>(bytes: &'a[u8], value: &mut Option<Vec<u8>>) -> MqttResult<&'a[u8]> {
    if value.is_some() {
        error!("Packet Decode - Invalid duplicate optional binary data property");
        return Err(MqttError::new_protocol_violation("duplicate binary data property"));
    }

    let (value_bytes, remaining) = split_length_prefixed_value(bytes, "Binary data")?;
    *value = Some(value_bytes.to_vec());
    Ok(remaining)
}

pub(crate) fn decode_user_property<'a>(bytes: &'a[u8], properties: &mut Option<Vec<UserProperty>>) -> MqttResult<&'a[u8]> {
    let mut property = UserProperty::default();

    let mut mutable_bytes = bytes;
    mutable_bytes = decode_length_prefixed_string(mutable_bytes, &mut property.name)?;
    mutable_bytes = decode_length_prefixed_string(mutable_bytes, &mut property.value)?;

    properties.get_or_insert_with(Vec::new).push(property);

    Ok(mutable_bytes)
}

pub(crate) fn decode_u8<'a>(bytes: &'a[u8], value: &mut u8) -> MqttResult<&'a[u8]> {
    if bytes.is_empty() {
        error!("Packet Decode - Insufficient packet bytes for u8 field");
        return Err(MqttError::new_protocol_violation("truncated u8 field"));
    }

    *value = bytes[0];

    Ok(&bytes[1..])
}

pub(crate) fn decode_optional_u8_as_bool<'a>(bytes: &'a[u8], value: &mut Option<bool>) -> MqttResult<&'a[u8]> {
    if value.is_some() {
        error!("Packet Decode - Invalid duplicate optional boolean property");
        return Err(MqttError::new_protocol_violation("duplicate boolean property"));
    }

    let mut byte = 0;
    let remaining = decode_u8(bytes, &mut byte)?;
    match byte {
        0 => { *value = Some(false); }
        1 => { *value = Some(true); }
        _ => {
            error!("Packet Decode - Invalid byte value for boolean property");
            return Err(MqttError::new_protocol_violation("invalid boolean property value"));
        }
    }

    Ok(remaining)
}

pub(crate) fn decode_u8_as_enum<'a, T>(bytes: &'a[u8], value: &mut T, converter: fn(u8) -> MqttResult<T>) -> MqttResult<&'a[u8]> {
    let mut byte = 0;
    let remaining = decode_u8(bytes, &mut byte)?;
    *value = converter(byte)?;

    Ok(remaining)
}

pub(crate) fn decode_optional_u8_as_enum<'a, T>(bytes: &'a[u8], value: &mut Option<T>, converter: fn(u8) -> MqttResult<T>) -> MqttResult<&'a[u8]> {
    if value.is_some() {
        error!("Packet Decode - Invalid duplicate optional enum property");
        return Err(MqttError::new_protocol_violation("duplicate enum property"));
    }

    let mut byte = 0;
    let remaining = decode_u8(bytes, &mut byte)?;
    *value = Some(converter(byte)?);

    Ok(remaining)
}

pub(crate) fn decode_u16<'a>(bytes: &'a[u8], value: &mut u16) -> MqttResult<&'a[u8]> {
    if bytes.len() < 2 {
        error!("Packet Decode - Insufficient packet bytes for u16 field");
        return Err(MqttError::new_protocol_violation("truncated u16 field"));
    }

    *value = u16::from_be_bytes([bytes[0], bytes[1]]);

    Ok(&bytes[2..])
}

pub(crate) fn decode_optional_u16<'a>(bytes: &'a[u8], value: &mut Option<u16>) -> MqttResult<&'a[u8]> {
    if value.is_some() {
        error!("Packet Decode - Invalid duplicate optional u16 property");
        return Err(MqttError::new_protocol_violation("duplicate u16 property"));
    }

    let mut decoded = 0;
    let remaining = decode_u16(bytes, &mut decoded)?;
    *value = Some(decoded);

    Ok(remaining)
}

pub(crate) fn decode_u32<'a>(bytes: &'a[u8], value: &mut u32) -> MqttResult<&'a[u8]> {
    if bytes.len() < 4 {
        error!("Packet Decode - Insufficient packet bytes for u32 field");
        return Err(MqttError::new_protocol_violation("truncated u32 field"));
    }

    *value = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

    Ok(&bytes[4..])
}

pub(crate) fn decode_optional_u32<'a>(bytes: &'a[u8], value: &mut Option<u32>) -> MqttResult<&'a[u8]> {
    if value.is_some() {
        error!("Packet Decode - Invalid duplicate optional u32 property");
        return Err(MqttError::new_protocol_violation("duplicate u32 property"));
    }

    let mut decoded = 0;
    let remaining = decode_u32(bytes, &mut decoded)?;
    *value = Some(decoded);

    Ok(remaining)
}

/// Splits an MQTT5 property block off the front of `bytes`, returning (properties, remainder).
pub(crate) fn decode_property_block<'a>(bytes: &'a[u8], packet_name: &str) -> MqttResult<(&'a[u8], &'a[u8])> {
    let mut properties_length = 0;
    let remaining = decode_vli_into_mutable(bytes, &mut properties_length)?;
    if properties_length > remaining.len() {
        error!("{} Decode - property length exceeds remaining packet length", packet_name);
        return Err(MqttError::new_protocol_violation("property length exceeds remaining packet length"));
    }

    Ok((&remaining[..properties_length], &remaining[properties_length..]))
}

pub(crate) fn fail_on_unknown_property(property_key: u8, packet_name: &str) -> MqttError {
    error!("{} Decode - Invalid property type ({})", packet_name, property_key);
    MqttError::new_protocol_violation(format!("invalid {} property type ({})", packet_name, property_key))
}

pub(crate) fn expect_fully_consumed(bytes: &[u8], packet_name: &str) -> MqttResult<()> {
    if !bytes.is_empty() {
        error!("{} Decode - {} unexpected trailing bytes", packet_name, bytes.len());
        return Err(MqttError::new_protocol_violation(format!("{} has trailing bytes", packet_name)));
    }

    Ok(())
}

/// Reason string and user properties; the only properties ack-style packets carry.
pub(crate) fn decode_ack_properties(property_bytes: &[u8], reason_string: &mut Option<String>, user_properties: &mut Option<Vec<UserProperty>>, packet_name: &str) -> MqttResult<()> {
    let mut mutable_property_bytes = property_bytes;

    while !mutable_property_bytes.is_empty() {
        let property_key = mutable_property_bytes[0];
        mutable_property_bytes = &mutable_property_bytes[1..];

        match property_key {
            crate::mqtt::utils::PROPERTY_KEY_USER_PROPERTY => { mutable_property_bytes = decode_user_property(mutable_property_bytes, user_properties)?; }
            crate::mqtt::utils::PROPERTY_KEY_REASON_STRING => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, reason_string)?; }
            _ => {
                return Err(fail_on_unknown_property(property_key, packet_name));
            }
        }
    }

    Ok(())
}

/// Defines the decode function for a packet shaped like PUBACK: a packet id, then (MQTT5 only)
/// an optional reason code and an optional property block.
macro_rules! define_ack_packet_decode_function {
    ($function_name: ident, $mqtt_packet_type: ident, $packet_type: ident, $packet_type_as_string: expr, $reason_code_converter_function_name: ident) => {
        pub(crate) fn $function_name(packet_body: &[u8], version: ProtocolVersion) -> MqttResult<MqttPacket> {
            let mut packet = $packet_type::default();

            let mut mutable_body = packet_body;
            mutable_body = decode_u16(mutable_body, &mut packet.packet_id)?;

            if version.is_mqtt5() && !mutable_body.is_empty() {
                mutable_body = decode_u8_as_enum(mutable_body, &mut packet.reason_code, $reason_code_converter_function_name)?;
                if !mutable_body.is_empty() {
                    let (properties, remaining) = decode_property_block(mutable_body, $packet_type_as_string)?;
                    decode_ack_properties(properties, &mut packet.reason_string, &mut packet.user_properties, $packet_type_as_string)?;
                    mutable_body = remaining;
                }
            }

            expect_fully_consumed(mutable_body, $packet_type_as_string)?;

            Ok(MqttPacket::$mqtt_packet_type(packet))
        }
    };
}

pub(crate) use define_ack_packet_decode_function;
