/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Internal primitives for writing MQTT wire values into a growable byte buffer.
 */

use crate::error::{MqttError, MqttResult};
use crate::mqtt::*;
use crate::mqtt::utils::*;

use log::*;

pub(crate) const MAXIMUM_VARIABLE_LENGTH_INTEGER: usize = (1 << 28) - 1;
pub(crate) const MAXIMUM_LENGTH_PREFIXED_VALUE: usize = u16::MAX as usize;

pub(crate) fn compute_variable_length_integer_encode_size(value: usize) -> MqttResult<usize> {
    if value < 1usize << 7 {
        Ok(1)
    } else if value < 1usize << 14 {
        Ok(2)
    } else if value < 1usize << 21 {
        Ok(3)
    } else if value <= MAXIMUM_VARIABLE_LENGTH_INTEGER {
        Ok(4)
    } else {
        error!("Packet Encode - vli value {} exceeds the protocol maximum (2 ^ 28 - 1)", value);
        Err(MqttError::new_protocol_violation("vli value exceeds the protocol maximum (2 ^ 28 - 1)"))
    }
}

/// Writes `value` as a variable length integer into the front of `dest`, returning the number
/// of bytes used.  `dest` must hold at least four bytes.
pub(crate) fn encode_vli_to_slice(value: usize, dest: &mut [u8]) -> MqttResult<usize> {
    let encode_size = compute_variable_length_integer_encode_size(value)?;

    let mut remaining = value;
    for byte in dest.iter_mut().take(encode_size) {
        let mut encoded = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining > 0 {
            encoded |= 0x80;
        }
        *byte = encoded;
    }

    Ok(encode_size)
}

pub(crate) fn encode_vli(value: usize, dest: &mut Vec<u8>) -> MqttResult<()> {
    let mut encoding = [0u8; 4];
    let encode_size = encode_vli_to_slice(value, &mut encoding)?;
    dest.extend_from_slice(&encoding[..encode_size]);
    Ok(())
}

pub(crate) fn encode_u8(value: u8, dest: &mut Vec<u8>) {
    dest.push(value);
}

pub(crate) fn encode_u16(value: u16, dest: &mut Vec<u8>) {
    dest.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn encode_u32(value: u32, dest: &mut Vec<u8>) {
    dest.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn encode_length_prefixed_bytes(value: &[u8], dest: &mut Vec<u8>) -> MqttResult<()> {
    if value.len() > MAXIMUM_LENGTH_PREFIXED_VALUE {
        error!("Packet Encode - length-prefixed value of {} bytes is too long", value.len());
        return Err(MqttError::new_protocol_violation("length-prefixed value exceeds 65535 bytes"));
    }

    encode_u16(value.len() as u16, dest);
    dest.extend_from_slice(value);
    Ok(())
}

pub(crate) fn encode_length_prefixed_string(value: &str, dest: &mut Vec<u8>) -> MqttResult<()> {
    encode_length_prefixed_bytes(value.as_bytes(), dest)
}

/// Writes an MQTT5 property block: the block is written in place by `writer` and the
/// variable length integer prefix is spliced in front of it afterwards.
pub(crate) fn encode_properties<F>(dest: &mut Vec<u8>, writer: F) -> MqttResult<()> where F : FnOnce(&mut Vec<u8>) -> MqttResult<()> {
    let start = dest.len();
    writer(dest)?;

    let properties_length = dest.len() - start;
    let mut prefix = [0u8; 4];
    let prefix_size = encode_vli_to_slice(properties_length, &mut prefix)?;
    dest.splice(start..start, prefix[..prefix_size].iter().copied());

    Ok(())
}

macro_rules! define_optional_integral_property_encoder {
    ($function_name: ident, $int_type: ty, $encoder: ident) => {
        pub(crate) fn $function_name(property_key: u8, value: Option<$int_type>, dest: &mut Vec<u8>) {
            if let Some(val) = value {
                encode_u8(property_key, dest);
                $encoder(val, dest);
            }
        }
    };
}

define_optional_integral_property_encoder!(encode_optional_u8_property, u8, encode_u8);
define_optional_integral_property_encoder!(encode_optional_u16_property, u16, encode_u16);
define_optional_integral_property_encoder!(encode_optional_u32_property, u32, encode_u32);

pub(crate) fn encode_optional_bool_property(property_key: u8, value: Option<bool>, dest: &mut Vec<u8>) {
    encode_optional_u8_property(property_key, value.map(|val| if val { 1 } else { 0 }), dest);
}

pub(crate) fn encode_optional_string_property(property_key: u8, value: &Option<String>, dest: &mut Vec<u8>) -> MqttResult<()> {
    if let Some(val) = value {
        encode_u8(property_key, dest);
        encode_length_prefixed_string(val, dest)?;
    }

    Ok(())
}

pub(crate) fn encode_optional_bytes_property(property_key: u8, value: &Option<Vec<u8>>, dest: &mut Vec<u8>) -> MqttResult<()> {
    if let Some(val) = value {
        encode_u8(property_key, dest);
        encode_length_prefixed_bytes(val, dest)?;
    }

    Ok(())
}

pub(crate) fn encode_user_properties(user_properties: &Option<Vec<UserProperty>>, dest: &mut Vec<u8>) -> MqttResult<()> {
    if let Some(properties) = user_properties {
        for property in properties {
            encode_u8(PROPERTY_KEY_USER_PROPERTY, dest);
            encode_length_prefixed_string(&property.name, dest)?;
            encode_length_prefixed_string(&property.value, dest)?;
        }
    }

    Ok(())
}

/// Reason string and user properties; the only properties ack-style packets carry.
pub(crate) fn encode_ack_properties(reason_string: &Option<String>, user_properties: &Option<Vec<UserProperty>>, dest: &mut Vec<u8>) -> MqttResult<()> {
    encode_properties(dest, |properties| {
        encode_optional_string_property(PROPERTY_KEY_REASON_STRING, reason_string, properties)?;
        encode_user_properties(user_properties, properties)
    })
}

/// Defines the write function for a packet shaped like PUBACK.  MQTT5 omits the reason code when
/// it is Success and there are no properties; MQTT 3.x only ever writes the packet id.
macro_rules! define_ack_packet_write_function {
    ($function_name: ident, $packet_type: ident, $first_byte: expr, $success_reason_code: expr) => {
        pub(crate) fn $function_name(packet: &$packet_type, version: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
            encode_u16(packet.packet_id, dest);

            if version.is_mqtt5() {
                let has_properties = packet.reason_string.is_some() || packet.user_properties.is_some();
                if has_properties || packet.reason_code != $success_reason_code {
                    encode_u8(packet.reason_code as u8, dest);
                    if has_properties {
                        encode_ack_properties(&packet.reason_string, &packet.user_properties, dest)?;
                    }
                }
            }

            Ok($first_byte)
        }
    };
}

pub(crate) use define_ack_packet_write_function;
