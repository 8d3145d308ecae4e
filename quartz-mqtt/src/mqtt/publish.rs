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

const MAXIMUM_SUBSCRIPTION_IDENTIFIER : u32 = 268_435_455;

fn compute_publish_first_byte(packet: &PublishPacket) -> u8 {
    let mut first_byte = PACKET_TYPE_PUBLISH << 4;
    if packet.duplicate {
        first_byte |= PUBLISH_PACKET_FIXED_HEADER_DUPLICATE_FLAG;
    }

    first_byte |= (packet.message.qos as u8) << 1;

    if packet.message.retain {
        first_byte |= PUBLISH_PACKET_FIXED_HEADER_RETAIN_FLAG;
    }

    first_byte
}

fn write_publish_properties(message: &ApplicationMessage, dest: &mut Vec<u8>) -> MqttResult<()> {
    encode_properties(dest, |properties| {
        encode_optional_u8_property(PROPERTY_KEY_PAYLOAD_FORMAT_INDICATOR, message.payload_format.map(|format| format as u8), properties);
        encode_optional_u32_property(PROPERTY_KEY_MESSAGE_EXPIRY_INTERVAL, message.message_expiry_interval_seconds, properties);
        encode_optional_u16_property(PROPERTY_KEY_TOPIC_ALIAS, message.topic_alias, properties);
        encode_optional_string_property(PROPERTY_KEY_RESPONSE_TOPIC, &message.response_topic, properties)?;
        encode_optional_bytes_property(PROPERTY_KEY_CORRELATION_DATA, &message.correlation_data, properties)?;
        if let Some(identifiers) = &message.subscription_identifiers {
            for identifier in identifiers {
                encode_u8(PROPERTY_KEY_SUBSCRIPTION_IDENTIFIER, properties);
                encode_vli(*identifier as usize, properties)?;
            }
        }
        encode_optional_string_property(PROPERTY_KEY_CONTENT_TYPE, &message.content_type, properties)?;
        encode_user_properties(&message.user_properties, properties)
    })
}

pub(crate) fn write_publish_packet(packet: &PublishPacket, version: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
    let message = &packet.message;

    encode_length_prefixed_string(&message.topic, dest)?;

    if message.qos != QualityOfService::AtMostOnce {
        encode_u16(packet.packet_id, dest);
    }

    if version.is_mqtt5() {
        write_publish_properties(message, dest)?;
    }

    // the payload is the remainder of the packet; it carries no length prefix
    dest.extend_from_slice(&message.payload);

    Ok(compute_publish_first_byte(packet))
}

fn decode_publish_properties(property_bytes: &[u8], message: &mut ApplicationMessage) -> MqttResult<()> {
    let mut mutable_property_bytes = property_bytes;

    while !mutable_property_bytes.is_empty() {
        let property_key = mutable_property_bytes[0];
        mutable_property_bytes = &mutable_property_bytes[1..];

        match property_key {
            PROPERTY_KEY_PAYLOAD_FORMAT_INDICATOR => { mutable_property_bytes = decode_optional_u8_as_enum(mutable_property_bytes, &mut message.payload_format, convert_u8_to_payload_format_indicator)?; }
            PROPERTY_KEY_MESSAGE_EXPIRY_INTERVAL => { mutable_property_bytes = decode_optional_u32(mutable_property_bytes, &mut message.message_expiry_interval_seconds)?; }
            PROPERTY_KEY_TOPIC_ALIAS => { mutable_property_bytes = decode_optional_u16(mutable_property_bytes, &mut message.topic_alias)?; }
            PROPERTY_KEY_RESPONSE_TOPIC => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut message.response_topic)?; }
            PROPERTY_KEY_CORRELATION_DATA => { mutable_property_bytes = decode_optional_length_prefixed_bytes(mutable_property_bytes, &mut message.correlation_data)?; }
            PROPERTY_KEY_SUBSCRIPTION_IDENTIFIER => {
                let mut identifier : usize = 0;
                mutable_property_bytes = decode_vli_into_mutable(mutable_property_bytes, &mut identifier)?;
                if identifier == 0 {
                    error!("PublishPacket Decode - subscription identifier of zero");
                    return Err(MqttError::new_protocol_violation("publish subscription identifier of zero"));
                }

                message.subscription_identifiers.get_or_insert_with(Vec::new).push(identifier as u32);
            }
            PROPERTY_KEY_CONTENT_TYPE => { mutable_property_bytes = decode_optional_length_prefixed_string(mutable_property_bytes, &mut message.content_type)?; }
            PROPERTY_KEY_USER_PROPERTY => { mutable_property_bytes = decode_user_property(mutable_property_bytes, &mut message.user_properties)?; }
            _ => {
                return Err(fail_on_unknown_property(property_key, "Publish"));
            }
        }
    }

    Ok(())
}

pub(crate) fn decode_publish_packet(first_byte: u8, packet_body: &[u8], version: ProtocolVersion) -> MqttResult<MqttPacket> {
    let qos = convert_u8_to_quality_of_service((first_byte >> 1) & QOS_MASK)?;

    let mut packet = PublishPacket {
        duplicate: (first_byte & PUBLISH_PACKET_FIXED_HEADER_DUPLICATE_FLAG) != 0,
        message: ApplicationMessage {
            qos,
            retain: (first_byte & PUBLISH_PACKET_FIXED_HEADER_RETAIN_FLAG) != 0,
            ..Default::default()
        },
        ..Default::default()
    };

    if qos == QualityOfService::AtMostOnce && packet.duplicate {
        error!("PublishPacket Decode - duplicate flag set on a qos 0 publish");
        return Err(MqttError::new_protocol_violation("duplicate flag set on qos 0 publish"));
    }

    let mut mutable_body = packet_body;
    mutable_body = decode_length_prefixed_string(mutable_body, &mut packet.message.topic)?;

    if qos != QualityOfService::AtMostOnce {
        mutable_body = decode_u16(mutable_body, &mut packet.packet_id)?;
        if packet.packet_id == 0 {
            error!("PublishPacket Decode - packet id of zero on a qos {:?} publish", qos);
            return Err(MqttError::new_protocol_violation("publish packet id of zero"));
        }
    }

    if version.is_mqtt5() {
        let (properties, remaining) = decode_property_block(mutable_body, "Publish")?;
        decode_publish_properties(properties, &mut packet.message)?;
        mutable_body = remaining;
    }

    if packet.message.topic.is_empty() && packet.message.topic_alias.is_none() {
        error!("PublishPacket Decode - empty topic without a topic alias");
        return Err(MqttError::new_protocol_violation("publish has an empty topic and no topic alias"));
    }

    packet.message.payload = mutable_body.to_vec();

    Ok(MqttPacket::Publish(packet))
}

pub(crate) fn validate_publish_packet_outbound(packet: &PublishPacket, version: ProtocolVersion) -> MqttResult<()> {
    let message = &packet.message;

    if message.qos == QualityOfService::AtMostOnce {
        if packet.packet_id != 0 {
            return Err(validation_failure("Publish", "qos 0 publishes may not have a packet id"));
        }

        if packet.duplicate {
            return Err(validation_failure("Publish", "qos 0 publishes may not set the duplicate flag"));
        }
    } else {
        validate_packet_id_non_zero(packet.packet_id, "Publish")?;
    }

    if message.topic.is_empty() {
        if !version.is_mqtt5() || message.topic_alias.is_none() {
            return Err(validation_failure("Publish", "empty topic without a topic alias"));
        }
    } else if !is_valid_topic(&message.topic) {
        return Err(validation_failure("Publish", "topic contains wildcards or is too long"));
    }

    if message.topic_alias == Some(0) {
        return Err(validation_failure("Publish", "topic alias may not be zero"));
    }

    if let Some(identifiers) = &message.subscription_identifiers {
        if identifiers.iter().any(|id| *id == 0 || *id > MAXIMUM_SUBSCRIPTION_IDENTIFIER) {
            return Err(validation_failure("Publish", "subscription identifier out of range"));
        }
    }

    validate_optional_string_length(&message.response_topic, "Publish", "response_topic")?;
    validate_optional_binary_length(&message.correlation_data, "Publish", "correlation_data")?;
    validate_optional_string_length(&message.content_type, "Publish", "content_type")?;
    validate_user_properties(&message.user_properties, version, "Publish")?;

    Ok(())
}

impl fmt::Display for PublishPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PublishPacket {{")?;
        if self.packet_id != 0 {
            log_primitive_value!(self.packet_id, f, "packet_id");
        }
        log_primitive_value!(self.duplicate, f, "duplicate");
        self.message.fmt(f)?;
        write!(f, " }}")
    }
}
