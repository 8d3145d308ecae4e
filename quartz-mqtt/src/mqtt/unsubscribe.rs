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

pub(crate) fn write_unsubscribe_packet(packet: &UnsubscribePacket, version: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
    encode_u16(packet.packet_id, dest);

    if version.is_mqtt5() {
        encode_properties(dest, |properties| {
            encode_user_properties(&packet.user_properties, properties)
        })?;
    }

    for topic_filter in &packet.topic_filters {
        encode_length_prefixed_string(topic_filter, dest)?;
    }

    Ok(UNSUBSCRIBE_FIRST_BYTE)
}

fn decode_unsubscribe_properties(property_bytes: &[u8], packet : &mut UnsubscribePacket) -> MqttResult<()> {
    let mut mutable_property_bytes = property_bytes;

    while !mutable_property_bytes.is_empty() {
        let property_key = mutable_property_bytes[0];
        mutable_property_bytes = &mutable_property_bytes[1..];

        match property_key {
            PROPERTY_KEY_USER_PROPERTY => { mutable_property_bytes = decode_user_property(mutable_property_bytes, &mut packet.user_properties)?; }
            _ => {
                return Err(fail_on_unknown_property(property_key, "Unsubscribe"));
            }
        }
    }

    Ok(())
}

pub(crate) fn decode_unsubscribe_packet(packet_body: &[u8], version: ProtocolVersion) -> MqttResult<MqttPacket> {
    let mut packet = UnsubscribePacket::default();

    let mut mutable_body = decode_u16(packet_body, &mut packet.packet_id)?;

    if version.is_mqtt5() {
        let (properties, remaining) = decode_property_block(mutable_body, "Unsubscribe")?;
        decode_unsubscribe_properties(properties, &mut packet)?;
        mutable_body = remaining;
    }

    while !mutable_body.is_empty() {
        let mut topic_filter = String::new();
        mutable_body = decode_length_prefixed_string(mutable_body, &mut topic_filter)?;
        packet.topic_filters.push(topic_filter);
    }

    if packet.topic_filters.is_empty() {
        error!("UnsubscribePacket Decode - no topic filters");
        return Err(MqttError::new_protocol_violation("unsubscribe packet without topic filters"));
    }

    Ok(MqttPacket::Unsubscribe(packet))
}

pub(crate) fn validate_unsubscribe_packet_outbound(packet: &UnsubscribePacket, version: ProtocolVersion) -> MqttResult<()> {
    validate_packet_id_non_zero(packet.packet_id, "Unsubscribe")?;

    if packet.topic_filters.is_empty() {
        return Err(validation_failure("Unsubscribe", "empty topic filter list"));
    }

    if !packet.topic_filters.iter().all(|filter| is_valid_topic_filter(filter)) {
        return Err(validation_failure("Unsubscribe", "invalid topic filter"));
    }

    validate_user_properties(&packet.user_properties, version, "Unsubscribe")?;

    Ok(())
}

impl fmt::Display for UnsubscribePacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UnsubscribePacket {{")?;
        log_primitive_value!(self.packet_id, f, "packet_id");
        log_user_properties!(self.user_properties, f, "user_properties", value);
        write!(f, " topic_filters: [")?;
        for topic_filter in &self.topic_filters {
            write!(f, " \"{}\"", topic_filter)?;
        }
        write!(f, " ] }}")
    }
}
