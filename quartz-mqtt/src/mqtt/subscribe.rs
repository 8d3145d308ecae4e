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

const SUBSCRIPTION_OPTIONS_RESERVED_MASK_5 : u8 = 3u8 << 6;
const SUBSCRIPTION_OPTIONS_RESERVED_MASK_311 : u8 = !QOS_MASK;

fn compute_subscription_options_byte(subscription: &Subscription, version: ProtocolVersion) -> u8 {
    let mut options_byte = subscription.qos as u8;

    if version.is_mqtt5() {
        if subscription.no_local {
            options_byte |= SUBSCRIPTION_OPTIONS_NO_LOCAL_MASK;
        }

        if subscription.retain_as_published {
            options_byte |= SUBSCRIPTION_OPTIONS_RETAIN_AS_PUBLISHED_MASK;
        }

        options_byte |= (subscription.retain_handling_type as u8) << SUBSCRIPTION_OPTIONS_RETAIN_HANDLING_SHIFT;
    }

    options_byte
}

pub(crate) fn write_subscribe_packet(packet: &SubscribePacket, version: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
    encode_u16(packet.packet_id, dest);

    if version.is_mqtt5() {
        encode_properties(dest, |properties| {
            if let Some(identifier) = packet.subscription_identifier {
                encode_u8(PROPERTY_KEY_SUBSCRIPTION_IDENTIFIER, properties);
                encode_vli(identifier as usize, properties)?;
            }

            encode_user_properties(&packet.user_properties, properties)
        })?;
    }

    for subscription in &packet.subscriptions {
        encode_length_prefixed_string(&subscription.topic_filter, dest)?;
        encode_u8(compute_subscription_options_byte(subscription, version), dest);
    }

    Ok(SUBSCRIBE_FIRST_BYTE)
}

fn decode_subscribe_properties(property_bytes: &[u8], packet : &mut SubscribePacket) -> MqttResult<()> {
    let mut mutable_property_bytes = property_bytes;

    while !mutable_property_bytes.is_empty() {
        let property_key = mutable_property_bytes[0];
        mutable_property_bytes = &mutable_property_bytes[1..];

        match property_key {
            PROPERTY_KEY_SUBSCRIPTION_IDENTIFIER => {
                if packet.subscription_identifier.is_some() {
                    error!("SubscribePacket Decode - duplicate subscription identifier");
                    return Err(MqttError::new_protocol_violation("duplicate subscription identifier"));
                }

                let mut identifier : usize = 0;
                mutable_property_bytes = decode_vli_into_mutable(mutable_property_bytes, &mut identifier)?;
                packet.subscription_identifier = Some(identifier as u32);
            }
            PROPERTY_KEY_USER_PROPERTY => { mutable_property_bytes = decode_user_property(mutable_property_bytes, &mut packet.user_properties)?; }
            _ => {
                return Err(fail_on_unknown_property(property_key, "Subscribe"));
            }
        }
    }

    Ok(())
}

fn decode_subscription(bytes: &[u8], version: ProtocolVersion) -> MqttResult<(Subscription, &[u8])> {
    let mut subscription = Subscription::default();

    let mut mutable_bytes = decode_length_prefixed_string(bytes, &mut subscription.topic_filter)?;

    let mut options_byte : u8 = 0;
    mutable_bytes = decode_u8(mutable_bytes, &mut options_byte)?;

    let reserved_mask = if version.is_mqtt5() { SUBSCRIPTION_OPTIONS_RESERVED_MASK_5 } else { SUBSCRIPTION_OPTIONS_RESERVED_MASK_311 };
    if (options_byte & reserved_mask) != 0 {
        error!("SubscribePacket Decode - reserved subscription option bits set");
        return Err(MqttError::new_protocol_violation("reserved subscription option bits set"));
    }

    subscription.qos = convert_u8_to_quality_of_service(options_byte & QOS_MASK)?;
    if version.is_mqtt5() {
        subscription.no_local = (options_byte & SUBSCRIPTION_OPTIONS_NO_LOCAL_MASK) != 0;
        subscription.retain_as_published = (options_byte & SUBSCRIPTION_OPTIONS_RETAIN_AS_PUBLISHED_MASK) != 0;
        subscription.retain_handling_type = convert_u8_to_retain_handling_type((options_byte >> SUBSCRIPTION_OPTIONS_RETAIN_HANDLING_SHIFT) & 0x03)?;
    }

    Ok((subscription, mutable_bytes))
}

pub(crate) fn decode_subscribe_packet(packet_body: &[u8], version: ProtocolVersion) -> MqttResult<MqttPacket> {
    let mut packet = SubscribePacket::default();

    let mut mutable_body = decode_u16(packet_body, &mut packet.packet_id)?;

    if version.is_mqtt5() {
        let (properties, remaining) = decode_property_block(mutable_body, "Subscribe")?;
        decode_subscribe_properties(properties, &mut packet)?;
        mutable_body = remaining;
    }

    while !mutable_body.is_empty() {
        let (subscription, remaining) = decode_subscription(mutable_body, version)?;
        packet.subscriptions.push(subscription);
        mutable_body = remaining;
    }

    if packet.subscriptions.is_empty() {
        error!("SubscribePacket Decode - no subscriptions");
        return Err(MqttError::new_protocol_violation("subscribe packet without subscriptions"));
    }

    Ok(MqttPacket::Subscribe(packet))
}

pub(crate) fn validate_subscribe_packet_outbound(packet: &SubscribePacket, version: ProtocolVersion) -> MqttResult<()> {
    validate_packet_id_non_zero(packet.packet_id, "Subscribe")?;

    if packet.subscriptions.is_empty() {
        return Err(validation_failure("Subscribe", "empty subscription list"));
    }

    for subscription in &packet.subscriptions {
        if !is_valid_topic_filter(&subscription.topic_filter) {
            return Err(validation_failure("Subscribe", "invalid topic filter"));
        }
    }

    if let Some(identifier) = packet.subscription_identifier {
        if identifier == 0 || identifier as usize > MAXIMUM_VARIABLE_LENGTH_INTEGER {
            return Err(validation_failure("Subscribe", "subscription identifier out of range"));
        }
    }

    validate_user_properties(&packet.user_properties, version, "Subscribe")?;

    Ok(())
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        log_string!(self.topic_filter, f, "topic_filter");
        log_enum!(self.qos, f, "qos");
        log_primitive_value!(self.no_local, f, "no_local");
        log_primitive_value!(self.retain_as_published, f, "retain_as_published");
        log_enum!(self.retain_handling_type, f, "retain_handling_type");
        write!(f, " }}")
    }
}

impl fmt::Display for SubscribePacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SubscribePacket {{")?;
        log_primitive_value!(self.packet_id, f, "packet_id");
        log_optional_primitive_value!(self.subscription_identifier, f, "subscription_identifier", value);
        log_user_properties!(self.user_properties, f, "user_properties", value);
        write!(f, " subscriptions: [")?;
        for subscription in &self.subscriptions {
            write!(f, " {}", subscription)?;
        }
        write!(f, " ] }}")
    }
}
