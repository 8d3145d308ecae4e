/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::error::{MqttError, MqttResult};
use crate::mqtt::*;

use log::*;

pub(crate) const MAXIMUM_STRING_PROPERTY_LENGTH : usize = 65535;
pub(crate) const MAXIMUM_BINARY_PROPERTY_LENGTH : usize = 65535;

pub(crate) fn validation_failure(packet_name: &str, message: &str) -> MqttError {
    error!("{}Packet Validation - {}", packet_name, message);
    MqttError::new_protocol_violation(format!("{} validation failure: {}", packet_name, message))
}

pub(crate) fn validate_string_length(value: &str, packet_name: &str, field_name: &str) -> MqttResult<()> {
    if value.len() > MAXIMUM_STRING_PROPERTY_LENGTH {
        return Err(validation_failure(packet_name, &format!("{} string field too long", field_name)));
    }

    Ok(())
}

pub(crate) fn validate_optional_string_length(optional_string: &Option<String>, packet_name: &str, field_name: &str) -> MqttResult<()> {
    if let Some(value) = optional_string {
        validate_string_length(value, packet_name, field_name)?;
    }

    Ok(())
}

pub(crate) fn validate_optional_binary_length(optional_data: &Option<Vec<u8>>, packet_name: &str, field_name: &str) -> MqttResult<()> {
    if let Some(value) = optional_data {
        if value.len() > MAXIMUM_BINARY_PROPERTY_LENGTH {
            return Err(validation_failure(packet_name, &format!("{} binary field too long", field_name)));
        }
    }

    Ok(())
}

/// User properties do not exist before MQTT5.  Rather than silently dropping them, 3.x
/// connections reject packets that carry any.
pub(crate) fn validate_user_properties(properties: &Option<Vec<UserProperty>>, version: ProtocolVersion, packet_name: &str) -> MqttResult<()> {
    if let Some(props) = properties {
        if !version.is_mqtt5() && !props.is_empty() {
            return Err(validation_failure(packet_name, &format!("user properties are not supported by MQTT {}", version)));
        }

        for property in props {
            validate_string_length(&property.name, packet_name, "UserProperty Name")?;
            validate_string_length(&property.value, packet_name, "UserProperty Value")?;
        }
    }

    Ok(())
}

pub(crate) fn validate_packet_id_non_zero(packet_id: u16, packet_name: &str) -> MqttResult<()> {
    if packet_id == 0 {
        return Err(validation_failure(packet_name, "packet id is zero"));
    }

    Ok(())
}

/// Topic names may not be empty and may not contain wildcard characters.
pub(crate) fn is_valid_topic(topic: &str) -> bool {
    if topic.is_empty() || topic.len() > MAXIMUM_STRING_PROPERTY_LENGTH {
        return false;
    }

    !topic.contains(['#', '+'])
}

pub(crate) fn is_valid_topic_filter(topic_filter: &str) -> bool {
    !topic_filter.is_empty() && topic_filter.len() <= MAXIMUM_STRING_PROPERTY_LENGTH
}

macro_rules! validate_ack_outbound {
    ($function_name: ident, $packet_type_name: ident, $packet_type_string: expr) => {
        pub(crate) fn $function_name(packet: &$packet_type_name, version: ProtocolVersion) -> MqttResult<()> {

            validate_packet_id_non_zero(packet.packet_id, $packet_type_string)?;
            validate_optional_string_length(&packet.reason_string, $packet_type_string, "reason_string")?;
            validate_user_properties(&packet.user_properties, version, $packet_type_string)?;

            Ok(())
        }
    };
}

pub(crate) use validate_ack_outbound;
