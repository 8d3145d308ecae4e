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

define_ack_packet_write_function!(write_pubrec_packet, PubrecPacket, PUBREC_FIRST_BYTE, PubrecReasonCode::Success);
define_ack_packet_decode_function!(decode_pubrec_packet, Pubrec, PubrecPacket, "Pubrec", convert_u8_to_pubrec_reason_code);
validate_ack_outbound!(validate_pubrec_packet_outbound, PubrecPacket, "Pubrec");
define_ack_packet_display_trait!(PubrecPacket, "PubrecPacket");
