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

define_ack_packet_write_function!(write_puback_packet, PubackPacket, PUBACK_FIRST_BYTE, PubackReasonCode::Success);
define_ack_packet_decode_function!(decode_puback_packet, Puback, PubackPacket, "Puback", convert_u8_to_puback_reason_code);
validate_ack_outbound!(validate_puback_packet_outbound, PubackPacket, "Puback");
define_ack_packet_display_trait!(PubackPacket, "PubackPacket");
