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

define_ack_packet_write_function!(write_pubcomp_packet, PubcompPacket, PUBCOMP_FIRST_BYTE, PubcompReasonCode::Success);
define_ack_packet_decode_function!(decode_pubcomp_packet, Pubcomp, PubcompPacket, "Pubcomp", convert_u8_to_pubcomp_reason_code);
validate_ack_outbound!(validate_pubcomp_packet_outbound, PubcompPacket, "Pubcomp");
define_ack_packet_display_trait!(PubcompPacket, "PubcompPacket");
