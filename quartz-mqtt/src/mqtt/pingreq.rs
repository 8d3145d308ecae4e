/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::decode::utils::*;
use crate::error::MqttResult;
use crate::mqtt::*;
use crate::mqtt::utils::*;

use std::fmt;

pub(crate) fn write_pingreq_packet(_: &PingreqPacket, _: ProtocolVersion, _: &mut Vec<u8>) -> MqttResult<u8> {
    Ok(PINGREQ_FIRST_BYTE)
}

pub(crate) fn decode_pingreq_packet(packet_body: &[u8]) -> MqttResult<MqttPacket> {
    expect_fully_consumed(packet_body, "Pingreq")?;

    Ok(MqttPacket::Pingreq(PingreqPacket{}))
}

impl fmt::Display for PingreqPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PingreqPacket {{ }}")
    }
}
