/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::decode::utils::*;
use crate::error::MqttResult;
use crate::mqtt::*;
use crate::mqtt::utils::*;

use std::fmt;

pub(crate) fn write_pingresp_packet(_: &PingrespPacket, _: ProtocolVersion, _: &mut Vec<u8>) -> MqttResult<u8> {
    Ok(PINGRESP_FIRST_BYTE)
}

pub(crate) fn decode_pingresp_packet(packet_body: &[u8]) -> MqttResult<MqttPacket> {
    expect_fully_consumed(packet_body, "Pingresp")?;

    Ok(MqttPacket::Pingresp(PingrespPacket{}))
}

impl fmt::Display for PingrespPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PingrespPacket {{ }}")
    }
}
