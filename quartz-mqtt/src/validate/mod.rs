/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Outbound packet validation.  Run by the encoder before a single byte is written, so a packet
that fails validation never reaches the wire.
 */

pub(crate) mod utils;

use crate::error::MqttResult;
use crate::mqtt::*;
use crate::mqtt::auth::*;
use crate::mqtt::connack::*;
use crate::mqtt::connect::*;
use crate::mqtt::disconnect::*;
use crate::mqtt::puback::*;
use crate::mqtt::pubcomp::*;
use crate::mqtt::publish::*;
use crate::mqtt::pubrec::*;
use crate::mqtt::pubrel::*;
use crate::mqtt::suback::*;
use crate::mqtt::subscribe::*;
use crate::mqtt::unsuback::*;
use crate::mqtt::unsubscribe::*;

/// Validates a packet against the structural rules of the given protocol version.
///
/// Utf-8 codepoints are not checked beyond what `String` already guarantees.
pub(crate) fn validate_packet_outbound(packet: &MqttPacket, version: ProtocolVersion) -> MqttResult<()> {
    match packet {
        MqttPacket::Auth(auth) => { validate_auth_packet_outbound(auth, version) }
        MqttPacket::Connack(connack) => { validate_connack_packet_outbound(connack, version) }
        MqttPacket::Connect(connect) => { validate_connect_packet_outbound(connect, version) }
        MqttPacket::Disconnect(disconnect) => { validate_disconnect_packet_outbound(disconnect, version) }
        MqttPacket::Pingreq(_) => { Ok(()) }
        MqttPacket::Pingresp(_) => { Ok(()) }
        MqttPacket::Puback(puback) => { validate_puback_packet_outbound(puback, version) }
        MqttPacket::Pubcomp(pubcomp) => { validate_pubcomp_packet_outbound(pubcomp, version) }
        MqttPacket::Publish(publish) => { validate_publish_packet_outbound(publish, version) }
        MqttPacket::Pubrec(pubrec) => { validate_pubrec_packet_outbound(pubrec, version) }
        MqttPacket::Pubrel(pubrel) => { validate_pubrel_packet_outbound(pubrel, version) }
        MqttPacket::Suback(suback) => { validate_suback_packet_outbound(suback, version) }
        MqttPacket::Subscribe(subscribe) => { validate_subscribe_packet_outbound(subscribe, version) }
        MqttPacket::Unsuback(unsuback) => { validate_unsuback_packet_outbound(unsuback, version) }
        MqttPacket::Unsubscribe(unsubscribe) => { validate_unsubscribe_packet_outbound(unsubscribe, version) }
    }
}
