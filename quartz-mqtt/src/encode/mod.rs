/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Packet serialization.  A single `Encoder` lives inside each connection's writer and is reused for
every outbound packet.
 */

pub(crate) mod utils;

use crate::encode::utils::*;
use crate::error::MqttResult;
use crate::mqtt::*;
use crate::mqtt::auth::*;
use crate::mqtt::connack::*;
use crate::mqtt::connect::*;
use crate::mqtt::disconnect::*;
use crate::mqtt::pingreq::*;
use crate::mqtt::pingresp::*;
use crate::mqtt::puback::*;
use crate::mqtt::pubcomp::*;
use crate::mqtt::publish::*;
use crate::mqtt::pubrec::*;
use crate::mqtt::pubrel::*;
use crate::mqtt::suback::*;
use crate::mqtt::subscribe::*;
use crate::mqtt::unsuback::*;
use crate::mqtt::unsubscribe::*;
use crate::validate::validate_packet_outbound;

const ENCODE_BUFFER_DEFAULT_SIZE : usize = 4 * 1024;
const ENCODE_BUFFER_RETAINED_SIZE : usize = 64 * 1024;

// first byte + the longest possible remaining length
const FIXED_HEADER_RESERVED_SIZE : usize = 5;

fn write_packet_body(packet: &MqttPacket, version: ProtocolVersion, dest: &mut Vec<u8>) -> MqttResult<u8> {
    match packet {
        MqttPacket::Connect(connect) => { write_connect_packet(connect, version, dest) }
        MqttPacket::Connack(connack) => { write_connack_packet(connack, version, dest) }
        MqttPacket::Publish(publish) => { write_publish_packet(publish, version, dest) }
        MqttPacket::Puback(puback) => { write_puback_packet(puback, version, dest) }
        MqttPacket::Pubrec(pubrec) => { write_pubrec_packet(pubrec, version, dest) }
        MqttPacket::Pubrel(pubrel) => { write_pubrel_packet(pubrel, version, dest) }
        MqttPacket::Pubcomp(pubcomp) => { write_pubcomp_packet(pubcomp, version, dest) }
        MqttPacket::Subscribe(subscribe) => { write_subscribe_packet(subscribe, version, dest) }
        MqttPacket::Suback(suback) => { write_suback_packet(suback, version, dest) }
        MqttPacket::Unsubscribe(unsubscribe) => { write_unsubscribe_packet(unsubscribe, version, dest) }
        MqttPacket::Unsuback(unsuback) => { write_unsuback_packet(unsuback, version, dest) }
        MqttPacket::Pingreq(pingreq) => { write_pingreq_packet(pingreq, version, dest) }
        MqttPacket::Pingresp(pingresp) => { write_pingresp_packet(pingresp, version, dest) }
        MqttPacket::Disconnect(disconnect) => { write_disconnect_packet(disconnect, version, dest) }
        MqttPacket::Auth(auth) => { write_auth_packet(auth, version, dest) }
    }
}

/// Serializes packets into a growable buffer that is reused across calls.
///
/// The first five bytes of the buffer are reserved for the fixed header.  Once the body has been
/// written and its length is known, the header is written right-aligned into the reserved region
/// and the returned frame starts wherever the header starts, so the body is never moved.
pub(crate) struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    pub(crate) fn new() -> Encoder {
        Encoder {
            buffer: Vec::with_capacity(ENCODE_BUFFER_DEFAULT_SIZE),
        }
    }

    /// Validates and serializes a packet, returning the complete frame.  Nothing is written if
    /// validation fails.
    pub(crate) fn encode(&mut self, packet: &MqttPacket, version: ProtocolVersion) -> MqttResult<&[u8]> {
        validate_packet_outbound(packet, version)?;

        self.reset();
        self.buffer.resize(FIXED_HEADER_RESERVED_SIZE, 0);

        let first_byte = write_packet_body(packet, version, &mut self.buffer)?;

        let remaining_length = self.buffer.len() - FIXED_HEADER_RESERVED_SIZE;
        let remaining_length_size = compute_variable_length_integer_encode_size(remaining_length)?;
        let frame_start = FIXED_HEADER_RESERVED_SIZE - remaining_length_size - 1;

        self.buffer[frame_start] = first_byte;
        encode_vli_to_slice(remaining_length, &mut self.buffer[(frame_start + 1)..FIXED_HEADER_RESERVED_SIZE])?;

        Ok(&self.buffer[frame_start..])
    }

    fn reset(&mut self) {
        self.buffer.clear();
        if self.buffer.capacity() > ENCODE_BUFFER_RETAINED_SIZE {
            self.buffer.shrink_to(ENCODE_BUFFER_DEFAULT_SIZE);
        }
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}
