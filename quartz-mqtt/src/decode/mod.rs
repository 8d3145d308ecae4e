/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Packet deserialization and stream framing.
 */

pub(crate) mod utils;

use crate::decode::utils::*;
use crate::encode::utils::{compute_variable_length_integer_encode_size, MAXIMUM_VARIABLE_LENGTH_INTEGER};
use crate::error::{MqttError, MqttResult};
use crate::logging::*;
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
use crate::mqtt::utils::*;

use log::*;
use tokio::io::{AsyncRead, AsyncReadExt};

const DECODE_BUFFER_DEFAULT_SIZE : usize = 16 * 1024;
const DECODE_BUFFER_RETAINED_SIZE : usize = 256 * 1024;

// fixed header byte + four byte remaining length + the largest remaining length
const MAXIMUM_FRAME_SIZE : usize = 1 + 4 + MAXIMUM_VARIABLE_LENGTH_INTEGER;

fn validate_fixed_header_flags(first_byte: u8, version: ProtocolVersion) -> MqttResult<()> {
    let packet_type = first_byte >> 4;
    let flags = first_byte & 0x0F;

    let expected_flags = match packet_type {
        PACKET_TYPE_PUBLISH => { return Ok(()); }
        PACKET_TYPE_PUBREL | PACKET_TYPE_SUBSCRIBE | PACKET_TYPE_UNSUBSCRIBE => { 0x02 }
        PACKET_TYPE_AUTH => {
            if !version.is_mqtt5() {
                error!("Packet Decode - AUTH packet received on an MQTT {} connection", version);
                return Err(MqttError::new_protocol_violation("AUTH packets are not valid before MQTT5"));
            }
            0
        }
        0 => {
            error!("Packet Decode - reserved packet type 0");
            return Err(MqttError::new_protocol_violation("reserved packet type 0"));
        }
        _ => { 0 }
    };

    if flags != expected_flags {
        error!("Packet Decode - invalid fixed header flags ({:#x}) for packet type {}", flags, packet_type);
        return Err(MqttError::new_protocol_violation("invalid fixed header flags"));
    }

    Ok(())
}

/// Decodes a single packet from its first byte and a body holding exactly remaining-length
/// bytes.
pub(crate) fn decode_packet(first_byte: u8, packet_body: &[u8], version: ProtocolVersion) -> MqttResult<MqttPacket> {
    validate_fixed_header_flags(first_byte, version)?;

    match first_byte >> 4 {
        PACKET_TYPE_CONNECT => { decode_connect_packet(packet_body) }
        PACKET_TYPE_CONNACK => { decode_connack_packet(packet_body, version) }
        PACKET_TYPE_PUBLISH => { decode_publish_packet(first_byte, packet_body, version) }
        PACKET_TYPE_PUBACK => { decode_puback_packet(packet_body, version) }
        PACKET_TYPE_PUBREC => { decode_pubrec_packet(packet_body, version) }
        PACKET_TYPE_PUBREL => { decode_pubrel_packet(packet_body, version) }
        PACKET_TYPE_PUBCOMP => { decode_pubcomp_packet(packet_body, version) }
        PACKET_TYPE_SUBSCRIBE => { decode_subscribe_packet(packet_body, version) }
        PACKET_TYPE_SUBACK => { decode_suback_packet(packet_body, version) }
        PACKET_TYPE_UNSUBSCRIBE => { decode_unsubscribe_packet(packet_body, version) }
        PACKET_TYPE_UNSUBACK => { decode_unsuback_packet(packet_body, version) }
        PACKET_TYPE_PINGREQ => { decode_pingreq_packet(packet_body) }
        PACKET_TYPE_PINGRESP => { decode_pingresp_packet(packet_body) }
        PACKET_TYPE_DISCONNECT => { decode_disconnect_packet(packet_body, version) }
        PACKET_TYPE_AUTH => { decode_auth_packet(packet_body) }
        _ => {
            Err(MqttError::new_protocol_violation("unknown packet type"))
        }
    }
}

/// Reads the protocol name and level at the front of a CONNECT body without consuming it.
pub(crate) fn detect_protocol_version(connect_body: &[u8]) -> MqttResult<ProtocolVersion> {
    let mut protocol_name = String::new();
    let after_name = decode_length_prefixed_string(connect_body, &mut protocol_name)?;

    let mut protocol_level = 0;
    decode_u8(after_name, &mut protocol_level)?;

    match (protocol_name.as_str(), protocol_level) {
        ("MQIsdp", 3) => { Ok(ProtocolVersion::Mqtt31) }
        ("MQTT", 4) => { Ok(ProtocolVersion::Mqtt311) }
        ("MQTT", 5) => { Ok(ProtocolVersion::Mqtt5) }
        _ => {
            error!("ConnectPacket Decode - unsupported protocol name/level: {}/{}", protocol_name, protocol_level);
            Err(MqttError::new_protocol_violation(format!("unsupported protocol name/level: {}/{}", protocol_name, protocol_level)))
        }
    }
}

/// Frames packets off an async byte stream: one fixed header byte, a one to four byte remaining
/// length, then exactly that many body bytes.
pub(crate) struct PacketReader<R> {
    reader: R,
    version: ProtocolVersion,
    maximum_packet_size: usize,
    body: Vec<u8>,
}

impl<R> PacketReader<R> where R : AsyncRead + Unpin {
    pub(crate) fn new(reader: R, version: ProtocolVersion) -> Self {
        PacketReader {
            reader,
            version,
            maximum_packet_size: MAXIMUM_FRAME_SIZE,
            body: Vec::with_capacity(DECODE_BUFFER_DEFAULT_SIZE),
        }
    }

    /// Bounds the total size, fixed header included, of any packet this reader accepts.  `None`
    /// leaves only the protocol's own limit.
    pub(crate) fn with_maximum_packet_size(mut self, maximum_packet_size: Option<u32>) -> Self {
        if let Some(maximum_packet_size) = maximum_packet_size {
            self.maximum_packet_size = maximum_packet_size as usize;
        }

        self
    }

    pub(crate) fn set_protocol_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    /// Reads the next packet.  `Ok(None)` means the stream ended cleanly on a packet boundary.
    pub(crate) async fn read_packet(&mut self) -> MqttResult<Option<MqttPacket>> {
        let mut first_byte = [0u8; 1];
        if self.reader.read(&mut first_byte).await? == 0 {
            return Ok(None);
        }

        let remaining_length = self.read_remaining_length().await?;
        let packet_size = 1 + compute_variable_length_integer_encode_size(remaining_length)? + remaining_length;
        if packet_size > self.maximum_packet_size {
            error!("Packet Decode - inbound packet of {} bytes exceeds the maximum packet size of {}", packet_size, self.maximum_packet_size);
            return Err(MqttError::new_protocol_violation("inbound packet exceeds the maximum packet size"));
        }

        if self.body.capacity() > DECODE_BUFFER_RETAINED_SIZE && remaining_length <= DECODE_BUFFER_DEFAULT_SIZE {
            self.body = Vec::with_capacity(DECODE_BUFFER_DEFAULT_SIZE);
        }

        // the body buffer only grows as bytes actually arrive
        self.body.clear();
        let bytes_read = match (&mut self.reader).take(remaining_length as u64).read_to_end(&mut self.body).await {
            Ok(bytes_read) => { bytes_read }
            Err(err) => { return Err(Self::map_read_error(err)); }
        };

        if bytes_read < remaining_length {
            warn!("Packet Decode - stream ended after {} of {} body bytes", bytes_read, remaining_length);
            return Err(MqttError::new_connection_closed("stream ended in the middle of a packet"));
        }

        let packet = decode_packet(first_byte[0], &self.body, self.version)?;
        log_packet("Received packet: ", &packet);

        Ok(Some(packet))
    }

    async fn read_remaining_length(&mut self) -> MqttResult<usize> {
        let mut value : usize = 0;
        for i in 0..4 {
            let byte = match self.reader.read_u8().await {
                Ok(byte) => { byte }
                Err(err) => { return Err(Self::map_read_error(err)); }
            };

            value |= ((byte & 0x7F) as usize) << (7 * i);
            if (byte & 0x80) == 0 {
                return Ok(value);
            }
        }

        error!("Packet Decode - invalid variable length integer");
        Err(MqttError::new_protocol_violation("remaining length has more than four bytes"))
    }

    fn map_read_error(err: std::io::Error) -> MqttError {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            warn!("Packet Decode - stream ended in the middle of a packet");
            return MqttError::new_connection_closed("stream ended in the middle of a packet");
        }

        err.into()
    }
}
