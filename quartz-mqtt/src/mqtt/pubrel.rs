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

define_ack_packet_write_function!(write_pubrel_packet, PubrelPacket, PUBREL_FIRST_BYTE, PubrelReasonCode::Success);
define_ack_packet_decode_function!(decode_pubrel_packet, Pubrel, PubrelPacket, "Pubrel", convert_u8_to_pubrel_reason_code);
validate_ack_outbound!(validate_pubrel_packet_outbound, PubrelPacket, "Pubrel");
define_ack_packet_display_trait!(PubrelPacket, "PubrelPacket");

#[cfg(test)]
mod tests {

    use super::*;
    use crate::decode::testing::*;
    use crate::validate::testing::*;

    fn create_pubrel_with_all_properties() -> PubrelPacket {
        PubrelPacket {
            packet_id: 500,
            reason_code: PubrelReasonCode::PacketIdentifierNotFound,
            reason_string: Some("Who are you?".to_string()),
            user_properties: Some(create_user_properties()),
        }
    }

    #[test]
    fn pubrel_round_trip_encode_decode() {
        assert!(do_round_trip_encode_decode_test(&MqttPacket::Pubrel(create_pubrel_with_all_properties()), ProtocolVersion::Mqtt5));

        let packet = PubrelPacket {
            packet_id: 500,
            ..Default::default()
        };

        assert!(do_round_trip_encode_decode_test(&MqttPacket::Pubrel(packet), ProtocolVersion::Mqtt311));
    }

    #[test]
    fn pubrel_fixed_header_has_reserved_bit() {
        let packet = PubrelPacket {
            packet_id: 3,
            ..Default::default()
        };

        let encoded = encode_packet_for_test(&MqttPacket::Pubrel(packet), ProtocolVersion::Mqtt311);
        assert_eq!(&[0x62u8, 2, 0, 3], encoded.as_slice());
    }

    #[test]
    fn pubrel_decode_failure_missing_reserved_bit() {
        let packet = create_pubrel_with_all_properties();

        let clear_reserved_bit = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone[0] &= 0xF0;
            clone
        };

        do_mutated_decode_failure_test(&MqttPacket::Pubrel(packet), ProtocolVersion::Mqtt5, clear_reserved_bit);
    }

    #[test]
    fn pubrel_validate_failure() {
        let mut packet = create_pubrel_with_all_properties();
        verify_validation_failure(&MqttPacket::Pubrel(packet.clone()), ProtocolVersion::Mqtt31);

        packet.packet_id = 0;
        verify_validation_failure(&MqttPacket::Pubrel(packet), ProtocolVersion::Mqtt5);
    }
}
