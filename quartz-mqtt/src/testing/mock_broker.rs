/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::config::*;
use crate::decode::PacketReader;
use crate::encode::Encoder;
use crate::error::MqttResult;
use crate::mqtt::*;

use log::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{duplex, split, AsyncWriteExt, DuplexStream, WriteHalf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

const DUPLEX_BUFFER_SIZE : usize = 64 * 1024;

#[derive(Default)]
pub(crate) struct BrokerTestContext {
    pub(crate) received_packets: Vec<MqttPacket>,
}

pub(crate) type PacketHandler = Box<dyn Fn(&MqttPacket, &mut VecDeque<MqttPacket>, &mut BrokerTestContext) -> MqttResult<()> + Send + Sync + 'static>;
pub(crate) type PacketHandlerSet = HashMap<PacketType, PacketHandler>;
pub(crate) type PacketHandlerSetFactory = Arc<dyn Fn() -> PacketHandlerSet + Send + Sync>;

enum BrokerCommand {
    Send(MqttPacket),
    Close,
}

/// An in-memory broker.  Every invocation of its connection factory creates a fresh duplex
/// pipe and serves the far end with a newly created handler set.
pub(crate) struct MockBroker {
    handler_set_factory: PacketHandlerSetFactory,
    context: Arc<Mutex<BrokerTestContext>>,
    commands: Arc<Mutex<Option<UnboundedSender<BrokerCommand>>>>,
    connection_count: Arc<AtomicUsize>,
}

impl MockBroker {
    pub(crate) fn new(handler_set_factory: PacketHandlerSetFactory) -> Self {
        MockBroker {
            handler_set_factory,
            context: Arc::new(Mutex::new(BrokerTestContext::default())),
            commands: Arc::new(Mutex::new(None)),
            connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn channel(&self) -> ChannelOptions {
        let handler_set_factory = self.handler_set_factory.clone();
        let context = self.context.clone();
        let commands = self.commands.clone();
        let connection_count = self.connection_count.clone();

        let factory : ConnectionFactory = Arc::new(move || -> ConnectionFactoryReturnType {
            let (client_stream, broker_stream) = duplex(DUPLEX_BUFFER_SIZE);
            let (command_sender, command_receiver) = unbounded_channel();

            *commands.lock().unwrap() = Some(command_sender);
            connection_count.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(run_broker_connection(broker_stream, (handler_set_factory)(), context.clone(), command_receiver));

            let transport : MqttResult<Box<dyn AsyncTransport>> = Ok(Box::new(client_stream));
            Box::pin(async move { transport })
        });

        ChannelOptions::Custom(factory)
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// Writes a packet to the most recent connection, outside of any request/response pairing
    pub(crate) fn send_packet(&self, packet: MqttPacket) {
        if let Some(commands) = self.commands.lock().unwrap().as_ref() {
            let _ = commands.send(BrokerCommand::Send(packet));
        }
    }

    /// Closes the most recent connection from the broker side
    pub(crate) fn close_connection(&self) {
        if let Some(commands) = self.commands.lock().unwrap().take() {
            let _ = commands.send(BrokerCommand::Close);
        }
    }

    pub(crate) fn received_packets(&self) -> Vec<MqttPacket> {
        self.context.lock().unwrap().received_packets.clone()
    }

    pub(crate) fn received_packets_of_type(&self, packet_type: PacketType) -> Vec<MqttPacket> {
        self.received_packets().into_iter().filter(|packet| packet.packet_type() == packet_type).collect()
    }

    /// Polls the received packet log until `count` packets of the given type have arrived
    pub(crate) async fn wait_for_packets(&self, packet_type: PacketType, count: usize) -> Vec<MqttPacket> {
        let wait = async {
            loop {
                let packets = self.received_packets_of_type(packet_type);
                if packets.len() >= count {
                    return packets;
                }

                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        tokio::time::timeout(Duration::from_secs(5), wait).await.expect("broker did not receive the expected packets in time")
    }
}

async fn write_packet(encoder: &mut Encoder, writer: &mut WriteHalf<DuplexStream>, packet: &MqttPacket, version: ProtocolVersion) -> bool {
    let frame = match encoder.encode(packet, version) {
        Ok(frame) => { frame }
        Err(error) => { panic!("Test triggered broker encode failure: {}", error); }
    };

    writer.write_all(frame).await.is_ok() && writer.flush().await.is_ok()
}

async fn run_broker_connection(stream: DuplexStream, handlers: PacketHandlerSet, context: Arc<Mutex<BrokerTestContext>>, mut commands: UnboundedReceiver<BrokerCommand>) {
    let (reader, mut writer) = split(stream);
    let (packet_sender, mut packet_receiver) = unbounded_channel();

    // the reader runs on its own task since read_packet is not cancel-safe
    let read_task = tokio::spawn(async move {
        let mut reader = PacketReader::new(reader, ProtocolVersion::Mqtt311);
        while let Ok(Some(packet)) = reader.read_packet().await {
            if let MqttPacket::Connect(connect) = &packet {
                reader.set_protocol_version(connect.protocol_version);
            }

            if packet_sender.send(packet).is_err() {
                break;
            }
        }
    });

    let mut encoder = Encoder::new();
    let mut version = ProtocolVersion::Mqtt311;

    loop {
        tokio::select! {
            packet = packet_receiver.recv() => {
                let Some(packet) = packet else {
                    break;
                };

                if let MqttPacket::Connect(connect) = &packet {
                    version = connect.protocol_version;
                }

                let mut responses = VecDeque::new();
                {
                    let mut context = context.lock().unwrap();
                    context.received_packets.push(packet.clone());
                    if let Some(handler) = handlers.get(&packet.packet_type()) {
                        if let Err(error) = (handler)(&packet, &mut responses, &mut context) {
                            panic!("Test triggered broker packet handling failure: {}", error);
                        }
                    }
                }

                for response in &responses {
                    if !write_packet(&mut encoder, &mut writer, response, version).await {
                        break;
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Some(BrokerCommand::Send(packet)) => {
                        if !write_packet(&mut encoder, &mut writer, &packet, version).await {
                            break;
                        }
                    }
                    Some(BrokerCommand::Close) | None => {
                        debug!("mock broker - closing connection");
                        break;
                    }
                }
            }
        }
    }

    let _ = writer.shutdown().await;
    read_task.abort();
}

pub(crate) fn handle_connect_with_successful_connack(packet: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    if let MqttPacket::Connect(connect) = packet {
        let mut connack = ConnackPacket::default();
        if connect.protocol_version.is_mqtt5() && connect.client_id.is_empty() {
            connack.assigned_client_identifier = Some("assigned-client-id".to_string());
        }

        response_packets.push_back(MqttPacket::Connack(connack));
    }

    Ok(())
}

pub(crate) fn handle_connect_with_failure_connack(_: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    let connack = ConnackPacket {
        reason_code: ConnectReasonCode::NotAuthorized,
        ..Default::default()
    };

    response_packets.push_back(MqttPacket::Connack(connack));

    Ok(())
}

pub(crate) fn handle_connect_with_session_present(_: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    let connack = ConnackPacket {
        session_present: true,
        ..Default::default()
    };

    response_packets.push_back(MqttPacket::Connack(connack));

    Ok(())
}

pub(crate) fn handle_connect_with_server_keep_alive(_: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    let connack = ConnackPacket {
        server_keep_alive: Some(1),
        ..Default::default()
    };

    response_packets.push_back(MqttPacket::Connack(connack));

    Ok(())
}

pub(crate) fn handle_pingreq_with_pingresp(_: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    response_packets.push_back(MqttPacket::Pingresp(PingrespPacket {}));

    Ok(())
}

pub(crate) fn handle_publish_with_success(packet: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    if let MqttPacket::Publish(publish) = packet {
        match publish.message.qos {
            QualityOfService::AtMostOnce => {}
            QualityOfService::AtLeastOnce => {
                response_packets.push_back(MqttPacket::Puback(PubackPacket { packet_id: publish.packet_id, ..Default::default() }));
            }
            QualityOfService::ExactlyOnce => {
                response_packets.push_back(MqttPacket::Pubrec(PubrecPacket { packet_id: publish.packet_id, ..Default::default() }));
            }
        }
    }

    Ok(())
}

pub(crate) fn handle_publish_with_failure(packet: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    if let MqttPacket::Publish(publish) = packet {
        match publish.message.qos {
            QualityOfService::AtMostOnce => {}
            QualityOfService::AtLeastOnce => {
                response_packets.push_back(MqttPacket::Puback(PubackPacket { packet_id: publish.packet_id, reason_code: PubackReasonCode::QuotaExceeded, ..Default::default() }));
            }
            QualityOfService::ExactlyOnce => {
                response_packets.push_back(MqttPacket::Pubrec(PubrecPacket { packet_id: publish.packet_id, reason_code: PubrecReasonCode::QuotaExceeded, ..Default::default() }));
            }
        }
    }

    Ok(())
}

pub(crate) fn handle_pubrel_with_success(packet: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    if let MqttPacket::Pubrel(pubrel) = packet {
        response_packets.push_back(MqttPacket::Pubcomp(PubcompPacket { packet_id: pubrel.packet_id, ..Default::default() }));
    }

    Ok(())
}

pub(crate) fn handle_subscribe_with_success(packet: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    if let MqttPacket::Subscribe(subscribe) = packet {
        let reason_codes = subscribe.subscriptions.iter().map(|subscription| {
            match subscription.qos {
                QualityOfService::AtMostOnce => { SubackReasonCode::GrantedQos0 }
                QualityOfService::AtLeastOnce => { SubackReasonCode::GrantedQos1 }
                QualityOfService::ExactlyOnce => { SubackReasonCode::GrantedQos2 }
            }
        }).collect();

        response_packets.push_back(MqttPacket::Suback(SubackPacket { packet_id: subscribe.packet_id, reason_codes, ..Default::default() }));
    }

    Ok(())
}

pub(crate) fn handle_subscribe_with_extra_reason_code(packet: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    if let MqttPacket::Subscribe(subscribe) = packet {
        let mut reason_codes = vec!(SubackReasonCode::GrantedQos0; subscribe.subscriptions.len());
        reason_codes.push(SubackReasonCode::NotAuthorized);

        response_packets.push_back(MqttPacket::Suback(SubackPacket { packet_id: subscribe.packet_id, reason_codes, ..Default::default() }));
    }

    Ok(())
}

pub(crate) fn handle_unsubscribe_with_success(packet: &MqttPacket, response_packets: &mut VecDeque<MqttPacket>, context: &mut BrokerTestContext) -> MqttResult<()> {
    if let MqttPacket::Unsubscribe(unsubscribe) = packet {
        let is_mqtt5 = context.received_packets.iter().any(|received| {
            matches!(received, MqttPacket::Connect(connect) if connect.protocol_version.is_mqtt5())
        });

        let reason_codes = if is_mqtt5 { vec!(UnsubackReasonCode::Success; unsubscribe.topic_filters.len()) } else { Vec::new() };
        response_packets.push_back(MqttPacket::Unsuback(UnsubackPacket { packet_id: unsubscribe.packet_id, reason_codes, ..Default::default() }));
    }

    Ok(())
}

pub(crate) fn handle_with_nothing(_: &MqttPacket, _: &mut VecDeque<MqttPacket>, _: &mut BrokerTestContext) -> MqttResult<()> {
    Ok(())
}

pub(crate) fn create_default_packet_handlers() -> PacketHandlerSet {
    let mut handlers : PacketHandlerSet = HashMap::new();

    handlers.insert(PacketType::Connect, Box::new(handle_connect_with_successful_connack));
    handlers.insert(PacketType::Pingreq, Box::new(handle_pingreq_with_pingresp));
    handlers.insert(PacketType::Publish, Box::new(handle_publish_with_success));
    handlers.insert(PacketType::Pubrel, Box::new(handle_pubrel_with_success));
    handlers.insert(PacketType::Subscribe, Box::new(handle_subscribe_with_success));
    handlers.insert(PacketType::Unsubscribe, Box::new(handle_unsubscribe_with_success));
    handlers.insert(PacketType::Disconnect, Box::new(handle_with_nothing));

    handlers
}
