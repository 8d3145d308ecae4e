/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::client::*;
use crate::config::*;
use crate::error::{MqttError, MqttResult};
use crate::mqtt::*;
use crate::testing::event_waiter::*;
use crate::testing::mock_broker::*;

use assert_matches::assert_matches;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

const ALL_PROTOCOL_VERSIONS : [ProtocolVersion; 3] = [ProtocolVersion::Mqtt31, ProtocolVersion::Mqtt311, ProtocolVersion::Mqtt5];

fn unique_client_id() -> String {
    // short enough for MQTT 3.1's 23 character limit
    Uuid::new_v4().simple().to_string()[..20].to_string()
}

fn default_broker() -> MockBroker {
    MockBroker::new(Arc::new(create_default_packet_handlers))
}

type HandlerFn = fn(&MqttPacket, &mut VecDeque<MqttPacket>, &mut BrokerTestContext) -> MqttResult<()>;

fn broker_with_handler(packet_type: PacketType, handler: HandlerFn) -> MockBroker {
    MockBroker::new(Arc::new(move || {
        let mut handlers = create_default_packet_handlers();
        handlers.insert(packet_type, Box::new(handler));
        handlers
    }))
}

fn broker_without_handler(packet_type: PacketType) -> MockBroker {
    MockBroker::new(Arc::new(move || {
        let mut handlers = create_default_packet_handlers();
        handlers.remove(&packet_type);
        handlers
    }))
}

fn client_options_builder(broker: &MockBroker, version: ProtocolVersion) -> MqttClientOptionsBuilder {
    let connect_options = ConnectOptions::builder()
        .with_client_id(&unique_client_id())
        .build();

    let mut builder = MqttClientOptions::builder(broker.channel());
    builder.with_protocol_version(version)
        .with_connect_options(connect_options)
        .with_communication_timeout(Duration::from_secs(2));

    builder
}

async fn connect_client(broker: &MockBroker, options: MqttClientOptions) -> (Arc<MqttClient>, ClientEventRecorder) {
    let client = Arc::new(MqttClient::new(&Handle::current()));
    let mut recorder = ClientEventRecorder::new(&client);

    client.connect(options).await.expect("connect failed");
    assert_matches!(*recorder.next_event().await, ClientEvent::Connecting(_));
    assert_matches!(*recorder.next_event().await, ClientEvent::Connected(_));
    assert_eq!(1, broker.received_packets_of_type(PacketType::Connect).len());

    (client, recorder)
}

async fn connect_default_client(broker: &MockBroker, version: ProtocolVersion) -> (Arc<MqttClient>, ClientEventRecorder) {
    connect_client(broker, client_options_builder(broker, version).build()).await
}

type DeliveryReceiver = UnboundedReceiver<(String, Option<PendingAcknowledgement>)>;

fn add_recording_handler(client: &MqttClient, disposition: MessageDisposition) -> DeliveryReceiver {
    let (sender, receiver) = unbounded_channel();
    client.add_message_handler(Arc::new(move |received: &ReceivedMessage| {
        let _ = sender.send((received.message().topic().to_string(), received.pending_acknowledgement()));
        disposition
    }));

    receiver
}

async fn next_delivery(receiver: &mut DeliveryReceiver) -> (String, Option<PendingAcknowledgement>) {
    tokio::time::timeout(Duration::from_secs(5), receiver.recv()).await
        .expect("timed out waiting for a message delivery")
        .expect("delivery channel closed")
}

fn inbound_publish(topic: &str, qos: QualityOfService, packet_id: u16) -> MqttPacket {
    MqttPacket::Publish(PublishPacket {
        packet_id,
        duplicate: false,
        message: ApplicationMessage::builder(topic, qos).with_payload("payload".as_bytes()).build(),
    })
}

#[tokio::test]
async fn connect_success_all_versions() {
    for version in ALL_PROTOCOL_VERSIONS {
        let broker = default_broker();
        let (client, _recorder) = connect_default_client(&broker, version).await;

        assert_eq!(ConnectionState::Connected, client.connection_state());
        assert_matches!(&broker.received_packets()[0], MqttPacket::Connect(connect) if connect.protocol_version == version);
    }
}

#[tokio::test]
async fn connect_assigned_client_id_mqtt5() {
    let broker = default_broker();
    let client = MqttClient::new(&Handle::current());

    let options = MqttClientOptions::builder(broker.channel())
        .with_protocol_version(ProtocolVersion::Mqtt5)
        .build();

    let connack = client.connect(options).await.unwrap();
    assert_eq!(Some("assigned-client-id"), connack.assigned_client_identifier());
}

#[tokio::test]
async fn connect_refused() {
    let broker = broker_with_handler(PacketType::Connect, handle_connect_with_failure_connack);
    let client = MqttClient::new(&Handle::current());
    let mut recorder = ClientEventRecorder::new(&client);

    let result = client.connect(client_options_builder(&broker, ProtocolVersion::Mqtt311).build()).await;
    assert_matches!(result, Err(MqttError::ConnectionRefused(context)) if context.reason_code == ConnectReasonCode::NotAuthorized);
    assert_eq!(ConnectionState::Disconnected, client.connection_state());

    assert_matches!(*recorder.next_event().await, ClientEvent::Connecting(_));
    let event = recorder.next_event().await;
    assert_matches!(&*event, ClientEvent::Disconnected(DisconnectedEvent { was_connected: false, error: MqttError::ConnectionRefused(_), .. }));
}

#[tokio::test]
async fn connect_times_out_without_connack() {
    let broker = broker_without_handler(PacketType::Connect);
    let client = MqttClient::new(&Handle::current());

    let options = client_options_builder(&broker, ProtocolVersion::Mqtt5)
        .with_communication_timeout(Duration::from_millis(200))
        .build();

    assert_matches!(client.connect(options).await, Err(MqttError::CommunicationTimedOut(_)));
    assert_eq!(ConnectionState::Disconnected, client.connection_state());
}

#[tokio::test]
async fn connect_transport_failure() {
    let client = MqttClient::new(&Handle::current());
    let mut recorder = ClientEventRecorder::new(&client);

    let factory : ConnectionFactory = Arc::new(|| -> ConnectionFactoryReturnType {
        Box::pin(async { Err(MqttError::new_transport_error("connection refused")) })
    });

    let options = MqttClientOptions::builder(ChannelOptions::Custom(factory)).build();
    assert_matches!(client.connect(options).await, Err(MqttError::TransportError(_)));
    assert_eq!(ConnectionState::Disconnected, client.connection_state());

    assert_matches!(*recorder.next_event().await, ClientEvent::Connecting(_));
    assert_matches!(*recorder.next_event().await, ClientEvent::Disconnected(DisconnectedEvent { was_connected: false, .. }));
}

#[tokio::test]
async fn connect_invalid_options_never_opens_transport() {
    let broker = default_broker();
    let client = MqttClient::new(&Handle::current());

    let connect_options = ConnectOptions::builder()
        .with_client_id(&unique_client_id())
        .with_password("no-username".as_bytes())
        .build();

    let options = client_options_builder(&broker, ProtocolVersion::Mqtt311)
        .with_connect_options(connect_options)
        .build();

    assert_matches!(client.connect(options).await, Err(MqttError::ProtocolViolation(_)));
    assert_eq!(0, broker.connection_count());
    assert_eq!(ConnectionState::Disconnected, client.connection_state());
}

#[tokio::test]
async fn connect_while_connected_is_invalid_state() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    let result = client.connect(client_options_builder(&broker, ProtocolVersion::Mqtt311).build()).await;
    assert_matches!(result, Err(MqttError::InvalidState(_)));
    assert_eq!(ConnectionState::Connected, client.connection_state());
    assert_eq!(1, broker.connection_count());
}

#[tokio::test]
async fn operations_require_connection() {
    let client = MqttClient::new(&Handle::current());

    let message = ApplicationMessage::builder("a/b", QualityOfService::AtLeastOnce).build();
    assert_matches!(client.publish(message, PublishOptions::default()).await, Err(MqttError::NotConnected(_)));
    assert_matches!(client.subscribe(vec!(Subscription::new("a/#", QualityOfService::AtMostOnce)), SubscribeOptions::default()).await, Err(MqttError::NotConnected(_)));
    assert_matches!(client.unsubscribe(vec!("a/#".to_string()), UnsubscribeOptions::default()).await, Err(MqttError::NotConnected(_)));
    assert_matches!(client.ping(PingOptions::default()).await, Err(MqttError::NotConnected(_)));
    assert!(client.disconnect(DisconnectOptions::default()).await.is_ok());
}

#[tokio::test]
async fn publish_all_qos_all_versions() {
    for version in ALL_PROTOCOL_VERSIONS {
        let broker = default_broker();
        let (client, _recorder) = connect_default_client(&broker, version).await;

        let qos0 = ApplicationMessage::builder("hello/qos0", QualityOfService::AtMostOnce).with_payload("zero".as_bytes()).build();
        assert_eq!(PublishResponse::Qos0, client.publish(qos0, PublishOptions::default()).await.unwrap());

        let qos1 = ApplicationMessage::builder("hello/qos1", QualityOfService::AtLeastOnce).build();
        let response = client.publish(qos1, PublishOptions::default()).await.unwrap();
        assert_matches!(response, PublishResponse::Qos1(puback) if puback.packet_id() == 1 && puback.reason_code().is_success());

        let qos2 = ApplicationMessage::builder("hello/qos2", QualityOfService::ExactlyOnce).build();
        let response = client.publish(qos2, PublishOptions::default()).await.unwrap();
        assert_matches!(response, PublishResponse::Qos2(Qos2Response { pubrec, pubcomp: Some(pubcomp) }) => {
            assert_eq!(2, pubrec.packet_id());
            assert_eq!(2, pubcomp.packet_id());
        });

        let publishes = broker.received_packets_of_type(PacketType::Publish);
        assert_eq!(3, publishes.len());
        assert_matches!(&publishes[0], MqttPacket::Publish(publish) if publish.packet_id == 0 && publish.message.payload() == "zero".as_bytes());
        assert_eq!(1, broker.received_packets_of_type(PacketType::Pubrel).len());
    }
}

#[tokio::test]
async fn publish_qos2_failing_pubrec_ends_exchange() {
    let broker = broker_with_handler(PacketType::Publish, handle_publish_with_failure);
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt5).await;

    let message = ApplicationMessage::builder("hello/qos2", QualityOfService::ExactlyOnce).build();
    let response = client.publish(message, PublishOptions::default()).await.unwrap();
    assert_matches!(response, PublishResponse::Qos2(Qos2Response { pubrec, pubcomp: None }) if pubrec.reason_code() == PubrecReasonCode::QuotaExceeded);

    // a later ping proves the client wrote nothing else in between
    client.ping(PingOptions::default()).await.unwrap();
    assert!(broker.received_packets_of_type(PacketType::Pubrel).is_empty());
}

#[tokio::test]
async fn publish_timeout_is_not_fatal() {
    let broker = broker_without_handler(PacketType::Publish);
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    let message = ApplicationMessage::builder("no/ack", QualityOfService::AtLeastOnce).build();
    let options = PublishOptions::builder().with_timeout(Duration::from_millis(100)).build();
    assert_matches!(client.publish(message, options).await, Err(MqttError::CommunicationTimedOut(_)));

    assert_eq!(ConnectionState::Connected, client.connection_state());
    client.ping(PingOptions::default()).await.unwrap();
}

#[tokio::test]
async fn publish_invalid_topic_fails_without_writing() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    let message = ApplicationMessage::builder("bad/+/topic", QualityOfService::AtLeastOnce).build();
    assert_matches!(client.publish(message, PublishOptions::default()).await, Err(MqttError::ProtocolViolation(_)));

    assert_eq!(ConnectionState::Connected, client.connection_state());
    client.ping(PingOptions::default()).await.unwrap();
    assert!(broker.received_packets_of_type(PacketType::Publish).is_empty());
}

#[tokio::test]
async fn subscribe_and_unsubscribe_all_versions() {
    for version in ALL_PROTOCOL_VERSIONS {
        let broker = default_broker();
        let (client, _recorder) = connect_default_client(&broker, version).await;

        let subscriptions = vec!(
            Subscription::new("a/+", QualityOfService::AtMostOnce),
            Subscription::new("b/#", QualityOfService::ExactlyOnce),
        );

        let suback = client.subscribe(subscriptions, SubscribeOptions::default()).await.unwrap();
        assert_eq!(&[SubackReasonCode::GrantedQos0, SubackReasonCode::GrantedQos2], suback.reason_codes());

        let unsuback = client.unsubscribe(vec!("a/+".to_string(), "b/#".to_string()), UnsubscribeOptions::default()).await.unwrap();
        if version.is_mqtt5() {
            assert_eq!(&[UnsubackReasonCode::Success, UnsubackReasonCode::Success], unsuback.reason_codes());
        } else {
            assert!(unsuback.reason_codes().is_empty());
        }
    }
}

#[tokio::test]
async fn subscribe_with_identifier_mqtt5() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt5).await;

    let options = SubscribeOptions::builder()
        .with_subscription_identifier(42)
        .with_user_properties(vec!(UserProperty::new("key", "value")))
        .build();

    client.subscribe(vec!(Subscription::new("c/d", QualityOfService::AtLeastOnce)), options).await.unwrap();

    let subscribes = broker.received_packets_of_type(PacketType::Subscribe);
    assert_matches!(&subscribes[0], MqttPacket::Subscribe(subscribe) if subscribe.subscription_identifier == Some(42));
}

#[tokio::test]
async fn suback_reason_code_count_mismatch_is_fatal() {
    let broker = broker_with_handler(PacketType::Subscribe, handle_subscribe_with_extra_reason_code);
    let (client, mut recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt5).await;

    let result = client.subscribe(vec!(Subscription::new("a/b", QualityOfService::AtMostOnce)), SubscribeOptions::default()).await;
    assert_matches!(result, Err(MqttError::ProtocolViolation(_)));

    let event = recorder.wait_for_disconnected().await;
    assert_matches!(&*event, ClientEvent::Disconnected(DisconnectedEvent { was_connected: true, error: MqttError::ProtocolViolation(_), .. }));
    assert_eq!(ConnectionState::Disconnected, client.connection_state());
}

#[tokio::test]
async fn inbound_qos0_and_qos1_delivery() {
    for version in ALL_PROTOCOL_VERSIONS {
        let broker = default_broker();
        let (client, _recorder) = connect_default_client(&broker, version).await;
        let mut deliveries = add_recording_handler(&client, MessageDisposition::Accept);

        broker.send_packet(inbound_publish("inbound/qos0", QualityOfService::AtMostOnce, 0));
        let (topic, acknowledgement) = next_delivery(&mut deliveries).await;
        assert_eq!("inbound/qos0", topic);
        assert_eq!(None, acknowledgement);

        broker.send_packet(inbound_publish("inbound/qos1", QualityOfService::AtLeastOnce, 11));
        let (topic, _) = next_delivery(&mut deliveries).await;
        assert_eq!("inbound/qos1", topic);

        let pubacks = broker.wait_for_packets(PacketType::Puback, 1).await;
        assert_matches!(&pubacks[0], MqttPacket::Puback(puback) if puback.packet_id == 11);
    }
}

#[tokio::test]
async fn inbound_qos2_is_delivered_once() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt5).await;
    let mut deliveries = add_recording_handler(&client, MessageDisposition::Accept);

    broker.send_packet(inbound_publish("inbound/qos2", QualityOfService::ExactlyOnce, 7));
    let (topic, _) = next_delivery(&mut deliveries).await;
    assert_eq!("inbound/qos2", topic);
    broker.wait_for_packets(PacketType::Pubrec, 1).await;

    // a retry before PUBREL is acknowledged again but not redelivered
    broker.send_packet(inbound_publish("inbound/qos2", QualityOfService::ExactlyOnce, 7));
    broker.wait_for_packets(PacketType::Pubrec, 2).await;
    assert!(deliveries.try_recv().is_err());

    broker.send_packet(MqttPacket::Pubrel(PubrelPacket { packet_id: 7, ..Default::default() }));
    let pubcomps = broker.wait_for_packets(PacketType::Pubcomp, 1).await;
    assert_matches!(&pubcomps[0], MqttPacket::Pubcomp(pubcomp) if pubcomp.packet_id == 7 && pubcomp.reason_code == PubcompReasonCode::Success);

    broker.send_packet(MqttPacket::Pubrel(PubrelPacket { packet_id: 7, ..Default::default() }));
    let pubcomps = broker.wait_for_packets(PacketType::Pubcomp, 2).await;
    assert_matches!(&pubcomps[1], MqttPacket::Pubcomp(pubcomp) if pubcomp.reason_code == PubcompReasonCode::PacketIdentifierNotFound);

    // once released, the same packet id is a new message
    broker.send_packet(inbound_publish("inbound/qos2/again", QualityOfService::ExactlyOnce, 7));
    let (topic, _) = next_delivery(&mut deliveries).await;
    assert_eq!("inbound/qos2/again", topic);
}

#[tokio::test]
async fn inbound_qos2_rejection_allows_redelivery() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    client.add_message_handler(Arc::new(move |_: &ReceivedMessage| {
        if handler_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            MessageDisposition::Reject
        } else {
            MessageDisposition::Accept
        }
    }));

    broker.send_packet(inbound_publish("inbound/qos2", QualityOfService::ExactlyOnce, 9));
    client.ping(PingOptions::default()).await.unwrap();
    assert_eq!(1, calls.load(Ordering::SeqCst));
    assert!(broker.received_packets_of_type(PacketType::Pubrec).is_empty());

    broker.send_packet(inbound_publish("inbound/qos2", QualityOfService::ExactlyOnce, 9));
    let pubrecs = broker.wait_for_packets(PacketType::Pubrec, 1).await;
    assert_matches!(&pubrecs[0], MqttPacket::Pubrec(pubrec) if pubrec.packet_id == 9);
    assert_eq!(2, calls.load(Ordering::SeqCst));
}

#[tokio::test]
async fn handler_dispositions_combine() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    let mut deliveries = add_recording_handler(&client, MessageDisposition::Accept);
    client.add_message_handler(Arc::new(|_: &ReceivedMessage| -> MessageDisposition { panic!("handler failure") }));

    broker.send_packet(inbound_publish("inbound/qos1", QualityOfService::AtLeastOnce, 4));
    next_delivery(&mut deliveries).await;

    // the panicking handler counts as a rejection, so no PUBACK goes out
    client.ping(PingOptions::default()).await.unwrap();
    assert!(broker.received_packets_of_type(PacketType::Puback).is_empty());
    assert_eq!(ConnectionState::Connected, client.connection_state());
}

#[tokio::test]
async fn deferred_acknowledgement() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt5).await;
    let mut deliveries = add_recording_handler(&client, MessageDisposition::Defer);

    broker.send_packet(inbound_publish("deferred/qos1", QualityOfService::AtLeastOnce, 3));
    let (_, acknowledgement) = next_delivery(&mut deliveries).await;

    client.ping(PingOptions::default()).await.unwrap();
    assert!(broker.received_packets_of_type(PacketType::Puback).is_empty());

    client.acknowledge(acknowledgement.unwrap()).await.unwrap();
    let pubacks = broker.wait_for_packets(PacketType::Puback, 1).await;
    assert_matches!(&pubacks[0], MqttPacket::Puback(puback) if puback.packet_id == 3);

    broker.send_packet(inbound_publish("deferred/qos2", QualityOfService::ExactlyOnce, 5));
    let (_, acknowledgement) = next_delivery(&mut deliveries).await;
    client.acknowledge(acknowledgement.unwrap()).await.unwrap();
    let pubrecs = broker.wait_for_packets(PacketType::Pubrec, 1).await;
    assert_matches!(&pubrecs[0], MqttPacket::Pubrec(pubrec) if pubrec.packet_id == 5);
}

#[tokio::test]
async fn acknowledgement_from_previous_connection_is_rejected() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;
    let mut deliveries = add_recording_handler(&client, MessageDisposition::Defer);

    broker.send_packet(inbound_publish("deferred", QualityOfService::AtLeastOnce, 3));
    let (_, acknowledgement) = next_delivery(&mut deliveries).await;

    client.disconnect(DisconnectOptions::default()).await.unwrap();
    assert_matches!(client.acknowledge(acknowledgement.unwrap()).await, Err(MqttError::NotConnected(_)));

    client.connect(client_options_builder(&broker, ProtocolVersion::Mqtt311).build()).await.unwrap();
    assert_matches!(client.acknowledge(acknowledgement.unwrap()).await, Err(MqttError::InvalidState(_)));
}

#[tokio::test]
async fn inbound_topic_aliases() {
    let broker = default_broker();
    let connect_options = ConnectOptions::builder()
        .with_client_id(&unique_client_id())
        .with_topic_alias_maximum(2)
        .build();

    let options = client_options_builder(&broker, ProtocolVersion::Mqtt5)
        .with_connect_options(connect_options)
        .build();

    let (client, mut recorder) = connect_client(&broker, options).await;
    let mut deliveries = add_recording_handler(&client, MessageDisposition::Accept);

    let bind = ApplicationMessage::builder("aliased/topic", QualityOfService::AtMostOnce).with_topic_alias(1).build();
    broker.send_packet(MqttPacket::Publish(PublishPacket { packet_id: 0, duplicate: false, message: bind }));
    assert_eq!("aliased/topic", next_delivery(&mut deliveries).await.0);

    let reuse = ApplicationMessage::builder("", QualityOfService::AtMostOnce).with_topic_alias(1).build();
    broker.send_packet(MqttPacket::Publish(PublishPacket { packet_id: 0, duplicate: false, message: reuse }));
    assert_eq!("aliased/topic", next_delivery(&mut deliveries).await.0);

    let out_of_range = ApplicationMessage::builder("other/topic", QualityOfService::AtMostOnce).with_topic_alias(3).build();
    broker.send_packet(MqttPacket::Publish(PublishPacket { packet_id: 0, duplicate: false, message: out_of_range }));

    let event = recorder.wait_for_disconnected().await;
    assert_matches!(&*event, ClientEvent::Disconnected(DisconnectedEvent { error: MqttError::InboundTopicAliasNotValid(_), .. }));
    assert!(deliveries.try_recv().is_err());
}

#[tokio::test]
async fn inbound_packet_over_maximum_packet_size_is_fatal() {
    let broker = default_broker();
    let connect_options = ConnectOptions::builder()
        .with_client_id(&unique_client_id())
        .with_maximum_packet_size_bytes(64)
        .build();

    let options = client_options_builder(&broker, ProtocolVersion::Mqtt5)
        .with_connect_options(connect_options)
        .build();

    let (client, mut recorder) = connect_client(&broker, options).await;
    let mut deliveries = add_recording_handler(&client, MessageDisposition::Accept);

    broker.send_packet(inbound_publish("small", QualityOfService::AtMostOnce, 0));
    assert_eq!("small", next_delivery(&mut deliveries).await.0);

    let oversized = ApplicationMessage::builder("large", QualityOfService::AtMostOnce).with_payload(&[0u8; 128]).build();
    broker.send_packet(MqttPacket::Publish(PublishPacket { packet_id: 0, duplicate: false, message: oversized }));

    let event = recorder.wait_for_disconnected().await;
    assert_matches!(&*event, ClientEvent::Disconnected(DisconnectedEvent { was_connected: true, error: MqttError::ProtocolViolation(_), .. }));
    assert!(deliveries.try_recv().is_err());
}

#[tokio::test]
async fn server_pingreq_is_answered() {
    let broker = default_broker();
    let (_client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    broker.send_packet(MqttPacket::Pingreq(PingreqPacket {}));
    broker.wait_for_packets(PacketType::Pingresp, 1).await;
}

#[tokio::test]
async fn unknown_pubrec_is_released() {
    let broker = default_broker();
    let (_client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt5).await;

    broker.send_packet(MqttPacket::Pubrec(PubrecPacket { packet_id: 77, ..Default::default() }));
    let pubrels = broker.wait_for_packets(PacketType::Pubrel, 1).await;
    assert_matches!(&pubrels[0], MqttPacket::Pubrel(pubrel) if pubrel.packet_id == 77 && pubrel.reason_code == PubrelReasonCode::PacketIdentifierNotFound);
}

#[tokio::test]
async fn unhandled_response_is_ignored() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    broker.send_packet(MqttPacket::Puback(PubackPacket { packet_id: 500, ..Default::default() }));
    client.ping(PingOptions::default()).await.unwrap();
    assert_eq!(ConnectionState::Connected, client.connection_state());
}

#[tokio::test]
async fn server_disconnect_fails_pending_operations() {
    let broker = broker_without_handler(PacketType::Publish);
    let (client, mut recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt5).await;

    let publisher = client.clone();
    let pending = tokio::spawn(async move {
        let message = ApplicationMessage::builder("pending", QualityOfService::AtLeastOnce).build();
        publisher.publish(message, PublishOptions::default()).await
    });
    broker.wait_for_packets(PacketType::Publish, 1).await;

    let disconnect = DisconnectPacket::builder().with_reason_code(DisconnectReasonCode::ServerShuttingDown).build();
    broker.send_packet(MqttPacket::Disconnect(disconnect));

    assert_matches!(pending.await.unwrap(), Err(MqttError::ServerSideDisconnect(_)));

    let event = recorder.wait_for_disconnected().await;
    assert_matches!(&*event, ClientEvent::Disconnected(DisconnectedEvent { was_connected: true, error: MqttError::ServerSideDisconnect(_), disconnect: Some(disconnect) }) => {
        assert_eq!(DisconnectReasonCode::ServerShuttingDown, disconnect.reason_code());
    });
    assert_eq!(ConnectionState::Disconnected, client.connection_state());
}

#[tokio::test]
async fn broker_close_is_connection_closed() {
    let broker = default_broker();
    let (client, mut recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    broker.close_connection();

    let event = recorder.wait_for_disconnected().await;
    assert_matches!(&*event, ClientEvent::Disconnected(DisconnectedEvent { was_connected: true, error: MqttError::ConnectionClosed(_), disconnect: None }));
    assert_eq!(ConnectionState::Disconnected, client.connection_state());
}

#[tokio::test]
async fn user_disconnect() {
    let broker = broker_without_handler(PacketType::Publish);
    let (client, mut recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt5).await;

    let publisher = client.clone();
    let pending = tokio::spawn(async move {
        let message = ApplicationMessage::builder("pending", QualityOfService::AtLeastOnce).build();
        publisher.publish(message, PublishOptions::default()).await
    });
    broker.wait_for_packets(PacketType::Publish, 1).await;

    let disconnect = DisconnectPacket::builder().with_reason_string("done").build();
    client.disconnect(DisconnectOptions::builder().with_disconnect_packet(disconnect).build()).await.unwrap();
    assert_eq!(ConnectionState::Disconnected, client.connection_state());

    assert_matches!(pending.await.unwrap(), Err(MqttError::UserInitiatedDisconnect(_)));

    let disconnects = broker.wait_for_packets(PacketType::Disconnect, 1).await;
    assert_matches!(&disconnects[0], MqttPacket::Disconnect(disconnect) if disconnect.reason_string() == Some("done"));

    let event = recorder.wait_for_disconnected().await;
    assert_matches!(&*event, ClientEvent::Disconnected(DisconnectedEvent { was_connected: true, error: MqttError::UserInitiatedDisconnect(_), .. }));

    // a second disconnect has nothing to do
    assert!(client.disconnect(DisconnectOptions::default()).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_racing_broker_close_emits_one_event() {
    let broker = default_broker();
    let (client, mut recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    let disconnecting_client = client.clone();
    let disconnect = tokio::spawn(async move { disconnecting_client.disconnect(DisconnectOptions::default()).await });
    broker.close_connection();

    assert!(disconnect.await.unwrap().is_ok());
    recorder.wait_for_disconnected().await;

    assert!(recorder.next_event_within(Duration::from_millis(300)).await.is_none());
    assert_eq!(ConnectionState::Disconnected, client.connection_state());
}

#[tokio::test]
async fn reconnect_resets_packet_ids() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    let message = ApplicationMessage::builder("ids", QualityOfService::AtLeastOnce).build();
    client.publish(message.clone(), PublishOptions::default()).await.unwrap();
    client.publish(message.clone(), PublishOptions::default()).await.unwrap();

    client.disconnect(DisconnectOptions::default()).await.unwrap();
    client.connect(client_options_builder(&broker, ProtocolVersion::Mqtt311).build()).await.unwrap();
    assert_eq!(2, broker.connection_count());

    let response = client.publish(message, PublishOptions::default()).await.unwrap();
    assert_matches!(response, PublishResponse::Qos1(puback) if puback.packet_id() == 1);
}

#[tokio::test]
async fn session_present_keeps_qos2_tracking() {
    let broker = broker_with_handler(PacketType::Connect, handle_connect_with_session_present);
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;
    let mut deliveries = add_recording_handler(&client, MessageDisposition::Accept);

    broker.send_packet(inbound_publish("session/qos2", QualityOfService::ExactlyOnce, 21));
    next_delivery(&mut deliveries).await;
    broker.wait_for_packets(PacketType::Pubrec, 1).await;

    client.disconnect(DisconnectOptions::default()).await.unwrap();
    client.connect(client_options_builder(&broker, ProtocolVersion::Mqtt311).build()).await.unwrap();

    // the resumed session still knows packet id 21, so the retry is not redelivered
    broker.send_packet(inbound_publish("session/qos2", QualityOfService::ExactlyOnce, 21));
    broker.wait_for_packets(PacketType::Pubrec, 2).await;
    assert!(deliveries.try_recv().is_err());
}

#[tokio::test]
async fn keep_alive_sends_pings() {
    let broker = default_broker();
    let options = client_options_builder(&broker, ProtocolVersion::Mqtt311)
        .with_keep_alive_send_interval(Duration::from_millis(50))
        .build();

    let (client, _recorder) = connect_client(&broker, options).await;

    broker.wait_for_packets(PacketType::Pingreq, 2).await;
    assert_eq!(ConnectionState::Connected, client.connection_state());
}

#[tokio::test]
async fn server_keep_alive_overrides_configured_value() {
    let broker = broker_with_handler(PacketType::Connect, handle_connect_with_server_keep_alive);
    let connect_options = ConnectOptions::builder()
        .with_client_id(&unique_client_id())
        .with_keep_alive_interval_seconds(3600)
        .build();

    let options = client_options_builder(&broker, ProtocolVersion::Mqtt5)
        .with_connect_options(connect_options)
        .build();

    let (_client, _recorder) = connect_client(&broker, options).await;

    // a one second server keep alive pings after 750ms of idle time
    broker.wait_for_packets(PacketType::Pingreq, 1).await;
}

#[tokio::test]
async fn keep_alive_pings_at_three_quarters_of_period() {
    let broker = default_broker();
    let connect_options = ConnectOptions::builder()
        .with_client_id(&unique_client_id())
        .with_keep_alive_interval_seconds(2)
        .build();

    let options = client_options_builder(&broker, ProtocolVersion::Mqtt311)
        .with_connect_options(connect_options)
        .build();

    let (client, mut recorder) = connect_client(&broker, options).await;

    let start = std::time::Instant::now();
    broker.wait_for_packets(PacketType::Pingreq, 2).await;
    assert!(start.elapsed() >= Duration::from_millis(2900));

    assert!(recorder.next_event_within(Duration::from_millis(10)).await.is_none());
    assert_eq!(ConnectionState::Connected, client.connection_state());
}

#[tokio::test]
async fn keep_alive_failure_tears_down() {
    let broker = broker_without_handler(PacketType::Pingreq);
    let options = client_options_builder(&broker, ProtocolVersion::Mqtt311)
        .with_keep_alive_send_interval(Duration::from_millis(50))
        .with_communication_timeout(Duration::from_millis(200))
        .build();

    let (client, mut recorder) = connect_client(&broker, options).await;

    let event = recorder.wait_for_disconnected().await;
    assert_matches!(&*event, ClientEvent::Disconnected(DisconnectedEvent { was_connected: true, error: MqttError::CommunicationTimedOut(_), .. }));
    assert_eq!(ConnectionState::Disconnected, client.connection_state());
}

#[tokio::test]
async fn extended_authentication_round_trip() {
    let broker = default_broker();
    let handler : ExtendedAuthenticationHandler = Arc::new(|auth: &AuthPacket| {
        if auth.reason_code() == AuthenticateReasonCode::ContinueAuthentication {
            Some(AuthPacket::new(AuthenticateReasonCode::ContinueAuthentication, "TEST", Some("response".as_bytes())))
        } else {
            None
        }
    });

    let options = client_options_builder(&broker, ProtocolVersion::Mqtt5)
        .with_extended_authentication_handler(handler)
        .build();

    let (client, _recorder) = connect_client(&broker, options).await;

    broker.send_packet(MqttPacket::Auth(AuthPacket::new(AuthenticateReasonCode::ContinueAuthentication, "TEST", Some("challenge".as_bytes()))));
    let auths = broker.wait_for_packets(PacketType::Auth, 1).await;
    assert_matches!(&auths[0], MqttPacket::Auth(auth) if auth.authentication_data() == Some("response".as_bytes()));

    client.send_extended_authentication_data(AuthPacket::new(AuthenticateReasonCode::ReAuthenticate, "TEST", None)).await.unwrap();
    broker.wait_for_packets(PacketType::Auth, 2).await;
}

#[tokio::test]
async fn extended_authentication_requires_mqtt5() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    let auth = AuthPacket::new(AuthenticateReasonCode::ReAuthenticate, "TEST", None);
    assert_matches!(client.send_extended_authentication_data(auth).await, Err(MqttError::InvalidState(_)));
}

#[tokio::test]
async fn subscriber_receives_routed_message_once() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    let (sender, mut deliveries) = unbounded_channel();
    client.add_message_handler(Arc::new(move |received: &ReceivedMessage| {
        let _ = sender.send(received.message().clone());
        MessageDisposition::Accept
    }));

    client.subscribe(vec!(Subscription::new("a/b", QualityOfService::AtLeastOnce)), SubscribeOptions::default()).await.unwrap();

    let routed = ApplicationMessage::builder("a/b", QualityOfService::AtLeastOnce).with_payload("hello".as_bytes()).build();
    broker.send_packet(MqttPacket::Publish(PublishPacket { packet_id: 1, duplicate: false, message: routed }));

    let delivered = tokio::time::timeout(Duration::from_secs(5), deliveries.recv()).await.unwrap().unwrap();
    assert_eq!("a/b", delivered.topic());
    assert_eq!("hello".as_bytes(), delivered.payload());
    assert_eq!(QualityOfService::AtLeastOnce, delivered.qos());

    broker.wait_for_packets(PacketType::Puback, 1).await;
    client.ping(PingOptions::default()).await.unwrap();
    assert!(deliveries.try_recv().is_err());
    assert_eq!(1, broker.received_packets_of_type(PacketType::Puback).len());
}

#[tokio::test]
async fn removed_message_handler_is_not_called() {
    let broker = default_broker();
    let (client, _recorder) = connect_default_client(&broker, ProtocolVersion::Mqtt311).await;

    let (sender, mut removed_deliveries) = unbounded_channel();
    let handle = client.add_message_handler(Arc::new(move |_: &ReceivedMessage| {
        let _ = sender.send(());
        MessageDisposition::Accept
    }));
    let mut deliveries = add_recording_handler(&client, MessageDisposition::Accept);
    client.remove_message_handler(handle);

    broker.send_packet(inbound_publish("handlers", QualityOfService::AtMostOnce, 0));
    next_delivery(&mut deliveries).await;
    assert!(removed_deliveries.try_recv().is_err());
}
