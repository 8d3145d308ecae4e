/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Quartz-mqtt is the protocol core of an asynchronous MQTT client.  One [`MqttClient`] speaks
MQTT 3.1, 3.1.1, or 5 over any ordered byte stream, correlates requests with their
acknowledgements, runs keep alive, and hands inbound publishes to application handlers.

Reconnection, offline queueing, and outbound flow control are left to the caller.  A failed
connection fails every pending operation and emits a single `Disconnected` event; calling
[`MqttClient::connect`] again starts over with a fresh packet id space.

```no_run
use quartz_mqtt::client::*;
use quartz_mqtt::config::*;
use quartz_mqtt::mqtt::*;
use tokio::runtime::Handle;

# async fn run() -> quartz_mqtt::error::MqttResult<()> {
let client = MqttClient::new(&Handle::current());

let options = MqttClientOptions::builder(ChannelOptions::Tcp { endpoint: "localhost".to_string(), port: 1883 })
    .with_protocol_version(ProtocolVersion::Mqtt5)
    .build();

client.connect(options).await?;

let message = ApplicationMessage::builder("hello/world", QualityOfService::AtLeastOnce)
    .with_payload("hi".as_bytes())
    .build();
client.publish(message, PublishOptions::default()).await?;

client.disconnect(DisconnectOptions::default()).await?;
# Ok(())
# }
```
 */

mod alias;
pub mod client;
pub mod config;
mod decode;
mod encode;
pub mod error;
mod logging;
pub mod mqtt;
mod validate;

#[cfg(test)]
mod testing;

pub use client::MqttClient;
pub use error::{MqttError, MqttResult};
pub use mqtt::{ProtocolVersion, QualityOfService};
