/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::client::*;
use crate::config::ClientEventListener;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

const EVENT_WAIT_TIMEOUT : Duration = Duration::from_secs(5);

/// Records every event a client emits, in order.
pub(crate) struct ClientEventRecorder {
    receiver: UnboundedReceiver<Arc<ClientEvent>>,
}

impl ClientEventRecorder {
    pub(crate) fn new(client: &MqttClient) -> Self {
        let (sender, receiver) = unbounded_channel();
        client.add_event_listener(ClientEventListener::Channel(sender));

        ClientEventRecorder {
            receiver
        }
    }

    pub(crate) async fn next_event(&mut self) -> Arc<ClientEvent> {
        tokio::time::timeout(EVENT_WAIT_TIMEOUT, self.receiver.recv()).await
            .expect("timed out waiting for a client event")
            .expect("client event channel closed")
    }

    /// Returns the next event if one arrives within `wait`
    pub(crate) async fn next_event_within(&mut self, wait: Duration) -> Option<Arc<ClientEvent>> {
        tokio::time::timeout(wait, self.receiver.recv()).await.ok().flatten()
    }

    /// Skips events until the next Disconnected event
    pub(crate) async fn wait_for_disconnected(&mut self) -> Arc<ClientEvent> {
        loop {
            let event = self.next_event().await;
            if let ClientEvent::Disconnected(_) = *event {
                return event;
            }
        }
    }
}
