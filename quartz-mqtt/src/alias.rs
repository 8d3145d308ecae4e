/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Inbound topic alias handling for MQTT5 connections.  The server may replace a publish's topic
with a small integer once the pair has been established on the connection; this module keeps
those bindings and restores the topic before a message is handed to the application.
*/

use crate::error::{MqttError, MqttResult};
use crate::mqtt::ApplicationMessage;

use log::*;
use std::collections::HashMap;

/// Per-connection table of server-assigned topic aliases.  Bindings never outlive the
/// connection they were made on.
pub(crate) struct InboundAliasResolver {
    maximum_alias_value: u16,

    bindings : HashMap<u16, String>
}

impl InboundAliasResolver {

    /// `maximum_alias_value` is the topic alias maximum the client advertised in CONNECT; zero
    /// means no aliases are accepted at all.
    pub(crate) fn new(maximum_alias_value: u16) -> InboundAliasResolver {
        InboundAliasResolver {
            maximum_alias_value,
            bindings : HashMap::new()
        }
    }

    /// Binds or resolves the alias carried by an inbound publish.  On success the message's
    /// topic is always non-empty.
    pub(crate) fn resolve(&mut self, message: &mut ApplicationMessage) -> MqttResult<()> {
        let Some(alias) = message.topic_alias else {
            if message.topic.is_empty() {
                error!("Topic Alias Resolution - inbound publish has neither a topic nor an alias");
                return Err(MqttError::new_inbound_topic_alias_not_valid("inbound publish has an empty topic and no topic alias"));
            }

            return Ok(());
        };

        if alias == 0 || alias > self.maximum_alias_value {
            error!("Topic Alias Resolution - inbound alias {} outside of [1, {}]", alias, self.maximum_alias_value);
            return Err(MqttError::new_inbound_topic_alias_not_valid("inbound topic alias out of range"));
        }

        if message.topic.is_empty() {
            return match self.bindings.get(&alias) {
                Some(topic) => {
                    message.topic = topic.clone();
                    Ok(())
                }
                None => {
                    error!("Topic Alias Resolution - no binding exists for alias {}", alias);
                    Err(MqttError::new_inbound_topic_alias_not_valid("inbound topic alias has no binding"))
                }
            };
        }

        debug!("Topic Alias Resolution - binding alias {} to \"{}\"", alias, message.topic);
        self.bindings.insert(alias, message.topic.clone());

        Ok(())
    }
}
