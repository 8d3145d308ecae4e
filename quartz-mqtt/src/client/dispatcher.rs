/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Correlation of inbound response packets with the operations waiting on them.

Every request that expects an answer registers a correlation key (packet id + response packet
type) before its packet is written.  The receive loop hands each response to `resolve`, which
completes exactly one waiter.  Completion always travels through a oneshot channel after the
table lock has been released, so a waiter's continuation runs on its own task.
 */

use crate::error::{MqttError, MqttResult};
use crate::mqtt::{MqttPacket, PacketType};

use log::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) struct CorrelationKey {
    pub(crate) packet_id: u16,
    pub(crate) packet_type: PacketType,
}

impl CorrelationKey {
    pub(crate) fn new(packet_id: u16, packet_type: PacketType) -> Self {
        CorrelationKey {
            packet_id,
            packet_type
        }
    }

    fn from_packet(packet: &MqttPacket) -> Self {
        CorrelationKey::new(packet.packet_id(), packet.packet_type())
    }
}

type ResponseSender = oneshot::Sender<MqttResult<MqttPacket>>;

struct PendingResponse {
    serial: u64,
    sender: ResponseSender,
}

#[derive(Default)]
struct CorrelationTable {
    next_serial: u64,
    pending: HashMap<CorrelationKey, PendingResponse>,
}

fn lock_table(table: &Mutex<CorrelationTable>) -> MutexGuard<'_, CorrelationTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub(crate) struct ResponseDispatcher {
    table: Arc<Mutex<CorrelationTable>>,
}

impl ResponseDispatcher {

    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers interest in a single response.  Fails if something is already waiting on the
    /// same key.
    pub(crate) fn register(&self, key: CorrelationKey) -> MqttResult<PacketAwaiter> {
        let (sender, receiver) = oneshot::channel();

        let mut table = lock_table(&self.table);
        if table.pending.contains_key(&key) {
            error!("ResponseDispatcher - a {} with packet id {} is already pending", key.packet_type, key.packet_id);
            return Err(MqttError::new_already_pending(key.packet_id, key.packet_type));
        }

        table.next_serial += 1;
        let serial = table.next_serial;
        table.pending.insert(key, PendingResponse { serial, sender });

        Ok(PacketAwaiter {
            key,
            serial,
            receiver: Some(receiver),
            table: self.table.clone(),
        })
    }

    /// Completes the waiter registered for the packet's correlation key.  Fails with
    /// `UnhandledPacket` when nothing is waiting.
    pub(crate) fn resolve(&self, packet: MqttPacket) -> MqttResult<()> {
        let key = CorrelationKey::from_packet(&packet);

        let pending = lock_table(&self.table).pending.remove(&key);
        match pending {
            Some(pending) => {
                if pending.sender.send(Ok(packet)).is_err() {
                    debug!("ResponseDispatcher - waiter for {} with packet id {} went away before completion", key.packet_type, key.packet_id);
                }

                Ok(())
            }
            None => {
                Err(MqttError::new_unhandled_packet(key.packet_id, key.packet_type))
            }
        }
    }

    /// Completes every outstanding waiter with a copy of `error`.
    pub(crate) fn fail_all(&self, error: MqttError) {
        let drained : Vec<PendingResponse> = lock_table(&self.table).pending.drain().map(|(_, pending)| pending).collect();
        if !drained.is_empty() {
            debug!("ResponseDispatcher - failing {} pending operation(s): {}", drained.len(), error);
        }

        for pending in drained {
            let _ = pending.sender.send(Err(error.clone()));
        }
    }

    /// Drops every outstanding waiter without a result; each one observes `OperationCancelled`.
    pub(crate) fn clear(&self) {
        let drained : Vec<PendingResponse> = lock_table(&self.table).pending.drain().map(|(_, pending)| pending).collect();
        drop(drained);
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        lock_table(&self.table).pending.len()
    }
}

/// A registration in the response dispatcher.  Dropping the awaiter (for example after a
/// timeout) releases its correlation key, but never a newer registration of the same key.
pub(crate) struct PacketAwaiter {
    key: CorrelationKey,
    serial: u64,
    receiver: Option<oneshot::Receiver<MqttResult<MqttPacket>>>,
    table: Arc<Mutex<CorrelationTable>>,
}

impl PacketAwaiter {

    pub(crate) async fn wait(mut self, timeout: Duration) -> MqttResult<MqttPacket> {
        let Some(receiver) = self.receiver.take() else {
            return Err(MqttError::new_internal_state_error("packet awaiter polled twice"));
        };

        match tokio::time::timeout(timeout, receiver).await {
            Err(_) => {
                warn!("ResponseDispatcher - timed out waiting on {} with packet id {}", self.key.packet_type, self.key.packet_id);
                Err(MqttError::new_communication_timed_out(self.key.packet_type.as_str()))
            }
            Ok(Err(recv_error)) => { Err(recv_error.into()) }
            Ok(Ok(result)) => { result }
        }
    }
}

impl fmt::Debug for PacketAwaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketAwaiter")
            .field("key", &self.key)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

impl Drop for PacketAwaiter {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        if let Some(pending) = table.pending.get(&self.key) {
            if pending.serial == self.serial {
                table.pending.remove(&self.key);
            }
        }
    }
}
