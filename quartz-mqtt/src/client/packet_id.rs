/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use std::sync::{Mutex, PoisonError};

/// Hands out packet identifiers in the order 1, 2, ..., 65535, 1, ...  Zero is never produced.
///
/// Uniqueness among in-flight operations is not tracked here; a collision surfaces when the
/// response dispatcher refuses a second registration for the same correlation key.
pub(crate) struct PacketIdentifierProvider {
    next_id: Mutex<u16>,
}

impl PacketIdentifierProvider {

    pub(crate) fn new() -> Self {
        PacketIdentifierProvider {
            next_id: Mutex::new(1),
        }
    }

    pub(crate) fn next(&self) -> u16 {
        let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        let id = *next_id;
        *next_id = if id == u16::MAX { 1 } else { id + 1 };

        id
    }

    /// Restarts the sequence at 1.  Called once per connection attempt.
    pub(crate) fn reset(&self) {
        *self.next_id.lock().unwrap_or_else(PoisonError::into_inner) = 1;
    }
}

impl Default for PacketIdentifierProvider {
    fn default() -> Self {
        Self::new()
    }
}
