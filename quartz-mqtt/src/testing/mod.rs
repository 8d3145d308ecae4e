/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

pub(crate) mod event_waiter;
pub(crate) mod mock_broker;
mod protocol;
