// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Typed Messages
//!
//! A [`Message`] is an immutable, serializable value with a stable logical type
//! and a routing key computed from its own state. The logical type is what the
//! [`crate::registry::MessageRegistry`] maps to an exchange.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Stable logical identity of a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageType(&'static str);

impl MessageType {
    pub const fn new(name: &'static str) -> Self {
        MessageType(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A typed payload with a logical type and a routing key.
///
/// The routing key is derived from the message itself and need not be constant;
/// the registry's generic routing key is only used to bind consumer queues.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    const MESSAGE_TYPE: MessageType;

    fn routing_key(&self) -> String;

    fn message_type(&self) -> MessageType {
        Self::MESSAGE_TYPE
    }
}
