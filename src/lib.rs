// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Publish/Subscribe
//!
//! Typed publish/subscribe over RabbitMQ topic exchanges: a [`MessageRegistry`]
//! routing message types to exchanges, a pooled [`MessagePublisher`] with retry
//! and request/reply, and a [`MessageListener`] running acknowledged consumers.

mod otel;
mod pool;
mod rpc;
#[cfg(test)]
mod testing;

pub mod broker;
pub mod channel;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod events;
pub mod exchange;
pub mod listener;
pub mod message;
pub mod publisher;
pub mod queue;
pub mod rate_limit;
pub mod registry;
pub mod topology;

pub use config::{ConnectionParameters, PublisherConfig};
pub use consumer::{callback_fn, DeliveryOutcome, MessageCallback};
pub use errors::{AmqpError, CallbackError};
pub use listener::{MessageListener, Subscription};
pub use message::{Message, MessageType};
pub use publisher::{MessagePublisher, Publisher};
pub use rate_limit::RateLimitedPublisher;
pub use registry::{MessageRegistry, RegistryEntry};
