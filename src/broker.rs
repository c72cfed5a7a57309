// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Abstractions
//!
//! The publisher and the listener talk to the broker only through the traits in
//! this module. The production implementation lives in [`crate::channel`] and is
//! backed by lapin; tests plug in a recording fake.
//!
//! A [`BrokerChannel`] is never shared between two in-flight publishes. The
//! publisher's pool hands a channel to exactly one operation at a time.

use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use lapin::{
    protocol::basic::AMQPProperties,
    types::{AMQPValue, ShortString},
};
use std::{collections::BTreeMap, sync::Arc};

/// Stream of deliveries produced by a consumer registration.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, AmqpError>>;

/// Broker-supplied envelope for one received message.
///
/// A delivery is read-only; its outcome is decided exactly once by the consumer
/// that received it.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub data: Vec<u8>,
    pub properties: AMQPProperties,
}

impl Delivery {
    /// The correlation id carried in the message properties, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.properties
            .correlation_id()
            .as_ref()
            .map(|value| value.as_str())
    }

    /// The queue a reply to this message should be published to, if any.
    pub fn reply_to(&self) -> Option<&str> {
        self.properties.reply_to().as_ref().map(|value| value.as_str())
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        Delivery {
            delivery_tag: delivery.delivery_tag,
            exchange: delivery.exchange.to_string(),
            routing_key: delivery.routing_key.to_string(),
            redelivered: delivery.redelivered,
            data: delivery.data,
            properties: delivery.properties,
        }
    }
}

/// Per-publish message properties.
///
/// The correlation id and reply-to queue of the request/reply protocol travel
/// here, never in the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishProperties {
    pub content_type: String,
    pub persistent: bool,
    pub message_id: String,
    pub message_type: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub headers: BTreeMap<ShortString, AMQPValue>,
}

/// AMQP delivery mode for messages that must survive a broker restart.
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;
/// AMQP delivery mode for transient messages.
pub const TRANSIENT_DELIVERY_MODE: u8 = 1;

impl PublishProperties {
    /// The AMQP delivery mode matching the persistent flag.
    pub fn delivery_mode(&self) -> u8 {
        if self.persistent {
            PERSISTENT_DELIVERY_MODE
        } else {
            TRANSIENT_DELIVERY_MODE
        }
    }
}

/// A bidirectional channel multiplexed over a broker connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Whether the channel can still carry operations.
    fn is_open(&self) -> bool;

    /// Puts the channel in publisher-confirm mode.
    async fn enable_confirms(&self) -> Result<(), AmqpError>;

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Declares a queue and returns its name, which is generated by the broker
    /// when the definition carries an empty name.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<String, AmqpError>;

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    /// Limits the number of unacknowledged deliveries held by this channel.
    async fn set_prefetch(&self, prefetch_count: u16) -> Result<(), AmqpError>;

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: &PublishProperties,
    ) -> Result<(), AmqpError>;

    /// Registers a consumer on the queue and returns its deliveries.
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        no_ack: bool,
    ) -> Result<DeliveryStream, AmqpError>;

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    /// Rejects a single delivery without requeue.
    async fn reject(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    /// Negatively acknowledges a single delivery without requeue.
    async fn nack(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    /// Waits until the broker confirmed every publish made on this channel.
    async fn wait_for_confirms(&self) -> Result<(), AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// A live connection to the broker.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    fn is_open(&self) -> bool;

    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// Opens broker connections from a fixed set of connection parameters.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Opens a new connection, labelled with `name` on the broker side.
    async fn connect(&self, name: &str) -> Result<Arc<dyn BrokerConnection>, AmqpError>;
}
