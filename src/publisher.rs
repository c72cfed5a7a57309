// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! This module provides functionality for publishing messages to RabbitMQ exchanges.
//! [`MessagePublisher`] shares one long-lived connection between all callers and
//! draws a dedicated channel from its pool for every publish. Every publish path
//! makes up to [`PUBLISH_ATTEMPTS`] immediate attempts, replacing the channel after
//! each failure, and supports OpenTelemetry context propagation.

use crate::{
    broker::{BrokerChannel, ConnectionFactory, PublishProperties},
    config::{ConnectionParameters, PublisherConfig},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    message::{Message, MessageType},
    otel,
    pool::ChannelPool,
    registry::MessageRegistry,
    rpc::CorrelationContext,
    topology::AmqpTopology,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{future::Future, sync::Arc};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Attempts made by every publish path before the error reaches the caller.
pub const PUBLISH_ATTEMPTS: usize = 3;

/// Exchange used to address a queue directly by name.
const DEFAULT_EXCHANGE: &str = "";

/// The publish interface shared by [`MessagePublisher`] and its decorators.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes a registered message on its registered exchange, with the
    /// routing key computed by the message itself.
    async fn send<M: Message>(&self, message: &M) -> Result<(), AmqpError>;

    /// Publishes a message on an explicit exchange, with the routing key
    /// computed by the message itself.
    async fn send_to<M: Message>(&self, message: &M, exchange: &str) -> Result<(), AmqpError>;

    /// Publishes any serializable payload.
    async fn send_payload<P>(
        &self,
        payload: &P,
        exchange: &str,
        routing_key: &str,
        persistent: bool,
    ) -> Result<(), AmqpError>
    where
        P: Serialize + Sync + ?Sized;

    /// Publishes a request and waits for the reply carrying `correlation_id`.
    async fn send_and_receive<P, R>(
        &self,
        payload: &P,
        exchange: &str,
        routing_key: &str,
        persistent: bool,
        correlation_id: &str,
    ) -> Result<R, AmqpError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send;

    /// Publishes a correlated reply to a request's reply queue.
    async fn reply_to_queue<P>(
        &self,
        payload: &P,
        persistent: bool,
        correlation_id: &str,
        reply_to: &str,
    ) -> Result<(), AmqpError>
    where
        P: Serialize + Sync + ?Sized;

    /// Flushes pending confirms and closes the connection. Never fails.
    async fn close(&self);
}

/// RabbitMQ publisher backed by a pool of channels over one connection.
///
/// Safe to share between any number of concurrent callers.
pub struct MessagePublisher {
    registry: Arc<MessageRegistry>,
    config: PublisherConfig,
    pool: ChannelPool,
}

impl MessagePublisher {
    /// Connects to the broker described by `params` and declares the exchange
    /// of every registered message type.
    pub async fn connect(
        params: &ConnectionParameters,
        registry: Arc<MessageRegistry>,
        config: PublisherConfig,
    ) -> Result<Self, AmqpError> {
        params.validate()?;
        let factory = params.connection_factory();
        Self::new(&factory, &params.connection_name, registry, config).await
    }

    /// Opens the publisher's connection and declares the exchange of every
    /// registered message type as a durable topic exchange.
    ///
    /// Fails, closing the connection, if any exchange cannot be declared.
    pub async fn new(
        factory: &dyn ConnectionFactory,
        connection_name: &str,
        registry: Arc<MessageRegistry>,
        config: PublisherConfig,
    ) -> Result<Self, AmqpError> {
        let connection = factory.connect(connection_name).await?;

        let publisher = MessagePublisher {
            registry,
            config,
            pool: ChannelPool::new(connection),
        };

        if let Err(err) = publisher.declare_exchanges().await {
            error!(error = err.to_string(), "failure to declare publisher exchanges");
            if let Err(close_err) = publisher.pool.connection().close().await {
                error!(error = close_err.to_string(), "failure to close connection");
            }
            return Err(err);
        }

        Ok(publisher)
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    async fn declare_exchanges(&self) -> Result<(), AmqpError> {
        let channel = self.pool.provide().await?;

        let topology = self
            .registry
            .exchanges()
            .iter()
            .fold(AmqpTopology::new(channel.as_ref()), |topology, exchange| {
                topology.exchange(ExchangeDefinition::new(exchange).topic().durable())
            });
        topology.install().await?;

        self.pool.release(channel);
        Ok(())
    }

    fn encode<P: Serialize + ?Sized>(payload: &P) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(payload).map_err(|err| AmqpError::SerializePayloadError(err.to_string()))
    }

    fn properties(&self, persistent: bool, message_type: Option<MessageType>) -> PublishProperties {
        PublishProperties {
            content_type: self.config.content_type().to_owned(),
            persistent,
            message_id: Uuid::new_v4().to_string(),
            message_type: message_type.map(|kind| kind.to_string()),
            correlation_id: None,
            reply_to: None,
            headers: otel::inject_current_context(),
        }
    }

    /// Runs `operation` up to [`PUBLISH_ATTEMPTS`] times, immediately, until it
    /// succeeds. Each attempt checks out its own channel; a failed attempt's
    /// channel is dropped and never returns to the pool.
    async fn with_retry<T, F, Fut>(
        &self,
        exchange: &str,
        routing_key: &str,
        mut operation: F,
    ) -> Result<T, AmqpError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, AmqpError>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < PUBLISH_ATTEMPTS => {
                    warn!(
                        attempt,
                        error = err.to_string(),
                        exchange,
                        routing_key,
                        "publish failed, retrying on a fresh channel"
                    );
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        attempts = attempt,
                        error = err.to_string(),
                        exchange,
                        routing_key,
                        "giving up publishing"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn publish_once(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: &PublishProperties,
    ) -> Result<(), AmqpError> {
        let channel = self.pool.provide().await?;
        channel.publish(exchange, routing_key, body, properties).await?;
        self.pool.release(channel);
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: &PublishProperties,
    ) -> Result<(), AmqpError> {
        self.with_retry(exchange, routing_key, || {
            self.publish_once(exchange, routing_key, body, properties)
        })
        .await?;

        debug!(exchange, routing_key, "message published");
        Ok(())
    }

    /// Opens the reply subscription and publishes the request on one channel.
    /// The channel stays checked out until the reply arrives.
    async fn request_once(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        persistent: bool,
        correlation_id: &str,
    ) -> Result<(Arc<dyn BrokerChannel>, CorrelationContext), AmqpError> {
        let channel = self.pool.provide().await?;
        let context = CorrelationContext::open(channel.as_ref(), correlation_id).await?;

        let mut properties = self.properties(persistent, None);
        properties.correlation_id = Some(correlation_id.to_owned());
        properties.reply_to = Some(context.reply_queue().to_owned());

        if let Err(err) = channel.publish(exchange, routing_key, body, &properties).await {
            let consumer_tag = context.consumer_tag().to_owned();
            if let Err(cancel_err) = channel.cancel(&consumer_tag).await {
                debug!(error = cancel_err.to_string(), "failure to cancel reply consumer");
            }
            return Err(err);
        }

        Ok((channel, context))
    }
}

#[async_trait]
impl Publisher for MessagePublisher {
    async fn send<M: Message>(&self, message: &M) -> Result<(), AmqpError> {
        let exchange = self
            .registry
            .exchange(&M::MESSAGE_TYPE)
            .ok_or_else(|| AmqpError::UnregisteredMessage(M::MESSAGE_TYPE.to_string()))?;

        self.send_to(message, &exchange).await
    }

    async fn send_to<M: Message>(&self, message: &M, exchange: &str) -> Result<(), AmqpError> {
        let body = Self::encode(message)?;
        let properties = self.properties(true, Some(M::MESSAGE_TYPE));

        self.publish(exchange, &message.routing_key(), &body, &properties)
            .await
    }

    async fn send_payload<P>(
        &self,
        payload: &P,
        exchange: &str,
        routing_key: &str,
        persistent: bool,
    ) -> Result<(), AmqpError>
    where
        P: Serialize + Sync + ?Sized,
    {
        let body = Self::encode(payload)?;
        let properties = self.properties(persistent, None);

        self.publish(exchange, routing_key, &body, &properties).await
    }

    async fn send_and_receive<P, R>(
        &self,
        payload: &P,
        exchange: &str,
        routing_key: &str,
        persistent: bool,
        correlation_id: &str,
    ) -> Result<R, AmqpError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        let body = Self::encode(payload)?;

        let (channel, reply, consumer_tag) = {
            let (channel, mut context) = self
                .with_retry(exchange, routing_key, || {
                    self.request_once(exchange, routing_key, &body, persistent, correlation_id)
                })
                .await?;

            let reply = context.wait(self.config.reply_timeout).await;
            (channel, reply, context.consumer_tag().to_owned())
        };

        match channel.cancel(&consumer_tag).await {
            Ok(()) => self.pool.release(channel),
            Err(err) => warn!(error = err.to_string(), "failure to cancel reply consumer"),
        }

        let reply = reply?;
        serde_json::from_slice(&reply).map_err(|err| AmqpError::ParsePayloadError(err.to_string()))
    }

    async fn reply_to_queue<P>(
        &self,
        payload: &P,
        persistent: bool,
        correlation_id: &str,
        reply_to: &str,
    ) -> Result<(), AmqpError>
    where
        P: Serialize + Sync + ?Sized,
    {
        let body = Self::encode(payload)?;
        let mut properties = self.properties(persistent, None);
        properties.correlation_id = Some(correlation_id.to_owned());

        self.publish(DEFAULT_EXCHANGE, reply_to, &body, &properties)
            .await
    }

    async fn close(&self) {
        for channel in self.pool.drain() {
            if let Err(err) = channel.wait_for_confirms().await {
                error!(error = err.to_string(), "failure to wait for publisher confirms");
            }
        }

        if let Err(err) = self.pool.connection().close().await {
            error!(error = err.to_string(), "failure to close connection");
        }
    }
}
