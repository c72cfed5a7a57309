// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! This module implements the broker abstractions on top of lapin. It establishes
//! connections to the RabbitMQ server from validated [`ConnectionParameters`] and
//! exposes lapin channels as [`BrokerChannel`]s.

use crate::{
    broker::{
        BrokerChannel, BrokerConnection, ConnectionFactory, Delivery, DeliveryStream,
        PublishProperties,
    },
    config::ConnectionParameters,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicPublishOptions, BasicQosOptions, BasicRejectOptions, ConfirmSelectOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{FieldTable, LongString, ShortString},
    uri::{AMQPAuthority, AMQPUri, AMQPUserInfo},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error};

/// AMQP reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

/// Opens lapin connections to the broker described by [`ConnectionParameters`].
#[derive(Debug, Clone)]
pub struct AmqpConnectionFactory {
    params: ConnectionParameters,
}

impl AmqpConnectionFactory {
    pub fn new(params: ConnectionParameters) -> Self {
        AmqpConnectionFactory { params }
    }

    fn uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.params.username.clone(),
                    password: self.params.password.clone(),
                },
                host: self.params.host.clone(),
                port: self.params.port,
            },
            vhost: self.params.virtual_host.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ConnectionFactory for AmqpConnectionFactory {
    /// Creates a new AMQP connection to RabbitMQ.
    ///
    /// The connection carries `name` as its client-provided name so it can be
    /// told apart in the broker's management views.
    async fn connect(&self, name: &str) -> Result<Arc<dyn BrokerConnection>, AmqpError> {
        debug!(name, "creating amqp connection...");
        let options =
            ConnectionProperties::default().with_connection_name(LongString::from(name.to_owned()));

        let conn = match Connection::connect_uri(self.uri(), options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError(err.to_string()))
            }
        }?;
        debug!(name, "amqp connected");

        Ok(Arc::new(AmqpConnection { conn }))
    }
}

/// A lapin connection shared by every channel opened on it.
pub struct AmqpConnection {
    conn: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    fn is_open(&self) -> bool {
        self.conn.status().connected()
    }

    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError> {
        debug!("creating amqp channel...");
        match self.conn.create_channel().await {
            Ok(channel) => {
                debug!(id = channel.id(), "channel created");
                Ok(Arc::new(AmqpChannel { channel }))
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError(err.to_string()))
            }
        }
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.conn
            .close(REPLY_SUCCESS, "closing connection")
            .await
            .map_err(|err| AmqpError::CloseError(err.to_string()))
    }
}

/// A lapin channel.
pub struct AmqpChannel {
    channel: Channel,
}

impl AmqpChannel {
    fn properties(props: &PublishProperties) -> BasicProperties {
        let mut properties = BasicProperties::default()
            .with_content_type(ShortString::from(props.content_type.clone()))
            .with_delivery_mode(props.delivery_mode())
            .with_message_id(ShortString::from(props.message_id.clone()))
            .with_headers(FieldTable::from(props.headers.clone()));

        if let Some(kind) = &props.message_type {
            properties = properties.with_type(ShortString::from(kind.clone()));
        }
        if let Some(correlation_id) = &props.correlation_id {
            properties = properties.with_correlation_id(ShortString::from(correlation_id.clone()));
        }
        if let Some(reply_to) = &props.reply_to {
            properties = properties.with_reply_to(ShortString::from(reply_to.clone()));
        }

        properties
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }

    async fn enable_confirms(&self) -> Result<(), AmqpError> {
        self.channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|err| AmqpError::ChannelError(err.to_string()))
    }

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", def.name);

        match self
            .channel
            .exchange_declare(
                &def.name,
                def.kind.into(),
                ExchangeDeclareOptions {
                    durable: def.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = %def.name,
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(def.name.clone()))
            }
            _ => {
                debug!("exchange: {} was created", def.name);
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<String, AmqpError> {
        match self
            .channel
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    durable: def.durable,
                    exclusive: def.exclusive,
                    auto_delete: def.delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), name = %def.name, "error to declare the queue");
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            Ok(queue) => {
                debug!("queue: {} was created", queue.name());
                Ok(queue.name().as_str().to_owned())
            }
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        self.channel
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to bind queue to exchange");
                AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                )
            })
    }

    async fn set_prefetch(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        self.channel
            .basic_qos(prefetch_count, BasicQosOptions { global: false })
            .await
            .map_err(|err| AmqpError::QoSDeclarationError(err.to_string()))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: &PublishProperties,
    ) -> Result<(), AmqpError> {
        // The returned confirm is awaited in bulk by `wait_for_confirms`.
        match self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                payload,
                Self::properties(properties),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError(err.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        no_ack: bool,
    ) -> Result<DeliveryStream, AmqpError> {
        let consumer = match self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::ConsumerDeclarationError(consumer_tag.to_owned()))
            }
            Ok(c) => Ok(c),
        }?;

        Ok(consumer
            .map(|result| {
                result
                    .map(Delivery::from)
                    .map_err(|err| AmqpError::ConsumerDeclarationError(err.to_string()))
            })
            .boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        self.channel
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await
            .map_err(|_| AmqpError::ConsumerCancelError(consumer_tag.to_owned()))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
            .map_err(|_| AmqpError::AckMessageError)
    }

    async fn reject(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue: false })
            .await
            .map_err(|_| AmqpError::RejectMessageError)
    }

    async fn nack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue: false,
                },
            )
            .await
            .map_err(|_| AmqpError::NackMessageError)
    }

    async fn wait_for_confirms(&self) -> Result<(), AmqpError> {
        let returned = self
            .channel
            .wait_for_confirms()
            .await
            .map_err(|err| AmqpError::CloseError(err.to_string()))?;

        if !returned.is_empty() {
            debug!(count = returned.len(), "broker returned unroutable messages");
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.channel
            .close(REPLY_SUCCESS, "closing channel")
            .await
            .map_err(|err| AmqpError::CloseError(err.to_string()))
    }
}
