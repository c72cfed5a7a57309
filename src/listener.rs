// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Listener
//!
//! Subscribes callbacks to queues. Every `listen*` call opens its own
//! connection, installs the queue topology, and starts one worker task per
//! requested thread. Each worker owns a dedicated channel with its own prefetch
//! limit and a [`MessageConsumer`] in manual acknowledgment mode.

use crate::{
    broker::{BrokerConnection, ConnectionFactory},
    config::ConnectionParameters,
    consumer::{MessageCallback, MessageConsumer},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    message::Message,
    queue::{QueueBinding, QueueDefinition},
    registry::MessageRegistry,
    topology::AmqpTopology,
};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, warn, Instrument};

/// Maximum unacknowledged deliveries per worker channel unless configured.
pub const DEFAULT_PREFETCH_COUNT: u16 = 50;

const PROBE_CONNECTION_NAME: &str = "listener-probe";

pub struct MessageListener {
    factory: Arc<dyn ConnectionFactory>,
    registry: Arc<MessageRegistry>,
    prefetch_count: u16,
}

impl MessageListener {
    pub async fn connect(
        params: &ConnectionParameters,
        registry: Arc<MessageRegistry>,
    ) -> Result<Self, AmqpError> {
        params.validate()?;
        Self::new(Arc::new(params.connection_factory()), registry).await
    }

    /// Checks that the broker is reachable by opening and closing a throwaway
    /// connection. Only the factory is kept.
    pub async fn new(
        factory: Arc<dyn ConnectionFactory>,
        registry: Arc<MessageRegistry>,
    ) -> Result<Self, AmqpError> {
        let probe = factory.connect(PROBE_CONNECTION_NAME).await?;
        if let Err(err) = probe.close().await {
            warn!(error = err.to_string(), "failure to close probe connection");
        }

        Ok(MessageListener {
            factory,
            registry,
            prefetch_count: DEFAULT_PREFETCH_COUNT,
        })
    }

    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Result<Self, AmqpError> {
        if prefetch_count == 0 {
            return Err(AmqpError::InvalidParameter(
                "prefetch count must be greater than 0".to_owned(),
            ));
        }
        self.prefetch_count = prefetch_count;
        Ok(self)
    }

    pub fn prefetch_count(&self) -> u16 {
        self.prefetch_count
    }

    /// Binds `queue` to `exchange` on `routing_key` and consumes it with
    /// `number_of_threads` workers sharing `callback`.
    pub async fn listen<C: MessageCallback>(
        &self,
        queue: &str,
        routing_key: &str,
        exchange: &str,
        number_of_threads: usize,
        callback: C,
    ) -> Result<Subscription, AmqpError> {
        if number_of_threads == 0 {
            return Err(AmqpError::InvalidParameter(
                "number of threads must be greater than 0".to_owned(),
            ));
        }

        let connection = self.factory.connect(&format!("{queue}-listener")).await?;

        let started = self
            .start_workers(
                connection.as_ref(),
                queue,
                routing_key,
                exchange,
                number_of_threads,
                Arc::new(callback),
            )
            .await;

        match started {
            Ok(workers) => Ok(Subscription {
                queue: queue.to_owned(),
                connection,
                workers,
            }),
            Err(err) => {
                error!(error = err.to_string(), queue, "failure to start listener");
                if let Err(close_err) = connection.close().await {
                    error!(error = close_err.to_string(), "failure to close connection");
                }
                Err(err)
            }
        }
    }

    /// Like [`MessageListener::listen`], with the routing key registered for
    /// the callback's message type.
    pub async fn listen_to_exchange<C>(
        &self,
        queue: &str,
        exchange: &str,
        number_of_threads: usize,
        callback: C,
    ) -> Result<Subscription, AmqpError>
    where
        C: MessageCallback,
        C::Message: Message,
    {
        let message_type = <C::Message as Message>::MESSAGE_TYPE;
        let routing_key = self
            .registry
            .generic_routing_key(&message_type)
            .ok_or_else(|| AmqpError::UnregisteredMessage(message_type.to_string()))?;

        self.listen(queue, &routing_key, exchange, number_of_threads, callback)
            .await
    }

    /// Like [`MessageListener::listen`], with the exchange and routing key
    /// registered for the callback's message type.
    pub async fn listen_registered<C>(
        &self,
        queue: &str,
        number_of_threads: usize,
        callback: C,
    ) -> Result<Subscription, AmqpError>
    where
        C: MessageCallback,
        C::Message: Message,
    {
        let message_type = <C::Message as Message>::MESSAGE_TYPE;
        let unregistered = || AmqpError::UnregisteredMessage(message_type.to_string());
        let exchange = self.registry.exchange(&message_type).ok_or_else(unregistered)?;
        let routing_key = self
            .registry
            .generic_routing_key(&message_type)
            .ok_or_else(unregistered)?;

        self.listen(queue, &routing_key, &exchange, number_of_threads, callback)
            .await
    }

    async fn start_workers<C: MessageCallback>(
        &self,
        connection: &dyn BrokerConnection,
        queue: &str,
        routing_key: &str,
        exchange: &str,
        number_of_threads: usize,
        callback: Arc<C>,
    ) -> Result<Vec<JoinHandle<()>>, AmqpError> {
        let setup = connection.open_channel().await?;
        AmqpTopology::new(setup.as_ref())
            .exchange(ExchangeDefinition::new(exchange).topic().durable())
            .queue(QueueDefinition::new(queue).durable())
            .queue_binding(
                QueueBinding::new(queue)
                    .exchange(exchange)
                    .routing_key(routing_key),
            )
            .install()
            .await?;
        if let Err(err) = setup.close().await {
            warn!(error = err.to_string(), "failure to close setup channel");
        }

        let mut workers = Vec::with_capacity(number_of_threads);
        for worker in 0..number_of_threads {
            let consumer_tag = format!("{queue}-{worker}");

            let deliveries = async {
                let channel = connection.open_channel().await?;
                channel.set_prefetch(self.prefetch_count).await?;
                let deliveries = channel.consume(queue, &consumer_tag, false).await?;
                Ok::<_, AmqpError>((channel, deliveries))
            }
            .await;

            let (channel, deliveries) = match deliveries {
                Ok(started) => started,
                Err(err) => {
                    workers.iter().for_each(JoinHandle::abort);
                    return Err(err);
                }
            };

            let consumer = MessageConsumer::new(channel, callback.clone(), queue);
            let span = info_span!("consumer", queue, worker);
            workers.push(tokio::spawn(consumer.run(deliveries).instrument(span)));
        }

        debug!(queue, exchange, routing_key, workers = number_of_threads, "listener started");
        Ok(workers)
    }
}

/// A running `listen*` call: its connection and its worker tasks.
pub struct Subscription {
    queue: String,
    connection: Arc<dyn BrokerConnection>,
    workers: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Closes the connection and stops every worker. In-flight deliveries that
    /// were not acknowledged are redelivered by the broker.
    pub async fn close(self) {
        if let Err(err) = self.connection.close().await {
            error!(error = err.to_string(), queue = %self.queue, "failure to close connection");
        }

        for worker in &self.workers {
            worker.abort();
        }
        join_all(self.workers).await;
    }

    /// Waits until every worker stopped, i.e. until the broker ends all
    /// consumers of this subscription.
    pub async fn join(self) {
        for res in join_all(self.workers).await {
            if let Err(err) = res {
                error!(error = err.to_string(), "tokio process error");
            }
        }
    }
}
