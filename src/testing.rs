// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker that records every operation made through the broker
//! traits. Deliveries are pushed to consumers by queue name.

use crate::{
    broker::{
        BrokerChannel, BrokerConnection, ConnectionFactory, Delivery, DeliveryStream,
        PublishProperties,
    },
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};
use tokio::sync::mpsc;

type Responder = Arc<dyn Fn(&Published) -> Vec<Delivery> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Published {
    pub channel: usize,
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub properties: PublishProperties,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Consume {
    pub channel: usize,
    pub queue: String,
    pub consumer_tag: String,
    pub no_ack: bool,
}

#[derive(Default)]
struct BrokerState {
    connections: Vec<String>,
    connections_closed: usize,
    refuse_connections: bool,
    channels_opened: usize,
    confirm_channels: Vec<usize>,
    exchanges: Vec<ExchangeDefinition>,
    failing_exchange: Option<String>,
    queues: Vec<QueueDefinition>,
    server_named: usize,
    bindings: Vec<QueueBinding>,
    prefetch: Vec<(usize, u16)>,
    consumes: Vec<Consume>,
    cancels: Vec<String>,
    publish_attempts: usize,
    publish_failures: usize,
    published: Vec<Published>,
    acks: Vec<u64>,
    rejects: Vec<u64>,
    nacks: Vec<u64>,
    confirms_waited: Vec<usize>,
    consumers: HashMap<String, Vec<mpsc::UnboundedSender<Result<Delivery, AmqpError>>>>,
    responder: Option<Responder>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl FakeBroker {
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap()
    }

    pub fn factory(&self) -> Arc<dyn ConnectionFactory> {
        Arc::new(FakeConnectionFactory {
            broker: self.clone(),
        })
    }

    pub fn connection(&self) -> Arc<dyn BrokerConnection> {
        self.state().connections.push("direct".to_owned());
        Arc::new(FakeConnection {
            broker: self.clone(),
            open: AtomicBool::new(true),
        })
    }

    pub fn refuse_connections(&self) {
        self.state().refuse_connections = true;
    }

    pub fn fail_exchange(&self, name: &str) {
        self.state().failing_exchange = Some(name.to_owned());
    }

    pub fn fail_next_publishes(&self, count: usize) {
        self.state().publish_failures = count;
    }

    /// Replies to requests carrying a reply-to queue with the deliveries
    /// returned by `responder`.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Published) -> Vec<Delivery> + Send + Sync + 'static,
    {
        self.state().responder = Some(Arc::new(responder));
    }

    /// Pushes a delivery to the first consumer of `queue` still listening.
    pub fn deliver(&self, queue: &str, delivery: Delivery) -> bool {
        let mut state = self.state();
        let Some(senders) = state.consumers.get_mut(queue) else {
            return false;
        };
        senders.retain(|sender| !sender.is_closed());
        senders
            .first()
            .map(|sender| sender.send(Ok(delivery)).is_ok())
            .unwrap_or(false)
    }

    pub fn connections(&self) -> Vec<String> {
        self.state().connections.clone()
    }

    pub fn connections_closed(&self) -> usize {
        self.state().connections_closed
    }

    pub fn channels_opened(&self) -> usize {
        self.state().channels_opened
    }

    pub fn confirm_channels(&self) -> usize {
        self.state().confirm_channels.len()
    }

    pub fn exchanges(&self) -> Vec<ExchangeDefinition> {
        self.state().exchanges.clone()
    }

    pub fn queues(&self) -> Vec<QueueDefinition> {
        self.state().queues.clone()
    }

    pub fn bindings(&self) -> Vec<QueueBinding> {
        self.state().bindings.clone()
    }

    pub fn prefetch(&self) -> Vec<(usize, u16)> {
        self.state().prefetch.clone()
    }

    pub fn consumes(&self) -> Vec<Consume> {
        self.state().consumes.clone()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.state().cancels.clone()
    }

    pub fn publish_attempts(&self) -> usize {
        self.state().publish_attempts
    }

    pub fn published(&self) -> Vec<Published> {
        self.state().published.clone()
    }

    pub fn acks(&self) -> Vec<u64> {
        self.state().acks.clone()
    }

    pub fn rejects(&self) -> Vec<u64> {
        self.state().rejects.clone()
    }

    pub fn nacks(&self) -> Vec<u64> {
        self.state().nacks.clone()
    }

    pub fn confirms_waited(&self) -> Vec<usize> {
        self.state().confirms_waited.clone()
    }
}

struct FakeConnectionFactory {
    broker: FakeBroker,
}

#[async_trait]
impl ConnectionFactory for FakeConnectionFactory {
    async fn connect(&self, name: &str) -> Result<Arc<dyn BrokerConnection>, AmqpError> {
        let mut state = self.broker.state();
        if state.refuse_connections {
            return Err(AmqpError::ConnectionError("connection refused".to_owned()));
        }
        state.connections.push(name.to_owned());

        Ok(Arc::new(FakeConnection {
            broker: self.broker.clone(),
            open: AtomicBool::new(true),
        }))
    }
}

struct FakeConnection {
    broker: FakeBroker,
    open: AtomicBool,
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError> {
        if !self.is_open() {
            return Err(AmqpError::ChannelError("connection closed".to_owned()));
        }

        let mut state = self.broker.state();
        state.channels_opened += 1;

        Ok(Arc::new(FakeChannel {
            id: state.channels_opened,
            broker: self.broker.clone(),
            open: AtomicBool::new(true),
        }))
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.open.store(false, Ordering::SeqCst);
        self.broker.state().connections_closed += 1;
        Ok(())
    }
}

pub(crate) struct FakeChannel {
    id: usize,
    broker: FakeBroker,
    open: AtomicBool,
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn enable_confirms(&self) -> Result<(), AmqpError> {
        self.broker.state().confirm_channels.push(self.id);
        Ok(())
    }

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        let mut state = self.broker.state();
        if state.failing_exchange.as_deref() == Some(def.name.as_str()) {
            return Err(AmqpError::DeclareExchangeError(def.name.clone()));
        }
        state.exchanges.push(def.clone());
        Ok(())
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<String, AmqpError> {
        let mut state = self.broker.state();
        state.queues.push(def.clone());

        if def.name.is_empty() {
            state.server_named += 1;
            return Ok(format!("amq.gen-{}", state.server_named));
        }
        Ok(def.name.clone())
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        self.broker.state().bindings.push(binding.clone());
        Ok(())
    }

    async fn set_prefetch(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        self.broker.state().prefetch.push((self.id, prefetch_count));
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: &PublishProperties,
    ) -> Result<(), AmqpError> {
        let published = Published {
            channel: self.id,
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            payload: payload.to_vec(),
            properties: properties.clone(),
        };

        let responder = {
            let mut state = self.broker.state();
            state.publish_attempts += 1;
            if state.publish_failures > 0 {
                state.publish_failures -= 1;
                return Err(AmqpError::PublishingError("connection reset by peer".to_owned()));
            }
            state.published.push(published.clone());
            state.responder.clone()
        };

        if let (Some(responder), Some(reply_to)) = (responder, &properties.reply_to) {
            for reply in responder(&published) {
                self.broker.deliver(reply_to, reply);
            }
        }

        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        no_ack: bool,
    ) -> Result<DeliveryStream, AmqpError> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut state = self.broker.state();
        state.consumes.push(Consume {
            channel: self.id,
            queue: queue.to_owned(),
            consumer_tag: consumer_tag.to_owned(),
            no_ack,
        });
        state
            .consumers
            .entry(queue.to_owned())
            .or_default()
            .push(sender);

        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|delivery| (delivery, receiver))
        })
        .boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        self.broker.state().cancels.push(consumer_tag.to_owned());
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.broker.state().acks.push(delivery_tag);
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.broker.state().rejects.push(delivery_tag);
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.broker.state().nacks.push(delivery_tag);
        Ok(())
    }

    async fn wait_for_confirms(&self) -> Result<(), AmqpError> {
        self.broker.state().confirms_waited.push(self.id);
        Ok(())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}
