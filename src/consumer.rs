// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! This module provides the per-delivery processing of a listener worker. Every
//! delivery ends in exactly one acknowledgment outcome:
//!
//! * payload cannot be decoded into the callback's message type: rejected,
//!   without requeue, and the callback is never invoked
//! * callback fails or panics: negatively acknowledged, without requeue
//! * callback succeeds: acknowledged
//!
//! Failures to send the acknowledgment itself are logged and never stop the
//! delivery loop. The module also supports OpenTelemetry for distributed tracing.

use crate::{
    broker::{BrokerChannel, Delivery, DeliveryStream},
    errors::CallbackError,
    otel,
};
use async_trait::async_trait;
use futures_util::{FutureExt, StreamExt};
use opentelemetry::{
    global,
    trace::{Span, Status},
};
use serde::de::DeserializeOwned;
use std::{
    any::type_name, borrow::Cow, future::Future, marker::PhantomData, panic::AssertUnwindSafe,
    sync::Arc,
};
use tracing::{debug, error, warn};

/// User code invoked once per successfully decoded delivery.
///
/// The handled type is declared by [`MessageCallback::Message`]; deliveries are
/// decoded from JSON into it before the callback runs.
#[async_trait]
pub trait MessageCallback: Send + Sync + 'static {
    type Message: DeserializeOwned + Send;

    /// Handles one message. The raw delivery is available for its envelope,
    /// e.g. [`Delivery::reply_to`] when answering a request.
    async fn on_message(
        &self,
        message: Self::Message,
        delivery: &Delivery,
    ) -> Result<(), CallbackError>;
}

/// Adapts an async closure taking the decoded message into a [`MessageCallback`].
pub struct FnCallback<T, F> {
    handler: F,
    _message: PhantomData<fn() -> T>,
}

pub fn callback_fn<T, F, Fut>(handler: F) -> FnCallback<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send,
{
    FnCallback {
        handler,
        _message: PhantomData,
    }
}

#[async_trait]
impl<T, F, Fut> MessageCallback for FnCallback<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send,
{
    type Message = T;

    async fn on_message(&self, message: T, _delivery: &Delivery) -> Result<(), CallbackError> {
        (self.handler)(message).await
    }
}

/// The acknowledgment issued for a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Rejected,
    Nacked,
}

/// Processes the deliveries of one channel, strictly one at a time.
pub struct MessageConsumer<C> {
    channel: Arc<dyn BrokerChannel>,
    callback: Arc<C>,
    queue: String,
}

impl<C: MessageCallback> MessageConsumer<C> {
    pub fn new(channel: Arc<dyn BrokerChannel>, callback: Arc<C>, queue: &str) -> Self {
        MessageConsumer {
            channel,
            callback,
            queue: queue.to_owned(),
        }
    }

    /// Handles deliveries until the stream ends, which happens when the
    /// consumer is cancelled or its channel closes.
    pub async fn run(self, mut deliveries: DeliveryStream) {
        while let Some(result) = deliveries.next().await {
            match result {
                Ok(delivery) => {
                    self.handle(&delivery).await;
                }
                Err(err) => error!(error = err.to_string(), "errors consume msg"),
            }
        }

        debug!(queue = %self.queue, "delivery stream ended");
    }

    /// Decodes the delivery, runs the callback and issues exactly one of
    /// ack, reject or nack.
    pub async fn handle(&self, delivery: &Delivery) -> DeliveryOutcome {
        let tracer = global::tracer(otel::CONSUMER_TRACER);
        let (_ctx, mut span) = otel::new_span(&delivery.properties, &tracer, &self.queue);

        debug!(
            "received: {} - exchange: {}",
            delivery.routing_key, delivery.exchange
        );

        let message = match serde_json::from_slice::<C::Message>(&delivery.data) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    expected_type = type_name::<C::Message>(),
                    routing_key = %delivery.routing_key,
                    exchange = %delivery.exchange,
                    error = err.to_string(),
                    "rejecting message that cannot be decoded"
                );
                span.record_error(&err);
                span.set_status(Status::Error {
                    description: Cow::from("undecodable message"),
                });

                if let Err(err) = self.channel.reject(delivery.delivery_tag).await {
                    error!(error = err.to_string(), "error whiling reject msg");
                }
                return DeliveryOutcome::Rejected;
            }
        };

        let result = AssertUnwindSafe(self.callback.on_message(message, delivery))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(())) => {
                debug!("message successfully processed");
                span.set_status(Status::Ok);

                if let Err(err) = self.channel.ack(delivery.delivery_tag).await {
                    error!(error = err.to_string(), "error whiling ack msg");
                }
                DeliveryOutcome::Acked
            }
            Ok(Err(err)) => {
                error!(
                    error = err.to_string(),
                    routing_key = %delivery.routing_key,
                    "callback failed, discarding message"
                );
                span.record_error(err.as_ref());
                span.set_status(Status::Error {
                    description: Cow::from("callback failed"),
                });
                self.nack(delivery).await
            }
            Err(_) => {
                error!(
                    routing_key = %delivery.routing_key,
                    "callback panicked, discarding message"
                );
                span.set_status(Status::Error {
                    description: Cow::from("callback panicked"),
                });
                self.nack(delivery).await
            }
        }
    }

    async fn nack(&self, delivery: &Delivery) -> DeliveryOutcome {
        if let Err(err) = self.channel.nack(delivery.delivery_tag).await {
            error!(error = err.to_string(), "error whiling nack msg");
        }
        DeliveryOutcome::Nacked
    }
}
