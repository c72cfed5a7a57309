// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Rate-Limited Publisher
//!
//! A [`Publisher`] decorator spacing fire-and-forget publishes evenly at a
//! configured rate. Requests and shutdown go straight to the inner publisher.

use crate::{errors::AmqpError, message::Message, publisher::Publisher};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};
use tokio::time::{self, Instant};
use tracing::trace;

/// Hands out evenly spaced publish slots. Permits do not accumulate while idle.
struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(permits_per_second: f64) -> Result<Self, AmqpError> {
        if !permits_per_second.is_finite() || permits_per_second <= 0.0 {
            return Err(AmqpError::InvalidParameter(format!(
                "permits per second must be a positive number, got {permits_per_second}"
            )));
        }

        let interval = Duration::try_from_secs_f64(1.0 / permits_per_second)
            .ok()
            .filter(|interval| Instant::now().checked_add(*interval).is_some())
            .ok_or_else(|| {
                AmqpError::InvalidParameter(format!(
                    "permits per second {permits_per_second} is too low to schedule"
                ))
            })?;

        Ok(RateLimiter {
            interval,
            next_slot: Mutex::new(None),
        })
    }

    async fn acquire(&self) {
        let slot = {
            let mut next_slot = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = match *next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_slot = Some(slot.checked_add(self.interval).unwrap_or(slot));
            slot
        };

        trace!(wait = ?slot.saturating_duration_since(Instant::now()), "waiting for publish slot");
        time::sleep_until(slot).await;
    }
}

/// Throttles `send`, `send_to`, `send_payload` and `reply_to_queue` of the
/// inner publisher.
pub struct RateLimitedPublisher<P> {
    inner: P,
    limiter: RateLimiter,
}

impl<P: Publisher> RateLimitedPublisher<P> {
    pub fn new(inner: P, permits_per_second: f64) -> Result<Self, AmqpError> {
        Ok(RateLimitedPublisher {
            inner,
            limiter: RateLimiter::new(permits_per_second)?,
        })
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

#[async_trait]
impl<P: Publisher> Publisher for RateLimitedPublisher<P> {
    async fn send<M: Message>(&self, message: &M) -> Result<(), AmqpError> {
        self.limiter.acquire().await;
        self.inner.send(message).await
    }

    async fn send_to<M: Message>(&self, message: &M, exchange: &str) -> Result<(), AmqpError> {
        self.limiter.acquire().await;
        self.inner.send_to(message, exchange).await
    }

    async fn send_payload<T>(
        &self,
        payload: &T,
        exchange: &str,
        routing_key: &str,
        persistent: bool,
    ) -> Result<(), AmqpError>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.limiter.acquire().await;
        self.inner
            .send_payload(payload, exchange, routing_key, persistent)
            .await
    }

    async fn send_and_receive<T, R>(
        &self,
        payload: &T,
        exchange: &str,
        routing_key: &str,
        persistent: bool,
        correlation_id: &str,
    ) -> Result<R, AmqpError>
    where
        T: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        self.inner
            .send_and_receive(payload, exchange, routing_key, persistent, correlation_id)
            .await
    }

    async fn reply_to_queue<T>(
        &self,
        payload: &T,
        persistent: bool,
        correlation_id: &str,
        reply_to: &str,
    ) -> Result<(), AmqpError>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.limiter.acquire().await;
        self.inner
            .reply_to_queue(payload, persistent, correlation_id, reply_to)
            .await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}
