// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Publisher Channel Pool
//!
//! An unbounded hand-off collection of idle channels over one shared connection.
//! A channel is owned by the pool while idle and by exactly one publish while
//! checked out. Closed channels are never pooled. There is no upper bound and
//! no idle eviction: steady-state size follows the publish concurrency.

use crate::{
    broker::{BrokerChannel, BrokerConnection},
    errors::AmqpError,
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

pub(crate) struct ChannelPool {
    connection: Arc<dyn BrokerConnection>,
    idle: Mutex<VecDeque<Arc<dyn BrokerChannel>>>,
}

impl ChannelPool {
    pub(crate) fn new(connection: Arc<dyn BrokerConnection>) -> Self {
        ChannelPool {
            connection,
            idle: Mutex::new(VecDeque::new()),
        }
    }

    fn idle(&self) -> MutexGuard<'_, VecDeque<Arc<dyn BrokerChannel>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn connection(&self) -> &Arc<dyn BrokerConnection> {
        &self.connection
    }

    /// Checks out a channel: the oldest idle one if it is still open, otherwise
    /// a new confirm-mode channel on the shared connection.
    pub(crate) async fn provide(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError> {
        let polled = self.idle().pop_front();

        match polled {
            Some(channel) if channel.is_open() => return Ok(channel),
            Some(_) => debug!("discarding closed pooled channel"),
            None => {}
        }

        let channel = self.connection.open_channel().await?;
        channel.enable_confirms().await?;
        Ok(channel)
    }

    /// Returns a channel to the pool, dropping it when it is no longer open.
    pub(crate) fn release(&self, channel: Arc<dyn BrokerChannel>) {
        if channel.is_open() {
            self.idle().push_back(channel);
        } else {
            debug!("dropping closed channel instead of pooling it");
        }
    }

    /// Takes every idle channel out of the pool.
    pub(crate) fn drain(&self) -> Vec<Arc<dyn BrokerChannel>> {
        self.idle().drain(..).collect()
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBroker;

    #[tokio::test]
    async fn released_channel_is_handed_out_again() {
        let broker = FakeBroker::default();
        let pool = ChannelPool::new(broker.connection());

        let first = pool.provide().await.unwrap();
        pool.release(first.clone());
        let second = pool.provide().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(broker.channels_opened(), 1);
        assert_eq!(broker.confirm_channels(), 1);
    }

    #[tokio::test]
    async fn closed_channels_are_never_pooled() {
        let broker = FakeBroker::default();
        let pool = ChannelPool::new(broker.connection());

        let channel = pool.provide().await.unwrap();
        channel.close().await.unwrap();
        pool.release(channel);

        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn closed_idle_channel_is_replaced() {
        let broker = FakeBroker::default();
        let pool = ChannelPool::new(broker.connection());

        let first = pool.provide().await.unwrap();
        pool.release(first.clone());
        first.close().await.unwrap();

        let second = pool.provide().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(broker.channels_opened(), 2);
    }

    #[tokio::test]
    async fn drain_empties_the_pool() {
        let broker = FakeBroker::default();
        let pool = ChannelPool::new(broker.connection());

        let a = pool.provide().await.unwrap();
        let b = pool.provide().await.unwrap();
        pool.release(a);
        pool.release(b);

        assert_eq!(pool.drain().len(), 2);
        assert_eq!(pool.idle_count(), 0);
    }
}
