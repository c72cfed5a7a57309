// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Request/Reply Correlation
//!
//! A [`CorrelationContext`] lives for one request/reply exchange. It owns the
//! temporary reply queue subscription and accepts exactly one reply: the first
//! delivery carrying the expected correlation id. Deliveries with any other
//! correlation id are dropped.

use crate::{
    broker::{BrokerChannel, DeliveryStream},
    errors::AmqpError,
    queue::QueueDefinition,
};
use futures_util::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub(crate) struct CorrelationContext {
    correlation_id: String,
    reply_queue: String,
    consumer_tag: String,
    replies: DeliveryStream,
}

impl CorrelationContext {
    /// Declares a server-named exclusive reply queue on `channel` and
    /// subscribes to it before any request is published.
    pub(crate) async fn open(
        channel: &dyn BrokerChannel,
        correlation_id: &str,
    ) -> Result<Self, AmqpError> {
        let reply_queue = channel
            .declare_queue(&QueueDefinition::server_named().exclusive().delete())
            .await?;
        let consumer_tag = format!("reply-{}", Uuid::new_v4());
        let replies = channel.consume(&reply_queue, &consumer_tag, true).await?;

        debug!(correlation_id, reply_queue = %reply_queue, "reply queue ready");

        Ok(CorrelationContext {
            correlation_id: correlation_id.to_owned(),
            reply_queue,
            consumer_tag,
            replies,
        })
    }

    pub(crate) fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    pub(crate) fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Waits for the first reply bearing this context's correlation id and
    /// returns its body.
    pub(crate) async fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>, AmqpError> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.next_matching()).await {
                Ok(reply) => reply,
                Err(_) => Err(AmqpError::ReplyTimeout(self.correlation_id.clone())),
            },
            None => self.next_matching().await,
        }
    }

    async fn next_matching(&mut self) -> Result<Vec<u8>, AmqpError> {
        while let Some(result) = self.replies.next().await {
            let delivery = result?;

            if delivery.correlation_id() == Some(self.correlation_id.as_str()) {
                return Ok(delivery.data);
            }

            warn!(
                expected = %self.correlation_id,
                received = ?delivery.correlation_id(),
                "dropping reply with foreign correlation id"
            );
        }

        Err(AmqpError::ReplyChannelClosed(self.correlation_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{broker::Delivery, testing::FakeBroker};
    use lapin::{protocol::basic::AMQPProperties, types::ShortString};

    fn reply(correlation_id: &str, body: &[u8]) -> Delivery {
        Delivery {
            data: body.to_vec(),
            properties: AMQPProperties::default()
                .with_correlation_id(ShortString::from(correlation_id)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn accepts_only_the_matching_reply() {
        let broker = FakeBroker::default();
        let channel = broker.connection().open_channel().await.unwrap();

        let mut context = CorrelationContext::open(channel.as_ref(), "c-1").await.unwrap();
        assert_eq!(context.reply_queue(), "amq.gen-1");

        broker.deliver("amq.gen-1", reply("other", b"wrong"));
        broker.deliver("amq.gen-1", reply("c-1", b"right"));
        broker.deliver("amq.gen-1", reply("c-1", b"late"));

        assert_eq!(context.wait(None).await, Ok(b"right".to_vec()));

        let queues = broker.queues();
        assert!(queues[0].is_exclusive() && queues[0].is_auto_delete());
        assert!(broker.consumes()[0].no_ack);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_timeout() {
        let broker = FakeBroker::default();
        let channel = broker.connection().open_channel().await.unwrap();

        let mut context = CorrelationContext::open(channel.as_ref(), "c-2").await.unwrap();
        broker.deliver("amq.gen-1", reply("other", b"wrong"));

        let result = context.wait(Some(Duration::from_secs(5))).await;

        assert_eq!(result, Err(AmqpError::ReplyTimeout("c-2".to_owned())));
    }
}
