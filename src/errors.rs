// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Messaging Runtime
//!
//! This module provides the error taxonomy shared by the publisher, the listener
//! and the registry. Configuration errors are raised synchronously and never
//! retried, transport errors on the publish path are retried before surfacing,
//! and consume-path errors are turned into an acknowledgment outcome instead of
//! being propagated.

use thiserror::Error;

/// Error returned by a user callback when it fails to handle a message.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Each variant provides specific context about what operation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// A connection parameter or runtime setting is invalid
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The message type has no exchange or routing key in the registry
    #[error("message type `{0}` is not registered")]
    UnregisteredMessage(String),

    /// A message field is missing or out of its documented range
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error declaring a consumer
    #[error("failure to declare consumer `{0}`")]
    ConsumerDeclarationError(String),

    /// Error canceling a consumer
    #[error("failure to cancel consumer `{0}`")]
    ConsumerCancelError(String),

    /// Error publishing a message, carrying the broker error
    #[error("failure to publish: {0}")]
    PublishingError(String),

    /// Error serializing a message payload
    #[error("failure to serialize payload: {0}")]
    SerializePayloadError(String),

    /// Error parsing a message payload
    #[error("failure to parse payload: {0}")]
    ParsePayloadError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error rejecting a message
    #[error("failure to reject message")]
    RejectMessageError,

    /// No reply with the expected correlation id arrived in time
    #[error("no reply received for correlation id `{0}`")]
    ReplyTimeout(String),

    /// The reply subscription ended before a matching reply arrived
    #[error("reply subscription closed for correlation id `{0}`")]
    ReplyChannelClosed(String),

    /// Error closing a channel or connection
    #[error("failure to close: {0}")]
    CloseError(String),
}

impl AmqpError {
    /// Returns true for errors raised by bad configuration rather than the broker.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AmqpError::InvalidParameter(_)
                | AmqpError::UnregisteredMessage(_)
                | AmqpError::InvalidMessage(_)
        )
    }
}
