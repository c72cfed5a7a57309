// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker and Runtime Configuration
//!
//! [`ConnectionParameters`] describes how to reach the broker and is validated
//! when constructed. [`PublisherConfig`] carries the publisher's tunables.

use crate::{channel::AmqpConnectionFactory, errors::AmqpError};
use serde::Deserialize;
use std::{env, time::Duration};

/// Content type used when no override is configured.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";
/// Content type for JSON-flavored deployments.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// How long a request/reply call waits for its reply unless configured otherwise.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);
/// Connection name used when `APP_NAME` is not set.
pub const DEFAULT_CONNECTION_NAME: &str = "rabbitmq-pubsub";

pub const ENV_HOST: &str = "RABBITMQ_HOST";
pub const ENV_PORT: &str = "RABBITMQ_PORT";
pub const ENV_USER: &str = "RABBITMQ_USER";
pub const ENV_PASSWORD: &str = "RABBITMQ_PASSWORD";
pub const ENV_VHOST: &str = "RABBITMQ_VHOST";
pub const ENV_APP_NAME: &str = "APP_NAME";

/// Validated broker connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionParameters {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub virtual_host: String,
    #[serde(default = "default_connection_name")]
    pub connection_name: String,
}

fn default_connection_name() -> String {
    DEFAULT_CONNECTION_NAME.to_owned()
}

impl ConnectionParameters {
    /// Creates validated connection parameters.
    ///
    /// Every string must be non-empty and the port must be greater than zero.
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        virtual_host: &str,
    ) -> Result<Self, AmqpError> {
        let params = ConnectionParameters {
            host: host.to_owned(),
            port,
            username: username.to_owned(),
            password: password.to_owned(),
            virtual_host: virtual_host.to_owned(),
            connection_name: default_connection_name(),
        };
        params.validate()?;
        Ok(params)
    }

    /// Reads the parameters from the `RABBITMQ_*` environment variables.
    pub fn from_env() -> Result<Self, AmqpError> {
        let port = required_env(ENV_PORT)?;
        let port = port
            .parse::<u16>()
            .map_err(|_| AmqpError::InvalidParameter(format!("{ENV_PORT} is not a port: {port}")))?;

        let params = ConnectionParameters::new(
            &required_env(ENV_HOST)?,
            port,
            &required_env(ENV_USER)?,
            &required_env(ENV_PASSWORD)?,
            &required_env(ENV_VHOST)?,
        )?;

        match env::var(ENV_APP_NAME) {
            Ok(name) if !name.is_empty() => params.with_connection_name(&name),
            _ => Ok(params),
        }
    }

    /// Sets the client-provided name of the publisher's connection.
    pub fn with_connection_name(mut self, name: &str) -> Result<Self, AmqpError> {
        self.connection_name = name.to_owned();
        self.validate()?;
        Ok(self)
    }

    /// Checks that no field is empty and the port is set.
    pub fn validate(&self) -> Result<(), AmqpError> {
        let fields = [
            ("host", &self.host),
            ("username", &self.username),
            ("password", &self.password),
            ("virtual_host", &self.virtual_host),
            ("connection_name", &self.connection_name),
        ];

        if let Some((field, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(AmqpError::InvalidParameter(format!("{field} must not be empty")));
        }

        if self.port == 0 {
            return Err(AmqpError::InvalidParameter("port must be greater than 0".to_owned()));
        }

        Ok(())
    }

    /// Produces a factory opening lapin connections with these parameters.
    pub fn connection_factory(&self) -> AmqpConnectionFactory {
        AmqpConnectionFactory::new(self.clone())
    }
}

fn required_env(key: &str) -> Result<String, AmqpError> {
    env::var(key).map_err(|_| AmqpError::InvalidParameter(format!("{key} is not set")))
}

/// Publisher tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Fixed content type sent with every message, `text/plain` when absent.
    pub content_type: Option<String>,
    /// Upper bound on the wait for a request/reply answer, `None` waits forever.
    pub reply_timeout: Option<Duration>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig {
            content_type: None,
            reply_timeout: Some(DEFAULT_REPLY_TIMEOUT),
        }
    }
}

impl PublisherConfig {
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}
