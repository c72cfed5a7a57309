// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Built-in Crawler Events
//!
//! The message types known to every registry out of the box, and the route table
//! that seeds it. Each constructor validates its fields, and deserialization goes
//! through the same constructor, so an invalid payload never decodes.

use crate::{
    errors::AmqpError,
    message::{Message, MessageType},
    registry::RegistryEntry,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CRAWLER_EXCHANGE: &str = "crawler";
pub const INDEXER_EXCHANGE: &str = "indexer";

pub const CRAWL_STARTED_KEY: &str = "crawl.started";
pub const PAGE_FETCHED_KEY: &str = "crawl.page.fetched";
pub const CRAWL_COMPLETED_KEY: &str = "crawl.completed";
pub const CRAWL_FAILED_KEY: &str = "crawl.error";
pub const INDEX_REQUESTED_KEY: &str = "index.requested";

/// The default route table: every built-in event with its exchange and
/// generic routing key.
pub fn default_routes() -> Vec<RegistryEntry> {
    vec![
        RegistryEntry::of::<CrawlStarted>(CRAWLER_EXCHANGE, CRAWL_STARTED_KEY),
        RegistryEntry::of::<PageFetched>(CRAWLER_EXCHANGE, PAGE_FETCHED_KEY),
        RegistryEntry::of::<CrawlCompleted>(CRAWLER_EXCHANGE, CRAWL_COMPLETED_KEY),
        RegistryEntry::of::<CrawlFailed>(CRAWLER_EXCHANGE, &format!("{CRAWL_FAILED_KEY}.#")),
        RegistryEntry::of::<IndexRequested>(INDEXER_EXCHANGE, INDEX_REQUESTED_KEY),
    ]
}

fn required(field: &str, value: &str) -> Result<String, AmqpError> {
    if value.trim().is_empty() {
        return Err(AmqpError::InvalidMessage(format!("{field} must not be empty")));
    }
    Ok(value.to_owned())
}

fn positive_attempt(attempt: u32) -> Result<u32, AmqpError> {
    if attempt == 0 {
        return Err(AmqpError::InvalidMessage("attempt must be greater than 0".to_owned()));
    }
    Ok(attempt)
}

/// A crawl of `url` began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "wire::CrawlStarted")]
pub struct CrawlStarted {
    crawl_id: String,
    url: String,
    attempt: u32,
}

impl CrawlStarted {
    pub fn new(crawl_id: &str, url: &str, attempt: u32) -> Result<Self, AmqpError> {
        Ok(CrawlStarted {
            crawl_id: required("crawl_id", crawl_id)?,
            url: required("url", url)?,
            attempt: positive_attempt(attempt)?,
        })
    }

    pub fn crawl_id(&self) -> &str {
        &self.crawl_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Message for CrawlStarted {
    const MESSAGE_TYPE: MessageType = MessageType::new("crawl-started");

    fn routing_key(&self) -> String {
        CRAWL_STARTED_KEY.to_owned()
    }
}

/// A page was downloaded during a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "wire::PageFetched")]
pub struct PageFetched {
    crawl_id: String,
    url: String,
    status_code: u16,
    content_length: u64,
}

impl PageFetched {
    pub fn new(
        crawl_id: &str,
        url: &str,
        status_code: u16,
        content_length: u64,
    ) -> Result<Self, AmqpError> {
        if !(100..=599).contains(&status_code) {
            return Err(AmqpError::InvalidMessage(format!(
                "status_code {status_code} is not an HTTP status"
            )));
        }

        Ok(PageFetched {
            crawl_id: required("crawl_id", crawl_id)?,
            url: required("url", url)?,
            status_code,
            content_length,
        })
    }

    pub fn crawl_id(&self) -> &str {
        &self.crawl_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }
}

impl Message for PageFetched {
    const MESSAGE_TYPE: MessageType = MessageType::new("page-fetched");

    fn routing_key(&self) -> String {
        PAGE_FETCHED_KEY.to_owned()
    }
}

/// A crawl finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "wire::CrawlCompleted")]
pub struct CrawlCompleted {
    crawl_id: String,
    pages: u64,
}

impl CrawlCompleted {
    pub fn new(crawl_id: &str, pages: u64) -> Result<Self, AmqpError> {
        Ok(CrawlCompleted {
            crawl_id: required("crawl_id", crawl_id)?,
            pages,
        })
    }

    pub fn crawl_id(&self) -> &str {
        &self.crawl_id
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }
}

impl Message for CrawlCompleted {
    const MESSAGE_TYPE: MessageType = MessageType::new("crawl-completed");

    fn routing_key(&self) -> String {
        CRAWL_COMPLETED_KEY.to_owned()
    }
}

/// Why a crawl attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    Http,
    Parse,
    Robots,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Http => "http",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Robots => "robots",
        };
        f.write_str(name)
    }
}

/// A crawl attempt failed.
///
/// The routing key carries the error category, so consumers can bind to
/// `crawl.error.#` or to a single category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "wire::CrawlFailed")]
pub struct CrawlFailed {
    crawl_id: String,
    url: String,
    category: ErrorCategory,
    reason: String,
    attempt: u32,
}

impl CrawlFailed {
    pub fn new(
        crawl_id: &str,
        url: &str,
        category: ErrorCategory,
        reason: &str,
        attempt: u32,
    ) -> Result<Self, AmqpError> {
        Ok(CrawlFailed {
            crawl_id: required("crawl_id", crawl_id)?,
            url: required("url", url)?,
            category,
            reason: reason.to_owned(),
            attempt: positive_attempt(attempt)?,
        })
    }

    pub fn crawl_id(&self) -> &str {
        &self.crawl_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Message for CrawlFailed {
    const MESSAGE_TYPE: MessageType = MessageType::new("crawl-failed");

    fn routing_key(&self) -> String {
        format!("{CRAWL_FAILED_KEY}.{}", self.category)
    }
}

/// A fetched document should be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "wire::IndexRequested")]
pub struct IndexRequested {
    document_id: String,
    url: String,
}

impl IndexRequested {
    pub fn new(document_id: &str, url: &str) -> Result<Self, AmqpError> {
        Ok(IndexRequested {
            document_id: required("document_id", document_id)?,
            url: required("url", url)?,
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Message for IndexRequested {
    const MESSAGE_TYPE: MessageType = MessageType::new("index-requested");

    fn routing_key(&self) -> String {
        INDEX_REQUESTED_KEY.to_owned()
    }
}

/// Unvalidated shapes of the events as they arrive from the broker.
mod wire {
    use super::ErrorCategory;
    use serde::Deserialize;

    #[derive(Deserialize)]
    pub(super) struct CrawlStarted {
        pub crawl_id: String,
        pub url: String,
        pub attempt: u32,
    }

    #[derive(Deserialize)]
    pub(super) struct PageFetched {
        pub crawl_id: String,
        pub url: String,
        pub status_code: u16,
        pub content_length: u64,
    }

    #[derive(Deserialize)]
    pub(super) struct CrawlCompleted {
        pub crawl_id: String,
        pub pages: u64,
    }

    #[derive(Deserialize)]
    pub(super) struct CrawlFailed {
        pub crawl_id: String,
        pub url: String,
        pub category: ErrorCategory,
        pub reason: String,
        pub attempt: u32,
    }

    #[derive(Deserialize)]
    pub(super) struct IndexRequested {
        pub document_id: String,
        pub url: String,
    }
}

impl TryFrom<wire::CrawlStarted> for CrawlStarted {
    type Error = AmqpError;

    fn try_from(raw: wire::CrawlStarted) -> Result<Self, Self::Error> {
        CrawlStarted::new(&raw.crawl_id, &raw.url, raw.attempt)
    }
}

impl TryFrom<wire::PageFetched> for PageFetched {
    type Error = AmqpError;

    fn try_from(raw: wire::PageFetched) -> Result<Self, Self::Error> {
        PageFetched::new(&raw.crawl_id, &raw.url, raw.status_code, raw.content_length)
    }
}

impl TryFrom<wire::CrawlCompleted> for CrawlCompleted {
    type Error = AmqpError;

    fn try_from(raw: wire::CrawlCompleted) -> Result<Self, Self::Error> {
        CrawlCompleted::new(&raw.crawl_id, raw.pages)
    }
}

impl TryFrom<wire::CrawlFailed> for CrawlFailed {
    type Error = AmqpError;

    fn try_from(raw: wire::CrawlFailed) -> Result<Self, Self::Error> {
        CrawlFailed::new(&raw.crawl_id, &raw.url, raw.category, &raw.reason, raw.attempt)
    }
}

impl TryFrom<wire::IndexRequested> for IndexRequested {
    type Error = AmqpError;

    fn try_from(raw: wire::IndexRequested) -> Result<Self, Self::Error> {
        IndexRequested::new(&raw.document_id, &raw.url)
    }
}
