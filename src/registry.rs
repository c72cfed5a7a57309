// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Registry
//!
//! Maps a message's logical type to the exchange it is published on and the
//! generic routing key consumers bind with. A registry is seeded from an
//! immutable route table at construction and is freely mutable afterwards,
//! including removal of the seeded routes.

use crate::{
    events,
    message::{Message, MessageType},
};
use std::{
    collections::{HashMap, HashSet},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// One row of a route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub message_type: MessageType,
    pub exchange: String,
    pub routing_key: String,
}

impl RegistryEntry {
    pub fn new(message_type: MessageType, exchange: &str, routing_key: &str) -> Self {
        RegistryEntry {
            message_type,
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        }
    }

    /// Builds the entry for a message type known at compile time.
    pub fn of<M: Message>(exchange: &str, routing_key: &str) -> Self {
        RegistryEntry::new(M::MESSAGE_TYPE, exchange, routing_key)
    }
}

#[derive(Debug, Clone)]
struct Route {
    exchange: String,
    routing_key: String,
}

/// Thread-safe table of message routes.
///
/// Every mutation happens under a single write lock. Lookups share a read lock,
/// so each call sees a consistent table, but two separate calls may observe a
/// mutation made in between.
#[derive(Debug)]
pub struct MessageRegistry {
    routes: RwLock<HashMap<MessageType, Route>>,
}

impl Default for MessageRegistry {
    /// A registry seeded with the built-in crawler events.
    fn default() -> Self {
        MessageRegistry::with_routes(&events::default_routes())
    }
}

impl MessageRegistry {
    /// A registry with no routes at all.
    pub fn empty() -> Self {
        MessageRegistry {
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// A registry seeded from the given route table. Later entries win.
    pub fn with_routes(entries: &[RegistryEntry]) -> Self {
        let registry = MessageRegistry::empty();
        for entry in entries {
            registry.register(entry.message_type, &entry.exchange, &entry.routing_key);
        }
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<MessageType, Route>> {
        self.routes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<MessageType, Route>> {
        self.routes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The exchange registered for `message_type`, if any.
    pub fn exchange(&self, message_type: &MessageType) -> Option<String> {
        self.read()
            .get(message_type)
            .map(|route| route.exchange.clone())
    }

    /// The routing key consumers of `message_type` bind with, if registered.
    pub fn generic_routing_key(&self, message_type: &MessageType) -> Option<String> {
        self.read()
            .get(message_type)
            .map(|route| route.routing_key.clone())
    }

    /// A snapshot of every registered type. Later mutations are not reflected.
    pub fn registered_messages(&self) -> HashSet<MessageType> {
        self.read().keys().copied().collect()
    }

    /// The distinct exchanges of every registered type.
    pub fn exchanges(&self) -> Vec<String> {
        let mut exchanges: Vec<String> = self
            .read()
            .values()
            .map(|route| route.exchange.clone())
            .collect();
        exchanges.sort();
        exchanges.dedup();
        exchanges
    }

    /// Adds or silently replaces the route of `message_type`.
    pub fn register(&self, message_type: MessageType, exchange: &str, routing_key: &str) {
        self.write().insert(
            message_type,
            Route {
                exchange: exchange.to_owned(),
                routing_key: routing_key.to_owned(),
            },
        );
    }

    /// Removes the route of `message_type`; does nothing when absent.
    pub fn unregister(&self, message_type: &MessageType) {
        self.write().remove(message_type);
    }

    /// Removes every route, the seeded ones included.
    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn exchange_for<M: Message>(&self) -> Option<String> {
        self.exchange(&M::MESSAGE_TYPE)
    }

    pub fn routing_key_for<M: Message>(&self) -> Option<String> {
        self.generic_routing_key(&M::MESSAGE_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CrawlStarted, IndexRequested, CRAWLER_EXCHANGE, CRAWL_STARTED_KEY};
    use std::sync::Arc;

    const UNKNOWN: MessageType = MessageType::new("unknown");

    #[test]
    fn default_registry_knows_builtin_events() {
        let registry = MessageRegistry::default();

        for entry in events::default_routes() {
            assert_eq!(registry.exchange(&entry.message_type), Some(entry.exchange));
            assert_eq!(
                registry.generic_routing_key(&entry.message_type),
                Some(entry.routing_key)
            );
        }
        assert_eq!(registry.exchange(&UNKNOWN), None);
        assert_eq!(registry.generic_routing_key(&UNKNOWN), None);
    }

    #[test]
    fn register_then_unregister_restores_absence() {
        let registry = MessageRegistry::empty();

        registry.register(UNKNOWN, "ex", "rk");
        assert_eq!(registry.exchange(&UNKNOWN), Some("ex".to_owned()));

        registry.unregister(&UNKNOWN);
        assert_eq!(registry.exchange(&UNKNOWN), None);
        assert_eq!(registry.generic_routing_key(&UNKNOWN), None);

        registry.unregister(&UNKNOWN);
    }

    #[test]
    fn register_overwrites_defaults() {
        let registry = MessageRegistry::default();

        registry.register(CrawlStarted::MESSAGE_TYPE, "other", "other.key");

        assert_eq!(registry.exchange_for::<CrawlStarted>(), Some("other".to_owned()));
        assert_eq!(
            registry.routing_key_for::<CrawlStarted>(),
            Some("other.key".to_owned())
        );
    }

    #[test]
    fn clear_removes_defaults() {
        let registry = MessageRegistry::default();
        assert!(!registry.registered_messages().is_empty());

        registry.clear();

        assert!(registry.registered_messages().is_empty());
        assert_eq!(registry.exchange_for::<IndexRequested>(), None);
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let registry = MessageRegistry::default();
        let snapshot = registry.registered_messages();

        registry.clear();

        assert_eq!(snapshot.len(), events::default_routes().len());
        assert!(snapshot.contains(&CrawlStarted::MESSAGE_TYPE));
    }

    #[test]
    fn injected_table_replaces_defaults() {
        let registry = MessageRegistry::with_routes(&[RegistryEntry::of::<CrawlStarted>(
            "a",
            CRAWL_STARTED_KEY,
        )]);

        assert_eq!(registry.registered_messages().len(), 1);
        assert_eq!(registry.exchanges(), vec!["a".to_owned()]);
        assert_eq!(MessageRegistry::default().exchanges().first().unwrap(), CRAWLER_EXCHANGE);
    }

    #[test]
    fn concurrent_registration_is_serialized() {
        let registry = Arc::new(MessageRegistry::empty());
        const TYPES: [MessageType; 4] = [
            MessageType::new("a"),
            MessageType::new("b"),
            MessageType::new("c"),
            MessageType::new("d"),
        ];

        let handles: Vec<_> = TYPES
            .iter()
            .map(|message_type| {
                let registry = registry.clone();
                let message_type = *message_type;
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.register(message_type, "ex", &format!("rk.{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.registered_messages().len(), TYPES.len());
        assert_eq!(registry.generic_routing_key(&TYPES[0]), Some("rk.99".to_owned()));
    }
}
