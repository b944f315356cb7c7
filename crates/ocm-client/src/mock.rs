//! Mock OcmClient for unit testing
//!
//! This module provides a mock implementation of `OcmClientTrait` that can
//! be used in unit tests without a running hub. Items live in memory per
//! collection; open watches can be fed events, ended, and their closes
//! counted. List, watch and get failures can be injected.

use crate::collection::Collection;
use crate::error::OcmError;
use crate::ocm_trait::OcmClientTrait;
use crate::watch::{WatchEvent, WatchHandle};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

const MOCK_WATCH_CAPACITY: usize = 64;

// A test that panicked while holding a lock must not poison the others
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock OcmClient for testing
#[derive(Clone, Default)]
pub struct MockOcmClient {
    // In-memory storage for items, keyed by collection
    items: Arc<Mutex<HashMap<Collection, Vec<Value>>>>,
    // Senders of the watches currently open
    watchers: Arc<Mutex<Vec<mpsc::Sender<WatchEvent>>>>,
    // Injected failures
    list_failure: Arc<Mutex<Option<String>>>,
    watch_failure: Arc<Mutex<Option<String>>>,
    get_failure: Arc<Mutex<Option<String>>>,
    // Call accounting
    list_calls: Arc<AtomicUsize>,
    watch_opens: Arc<AtomicUsize>,
    watch_closes: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MockOcmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockOcmClient")
            .field("list_calls", &self.list_calls())
            .field("watch_opens", &self.watch_opens())
            .field("watch_closes", &self.watch_closes())
            .finish()
    }
}

impl MockOcmClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the items of a collection (for test setup)
    pub fn set_items(&self, collection: &Collection, items: Vec<Value>) {
        lock(&self.items).insert(collection.clone(), items);
    }

    /// Make every following `list` fail with `message`, or succeed again with `None`
    pub fn set_list_failure(&self, message: Option<&str>) {
        *lock(&self.list_failure) = message.map(str::to_string);
    }

    /// Make every following `watch` fail with `message`, or succeed again with `None`
    pub fn set_watch_failure(&self, message: Option<&str>) {
        *lock(&self.watch_failure) = message.map(str::to_string);
    }

    /// Make every following `get` fail with `message`, or succeed again with `None`
    pub fn set_get_failure(&self, message: Option<&str>) {
        *lock(&self.get_failure) = message.map(str::to_string);
    }

    /// Deliver an event to every open watch. Returns how many received it.
    pub async fn emit(&self, event: WatchEvent) -> usize {
        let senders: Vec<_> = lock(&self.watchers).clone();
        let mut delivered = 0;
        for sender in senders {
            if sender.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// End every open watch, as if the server had closed them.
    pub fn end_watches(&self) {
        lock(&self.watchers).clear();
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_opens(&self) -> usize {
        self.watch_opens.load(Ordering::SeqCst)
    }

    pub fn watch_closes(&self) -> usize {
        self.watch_closes.load(Ordering::SeqCst)
    }
}

fn item_name(item: &Value) -> Option<&str> {
    item.pointer("/metadata/name").and_then(Value::as_str)
}

#[async_trait::async_trait]
impl OcmClientTrait for MockOcmClient {
    async fn list(&self, collection: &Collection) -> Result<Vec<Value>, OcmError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.list_failure).clone() {
            return Err(OcmError::UnexpectedResponse(message));
        }
        Ok(lock(&self.items)
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn watch(&self, _collection: &Collection) -> Result<WatchHandle, OcmError> {
        if let Some(message) = lock(&self.watch_failure).clone() {
            return Err(OcmError::Watch(message));
        }
        self.watch_opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(MOCK_WATCH_CAPACITY);
        lock(&self.watchers).push(tx);
        let closes = self.watch_closes.clone();
        Ok(WatchHandle::new(rx, move || {
            closes.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn get(&self, collection: &Collection, name: &str) -> Result<Value, OcmError> {
        if let Some(message) = lock(&self.get_failure).clone() {
            return Err(OcmError::UnexpectedResponse(message));
        }
        lock(&self.items)
            .get(collection)
            .and_then(|items| items.iter().find(|item| item_name(item) == Some(name)))
            .cloned()
            .ok_or_else(|| OcmError::NotFound(format!("{collection}/{name}")))
    }
}
