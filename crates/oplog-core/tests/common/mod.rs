#![allow(dead_code)]

use std::sync::Arc;

use oplog_core::{AccessController, AllowAll, Entry, Log, LogContext};
use oplog_crypto::{Ed25519IdentityProvider, IdentityOptions, IdentityProvider};
use oplog_store::{BlockStore, InMemoryBlockStore};

/// One block store and one keystore shared by every writer in a test.
pub struct Network {
    pub store: Arc<InMemoryBlockStore>,
    pub provider: Arc<Ed25519IdentityProvider>,
}

impl Network {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryBlockStore::new()))
    }

    pub fn with_store(store: Arc<InMemoryBlockStore>) -> Self {
        Self {
            store,
            provider: Arc::new(Ed25519IdentityProvider::new()),
        }
    }

    pub fn ctx(&self, writer: &str) -> LogContext {
        self.ctx_on(writer, self.store.clone(), Arc::new(AllowAll))
    }

    pub fn ctx_on(
        &self,
        writer: &str,
        store: Arc<dyn BlockStore>,
        access: Arc<dyn AccessController>,
    ) -> LogContext {
        let identity = self
            .provider
            .create_identity(&IdentityOptions::new(writer))
            .unwrap();
        LogContext::new(store, access, identity, self.provider.clone())
    }

    pub fn log(&self, writer: &str) -> Log {
        Log::new(self.ctx(writer), "X")
    }
}

pub fn payloads(log: &Log) -> Vec<String> {
    log.iter().map(payload_text).collect()
}

pub fn payload_text(entry: &Entry) -> String {
    match entry.payload() {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn last(log: &Log) -> Entry {
    log.values().last().map(|e| (*e).clone()).unwrap()
}
