//! In-process relay with the same slot semantics as the HTTP relay.
//!
//! A slot holds one message, a second write to an occupied slot is a
//! conflict (409) and a successful read consumes the slot.

use crate::relay::{RelayError, RelayTransport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared in-memory relay. Clones address the same slots.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a message is waiting under `key_id`.
    pub fn contains(&self, key_id: &str) -> bool {
        self.slots().contains_key(key_id)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RelayTransport for MemoryRelay {
    async fn fetch_message(&self, key_id: &str) -> Result<Option<String>, RelayError> {
        Ok(self.slots().remove(key_id))
    }

    async fn post_message(&self, key_id: &str, encrypted_message: &str) -> Result<(), RelayError> {
        let mut slots = self.slots();
        if slots.contains_key(key_id) {
            return Err(RelayError::UnexpectedStatus(409));
        }
        slots.insert(key_id.to_string(), encrypted_message.to_string());
        Ok(())
    }
}
