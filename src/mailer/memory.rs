//! In-memory transport.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{EmailTransport, OutgoingEmail};
use crate::Result;

/// Keeps every sent email in an outbox that can be inspected.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    outbox: Mutex<Vec<OutgoingEmail>>,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything sent so far, oldest first.
    pub fn outbox(&self) -> Vec<OutgoingEmail> {
        self.outbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of emails sent so far.
    pub fn len(&self) -> usize {
        self.outbox.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been sent.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent email.
    pub fn last(&self) -> Option<OutgoingEmail> {
        self.outbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// Forget everything sent so far.
    pub fn clear(&self) {
        self.outbox.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl EmailTransport for MemoryTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        self.outbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(email.clone());
        Ok(())
    }
}
