//! Collaborators the host environment supplies to the engine
use super::approvable::Approvable;
use super::types::{DocumentRef, TimeStamp, UserId};
use chrono::Utc;
use std::sync::Arc;

/// Resolves a weak `(document_type, document_id)` reference to a live
/// document handle. `Ok(None)` is the explicit not-found result.
pub trait DocumentRegistry: Send + Sync {
    fn resolve(&self, document: &DocumentRef) -> anyhow::Result<Option<Arc<dyn Approvable>>>;
}

/// Append-only audit/timeline sink exposed by each document.
pub trait AuditLog: Send + Sync {
    fn post(&self, document: &DocumentRef, text: &str) -> anyhow::Result<()>;
}

/// Organisational hierarchy and identity labels.
pub trait Directory: Send + Sync {
    fn manager_of(&self, user: &UserId) -> Option<UserId>;

    fn display_name(&self, _user: &UserId) -> Option<String> {
        None
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> TimeStamp<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp<Utc> {
        TimeStamp::new()
    }
}

/// Everything the engine consumes from its host, bundled.
#[derive(Clone)]
pub struct HostEnv {
    pub registry: Arc<dyn DocumentRegistry>,
    pub audit: Arc<dyn AuditLog>,
    pub directory: Arc<dyn Directory>,
    pub clock: Arc<dyn Clock>,
}

impl HostEnv {
    pub fn new(
        registry: Arc<dyn DocumentRegistry>,
        audit: Arc<dyn AuditLog>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            registry,
            audit,
            directory,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Label used for an approver in audit messages
    pub fn approver_name(&self, user: &UserId) -> String {
        self.directory
            .display_name(user)
            .unwrap_or_else(|| user.to_string())
    }
}
