//! In-process host adapters, for tests and embedding without a host ORM
use super::approvable::Approvable;
use super::host::{AuditLog, Clock, Directory, DocumentRegistry};
use super::types::{DocumentRef, TimeStamp, UserId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Default)]
pub struct MemoryRegistry {
    documents: RwLock<HashMap<DocumentRef, Arc<dyn Approvable>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, document: Arc<dyn Approvable>) -> anyhow::Result<()> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| anyhow::anyhow!("document registry lock poisoned"))?;
        documents.insert(document.document_ref(), document);
        Ok(())
    }

    pub fn remove(&self, document: &DocumentRef) -> anyhow::Result<()> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| anyhow::anyhow!("document registry lock poisoned"))?;
        documents.remove(document);
        Ok(())
    }
}

impl DocumentRegistry for MemoryRegistry {
    fn resolve(&self, document: &DocumentRef) -> anyhow::Result<Option<Arc<dyn Approvable>>> {
        let documents = self
            .documents
            .read()
            .map_err(|_| anyhow::anyhow!("document registry lock poisoned"))?;
        Ok(documents.get(document).cloned())
    }
}

/// Keeps every posted message, in order.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<(DocumentRef, String)>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages posted on one document
    pub fn messages_for(&self, document: &DocumentRef) -> Vec<String> {
        match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .filter(|(doc, _)| doc == document)
                .map(|(_, text)| text.clone())
                .collect(),
            Err(_) => vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for MemoryAuditLog {
    fn post(&self, document: &DocumentRef, text: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("audit log lock poisoned"))?
            .push((document.clone(), text.to_owned()));
        Ok(())
    }
}

/// Static user -> manager map with optional display names.
#[derive(Debug, Default, Clone)]
pub struct OrgChart {
    managers: HashMap<UserId, UserId>,
    names: HashMap<UserId, String>,
}

impl OrgChart {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_manager(mut self, user: impl Into<UserId>, manager: impl Into<UserId>) -> Self {
        self.managers.insert(user.into(), manager.into());
        self
    }
    pub fn with_name(mut self, user: impl Into<UserId>, name: impl Into<String>) -> Self {
        self.names.insert(user.into(), name.into());
        self
    }
}

impl Directory for OrgChart {
    fn manager_of(&self, user: &UserId) -> Option<UserId> {
        self.managers.get(user).cloned()
    }
    fn display_name(&self, user: &UserId) -> Option<String> {
        self.names.get(user).cloned()
    }
}

/// Clock pinned to a single instant.
#[derive(Debug, Clone)]
pub struct FixedClock(pub TimeStamp<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> TimeStamp<Utc> {
        self.0.clone()
    }
}
