//! Service layer API for approval workflow operations
use super::approvable::Approvable;
use super::config::EngineConfig;
use super::error::ApprovalError;
use super::host::HostEnv;
use super::line::{ApprovalLine, Decision};
use super::store::LineStore;
use super::types::{ApprovalState, DocumentRef, LineId, LineState, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Read-only listing of one document's chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainView {
    pub document: DocumentRef,
    pub lines: Vec<ApprovalLine>,
}

impl ChainView {
    pub fn pending(&self) -> impl Iterator<Item = &ApprovalLine> {
        self.lines.iter().filter(|line| line.is_pending())
    }
}

// Serialises chain replacement and decisions per document so the completion
// re-scan sees a consistent snapshot. Entries live only while some caller
// holds or waits on them.
#[derive(Default)]
struct DocumentLocks {
    locks: Mutex<HashMap<DocumentRef, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    fn acquire(&self, document: &DocumentRef) -> Arc<Mutex<()>> {
        // the guarded value is (), so a poisoned lock carries no broken state
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(document.clone()).or_default().clone()
    }

    /// Hand back a lock taken with `acquire`; the entry is evicted once no
    /// other caller holds a clone. Clones are only made under the map lock.
    fn release(&self, document: &DocumentRef, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        let ours = locks
            .get(document)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock));
        // one count for the map entry, one for `lock`
        if ours && Arc::strong_count(&lock) <= 2 {
            locks.remove(document);
        }
    }

    /// Run `action` while holding the document's lock
    fn with<T>(&self, document: &DocumentRef, action: impl FnOnce() -> T) -> T {
        let lock = self.acquire(document);
        let outcome = {
            let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
            action()
        };
        self.release(document, lock);
        outcome
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

pub struct ApprovalService {
    store: LineStore,
    host: HostEnv,
    config: EngineConfig,
    locks: DocumentLocks,
}

impl ApprovalService {
    pub fn new(instance: Arc<sled::Db>, host: HostEnv) -> anyhow::Result<Self> {
        Self::with_config(instance, host, EngineConfig::default())
    }

    pub fn with_config(
        instance: Arc<sled::Db>,
        host: HostEnv,
        config: EngineConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let store = LineStore::open(&instance, &config)?;
        Ok(Self {
            store,
            host,
            config,
            locks: DocumentLocks::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the document's chain with one line per resolved approver and
    /// move the document to `Waiting`. Approvers are resolved and checked
    /// before the old chain is touched, so a failure leaves it intact.
    pub fn request_approval(&self, document: &dyn Approvable) -> anyhow::Result<Vec<ApprovalLine>> {
        let doc_ref = document.document_ref();
        doc_ref.validate()?;

        self.locks
            .with(&doc_ref, || self.replace_and_wait(document, &doc_ref))
    }

    fn replace_and_wait(
        &self,
        document: &dyn Approvable,
        doc_ref: &DocumentRef,
    ) -> anyhow::Result<Vec<ApprovalLine>> {
        let approvers = document.resolve_approvers(self.host.directory.as_ref())?;
        if approvers.is_empty() {
            return Err(ApprovalError::NoApprovers(doc_ref.clone()).into());
        }
        if !self.config.allow_duplicate_approvers {
            let mut seen = HashSet::new();
            if let Some(dup) = approvers.iter().find(|user| !seen.insert(*user)) {
                return Err(ApprovalError::DuplicateApprover(dup.clone()).into());
            }
        }

        let now = self.host.clock.now();
        let document_name = document.display_name();
        let lines: Vec<ApprovalLine> = approvers
            .iter()
            .enumerate()
            .map(|(position, approver)| {
                ApprovalLine::new(
                    doc_ref.clone(),
                    self.config.sequence_for(position),
                    approver.clone(),
                    self.host.approver_name(approver),
                    document_name.clone(),
                    now.clone(),
                )
            })
            .collect();

        let previous = self.store.chain(doc_ref)?;
        self.store.replace_chain(doc_ref, &lines)?;

        // the host refused the state change: put the old chain back so the
        // request leaves no trace
        if let Err(err) = document.set_approval_state(ApprovalState::Waiting) {
            if let Err(restore) = self.store.replace_chain(doc_ref, &previous) {
                warn!(document = %doc_ref, error = %restore, "failed to restore previous approval chain");
            }
            return Err(err);
        }

        info!(document = %doc_ref, approvers = lines.len(), "approval chain requested");
        self.post_best_effort(
            doc_ref,
            Some(document),
            &format!(
                "Approval requested. Waiting for {} approver(s).",
                lines.len()
            ),
        );

        Ok(lines)
    }

    /// Approve a single line by id, acting as `actor`
    pub fn approve_line(
        &self,
        line_id: LineId,
        actor: &UserId,
        notes: Option<String>,
    ) -> anyhow::Result<ApprovalLine> {
        self.decide_line(line_id, Decision::Approve, actor, notes)
    }

    /// Reject a single line by id, acting as `actor`
    pub fn reject_line(
        &self,
        line_id: LineId,
        actor: &UserId,
        notes: Option<String>,
    ) -> anyhow::Result<ApprovalLine> {
        self.decide_line(line_id, Decision::Reject, actor, notes)
    }

    fn decide_line(
        &self,
        line_id: LineId,
        decision: Decision,
        actor: &UserId,
        notes: Option<String>,
    ) -> anyhow::Result<ApprovalLine> {
        let doc_ref = self.store.get(line_id)?.document;

        self.locks.with(&doc_ref, || -> anyhow::Result<ApprovalLine> {
            let line = self
                .store
                .decide(line_id, decision, actor, notes, self.host.clock.now())?;
            self.after_decision(&line, decision, None);
            Ok(line)
        })
    }

    /// Approve the actor's pending step on `document`
    pub fn approve_my_step(
        &self,
        document: &dyn Approvable,
        actor: &UserId,
        notes: Option<String>,
    ) -> anyhow::Result<ApprovalLine> {
        self.decide_my_step(document, Decision::Approve, actor, notes)
    }

    /// Reject the actor's pending step on `document`. Also forces the
    /// document to `Rejected`, independent of the rejection hook.
    pub fn reject_my_step(
        &self,
        document: &dyn Approvable,
        actor: &UserId,
        notes: Option<String>,
    ) -> anyhow::Result<ApprovalLine> {
        let line = self.decide_my_step(document, Decision::Reject, actor, notes)?;

        if let Err(err) = document.set_approval_state(ApprovalState::Rejected) {
            warn!(document = %line.document, error = %err, "failed to force rejected state");
        }

        Ok(line)
    }

    fn decide_my_step(
        &self,
        document: &dyn Approvable,
        decision: Decision,
        actor: &UserId,
        notes: Option<String>,
    ) -> anyhow::Result<ApprovalLine> {
        let doc_ref = document.document_ref();
        doc_ref.validate()?;

        self.locks.with(&doc_ref, || -> anyhow::Result<ApprovalLine> {
            // lowest sequence first when an approver appears more than once
            let Some(mine) = self
                .store
                .chain(&doc_ref)?
                .into_iter()
                .find(|line| line.is_pending_for(actor))
            else {
                return Err(ApprovalError::NotAuthorized {
                    actor: actor.clone(),
                }
                .into());
            };

            let line = self
                .store
                .decide(mine.id, decision, actor, notes, self.host.clock.now())?;
            self.after_decision(&line, decision, Some(document));
            Ok(line)
        })
    }

    // Notification side of a decision. Everything here is best-effort: the
    // line is already committed and nothing below may undo it.
    fn after_decision(
        &self,
        line: &ApprovalLine,
        decision: Decision,
        in_hand: Option<&dyn Approvable>,
    ) {
        info!(
            document = %line.document,
            line = %line.id,
            sequence = line.sequence,
            state = %line.state(),
            "approval line decided"
        );
        self.post_best_effort(&line.document, in_hand, &line.decision_message(decision));

        match decision {
            Decision::Approve => self.check_completion(line, in_hand),
            Decision::Reject => {
                self.with_document(&line.document, in_hand, "on_rejected", |document| {
                    document.on_rejected(line, self.host.audit.as_ref())
                });
                info!(document = %line.document, approver = %line.approver(), "approval chain rejected");
            }
        }
    }

    // Full re-scan of the siblings rather than a counter.
    fn check_completion(&self, line: &ApprovalLine, in_hand: Option<&dyn Approvable>) {
        let siblings = match self.store.chain(&line.document) {
            Ok(siblings) => siblings,
            Err(err) => {
                warn!(document = %line.document, error = %err, "completion check could not read chain");
                return;
            }
        };

        if siblings.iter().all(|sibling| sibling.state() == LineState::Approved) {
            self.with_document(&line.document, in_hand, "on_all_approved", |document| {
                document.on_all_approved(self.host.audit.as_ref())
            });
            info!(document = %line.document, lines = siblings.len(), "approval chain completed");
        }
    }

    fn post_best_effort(&self, doc_ref: &DocumentRef, in_hand: Option<&dyn Approvable>, text: &str) {
        self.with_document(doc_ref, in_hand, "audit post", |_| {
            self.host.audit.post(doc_ref, text)
        });
    }

    /// Run `action` against the document, resolving it through the registry
    /// when the caller did not hand it in. Failures are logged and dropped.
    fn with_document<F>(
        &self,
        doc_ref: &DocumentRef,
        in_hand: Option<&dyn Approvable>,
        what: &str,
        action: F,
    ) where
        F: FnOnce(&dyn Approvable) -> anyhow::Result<()>,
    {
        let outcome = match in_hand {
            Some(document) => action(document),
            None => match self.host.registry.resolve(doc_ref) {
                Ok(Some(document)) => action(document.as_ref()),
                Ok(None) => {
                    debug!(document = %doc_ref, what, "document not found, notification skipped");
                    Ok(())
                }
                Err(err) => Err(err),
            },
        };

        if let Err(err) = outcome {
            warn!(document = %doc_ref, what, error = %err, "best-effort notification failed");
        }
    }

    /// Scoped listing of the document's current chain
    pub fn view_lines(&self, document: &dyn Approvable) -> anyhow::Result<ChainView> {
        let doc_ref = document.document_ref();
        let lines = self.lines_for(&doc_ref)?;
        Ok(ChainView {
            document: doc_ref,
            lines,
        })
    }

    pub fn lines_for(&self, doc_ref: &DocumentRef) -> anyhow::Result<Vec<ApprovalLine>> {
        doc_ref.validate()?;
        self.store.chain(doc_ref)
    }

    pub fn get_line(&self, line_id: LineId) -> anyhow::Result<ApprovalLine> {
        self.store.get(line_id)
    }

    /// Number of lines in the document's chain
    pub fn approval_count(&self, document: &dyn Approvable) -> anyhow::Result<usize> {
        Ok(self.lines_for(&document.document_ref())?.len())
    }

    pub fn pending_count(&self, document: &dyn Approvable) -> anyhow::Result<usize> {
        Ok(self
            .lines_for(&document.document_ref())?
            .iter()
            .filter(|line| line.is_pending())
            .count())
    }

    /// Whether `actor` has a pending step on the document
    pub fn is_approver(&self, document: &dyn Approvable, actor: &UserId) -> anyhow::Result<bool> {
        Ok(self
            .lines_for(&document.document_ref())?
            .iter()
            .any(|line| line.is_pending_for(actor)))
    }

    /// Recompute the cached document label on every line of the chain.
    /// Falls back to the configured unknown label when unresolvable.
    pub fn refresh_document_names(&self, doc_ref: &DocumentRef) -> anyhow::Result<String> {
        doc_ref.validate()?;

        let label = match self.host.registry.resolve(doc_ref) {
            Ok(Some(document)) => document.display_name(),
            Ok(None) => self.config.unknown_document_label.clone(),
            Err(err) => {
                debug!(document = %doc_ref, error = %err, "document lookup failed");
                self.config.unknown_document_label.clone()
            }
        };

        self.locks
            .with(doc_ref, || self.store.set_document_name(doc_ref, &label))?;

        Ok(label)
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        self.store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryAuditLog, MemoryRegistry, OrgChart};
    use std::sync::{Barrier, OnceLock};
    use tempfile::tempdir;

    struct Memo {
        doc: DocumentRef,
        state: Mutex<ApprovalState>,
    }

    impl Approvable for Memo {
        fn document_ref(&self) -> DocumentRef {
            self.doc.clone()
        }
        fn approval_state(&self) -> ApprovalState {
            *self.state.lock().unwrap()
        }
        fn set_approval_state(&self, state: ApprovalState) -> anyhow::Result<()> {
            *self.state.lock().unwrap() = state;
            Ok(())
        }
        fn resolve_approvers(&self, _: &dyn crate::host::Directory) -> anyhow::Result<Vec<UserId>> {
            Ok(vec![UserId::from("alice")])
        }
    }

    fn memo(id: &str) -> Memo {
        Memo {
            doc: DocumentRef::new("memo", id),
            state: Mutex::new(ApprovalState::Draft),
        }
    }

    /// Opens a chain on `next` once its own chain completes
    struct Handoff {
        memo: Memo,
        next: Memo,
        service: OnceLock<Arc<ApprovalService>>,
    }

    impl Approvable for Handoff {
        fn document_ref(&self) -> DocumentRef {
            self.memo.document_ref()
        }
        fn approval_state(&self) -> ApprovalState {
            self.memo.approval_state()
        }
        fn set_approval_state(&self, state: ApprovalState) -> anyhow::Result<()> {
            self.memo.set_approval_state(state)
        }
        fn resolve_approvers(&self, directory: &dyn crate::host::Directory) -> anyhow::Result<Vec<UserId>> {
            self.memo.resolve_approvers(directory)
        }
        fn on_all_approved(&self, audit: &dyn crate::host::AuditLog) -> anyhow::Result<()> {
            crate::mark_approved(self, audit)?;
            if let Some(service) = self.service.get() {
                service.request_approval(&self.next)?;
            }
            Ok(())
        }
    }

    #[test]
    fn hooks_may_drive_other_documents() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let db = Arc::new(sled::open(temp_dir.path().join("handoff.db"))?);
        let host = HostEnv::new(
            Arc::new(MemoryRegistry::new()),
            Arc::new(MemoryAuditLog::new()),
            Arc::new(OrgChart::new()),
        );
        let service = Arc::new(ApprovalService::new(db, host)?);
        let handoff = Handoff {
            memo: memo("draft"),
            next: memo("final"),
            service: OnceLock::new(),
        };
        let _ = handoff.service.set(Arc::clone(&service));

        service.request_approval(&handoff)?;
        service.approve_my_step(&handoff, &UserId::from("alice"), None)?;

        assert_eq!(handoff.approval_state(), ApprovalState::Approved);
        assert_eq!(handoff.next.approval_state(), ApprovalState::Waiting);
        assert_eq!(service.approval_count(&handoff.next)?, 1);
        assert_eq!(service.locks.tracked(), 0);
        Ok(())
    }

    #[test]
    fn lock_entries_are_evicted_after_use() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let db = Arc::new(sled::open(temp_dir.path().join("locks.db"))?);
        let host = HostEnv::new(
            Arc::new(MemoryRegistry::new()),
            Arc::new(MemoryAuditLog::new()),
            Arc::new(OrgChart::new()),
        );
        let service = ApprovalService::new(db, host)?;

        for id in 0..200 {
            let memo = memo(&id.to_string());
            service.request_approval(&memo)?;
            service.approve_my_step(&memo, &UserId::from("alice"), None)?;
            // failed calls release their entry too
            assert!(service.approve_my_step(&memo, &UserId::from("alice"), None).is_err());
        }

        assert_eq!(service.locks.tracked(), 0);
        Ok(())
    }

    #[test]
    fn contended_lock_is_kept_until_last_holder_leaves() {
        let locks = DocumentLocks::default();
        let doc = DocumentRef::new("memo", "1");
        let entered = Barrier::new(2);

        std::thread::scope(|s| {
            let first = locks.acquire(&doc);
            let guard = first.lock().unwrap();

            s.spawn(|| {
                entered.wait();
                locks.with(&doc, || ());
            });
            entered.wait();
            // the waiter may or may not have cloned yet; either way the
            // entry must survive our release while it still needs it
            drop(guard);
            locks.release(&doc, first);
        });

        assert_eq!(locks.tracked(), 0);
    }
}
