//! Shared fixtures: a sales order document and a service on a temp sled db
#![allow(dead_code)]

use approval_line::{
    Approvable, ApprovalService,
    host::{AuditLog, HostEnv},
    line::ApprovalLine,
    mark_approved, mark_rejected,
    memory::{MemoryAuditLog, MemoryRegistry, OrgChart},
    types::{ApprovalState, DocumentRef, LineId, UserId},
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tempfile::{TempDir, tempdir};

/// A host document with its own routing rules and confirmation step
pub struct SalesOrder {
    doc: DocumentRef,
    name: String,
    owner: Option<UserId>,
    routing: Mutex<Option<Vec<UserId>>>,
    state: Mutex<ApprovalState>,
    confirmations: AtomicUsize,
    rejected_lines: Mutex<Vec<LineId>>,
    locked: AtomicBool,
}

impl SalesOrder {
    pub fn new(id: &str) -> Self {
        Self {
            doc: DocumentRef::new("sale.order", id),
            name: format!("SO{id}"),
            owner: None,
            routing: Mutex::new(None),
            state: Mutex::new(ApprovalState::Draft),
            confirmations: AtomicUsize::new(0),
            rejected_lines: Mutex::new(vec![]),
            locked: AtomicBool::new(false),
        }
    }
    pub fn owned_by(mut self, owner: &str) -> Self {
        self.owner = Some(UserId::from(owner));
        self
    }
    /// Route approvals to this explicit list instead of the owner's manager
    pub fn routed_to(self, approvers: &[&str]) -> Self {
        self.set_routing(approvers);
        self
    }
    pub fn set_routing(&self, approvers: &[&str]) {
        *self.routing.lock().unwrap() = Some(approvers.iter().map(|a| UserId::from(*a)).collect());
    }
    /// From now on the host refuses to store approval state changes
    pub fn lock_record(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }
    pub fn state(&self) -> ApprovalState {
        *self.state.lock().unwrap()
    }
    pub fn confirmations(&self) -> usize {
        self.confirmations.load(Ordering::SeqCst)
    }
    pub fn rejected_lines(&self) -> Vec<LineId> {
        self.rejected_lines.lock().unwrap().clone()
    }
}

impl Approvable for SalesOrder {
    fn document_ref(&self) -> DocumentRef {
        self.doc.clone()
    }
    fn display_name(&self) -> String {
        self.name.clone()
    }
    fn approval_state(&self) -> ApprovalState {
        self.state()
    }
    fn set_approval_state(&self, state: ApprovalState) -> anyhow::Result<()> {
        if self.locked.load(Ordering::SeqCst) {
            anyhow::bail!("{} is locked for editing", self.name);
        }
        *self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("state lock poisoned"))? = state;
        Ok(())
    }
    fn owner(&self) -> Option<UserId> {
        self.owner.clone()
    }
    fn resolve_approvers(
        &self,
        directory: &dyn approval_line::host::Directory,
    ) -> anyhow::Result<Vec<UserId>> {
        match self.routing.lock().unwrap().clone() {
            Some(approvers) => Ok(approvers),
            None => Ok(approval_line::approvable::manager_of_owner(
                self.owner.as_ref(),
                directory,
            )),
        }
    }
    fn on_all_approved(&self, audit: &dyn AuditLog) -> anyhow::Result<()> {
        mark_approved(self, audit)?;
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn on_rejected(&self, line: &ApprovalLine, audit: &dyn AuditLog) -> anyhow::Result<()> {
        mark_rejected(self, line, audit)?;
        self.rejected_lines.lock().unwrap().push(line.id);
        Ok(())
    }
}

/// A document that keeps every default hook
pub struct LeaveRequest {
    pub doc: DocumentRef,
    pub owner: Option<UserId>,
    pub state: Mutex<ApprovalState>,
}

impl LeaveRequest {
    pub fn new(id: &str, owner: Option<&str>) -> Self {
        Self {
            doc: DocumentRef::new("hr.leave", id),
            owner: owner.map(UserId::from),
            state: Mutex::new(ApprovalState::Draft),
        }
    }
}

impl Approvable for LeaveRequest {
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
    fn owner(&self) -> Option<UserId> {
        self.owner.clone()
    }
}

pub struct Fixture {
    // held so the temp dir outlives the db
    _dir: TempDir,
    pub db: Arc<sled::Db>,
    pub service: ApprovalService,
    pub registry: Arc<MemoryRegistry>,
    pub audit: Arc<MemoryAuditLog>,
}

impl Fixture {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_org(OrgChart::new())
    }

    pub fn with_org(org: OrgChart) -> anyhow::Result<Self> {
        Self::with_host(org, |host| host)
    }

    pub fn with_host(
        org: OrgChart,
        customise: impl FnOnce(HostEnv) -> HostEnv,
    ) -> anyhow::Result<Self> {
        // Sled uses file-based locking, so each test gets its own database
        // under a temp dir for simplified cleanup.
        let dir = tempdir()?;
        let db = Arc::new(sled::open(dir.path().join("approvals.db"))?);

        let registry = Arc::new(MemoryRegistry::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let host = customise(HostEnv::new(registry.clone(), audit.clone(), Arc::new(org)));
        let service = ApprovalService::new(db.clone(), host)?;

        Ok(Self {
            _dir: dir,
            db,
            service,
            registry,
            audit,
        })
    }

    /// Register a sales order with the host registry and hand it back
    pub fn order(&self, order: SalesOrder) -> anyhow::Result<Arc<SalesOrder>> {
        let order = Arc::new(order);
        self.registry.register(order.clone())?;
        Ok(order)
    }
}

pub fn user(id: &str) -> UserId {
    UserId::from(id)
}
