//! Walks a sales order through a two-step approval chain.
//!
//! `cargo run --example sales_order [config.toml]`

use approval_line::{
    Approvable, ApprovalService,
    config::EngineConfig,
    host::{AuditLog, HostEnv},
    mark_approved,
    memory::{MemoryAuditLog, MemoryRegistry, OrgChart},
    telemetry,
    types::{ApprovalState, DocumentRef, UserId},
};
use std::sync::{Arc, Mutex};

struct SalesOrder {
    id: String,
    salesperson: UserId,
    amount: u64,
    state: Mutex<ApprovalState>,
    confirmed: Mutex<bool>,
}

impl Approvable for SalesOrder {
    fn document_ref(&self) -> DocumentRef {
        DocumentRef::new("sale.order", &self.id)
    }
    fn display_name(&self) -> String {
        format!("SO{}", self.id)
    }
    fn approval_state(&self) -> ApprovalState {
        self.state.lock().map(|s| *s).unwrap_or_default()
    }
    fn set_approval_state(&self, state: ApprovalState) -> anyhow::Result<()> {
        *self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("order state lock poisoned"))? = state;
        Ok(())
    }
    fn owner(&self) -> Option<UserId> {
        Some(self.salesperson.clone())
    }
    // large orders also need finance sign-off after the manager
    fn resolve_approvers(
        &self,
        directory: &dyn approval_line::host::Directory,
    ) -> anyhow::Result<Vec<UserId>> {
        let mut approvers =
            approval_line::approvable::manager_of_owner(self.owner().as_ref(), directory);
        if self.amount > 50_000 {
            approvers.push(UserId::from("finance"));
        }
        Ok(approvers)
    }
    fn on_all_approved(&self, audit: &dyn AuditLog) -> anyhow::Result<()> {
        mark_approved(self, audit)?;
        *self
            .confirmed
            .lock()
            .map_err(|_| anyhow::anyhow!("order lock poisoned"))? = true;
        audit.post(&self.document_ref(), "Order confirmed.")
    }
}

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    telemetry::init_tracing(&config.logging)?;

    let dir = tempfile::tempdir()?;
    let db = Arc::new(sled::open(dir.path().join("demo.db"))?);

    let registry = Arc::new(MemoryRegistry::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let org = OrgChart::new()
        .with_manager("sam", "maria")
        .with_name("maria", "Maria (Sales Manager)")
        .with_name("finance", "Finance Desk");
    let host = HostEnv::new(registry.clone(), audit.clone(), Arc::new(org));
    let service = ApprovalService::with_config(db, host, config)?;

    let order = Arc::new(SalesOrder {
        id: "1042".into(),
        salesperson: UserId::from("sam"),
        amount: 82_000,
        state: Mutex::new(ApprovalState::Draft),
        confirmed: Mutex::new(false),
    });
    registry.register(order.clone())?;

    service.request_approval(&*order)?;
    service.approve_my_step(&*order, &UserId::from("maria"), Some("good margin".into()))?;
    service.approve_my_step(&*order, &UserId::from("finance"), None)?;

    for line in service.view_lines(&*order)?.lines {
        println!(
            "step {:>3} {:<24} {}",
            line.sequence, line.approver_name, line.state()
        );
    }
    for message in audit.messages_for(&order.document_ref()) {
        println!("audit: {message}");
    }
    println!("state: {:?}", order.approval_state());

    Ok(())
}
