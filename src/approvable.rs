//! The capability a document type implements to take part in approvals.
//!
//! Document types plug in their own routing by overriding
//! [`Approvable::resolve_approvers`], and their own follow-up work by
//! overriding the two completion hooks. Overrides that want the stock
//! behaviour call [`mark_approved`] / [`mark_rejected`] first, e.g.
//!
//! ```ignore
//! fn on_all_approved(&self, audit: &dyn AuditLog) -> anyhow::Result<()> {
//!     mark_approved(self, audit)?;
//!     self.confirm()
//! }
//! ```
use super::host::{AuditLog, Directory};
use super::line::ApprovalLine;
use super::types::{ApprovalState, DocumentRef, UserId};

/// A host document that can carry an approval chain.
///
/// The engine calls [`Approvable::resolve_approvers`],
/// [`Approvable::set_approval_state`] and the two completion hooks while it
/// holds this document's lock. Implementations must not call back into
/// [`ApprovalService`](crate::ApprovalService) for the same document from
/// these methods, or the calling thread deadlocks. Work on other documents is
/// fine.
pub trait Approvable: Send + Sync {
    fn document_ref(&self) -> DocumentRef;

    fn display_name(&self) -> String {
        self.document_ref().to_string()
    }

    fn approval_state(&self) -> ApprovalState;

    /// Persist the document level status on the host's own storage
    fn set_approval_state(&self, state: ApprovalState) -> anyhow::Result<()>;

    /// Owner / responsible user, used by the default approver policy
    fn owner(&self) -> Option<UserId> {
        None
    }

    /// Ordered list of identities that must approve, one line each.
    /// Defaults to the owner's manager.
    fn resolve_approvers(&self, directory: &dyn Directory) -> anyhow::Result<Vec<UserId>> {
        Ok(manager_of_owner(self.owner().as_ref(), directory))
    }

    /// Called once every line of the chain is approved
    fn on_all_approved(&self, audit: &dyn AuditLog) -> anyhow::Result<()> {
        mark_approved(self, audit)
    }

    /// Called as soon as any line of the chain is rejected
    fn on_rejected(&self, line: &ApprovalLine, audit: &dyn AuditLog) -> anyhow::Result<()> {
        mark_rejected(self, line, audit)
    }
}

pub fn manager_of_owner(owner: Option<&UserId>, directory: &dyn Directory) -> Vec<UserId> {
    owner
        .and_then(|user| directory.manager_of(user))
        .into_iter()
        .collect()
}

pub fn mark_approved<D: Approvable + ?Sized>(
    document: &D,
    audit: &dyn AuditLog,
) -> anyhow::Result<()> {
    document.set_approval_state(ApprovalState::Approved)?;
    audit.post(
        &document.document_ref(),
        "All approvals completed. Document approved.",
    )
}

pub fn mark_rejected<D: Approvable + ?Sized>(
    document: &D,
    line: &ApprovalLine,
    audit: &dyn AuditLog,
) -> anyhow::Result<()> {
    document.set_approval_state(ApprovalState::Rejected)?;
    audit.post(
        &document.document_ref(),
        &format!("Document rejected by {}", line.approver_name),
    )
}
