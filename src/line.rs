//! A single approval step and its pending -> approved/rejected state machine
use super::error::ApprovalError;
use super::types::{DocumentRef, LineId, LineState, TimeStamp, UserId};
use chrono::Utc;

/// Outcome an approver can give a pending line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

// One row per required approval step. Key in storage is the document's chain
// prefix followed by the line id.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalLine {
    #[n(0)]
    pub id: LineId,
    #[n(1)]
    pub document: DocumentRef,
    #[n(2)]
    pub sequence: u32,
    #[n(3)]
    approver: UserId,
    #[n(4)]
    pub approver_name: String,
    #[n(5)]
    state: LineState,
    #[n(6)]
    decided_at: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub notes: Option<String>,
    #[n(8)]
    pub document_name: String, // best-effort label of the referenced document
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
}

impl Decision {
    pub fn target_state(&self) -> LineState {
        match self {
            Decision::Approve => LineState::Approved,
            Decision::Reject => LineState::Rejected,
        }
    }
    pub fn verb(&self) -> &'static str {
        match self {
            Decision::Approve => "approved",
            Decision::Reject => "rejected",
        }
    }
}

impl ApprovalLine {
    pub fn new(
        document: DocumentRef,
        sequence: u32,
        approver: UserId,
        approver_name: String,
        document_name: String,
        created_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            id: LineId::new(),
            document,
            sequence,
            approver,
            approver_name,
            state: LineState::Pending,
            decided_at: None,
            notes: None,
            document_name,
            created_at,
        }
    }

    pub fn approver(&self) -> &UserId {
        &self.approver
    }
    pub fn state(&self) -> LineState {
        self.state
    }
    pub fn decided_at(&self) -> Option<&TimeStamp<Utc>> {
        self.decided_at.as_ref()
    }
    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }
    pub fn is_pending_for(&self, actor: &UserId) -> bool {
        self.is_pending() && &self.approver == actor
    }

    /// Move a pending line to its terminal state. The state check runs before
    /// the authorization check, and a failed call leaves the line untouched.
    pub fn decide(
        &mut self,
        decision: Decision,
        actor: &UserId,
        notes: Option<String>,
        now: TimeStamp<Utc>,
    ) -> Result<(), ApprovalError> {
        if !self.is_pending() {
            return Err(ApprovalError::AlreadyProcessed(self.id));
        }
        if &self.approver != actor {
            return Err(ApprovalError::NotAuthorized {
                actor: actor.clone(),
            });
        }

        self.state = decision.target_state();
        self.decided_at = Some(now);
        if notes.is_some() {
            self.notes = notes;
        }

        Ok(())
    }

    /// Audit text posted on the document once this line is decided
    pub fn decision_message(&self, decision: Decision) -> String {
        let mut message = format!(
            "{} has {} (Step {})",
            self.approver_name,
            decision.verb(),
            self.sequence
        );
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.is_empty()) {
            message.push_str(&format!("\nNotes: {notes}"));
        }
        message
    }

    /// Storage key: chain prefix followed by the raw line id
    pub fn storage_key(&self) -> Vec<u8> {
        let mut key = self.document.chain_prefix();
        key.extend_from_slice(self.id.as_bytes());
        key
    }

    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        Ok(minicbor::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ApprovalError> {
        Ok(minicbor::decode(bytes)?)
    }
}
