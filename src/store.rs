//! Durable ApprovalLine table on sled
use super::config::EngineConfig;
use super::error::ApprovalError;
use super::line::{ApprovalLine, Decision};
use super::types::{DocumentRef, LineId, TimeStamp, UserId};
use chrono::Utc;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};

/// Lines live in one tree keyed by `chain prefix ++ line id`, so a prefix scan
/// yields a document's chain. A second tree maps line id -> row key.
#[derive(Clone)]
pub struct LineStore {
    lines: sled::Tree,
    index: sled::Tree,
}

impl LineStore {
    pub fn open(instance: &sled::Db, config: &EngineConfig) -> anyhow::Result<Self> {
        Ok(Self {
            lines: instance.open_tree(&config.lines_tree)?,
            index: instance.open_tree(&config.index_tree)?,
        })
    }

    /// Current chain of a document, ordered by (sequence, creation)
    pub fn chain(&self, document: &DocumentRef) -> anyhow::Result<Vec<ApprovalLine>> {
        let mut lines = Vec::new();
        for entry in self.lines.scan_prefix(document.chain_prefix()) {
            let (_, value) = entry?;
            lines.push(ApprovalLine::decode(&value)?);
        }
        lines.sort_by_key(|line| (line.sequence, line.id));
        Ok(lines)
    }

    pub fn get(&self, id: LineId) -> anyhow::Result<ApprovalLine> {
        let (_, value) = self.get_raw(id)?;
        Ok(ApprovalLine::decode(&value)?)
    }

    fn get_raw(&self, id: LineId) -> Result<(sled::IVec, sled::IVec), ApprovalError> {
        let key = self
            .index
            .get(id.as_bytes())?
            .ok_or(ApprovalError::LineNotFound(id))?;
        let value = self
            .lines
            .get(&key)?
            .ok_or(ApprovalError::LineNotFound(id))?;
        Ok((key, value))
    }

    /// Swap the whole chain of `document` for `fresh` in one transaction.
    /// Old rows are discarded, not archived.
    pub fn replace_chain(
        &self,
        document: &DocumentRef,
        fresh: &[ApprovalLine],
    ) -> anyhow::Result<()> {
        let mut stale = Vec::new();
        for key in self.lines.scan_prefix(document.chain_prefix()).keys() {
            let key = key?;
            let id = key[key.len().saturating_sub(16)..].to_vec();
            stale.push((key.to_vec(), id));
        }

        let mut rows = Vec::with_capacity(fresh.len());
        for line in fresh {
            rows.push((line.storage_key(), line.id.as_bytes().to_vec(), line.encode()?));
        }

        let result = (&self.lines, &self.index).transaction(|(lines, index)| {
            for (key, id) in &stale {
                lines.remove(key.as_slice())?;
                index.remove(id.as_slice())?;
            }
            for (key, id, value) in &rows {
                lines.insert(key.as_slice(), value.as_slice())?;
                index.insert(id.as_slice(), key.as_slice())?;
            }
            Ok::<(), ConflictableTransactionError<ApprovalError>>(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(err)) => Err(err.into()),
            Err(TransactionError::Storage(err)) => Err(ApprovalError::Storage(err).into()),
        }
    }

    /// Apply a decision with compare-and-swap on the stored bytes, so of two
    /// racing deciders exactly one wins and the other sees AlreadyProcessed.
    pub fn decide(
        &self,
        id: LineId,
        decision: Decision,
        actor: &UserId,
        notes: Option<String>,
        now: TimeStamp<Utc>,
    ) -> anyhow::Result<ApprovalLine> {
        let (key, current) = self.get_raw(id)?;
        let mut line = ApprovalLine::decode(&current)?;

        line.decide(decision, actor, notes, now)?;

        let swapped = self
            .lines
            .compare_and_swap(&key, Some(&current), Some(line.encode()?))?;
        if swapped.is_err() {
            return Err(ApprovalError::AlreadyProcessed(id).into());
        }

        Ok(line)
    }

    /// Rewrite the cached document label on every line of the chain
    pub fn set_document_name(&self, document: &DocumentRef, name: &str) -> anyhow::Result<usize> {
        let mut updated = 0;
        for entry in self.lines.scan_prefix(document.chain_prefix()) {
            let (key, current) = entry?;
            let mut line = ApprovalLine::decode(&current)?;
            if line.document_name == name {
                continue;
            }
            line.document_name = name.to_owned();
            if self
                .lines
                .compare_and_swap(&key, Some(&current), Some(line.encode()?))?
                .is_ok()
            {
                updated += 1;
            }
        }
        Ok(updated)
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        self.lines.flush()?;
        self.index.flush()?;
        Ok(())
    }
}
