//! Identity, reference and status types shared by the engine
use super::error::ApprovalError;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use uuid7::{Uuid, uuid7};

/// Identity of a user who may request or decide approvals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

/// Weak reference to a host document: `(document_type, document_id)`.
/// The engine never owns the document's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, minicbor::Encode, minicbor::Decode)]
pub struct DocumentRef {
    #[n(0)]
    pub document_type: String,
    #[n(1)]
    pub document_id: String,
}

// newtype wrapper over uuid because Uuid doesn't implement minicbor traits.
// uuid7 is time ordered, so ids double as the creation-order tie break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(Uuid);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

/// Per-line outcome. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum LineState {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

/// Document level status, kept on the host document's own storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalState {
    #[default]
    Draft,
    Waiting,
    Approved,
    Rejected,
}

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    /// Generate a fresh bech32 encoded user identity
    pub fn generate() -> anyhow::Result<Self> {
        Ok(Self(super::utils::new_uuid_to_bech32("user_")?))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl DocumentRef {
    pub fn new(document_type: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            document_id: document_id.into(),
        }
    }

    /// Both components must be non-empty and free of NUL bytes, which delimit
    /// the storage key.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        for part in [&self.document_type, &self.document_id] {
            if part.is_empty() || part.contains('\0') {
                return Err(ApprovalError::InvalidReference(self.clone()));
            }
        }
        Ok(())
    }

    /// Key prefix shared by every line of this document's chain
    pub fn chain_prefix(&self) -> Vec<u8> {
        let mut prefix =
            Vec::with_capacity(self.document_type.len() + self.document_id.len() + 2);
        prefix.extend_from_slice(self.document_type.as_bytes());
        prefix.push(0);
        prefix.extend_from_slice(self.document_id.as_bytes());
        prefix.push(0);
        prefix
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.document_type, self.document_id)
    }
}

impl LineId {
    pub fn new() -> Self {
        Self(uuid7())
    }
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for LineId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<[u8; 16]> for LineId {
    fn from(value: [u8; 16]) -> Self {
        Self(Uuid::from(value))
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// `None` when the fields do not name a real instant (e.g. February 30)
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(TimeStamp)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl LineState {
    pub fn is_pending(&self) -> bool {
        matches!(self, LineState::Pending)
    }
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LineState::Pending => "pending",
            LineState::Approved => "approved",
            LineState::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

impl ApprovalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApprovalState::Approved | ApprovalState::Rejected)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl<C> minicbor::Encode<C> for UserId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for UserId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(UserId(d.str()?.to_owned()))
    }
}

impl<C> minicbor::Encode<C> for LineId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(self.0.as_bytes())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for LineId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let digest: [u8; 16] = d
            .bytes()?
            .try_into()
            .map_err(|_| minicbor::decode::Error::message("line id must be 16 bytes"))?;

        Ok(LineId::from(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_id_encoding() {
        let original = LineId::new();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: LineId = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn line_ids_are_creation_ordered() {
        let first = LineId::new();
        let second = LineId::new();

        assert!(first < second);
    }

    #[test]
    fn document_ref_rejects_nul_and_empty() {
        assert!(DocumentRef::new("sale.order", "42").validate().is_ok());
        assert!(DocumentRef::new("", "42").validate().is_err());
        assert!(DocumentRef::new("sale.order", "4\02").validate().is_err());
    }

    #[test]
    fn chain_prefix_separates_types() {
        // "ab","c" must not collide with "a","bc"
        let left = DocumentRef::new("ab", "c").chain_prefix();
        let right = DocumentRef::new("a", "bc").chain_prefix();

        assert_ne!(left, right);
    }

    #[test]
    fn impossible_dates_have_no_timestamp() {
        assert!(TimeStamp::new_with(2025, 2, 30, 12, 0, 0).is_none());
        assert!(TimeStamp::new_with(2025, 6, 15, 24, 0, 0).is_none());

        let leap = TimeStamp::new_with(2024, 2, 29, 12, 0, 0).unwrap();
        assert_eq!(leap.to_datetime_utc().timestamp(), 1_709_208_000);
    }
}
