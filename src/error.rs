use super::types::{DocumentRef, LineId, UserId};

#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error("{actor} is not authorized to act on this approval")]
    NotAuthorized { actor: UserId },
    #[error("This approval has already been processed ({0})")]
    AlreadyProcessed(LineId),
    #[error("No approvers found for {0}. Configure approvers first or check the org structure")]
    NoApprovers(DocumentRef),
    #[error("Approver {0} appears more than once in the chain")]
    DuplicateApprover(UserId),
    #[error("Approval line {0} does not exist")]
    LineNotFound(LineId),
    #[error("Invalid document reference: {0:?}")]
    InvalidReference(DocumentRef),
    #[error("Stored approval line could not be decoded: {0}")]
    Corrupt(#[from] minicbor::decode::Error),
    #[error(transparent)]
    Storage(#[from] sled::Error),
}

impl ApprovalError {
    /// Failures a caller can act on, as opposed to storage faults
    pub fn is_user_error(&self) -> bool {
        !matches!(self, ApprovalError::Storage(_) | ApprovalError::Corrupt(_))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
