// Error taxonomy for the invitation pipeline.
use crate::repository::NodeId;
use thiserror::Error;

/// Invite document could not be turned into an `InviteRecord`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed calendar document: {0}")]
    Malformed(String),

    #[error("unknown method: {}", .0.as_deref().unwrap_or("<none>"))]
    UnknownMethod(Option<String>),

    #[error("no VEVENT component found")]
    MissingEvent,

    #[error("missing identifier")]
    MissingIdentifier,

    #[error("missing start time")]
    MissingStart,

    #[error("invalid {property} value '{value}'")]
    InvalidTime { property: String, value: String },
}

/// Failure reported by a `Repository` implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("node not found: {0}")]
    NotFound(NodeId),

    #[error("'{name}' already exists in {parent}")]
    AlreadyExists { parent: NodeId, name: String },

    #[error("node {0} is not a calendar entry")]
    NotAnEntry(NodeId),

    #[error("node {0} has no content")]
    NoContent(NodeId),

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("store operation failed: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("lookup of '{uid}' failed: {source}")]
    Lookup { uid: String, source: StoreError },

    #[error("creating entry for '{uid}' failed: {source}")]
    Create { uid: String, source: StoreError },

    #[error("updating entry {node} failed: {source}")]
    Update { node: NodeId, source: StoreError },

    #[error("deleting entry {node} failed: {source}")]
    Delete { node: NodeId, source: StoreError },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("cannot resolve archive location for {email}: {source}")]
    Resolve { email: NodeId, source: StoreError },

    #[error("moving email {email} failed: {source}")]
    EmailMove { email: NodeId, source: StoreError },

    #[error("moving attachment {attachment} failed after {moved} of {total} attachments: {source}")]
    AttachmentMove {
        attachment: NodeId,
        moved: usize,
        total: usize,
        source: StoreError,
    },
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("group {group}: {source}")]
    Store { group: String, source: StoreError },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("reading email {email} failed: {source}")]
    Email { email: NodeId, source: StoreError },

    #[error("archival failed: {0}")]
    Archive(#[from] ArchiveError),
}
