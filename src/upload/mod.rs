//! Upload module
//!
//! Sequential, fail-fast batch uploads to S3 using signed POST credentials.
//!
//! One batch runs as a single background task: credentials are fetched once,
//! then each resource is resolved, keyed, and posted in order. The first error
//! of any kind aborts the remaining batch; there are no retries.

use crate::s3::S3ClientError;
use std::sync::Arc;
use thiserror::Error;

pub mod callback;
pub mod executor;
pub mod reporter;
pub mod resource;
pub mod suffix;

pub use callback::{CallbackContext, CallbackLooper, CallbackThread};
pub use executor::UploadExecutor;
pub use reporter::{ProgressReporter, UploadEvent, UploadListener};
pub use resource::{FileSystemResolver, ResolvedResource, ResourceHandle, ResourceResolver};
pub use suffix::{IncrementalSuffix, IndexedSuffix, SuffixRule, SuffixRuleError, SuffixRuleSpec};

/// ACL applied when the caller does not choose one
pub const DEFAULT_ACL: &str = "public-read";

/// Upload errors
///
/// Every variant is terminal for its batch and is delivered exactly once, to
/// [`UploadListener::on_upload_failed`], together with the index it applies to.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed retrieving S3 credentials from provider")]
    CredentialsUnavailable,

    #[error("Resource handle cannot be empty")]
    InvalidInput,

    #[error("Resource resolver is no longer available")]
    ContextUnavailable,

    #[error("Resource unreadable: {0}")]
    ResourceUnreadable(#[source] std::io::Error),

    #[error("Transport failure: {0}")]
    TransportFailure(#[from] S3ClientError),

    #[error("Unexpected response status {status} (expected 201)")]
    UnexpectedStatus { status: u16 },
}

impl UploadError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::CredentialsUnavailable => "credentials_unavailable",
            UploadError::InvalidInput => "invalid_input",
            UploadError::ContextUnavailable => "context_unavailable",
            UploadError::ResourceUnreadable(_) => "resource_unreadable",
            UploadError::TransportFailure(_) => "transport_failure",
            UploadError::UnexpectedStatus { .. } => "unexpected_status",
        }
    }
}

/// Batch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    CredentialsPending,
    Uploading,
    Completed,
    Aborted,
    Cancelled,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadState::Completed | UploadState::Aborted | UploadState::Cancelled
        )
    }
}

/// Final state of a batch
///
/// `urls` always has one entry per input resource; entries that were never
/// uploaded are empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub state: UploadState,
    pub urls: Vec<String>,
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == UploadState::Completed
    }
}

/// One batch of resources to upload
#[derive(Clone)]
pub struct UploadRequest {
    pub resources: Vec<Option<ResourceHandle>>,
    pub suffix_rule: Arc<dyn SuffixRule>,
    pub acl: String,
}

impl UploadRequest {
    pub fn new<I, R>(resources: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceHandle>,
    {
        Self::from_optional(resources.into_iter().map(|r| Some(r.into())))
    }

    /// Build a batch that may contain absent slots. An absent slot fails the
    /// batch with [`UploadError::InvalidInput`] when it is reached.
    pub fn from_optional<I>(resources: I) -> Self
    where
        I: IntoIterator<Item = Option<ResourceHandle>>,
    {
        Self {
            resources: resources.into_iter().collect(),
            suffix_rule: Arc::new(IncrementalSuffix),
            acl: DEFAULT_ACL.to_string(),
        }
    }

    pub fn with_suffix_rule(mut self, suffix_rule: Arc<dyn SuffixRule>) -> Self {
        self.suffix_rule = suffix_rule;
        self
    }

    pub fn with_acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = acl.into();
        self
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("resources", &self.resources)
            .field("acl", &self.acl)
            .finish_non_exhaustive()
    }
}
