//! Error types for page assembly and remote content operations.

use thiserror::Error;

use crate::assemble::AssemblyStage;

/// Failures reported by the remote content service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The token was rejected (HTTP 401).
    #[error("authentication failed, check WIKI_TOKEN")]
    Auth,

    /// The token lacks the permission for this operation (HTTP 403).
    #[error("permission denied for {operation}")]
    Permission {
        /// Operation that was refused.
        operation: &'static str,
    },

    /// Unknown page or space (HTTP 404).
    #[error("not found: {target}")]
    NotFound {
        /// Identifier that could not be resolved.
        target: String,
    },

    /// A page with the same title already exists in the space.
    #[error("page already exists: {detail}")]
    Conflict {
        /// Service-provided message.
        detail: String,
    },

    /// The expected version did not match `current + 1`.
    #[error("version conflict on page {page_id}: requested version {requested}")]
    VersionConflict {
        /// Page being updated.
        page_id: String,
        /// Version named in the rejected request.
        requested: u64,
    },

    /// The service is throttling requests (HTTP 429).
    #[error("rate limited by the content service, retry later")]
    RateLimited,

    /// The service rejected the request body (HTTP 400).
    #[error("request rejected by the content service: {detail}")]
    Validation {
        /// Service-provided message.
        detail: String,
    },

    /// Any other non-success status.
    #[error("content service returned HTTP {status}")]
    Http {
        /// Numeric status code.
        status: u16,
    },

    /// The request never produced a response.
    #[error("request to the content service failed: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("failed to decode content service response: {0}")]
    Decode(String),
}

/// Errors produced while creating, reading, or updating pages.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// A required input was missing or out of range. No request was sent.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The content is not valid UTF-8 at the given byte offset. No request was sent.
    #[error("content is not valid UTF-8 near byte offset {offset}")]
    Encoding {
        /// Start of the window where no code-point boundary could be found.
        offset: usize,
    },

    /// The remote service refused an operation before anything was written.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Chunked creation stopped after the page was created.
    #[error(
        "chunked creation of page {page_id} stopped at chunk {failed_chunk} of {total_chunks} \
         ({completed_chunks} written)"
    )]
    PartialAssembly {
        /// Page left live on the service.
        page_id: String,
        /// Chunks present on the page.
        completed_chunks: usize,
        /// Chunks the content was split into.
        total_chunks: usize,
        /// 1-based index of the chunk whose append failed.
        failed_chunk: usize,
        /// Remote failure that stopped the run.
        #[source]
        source: RemoteError,
    },
}

impl AssemblyError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stage of an assembly run this error terminates.
    pub fn stage(&self) -> AssemblyStage {
        match self {
            Self::Validation(_) => AssemblyStage::Validating,
            Self::Encoding { .. } => AssemblyStage::Splitting,
            Self::Remote(_) => AssemblyStage::Creating,
            Self::PartialAssembly { failed_chunk, .. } => AssemblyStage::Appending {
                chunk: *failed_chunk,
            },
        }
    }
}
