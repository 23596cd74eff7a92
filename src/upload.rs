//! Upload gate: pure validation for user-supplied files
//!
//! Checked synchronously before a file enters the capture/snapshot path.
//! Only the declared MIME type and the size are inspected; content is not
//! parsed (a mislabeled PDF is the backend's problem, not ours).

/// Maximum accepted upload size in bytes (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Declared MIME types the reading pipeline understands.
pub const ALLOWED_MIME_TYPES: [&str; 4] = [
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/webp",
];

/// A file offered for upload, described by metadata only.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    pub file_name: String,
    /// Declared MIME type, e.g. "image/png".
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Why an upload was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Declared MIME type is not in [`ALLOWED_MIME_TYPES`].
    UnsupportedType(String),
    /// File exceeds [`MAX_UPLOAD_BYTES`].
    TooLarge(u64),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnsupportedType(mime) => {
                write!(f, "unsupported file type '{}'", mime)
            }
            RejectReason::TooLarge(size) => {
                write!(
                    f,
                    "file is {} bytes, larger than the {} byte limit",
                    size, MAX_UPLOAD_BYTES
                )
            }
        }
    }
}

/// Outcome of validating an upload candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadVerdict {
    Accepted,
    Rejected(RejectReason),
}

impl UploadVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, UploadVerdict::Accepted)
    }
}

/// Validate a candidate against the MIME allow-list and the size ceiling.
///
/// Pure function, no side effects; safe to call from any path.
pub fn validate(candidate: &UploadCandidate) -> UploadVerdict {
    if !ALLOWED_MIME_TYPES.contains(&candidate.mime_type.as_str()) {
        return UploadVerdict::Rejected(RejectReason::UnsupportedType(
            candidate.mime_type.clone(),
        ));
    }

    if candidate.size_bytes > MAX_UPLOAD_BYTES {
        return UploadVerdict::Rejected(RejectReason::TooLarge(candidate.size_bytes));
    }

    UploadVerdict::Accepted
}
