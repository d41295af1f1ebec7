//! Error types for pdfseal.

use thiserror::Error;

/// Coarse classification of a [`PdfError`].
///
/// Callers decide what a failure means (for example "is this file merely
/// password-protected?") from the kind, never from the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The bytes cannot be turned into a valid object graph.
    Structural,
    /// A required password is missing or incorrect.
    Password,
    /// Set-password was requested on an already encrypted document.
    AlreadyProtected,
    /// Remove-password was requested on an unencrypted document.
    NotProtected,
    /// The input exceeds the configured size bounds.
    Resource,
}

/// Primary error type for PDF parsing and protection operations.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("invalid token at position {pos}: {msg}")]
    TokenError { pos: usize, msg: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    #[error("no valid xref table found")]
    NoValidXRef,

    #[error("PDF syntax error: {0}")]
    SyntaxError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("input is not a PDF document")]
    NotPdf,

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("incorrect password")]
    IncorrectPassword,

    #[error("owner password required to open the document for modification")]
    OwnerPasswordRequired,

    #[error("document is already password protected")]
    AlreadyProtected,

    #[error("document is not password protected")]
    NotProtected,

    #[error("input of {size} bytes exceeds the limit of {limit} bytes")]
    InputTooLarge { size: usize, limit: usize },
}

impl PdfError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::IncorrectPassword | Self::OwnerPasswordRequired => ErrorKind::Password,
            Self::AlreadyProtected => ErrorKind::AlreadyProtected,
            Self::NotProtected => ErrorKind::NotProtected,
            Self::InputTooLarge { .. } => ErrorKind::Resource,
            Self::TokenError { .. }
            | Self::UnexpectedEof
            | Self::TypeError { .. }
            | Self::Io(_)
            | Self::ObjectNotFound(..)
            | Self::NoValidXRef
            | Self::SyntaxError(_)
            | Self::DecodeError(_)
            | Self::NotPdf
            | Self::EncryptionError(_) => ErrorKind::Structural,
        }
    }

    /// True when the failure is a missing or incorrect password.
    pub const fn is_password_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Password)
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_variants_classify_as_password() {
        assert_eq!(PdfError::IncorrectPassword.kind(), ErrorKind::Password);
        assert_eq!(PdfError::OwnerPasswordRequired.kind(), ErrorKind::Password);
        assert!(PdfError::IncorrectPassword.is_password_error());
    }

    #[test]
    fn encryption_dictionary_problems_are_structural() {
        let err = PdfError::EncryptionError("Missing O in /Encrypt".into());
        assert_eq!(err.kind(), ErrorKind::Structural);
        assert!(!err.is_password_error());
    }

    #[test]
    fn size_limit_is_resource() {
        let err = PdfError::InputTooLarge { size: 10, limit: 5 };
        assert_eq!(err.kind(), ErrorKind::Resource);
    }
}
