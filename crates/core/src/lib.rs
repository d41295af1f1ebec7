//! pdfseal - detect, apply and remove PDF passwords.
//!
//! Documents are opened through an open resolver that retries under
//! progressively more lenient access modes and read accuracies, then
//! inspected or re-written with the PDF standard security handler.
//!
//! ```no_run
//! let bytes = std::fs::read("report.pdf")?;
//! let locked = pdfseal_core::set_password(&bytes, "user", Some("owner"))?;
//! let status = pdfseal_core::detect_protection(&locked)?;
//! assert!(status.view_protected);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod document;
pub mod error;
pub mod model;
pub mod parser;
pub mod protection;

pub use document::{ParsedDocument, PasswordRole, Permissions, SecurityLevel, SecurityState};
pub use error::{ErrorKind, PdfError, Result};
pub use protection::{
    AccessMode, OpenOptions, ProtectionService, ProtectionStatus, ReadAccuracy, SecurityReport,
    SetPasswordOptions, describe_security, detect_protection, detect_protection_with_password,
    is_permission_password_protected, is_view_password_protected, open_document, remove_password,
    set_password, set_password_with,
};
