//! Password protection service: detection, set-password and remove-password.
//!
//! Every operation takes the raw bytes of a PDF and returns either a result
//! or a classified [`PdfError`]; inputs are never modified in place.

use tracing::{debug, info};

use super::policy::{AccessMode, OpenOptions, ReadAccuracy, SetPasswordOptions};
use super::resolver::{check_input, open_document};
use crate::document::parsed::effective_permissions;
use crate::document::permissions::Permissions;
use crate::document::security::{PasswordRole, SecurityLevel, SecurityState};
use crate::error::{PdfError, Result};

/// Result of probing a document for both kinds of password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct ProtectionStatus {
    /// A password is needed to open the document at all.
    pub view_protected: bool,
    /// The password at hand does not grant full (owner) access.
    pub permission_protected: bool,
}

/// Security summary of a document, as far as the given password reveals it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SecurityReport {
    pub encrypted: bool,
    #[serde(flatten)]
    pub status: ProtectionStatus,
    /// Unset when the password did not open the document.
    pub level: Option<SecurityLevel>,
    pub revision: Option<i64>,
    pub key_length_bits: Option<usize>,
    pub role: Option<PasswordRole>,
    pub permissions: Option<Permissions>,
    pub repaired: bool,
}

/// Entry point carrying limits shared by all operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectionService {
    max_input_bytes: Option<usize>,
}

impl ProtectionService {
    pub const fn new() -> Self {
        Self {
            max_input_bytes: None,
        }
    }

    /// Reject inputs larger than `limit` bytes with a resource error.
    pub const fn with_max_input_bytes(mut self, limit: usize) -> Self {
        self.max_input_bytes = Some(limit);
        self
    }

    fn options(&self) -> OpenOptions {
        OpenOptions {
            max_input_bytes: self.max_input_bytes,
            ..OpenOptions::default()
        }
    }

    /// Probe whether opening needs a password.
    ///
    /// Single attempt in information-only mode with strict accuracy and no
    /// password. A password failure means protected; other failures are
    /// returned unchanged.
    pub fn is_view_password_protected(&self, bytes: &[u8]) -> Result<bool> {
        let options = self
            .options()
            .mode(AccessMode::InformationOnly)
            .accuracy(ReadAccuracy::Strict);
        password_probe(bytes, &options)
    }

    /// Probe whether full access needs a password beyond `view_password`.
    ///
    /// Single attempt in modify mode with strict accuracy.
    pub fn is_permission_password_protected(&self, bytes: &[u8], view_password: Option<&str>) -> Result<bool> {
        let options = self
            .options()
            .maybe_password(view_password)
            .mode(AccessMode::Modify)
            .accuracy(ReadAccuracy::Strict);
        password_probe(bytes, &options)
    }

    /// Run both probes.
    pub fn detect_protection(&self, bytes: &[u8], view_password: Option<&str>) -> Result<ProtectionStatus> {
        let status = ProtectionStatus {
            view_protected: self.is_view_password_protected(bytes)?,
            permission_protected: self.is_permission_password_protected(bytes, view_password)?,
        };
        debug!(?status, "protection detected");
        Ok(status)
    }

    /// Encrypt an unprotected document.
    ///
    /// Fails with [`PdfError::AlreadyProtected`] when the input is encrypted
    /// or cannot be opened without a password.
    pub fn set_password(&self, bytes: &[u8], options: &SetPasswordOptions) -> Result<Vec<u8>> {
        check_input(bytes, self.max_input_bytes)?;
        if !options.level.is_writable() {
            return Err(PdfError::EncryptionError(format!(
                "cannot write documents at level {:?}",
                options.level
            )));
        }
        let mut doc = open_document(bytes, &self.options()).map_err(|err| {
            if err.is_password_error() {
                PdfError::AlreadyProtected
            } else {
                err
            }
        })?;
        if doc.is_encrypted() {
            return Err(PdfError::AlreadyProtected);
        }

        let state = SecurityState::protected(
            options.level,
            &options.user_password,
            options.owner_password.as_deref(),
            options.permissions,
        );
        doc.apply_security(&state)?;
        let out = doc.to_bytes()?;
        info!(level = ?options.level, size = out.len(), "password applied");
        Ok(out)
    }

    /// Decrypt a protected document using its owner password.
    ///
    /// Fails with [`PdfError::NotProtected`] on unencrypted input and with a
    /// password error when `password` does not grant owner access.
    pub fn remove_password(&self, bytes: &[u8], password: &str) -> Result<Vec<u8>> {
        let options = self.options().password(password).mode(AccessMode::Modify);
        let mut doc = open_document(bytes, &options)?;
        if !doc.is_encrypted() {
            return Err(PdfError::NotProtected);
        }
        let level = doc.security().level;
        doc.clear_security();
        let out = doc.to_bytes()?;
        info!(?level, size = out.len(), "password removed");
        Ok(out)
    }

    /// Summarize the document's security.
    pub fn describe_security(&self, bytes: &[u8], password: Option<&str>) -> Result<SecurityReport> {
        let status = self.detect_protection(bytes, password)?;
        let options = self
            .options()
            .maybe_password(password)
            .mode(AccessMode::InformationOnly);
        let mut report = SecurityReport {
            encrypted: status.view_protected,
            status,
            level: None,
            revision: None,
            key_length_bits: None,
            role: None,
            permissions: None,
            repaired: false,
        };
        let doc = match open_document(bytes, &options) {
            Ok(doc) => doc,
            Err(err) if err.is_password_error() => return Ok(report),
            Err(err) => return Err(err),
        };
        report.encrypted = doc.is_encrypted();
        report.level = Some(doc.security().level);
        report.permissions = Some(effective_permissions(&doc));
        report.repaired = doc.was_repaired();
        if let Some(handler) = doc.handler() {
            report.revision = Some(handler.revision());
            report.key_length_bits = Some(handler.key_length_bits());
            report.role = Some(handler.role());
        }
        Ok(report)
    }
}

fn password_probe(bytes: &[u8], options: &OpenOptions) -> Result<bool> {
    match open_document(bytes, options) {
        Ok(_) => Ok(false),
        Err(err) if err.is_password_error() => Ok(true),
        Err(err) => Err(err),
    }
}

/// Whether opening `bytes` needs a password.
pub fn is_view_password_protected(bytes: &[u8]) -> Result<bool> {
    ProtectionService::new().is_view_password_protected(bytes)
}

/// Whether full access to `bytes` needs a password beyond `view_password`.
pub fn is_permission_password_protected(bytes: &[u8], view_password: Option<&str>) -> Result<bool> {
    ProtectionService::new().is_permission_password_protected(bytes, view_password)
}

/// Detect both kinds of protection without a password.
///
/// A view-protected document is then always reported as permission
/// protected, since the missing password grants no access at all.
pub fn detect_protection(bytes: &[u8]) -> Result<ProtectionStatus> {
    detect_protection_with_password(bytes, None)
}

/// Detect both kinds of protection, probing permissions with `view_password`.
pub fn detect_protection_with_password(bytes: &[u8], view_password: Option<&str>) -> Result<ProtectionStatus> {
    ProtectionService::new().detect_protection(bytes, view_password)
}

/// Encrypt with RC4-128, all permissions, owner password defaulting to the
/// user password.
pub fn set_password(bytes: &[u8], user_password: &str, owner_password: Option<&str>) -> Result<Vec<u8>> {
    let mut options = SetPasswordOptions::new(user_password);
    options.owner_password = owner_password.map(str::to_string);
    set_password_with(bytes, &options)
}

pub fn set_password_with(bytes: &[u8], options: &SetPasswordOptions) -> Result<Vec<u8>> {
    ProtectionService::new().set_password(bytes, options)
}

/// Decrypt with the owner password.
pub fn remove_password(bytes: &[u8], password: &str) -> Result<Vec<u8>> {
    ProtectionService::new().remove_password(bytes, password)
}

pub fn describe_security(bytes: &[u8], password: Option<&str>) -> Result<SecurityReport> {
    ProtectionService::new().describe_security(bytes, password)
}
