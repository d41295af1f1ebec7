//! Password protection: open policy, the open resolver and the public
//! detect / set / remove operations.

pub mod policy;
pub mod resolver;
pub mod service;

pub use policy::{AccessMode, OpenAttempt, OpenOptions, ReadAccuracy, SetPasswordOptions};
pub use resolver::{AttemptOutcome, AttemptRecord, OpenResolver, open_document};
pub use service::{
    ProtectionService, ProtectionStatus, SecurityReport, describe_security, detect_protection,
    detect_protection_with_password, is_permission_password_protected, is_view_password_protected,
    remove_password, set_password, set_password_with,
};
