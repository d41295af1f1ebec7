//! PDF document module - cross-reference loading, repair, security and output.
//!
//! This module contains:
//! - `xref` - cross-reference tables and streams
//! - `repair` - xref reconstruction by scanning for object headers
//! - `parsed` - the parsed object graph (ParsedDocument)
//! - `security` - the standard security handler
//! - `permissions` - permission flags of the P entry
//! - `writer` - serialization with a classic xref table

pub mod parsed;
pub mod permissions;
pub mod repair;
pub mod security;
pub mod writer;
pub mod xref;

pub use parsed::{ParsedDocument, effective_permissions};
pub use repair::RepairScan;
pub use permissions::Permissions;
pub use security::{
    PASSWORD_PADDING, PasswordRole, SecurityLevel, SecurityState, StandardSecurityHandler,
};
pub use xref::{XRefEntry, XRefTable};
