//! Open policy: access modes, read accuracy and caller options.

use crate::document::permissions::Permissions;
use crate::document::security::SecurityLevel;

/// What the caller intends to do with an opened document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Trailer and encryption dictionary only; nothing else is parsed.
    InformationOnly,
    Import,
    ReadOnly,
    /// Full access; requires the owner password on encrypted documents.
    Modify,
}

impl AccessMode {
    /// Next mode in the fallback cycle modify → import → read-only → modify.
    pub const fn next_in_cycle(self) -> Self {
        match self {
            Self::Modify => Self::Import,
            Self::Import => Self::ReadOnly,
            Self::ReadOnly | Self::InformationOnly => Self::Modify,
        }
    }
}

/// How strictly structural conformance is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadAccuracy {
    /// Reject any anomaly.
    Strict,
    /// Repair by scanning when the declared structure is inconsistent.
    Moderate,
}

/// One (access mode, read accuracy) combination tried by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct OpenAttempt {
    pub mode: AccessMode,
    pub accuracy: ReadAccuracy,
}

impl OpenAttempt {
    pub const fn new(mode: AccessMode, accuracy: ReadAccuracy) -> Self {
        Self { mode, accuracy }
    }

    /// Whether repairs may be applied under this attempt.
    pub const fn allows_repair(&self) -> bool {
        matches!(self.accuracy, ReadAccuracy::Moderate)
            && !matches!(self.mode, AccessMode::InformationOnly)
    }
}

impl Default for OpenAttempt {
    fn default() -> Self {
        Self::new(AccessMode::Modify, ReadAccuracy::Strict)
    }
}

/// Options for opening a document.
///
/// Unset mode or accuracy are left to the resolver's fallback sequence.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub password: Option<String>,
    pub mode: Option<AccessMode>,
    pub accuracy: Option<ReadAccuracy>,
    pub max_input_bytes: Option<usize>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn maybe_password(mut self, password: Option<&str>) -> Self {
        self.password = password.map(str::to_string);
        self
    }

    /// Pin the access mode.
    pub fn mode(mut self, mode: AccessMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Pin the read accuracy.
    pub fn accuracy(mut self, accuracy: ReadAccuracy) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn max_input_bytes(mut self, limit: usize) -> Self {
        self.max_input_bytes = Some(limit);
        self
    }

    /// First attempt: pinned values, else (modify, strict).
    pub fn initial_attempt(&self) -> OpenAttempt {
        OpenAttempt::new(
            self.mode.unwrap_or(AccessMode::Modify),
            self.accuracy.unwrap_or(ReadAccuracy::Strict),
        )
    }
}

/// Options for applying a password.
#[derive(Debug, Clone)]
pub struct SetPasswordOptions {
    pub user_password: String,
    /// Defaults to the user password.
    pub owner_password: Option<String>,
    pub permissions: Permissions,
    pub level: SecurityLevel,
}

impl SetPasswordOptions {
    pub fn new(user_password: impl Into<String>) -> Self {
        Self {
            user_password: user_password.into(),
            ..Self::default()
        }
    }

    pub fn owner_password(mut self, owner_password: impl Into<String>) -> Self {
        self.owner_password = Some(owner_password.into());
        self
    }

    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn level(mut self, level: SecurityLevel) -> Self {
        self.level = level;
        self
    }
}

impl Default for SetPasswordOptions {
    fn default() -> Self {
        Self {
            user_password: String::new(),
            owner_password: None,
            permissions: Permissions::all(),
            level: SecurityLevel::Rc4_128,
        }
    }
}
