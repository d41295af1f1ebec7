//! Open resolver: retries a failed open under progressively more lenient
//! (access mode, read accuracy) combinations.
//!
//! The transition from one attempt to the next is a pure function of the
//! current attempt, the failure kind and which settings the caller pinned.
//! [`OpenResolver::run`] drives it against any opener closure, so the
//! sequence can be tested without touching PDF bytes.

use tracing::{debug, info};

use super::policy::{OpenAttempt, OpenOptions, ReadAccuracy};
use crate::document::parsed::{PDF_SIGNATURE, ParsedDocument};
use crate::document::repair::RepairScan;
use crate::error::{ErrorKind, PdfError, Result};

/// Mode changes allowed after the first attempt.
pub const MAX_MODE_STEPS: u8 = 3;

/// Which settings the caller fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pins {
    pub mode: bool,
    pub accuracy: bool,
}

impl Pins {
    pub fn of(options: &OpenOptions) -> Self {
        Self {
            mode: options.mode.is_some(),
            accuracy: options.accuracy.is_some(),
        }
    }
}

/// Position in the retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverState {
    pub attempt: OpenAttempt,
    pub mode_steps: u8,
}

impl ResolverState {
    pub const fn start(attempt: OpenAttempt) -> Self {
        Self {
            attempt,
            mode_steps: 0,
        }
    }
}

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed(ErrorKind),
}

/// One attempt and how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct AttemptRecord {
    pub attempt: OpenAttempt,
    pub outcome: AttemptOutcome,
}

/// Advance the sequence by one step, ignoring history.
///
/// An unpinned mode cycles until [`MAX_MODE_STEPS`] is reached; an unpinned
/// strict accuracy relaxes to moderate and stays there. `None` when neither
/// setting can change.
fn step(state: ResolverState, pins: Pins) -> Option<ResolverState> {
    let (mode, mode_steps) = if !pins.mode && state.mode_steps < MAX_MODE_STEPS {
        (state.attempt.mode.next_in_cycle(), state.mode_steps + 1)
    } else {
        (state.attempt.mode, state.mode_steps)
    };
    let accuracy = match state.attempt.accuracy {
        ReadAccuracy::Strict if !pins.accuracy => ReadAccuracy::Moderate,
        accuracy => accuracy,
    };
    let next = ResolverState {
        attempt: OpenAttempt::new(mode, accuracy),
        mode_steps,
    };
    (next != state).then_some(next)
}

/// Next attempt after a failure, or `None` when the sequence is exhausted.
///
/// After a password failure a planned combination that was already tried is
/// skipped: the same password against the same settings cannot succeed.
pub fn next_attempt(
    state: ResolverState,
    failure: ErrorKind,
    pins: Pins,
    tried: &[OpenAttempt],
) -> Option<ResolverState> {
    let mut candidate = step(state, pins)?;
    while failure == ErrorKind::Password && tried.contains(&candidate.attempt) {
        candidate = step(candidate, pins)?;
    }
    Some(candidate)
}

/// Drives an opener through the retry sequence and records every attempt.
#[derive(Debug, Clone)]
pub struct OpenResolver {
    pins: Pins,
    initial: OpenAttempt,
    attempts: Vec<AttemptRecord>,
}

impl OpenResolver {
    pub fn new(options: &OpenOptions) -> Self {
        Self {
            pins: Pins::of(options),
            initial: options.initial_attempt(),
            attempts: Vec::new(),
        }
    }

    /// Attempts made by the last [`run`](Self::run), in order.
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Call `open` until it succeeds or the sequence is exhausted.
    ///
    /// On exhaustion the error of the final attempt is returned.
    pub fn run<T>(&mut self, mut open: impl FnMut(OpenAttempt) -> Result<T>) -> Result<T> {
        self.attempts.clear();
        let mut state = ResolverState::start(self.initial);
        loop {
            let attempt = state.attempt;
            let err = match open(attempt) {
                Ok(value) => {
                    self.attempts.push(AttemptRecord {
                        attempt,
                        outcome: AttemptOutcome::Success,
                    });
                    debug!(
                        mode = ?attempt.mode,
                        accuracy = ?attempt.accuracy,
                        attempts = self.attempts.len(),
                        "document opened"
                    );
                    return Ok(value);
                }
                Err(err) => err,
            };
            let kind = err.kind();
            self.attempts.push(AttemptRecord {
                attempt,
                outcome: AttemptOutcome::Failed(kind),
            });
            debug!(mode = ?attempt.mode, accuracy = ?attempt.accuracy, ?kind, error = %err, "open attempt failed");

            if matches!(kind, ErrorKind::Resource) {
                return Err(err);
            }
            let tried: Vec<OpenAttempt> = self.attempts.iter().map(|r| r.attempt).collect();
            match next_attempt(state, kind, self.pins, &tried) {
                Some(next) => state = next,
                None => return Err(err),
            }
        }
    }
}

/// Reject input that cannot be a PDF or exceeds the configured limit.
pub fn check_input(bytes: &[u8], max_input_bytes: Option<usize>) -> Result<()> {
    if let Some(limit) = max_input_bytes.filter(|&limit| bytes.len() > limit) {
        return Err(PdfError::InputTooLarge {
            size: bytes.len(),
            limit,
        });
    }
    if !bytes.starts_with(PDF_SIGNATURE) {
        return Err(PdfError::NotPdf);
    }
    Ok(())
}

/// Open a document, retrying under the resolver's fallback sequence.
pub fn open_document(bytes: &[u8], options: &OpenOptions) -> Result<ParsedDocument> {
    check_input(bytes, options.max_input_bytes)?;
    let password = options.password.as_deref();
    let scan = RepairScan::new();
    let doc = OpenResolver::new(options)
        .run(|attempt| ParsedDocument::parse_with_scan(bytes, password, attempt, &scan))?;
    if doc.was_repaired() {
        info!(mode = ?doc.attempt().mode, "document opened after repair");
    }
    Ok(doc)
}
