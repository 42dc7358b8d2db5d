//! Exit-code classification for the six fatal-error classes named in spec.md §7, plus the
//! non-error `cmd` early-exit class.

use ixa::IxaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Non-error early exit, e.g. `--print-interventions`.
    Cmd,
    /// Invalid or unsupported scenario input, fatal before simulation start.
    Scenario,
    /// Date/duration parsing failure.
    Format,
    /// Checkpoint structural mismatch.
    Checkpoint,
    /// Non-finite EIR/kappa or a zero `initialKappa` at switchover.
    Numeric,
    /// Internal invariant violation.
    Traced,
    /// Unclassified `IxaError`, matching the teacher's default exit behaviour.
    Default,
}

impl ExitCode {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Cmd => 0,
            ExitCode::Scenario => 65,
            ExitCode::Format => 66,
            ExitCode::Checkpoint => 67,
            ExitCode::Numeric => 68,
            ExitCode::Traced => 70,
            ExitCode::Default => 64,
        }
    }
}

/// Classifies `error`'s message by the recognisable prefixes each fatal path in this crate
/// writes into its `IxaError` string, since `ixa::IxaError` carries no structured variant of its
/// own beyond the message.
#[must_use]
pub fn classify(error: &IxaError) -> ExitCode {
    let IxaError::IxaError(message) = error;
    if message.starts_with("scenario:") {
        ExitCode::Scenario
    } else if message.starts_with("format:") {
        ExitCode::Format
    } else if message.starts_with("checkpoint:") {
        ExitCode::Checkpoint
    } else if message.starts_with("numeric:") {
        ExitCode::Numeric
    } else if message.starts_with("traced:") {
        ExitCode::Traced
    } else {
        ExitCode::Default
    }
}
