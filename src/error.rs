//! Error types for a single distance resolution.

use thiserror::Error;

/// Pipeline stage at which a non-finite value was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GapFill,
    Weights,
    Mds,
    Majorization,
    Extraction,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GapFill => "gap_fill",
            Stage::Weights => "weights",
            Stage::Mds => "mds",
            Stage::Majorization => "majorization",
            Stage::Extraction => "extraction",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while resolving one caller's distances.
///
/// None of these abort a multi-node round: callers fall back to the raw
/// initial guesses (see [`crate::graph_drawer::resolve_or_fallback`]).
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Caller absent, empty table, or a table outside the supported size.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The data admits no planar embedding (or the gauge-fixed Laplacian is singular).
    #[error("degenerate geometry: {message}")]
    DegenerateGeometry { message: String },

    /// A NaN or infinity surfaced after a pipeline stage.
    #[error("numeric anomaly after {stage}: {message}")]
    NumericAnomaly { stage: Stage, message: String },
}

impl ResolveError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            message: message.into(),
        }
    }

    pub fn numeric(stage: Stage, message: impl Into<String>) -> Self {
        Self::NumericAnomaly {
            stage,
            message: message.into(),
        }
    }

    /// Whether falling back to the raw guesses is the expected recovery.
    ///
    /// `InvalidInput` means the caller should skip graph drawing for this
    /// node entirely; the other two mean "use the raw guesses this round".
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidInput { .. } => false,
            Self::DegenerateGeometry { .. } => true,
            Self::NumericAnomaly { .. } => true,
        }
    }

    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::DegenerateGeometry { .. } => "degenerate_geometry",
            Self::NumericAnomaly { .. } => "numeric_anomaly",
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
