//! Orchestrator errors.

use std::fmt;

use thiserror::Error;

/// Error type crossing the sub-service seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Startup stage, in the order the orchestrator runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Metrics,
    Profiling,
    Rpc,
    Driver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Metrics => "metrics service",
            Stage::Profiling => "profiling",
            Stage::Rpc => "RPC service",
            Stage::Driver => "driver",
        })
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("already stopped")]
    AlreadyStopped,

    #[error("already started")]
    AlreadyStarted,

    #[error("failed to start {stage}: {source}")]
    Start {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error("{0}")]
    Stop(StopErrors),
}

impl ServiceError {
    pub(crate) fn start(stage: Stage, source: impl Into<BoxError>) -> Self {
        ServiceError::Start {
            stage,
            source: source.into(),
        }
    }

    /// Stage that failed, for startup errors.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ServiceError::Start { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Every failure collected during one `stop` attempt.
#[derive(Debug, Default)]
pub struct StopErrors(Vec<BoxError>);

impl StopErrors {
    pub(crate) fn push(&mut self, context: &str, err: impl fmt::Display) {
        self.0.push(format!("failed to stop {}: {}", context, err).into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StopErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_error_names_stage() {
        let err = ServiceError::start(Stage::Profiling, "address in use");
        assert_eq!(err.to_string(), "failed to start profiling: address in use");
        assert_eq!(err.stage(), Some(Stage::Profiling));
        assert_eq!(ServiceError::AlreadyStopped.stage(), None);
    }

    #[test]
    fn test_stop_errors_joined_per_line() {
        let mut errs = StopErrors::default();
        assert!(errs.is_empty());
        errs.push("driver", "boom");
        errs.push("metrics server", "still busy");

        let err = ServiceError::Stop(errs);
        assert_eq!(
            err.to_string(),
            "failed to stop driver: boom\nfailed to stop metrics server: still busy"
        );
    }
}
