use solution_model::StepKind;
use thiserror::Error;

/// Why a step's request could not be built from the solution and the
/// results captured so far
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{step} needs the result of a '{requires}' step, which has not completed")]
    MissingDependency { step: StepKind, requires: StepKind },

    #[error("{step} payload has no '{field}' value")]
    MissingField { step: StepKind, field: &'static str },

    #[error("{step} response has no '{field}' value")]
    UnreadableResponse { step: StepKind, field: &'static str },

    #[error("no subscription id is configured")]
    MissingSubscription,
}

pub type Result<T> = std::result::Result<T, ResolveError>;
