//! Use cases - one struct per operation, holding the ports it needs.
//!
//! Errors are per-use-case enums; the HTTP layer maps them to statuses.

pub mod aggregation;
pub mod context;
pub mod pipeline;
pub mod rolls;
pub mod safety;
pub mod turn;

pub use aggregation::{policy_for, InputAggregationPolicy, Readiness};
pub use pipeline::{ApplicationReport, ApplyResolution, FailedEffect, PipelineError};
pub use rolls::{
    FulfillRoll, RequestRoll, RollError, RollFulfilled, RollRequestParams, RollRequested,
};
pub use turn::{
    InputAccepted, RecoverTurn, ResolveTurn, StartTurn, SubmitInput, TurnError, TurnResolved,
};
