#![forbid(unsafe_code)]

//! Execution engine for Arazzo workflow documents.
//!
//! The document model and expression grammar live in `stepflow-core`;
//! this crate resolves expressions against a live run, builds and sends
//! requests, and drives the step state machine.

pub mod auth;
mod cancel;
pub mod context;
mod criteria;
pub mod events;
pub mod http;
pub mod operation;
mod request;
pub mod resolve;
mod runner;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use context::{CapturedResponse, ExecutionContext, StepRecord};
pub use criteria::evaluate_success;
pub use events::{CompositeEventSink, Event, EventSink, NoOpEventSink, StdoutEventSink};
pub use http::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use operation::{
    OperationLookupError, OperationRef, OperationResolver, ResolvedOperation,
    StaticOperationResolver,
};
pub use request::{build_request, BuildError};
pub use resolve::{resolve, resolve_scalar, resolve_value, ResolutionError};
pub use runner::{
    ExecutionResult, FailureReason, RunOptions, RunStatus, StartError, StepOutcome, StepTrace,
    WorkflowEngine,
};
