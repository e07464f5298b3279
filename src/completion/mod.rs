//! Completion Handlers (L6): one pluggable decision module per completion
//! type (spec §4.3).

mod handlers;
mod types;

pub use handlers::{
    build_handler, CheckBudgetHandler, CompletionDeps, CompositeHandler, CustomHandler,
    ExternalStateHandler, IterationBudgetHandler, KeywordSignalHandler, StepMachineHandler,
    StructuredSignalHandler,
};
pub use types::{CompletionContext, CompletionCriteria, CompletionHandler, ExternalProbe};
