//! Engine module: combiners, the operation driver, the parallel facade and the CLI front end

pub mod arg_parser;
pub mod combiner;
pub mod expr;
pub mod facade;
pub mod handlers;
pub mod operation;
pub mod progress;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use combiner::{BatchProcedure, Combinable, ShortCircuitable};
pub use facade::ParallelIterable;
pub use handlers::handle_run;
pub use operation::{Operation, OperationState, run_operation};
