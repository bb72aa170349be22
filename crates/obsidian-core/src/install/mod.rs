pub mod fetch;
pub mod plan;
pub mod progress;

pub use fetch::{FetchEngine, FetchFailure, FetchReport};
pub use plan::{plan, FetchTask, TaskCategory};
pub use progress::ProgressAggregator;
