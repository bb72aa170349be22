pub mod arguments;
pub mod natives;
pub mod process;
pub mod runtime;
pub mod types;

pub use arguments::assemble;
pub use natives::stage_natives;
pub use process::ProcessHandle;
pub use runtime::locate_runtime;
pub use types::{AssembledCommand, LaunchParams, LaunchPaths, UserKind};
