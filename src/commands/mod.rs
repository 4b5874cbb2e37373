pub mod context;
pub mod control;
pub mod logs;
pub mod mappings;
pub mod posts;
pub mod run;
pub mod sources;

pub use context::AppContext;
pub use run::{daemon, run_once};
