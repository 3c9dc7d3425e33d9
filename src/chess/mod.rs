pub mod analysis;
mod error;
pub mod export;
pub mod filter;
pub mod log;
pub mod moves;
pub mod oracle;
pub mod pipeline;
pub mod reader;
pub mod selection;
pub mod types;
pub mod visitor;

pub use error::{ArchiveError, ErrorAccumulator, ExportError, OracleError, PipelineError};
pub use oracle::{Evaluation, Oracle, UciEngine};
pub use pipeline::{PipelineConfig, PipelineSummary, run, run_with_oracle};
pub use types::{AnalyzedGame, GameRecord, MoveScore};
