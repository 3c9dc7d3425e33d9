//! Picks the highest-rated games of every year from a PGN archive, scores
//! each ply with a UCI engine and exports the scores as one wide CSV table.

pub mod chess;

pub use chess::{
    AnalyzedGame, Evaluation, GameRecord, MoveScore, Oracle, PipelineConfig, PipelineError,
    PipelineSummary, UciEngine, run, run_with_oracle,
};
