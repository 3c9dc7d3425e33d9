use log::info;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use super::analysis::analyse_games;
use super::error::PipelineError;
use super::export::{build_table, write_csv};
use super::oracle::{Oracle, UciEngine};
use super::reader::{Archive, ArchiveStats};
use super::selection::select_top_per_year;
use super::types::MoveScore;

pub const DEFAULT_FIRST_YEAR: i32 = 1920;
pub const DEFAULT_LAST_YEAR: i32 = 2020;
pub const DEFAULT_PER_YEAR: usize = 20;
pub const DEFAULT_SEARCH_DEPTH: u32 = 17;
pub const DEFAULT_ENGINE: &str = "stockfish";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Path or glob pattern of the PGN archive.
    pub archive: String,
    pub output: PathBuf,
    pub engine: String,
    pub years: RangeInclusive<i32>,
    pub per_year: usize,
    pub search_depth: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive: "wholeDatabase.pgn".to_string(),
            output: PathBuf::from("OutputFinal.csv"),
            engine: DEFAULT_ENGINE.to_string(),
            years: DEFAULT_FIRST_YEAR..=DEFAULT_LAST_YEAR,
            per_year: DEFAULT_PER_YEAR,
            search_depth: DEFAULT_SEARCH_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub archive: ArchiveStats,
    pub valid: usize,
    pub selected: usize,
    pub analysed: usize,
    pub unscored_plies: usize,
    pub rows: usize,
}

/// Runs the batch against a UCI engine launched once for the whole run.
pub fn run(config: &PipelineConfig) -> Result<PipelineSummary, PipelineError> {
    let mut engine = UciEngine::spawn(&config.engine)?;
    info!("engine ready: {}", engine.name());
    run_with_oracle(config, &mut engine)
}

/// Parse, select, analyse, export, strictly in that order. Nothing is
/// written unless every stage succeeds.
pub fn run_with_oracle<O: Oracle + ?Sized>(
    config: &PipelineConfig,
    oracle: &mut O,
) -> Result<PipelineSummary, PipelineError> {
    let archive = Archive::open(&config.archive)?;
    let report = archive.read_games();
    let valid = report.games.len();

    let selected = select_top_per_year(report.games, &config.years, config.per_year);
    let selected_count = selected.len();

    let analysed = analyse_games(oracle, selected, config.search_depth)?;
    let unscored_plies = analysed
        .iter()
        .flat_map(|game| game.scores.iter())
        .filter(|score| matches!(score, MoveScore::Unscored))
        .count();

    let table = build_table(&analysed);
    write_csv(&table, &config.output)?;
    info!("Saved!");

    Ok(PipelineSummary {
        archive: report.stats,
        valid,
        selected: selected_count,
        analysed: analysed.len(),
        unscored_plies,
        rows: table.rows.len(),
    })
}
