use anyhow::{Context, Result, bail};
use chess_evals::chess::log as chess_log;
use chess_evals::chess::pipeline::{
    DEFAULT_ENGINE, DEFAULT_FIRST_YEAR, DEFAULT_LAST_YEAR, DEFAULT_PER_YEAR, DEFAULT_SEARCH_DEPTH,
};
use chess_evals::{PipelineConfig, run};
use clap::Parser;
use std::path::PathBuf;

/// Score the top-rated games of every year in a PGN archive with a UCI engine.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// PGN archive, or a glob pattern of archives (`.zst` files are decompressed)
    archive: String,

    /// CSV file to write
    output: PathBuf,

    /// UCI engine executable
    #[arg(long, default_value = DEFAULT_ENGINE)]
    engine: String,

    /// First year considered for selection
    #[arg(long, default_value_t = DEFAULT_FIRST_YEAR)]
    first_year: i32,

    /// Last year considered for selection (inclusive)
    #[arg(long, default_value_t = DEFAULT_LAST_YEAR)]
    last_year: i32,

    /// Games kept per year, by combined rating
    #[arg(long, default_value_t = DEFAULT_PER_YEAR)]
    per_year: usize,

    /// Engine search depth per position
    #[arg(long, default_value_t = DEFAULT_SEARCH_DEPTH)]
    depth: u32,

    /// Debug logging (overridden by CHESS_LOG)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<PipelineConfig> {
        if self.first_year > self.last_year {
            bail!(
                "--first-year {} is after --last-year {}",
                self.first_year,
                self.last_year
            );
        }

        Ok(PipelineConfig {
            archive: self.archive,
            output: self.output,
            engine: self.engine,
            years: self.first_year..=self.last_year,
            per_year: self.per_year,
            search_depth: self.depth,
        })
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    chess_log::init(if args.verbose { "debug" } else { "info" });

    let config = args.into_config()?;
    let summary = run(&config)
        .with_context(|| format!("analysis of '{}' failed", config.archive))?;

    log::info!(
        "{} valid games, {} selected, {} analysed ({} unscored plies), {} rows written",
        summary.valid,
        summary.selected,
        summary.analysed,
        summary.unscored_plies,
        summary.rows
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_batch_constants() {
        let config = Args::try_parse_from(["chess-evals", "games.pgn", "out.csv"])
            .unwrap()
            .into_config()
            .unwrap();

        assert_eq!(
            config,
            PipelineConfig {
                archive: "games.pgn".to_string(),
                output: PathBuf::from("out.csv"),
                ..PipelineConfig::default()
            }
        );
    }

    #[test]
    fn test_overrides() {
        let config = Args::try_parse_from([
            "chess-evals",
            "games/*.pgn.zst",
            "out.csv",
            "--engine",
            "/usr/games/stockfish",
            "--first-year",
            "1990",
            "--last-year",
            "1999",
            "--per-year",
            "5",
            "--depth",
            "12",
        ])
        .unwrap()
        .into_config()
        .unwrap();

        assert_eq!(config.engine, "/usr/games/stockfish");
        assert_eq!(config.years, 1990..=1999);
        assert_eq!(config.per_year, 5);
        assert_eq!(config.search_depth, 12);
    }

    #[test]
    fn test_inverted_year_range_is_rejected() {
        let args = Args::try_parse_from([
            "chess-evals",
            "games.pgn",
            "out.csv",
            "--first-year",
            "2000",
            "--last-year",
            "1990",
        ])
        .unwrap();

        assert!(args.into_config().is_err());
    }
}
