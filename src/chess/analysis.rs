use log::{info, warn};

use super::error::OracleError;
use super::moves::{Mainline, side_to_move};
use super::oracle::{Oracle, normalize};
use super::types::{AnalyzedGame, GameRecord, MoveScore};

/// Games between two progress lines.
pub const ANALYSIS_PROGRESS_INTERVAL: usize = 100;

/// Lazily scores each ply of one game: play the move, ask the oracle about
/// the resulting position, normalize. Yields exactly one item per ply played
/// and cannot be restarted.
pub struct MoveScores<'a, O: Oracle + ?Sized> {
    oracle: &'a mut O,
    mainline: Mainline,
    depth: u32,
}

impl<'a, O: Oracle + ?Sized> MoveScores<'a, O> {
    pub fn new(oracle: &'a mut O, movetext: &str, depth: u32) -> Self {
        Self {
            oracle,
            mainline: Mainline::new(movetext),
            depth,
        }
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.mainline.stop_reason()
    }
}

impl<O: Oracle + ?Sized> Iterator for MoveScores<'_, O> {
    type Item = Result<MoveScore, OracleError>;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.mainline.next()?;
        let turn = side_to_move(&position);
        Some(
            self.oracle
                .analyse(&position, self.depth)
                .map(|evaluation| normalize(evaluation, turn)),
        )
    }
}

/// Scores every ply of one game.
pub fn analyse_game<O: Oracle + ?Sized>(
    oracle: &mut O,
    record: GameRecord,
    depth: u32,
) -> Result<AnalyzedGame, OracleError> {
    oracle.new_game()?;

    let mut moves = MoveScores::new(oracle, &record.movetext, depth);
    let scores = moves.by_ref().collect::<Result<Vec<_>, _>>()?;
    if let Some(reason) = moves.stop_reason() {
        warn!(
            "game {}: replay stopped after {} plies: {}",
            record.game,
            scores.len(),
            reason
        );
    }

    Ok(AnalyzedGame { record, scores })
}

/// Scores every selected game in order with one oracle. The first oracle
/// failure aborts the batch.
pub fn analyse_games<O: Oracle + ?Sized>(
    oracle: &mut O,
    games: Vec<GameRecord>,
    depth: u32,
) -> Result<Vec<AnalyzedGame>, OracleError> {
    info!("analysing {} games at depth {}", games.len(), depth);

    let mut analysed = Vec::with_capacity(games.len());
    for record in games {
        analysed.push(analyse_game(oracle, record, depth)?);
        if analysed.len().is_multiple_of(ANALYSIS_PROGRESS_INTERVAL) {
            info!("{} games analysed", analysed.len());
        }
    }

    info!("all games analysed");
    Ok(analysed)
}
