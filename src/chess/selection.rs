use log::info;
use std::cmp::Reverse;
use std::ops::RangeInclusive;

use super::types::GameRecord;

/// A record with its place inside its year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedGame {
    pub record: GameRecord,
    /// Zero-based rank by combined rating; `None` outside the year domain.
    pub year_rank: Option<usize>,
    pub included: bool,
}

/// Orders games by year, then by combined rating (highest first), keeping
/// parse order between equal ratings, and ranks them within each year.
/// Games ranked below `per_year` are included.
pub fn rank_games(
    mut games: Vec<GameRecord>,
    years: &RangeInclusive<i32>,
    per_year: usize,
) -> Vec<RankedGame> {
    // Stable: equal keys keep archive order.
    games.sort_by_key(|game| (game.year, Reverse(game.combined_rating())));

    let mut ranked = Vec::with_capacity(games.len());
    let mut current_year = None;
    let mut next_rank = 0;

    for record in games {
        let year_rank = if years.contains(&record.year) {
            if current_year != Some(record.year) {
                current_year = Some(record.year);
                next_rank = 0;
            }
            let rank = next_rank;
            next_rank += 1;
            Some(rank)
        } else {
            None
        };

        ranked.push(RankedGame {
            included: year_rank.is_some_and(|rank| rank < per_year),
            year_rank,
            record,
        });
    }

    ranked
}

/// The included games in ranking order.
pub fn select_top_per_year(
    games: Vec<GameRecord>,
    years: &RangeInclusive<i32>,
    per_year: usize,
) -> Vec<GameRecord> {
    let total = games.len();
    let selected: Vec<GameRecord> = rank_games(games, years, per_year)
        .into_iter()
        .filter(|ranked| ranked.included)
        .map(|ranked| ranked.record)
        .collect();

    info!(
        "selected {} of {} games ({} per year, {}-{})",
        selected.len(),
        total,
        per_year,
        years.start(),
        years.end()
    );
    selected
}
