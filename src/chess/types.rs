/// A validated game from the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameRecord {
    /// 1-based position among the real games of the archive.
    pub game: usize,
    pub year: i32,
    /// 0 when the tag is missing.
    pub white_elo: u32,
    /// 0 when the tag is missing.
    pub black_elo: u32,
    pub result: String,
    /// Line-reconstructed movetext with `{[...]}` commentary removed.
    pub movetext: String,
}

impl GameRecord {
    pub fn combined_rating(&self) -> u32 {
        self.white_elo + self.black_elo
    }
}

/// Normalized advantage after one ply: +1 is winning for White, -1 for Black.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveScore {
    Scored(f64),
    /// The engine reported mate (or a terminal position) without centipawns.
    Unscored,
}

impl MoveScore {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Scored(v) => Some(v),
            Self::Unscored => None,
        }
    }
}

/// An included game together with one score per ply actually played.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedGame {
    pub record: GameRecord,
    pub scores: Vec<MoveScore>,
}

impl AnalyzedGame {
    pub fn move_count(&self) -> usize {
        self.scores.len()
    }
}
