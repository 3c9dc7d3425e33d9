use shakmaty::fen::Fen;
use shakmaty::{Chess, Color, EnPassantMode, Position};

use super::filter::{MoveList, parse_movetext_mainline};

/// Positions reached by replaying a movetext's mainline from the standard
/// start, one per ply. Stops at the first move that cannot be played.
pub struct Mainline {
    position: Chess,
    sans: smallvec::IntoIter<[pgn_reader::SanPlus; 128]>,
    ply: usize,
    stopped: Option<String>,
}

impl Mainline {
    pub fn new(movetext: &str) -> Self {
        let parsed = parse_movetext_mainline(movetext);
        if parsed.parse_error {
            let mut mainline = Self::from_sans(MoveList::new());
            mainline.stopped = Some("movetext could not be parsed".to_string());
            return mainline;
        }
        Self::from_sans(parsed.sans)
    }

    fn from_sans(sans: MoveList) -> Self {
        Self {
            position: Chess::default(),
            sans: sans.into_iter(),
            ply: 0,
            stopped: None,
        }
    }

    /// Why replay ended early, if it did.
    pub fn stop_reason(&self) -> Option<&str> {
        self.stopped.as_deref()
    }
}

impl Iterator for Mainline {
    type Item = Chess;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped.is_some() {
            return None;
        }

        let san_plus = self.sans.next()?;
        match san_plus.san.to_move(&self.position) {
            Ok(m) => {
                self.position.play_unchecked(m);
                self.ply += 1;
                Some(self.position.clone())
            }
            Err(e) => {
                self.stopped = Some(format!("ply {}: {} ({})", self.ply + 1, san_plus, e));
                None
            }
        }
    }
}

pub fn fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

pub fn side_to_move(pos: &Chess) -> Color {
    pos.turn()
}
