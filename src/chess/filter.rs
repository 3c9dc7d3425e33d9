use pgn_reader::{Nag, RawComment, Reader, SanPlus, Skip, Visitor};
use regex::Regex;
use smallvec::SmallVec;
use std::io;
use std::ops::ControlFlow;
use std::sync::LazyLock;

use crate::pgn_visitor_skip_variations;

pub(crate) type MoveList = SmallVec<[SanPlus; 128]>;

/// Engine annotations such as `{[%eval 0.3]}` or `{[%clk 0:01:00]}`.
static COMMENTARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\[.*?\]\}").expect("valid commentary regex"));

/// Tag lines, quoted or not: `[Event "Hastings"]`, `[Round 1]`.
static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[\s*[A-Za-z0-9_]+(\s.*)?\]\s*$").expect("valid header regex")
});

// `1.` but never `11.`
static MOVES_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1\.").expect("valid move start regex"));

/// Replaces every `{[...]}` span with a single space.
pub fn strip_commentary(movetext: &str) -> String {
    COMMENTARY.replace_all(movetext, " ").into_owned()
}

pub fn is_header_line(line: &str) -> bool {
    HEADER_LINE.is_match(line)
}

/// Lines of an entry that belong to its movetext: not blank, not a tag line,
/// not a `%` escape line.
fn movetext_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty() && !line.starts_with('%') && !is_header_line(line))
}

/// Rebuilds an entry's movetext from its raw lines, joined with single spaces
/// and with commentary stripped.
pub fn movetext_from_lines(raw: &str) -> String {
    let joined = movetext_lines(raw).collect::<Vec<_>>().join(" ");
    strip_commentary(&joined)
}

/// Whether the entry's movetext opens with the first move (`1.`). A tagless
/// entry that does not is the tail of the game before it.
pub fn opens_with_first_move(raw: &str) -> bool {
    movetext_lines(raw)
        .next()
        .is_some_and(|line| MOVES_START.is_match(line))
}

pub(crate) struct ParsedMovetext {
    pub sans: MoveList,
    pub parse_error: bool,
}

/// Mainline SANs of a movetext; variations, comments and NAGs are skipped.
pub(crate) fn parse_movetext_mainline(movetext: &str) -> ParsedMovetext {
    if movetext.trim().is_empty() {
        return ParsedMovetext {
            sans: MoveList::new(),
            parse_error: false,
        };
    }

    let mut reader = Reader::new(io::Cursor::new(movetext.as_bytes()));
    let mut visitor = MainlineVisitor::default();

    match reader.read_game(&mut visitor) {
        Ok(Some(())) => ParsedMovetext {
            sans: visitor.sans,
            parse_error: false,
        },
        Ok(None) | Err(_) => ParsedMovetext {
            sans: visitor.sans,
            parse_error: true,
        },
    }
}

#[derive(Default)]
struct MainlineVisitor {
    sans: MoveList,
}

impl Visitor for MainlineVisitor {
    type Tags = ();
    type Movetext = ();
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        self.sans.clear();
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(())
    }

    fn san(
        &mut self,
        _movetext: &mut Self::Movetext,
        san_plus: SanPlus,
    ) -> ControlFlow<Self::Output> {
        self.sans.push(san_plus);
        ControlFlow::Continue(())
    }

    pgn_visitor_skip_variations!();

    fn end_game(&mut self, _movetext: Self::Movetext) -> Self::Output {}
}
