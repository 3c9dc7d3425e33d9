use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use std::cell::Cell;
use std::io::{self, Read};
use std::mem;
use std::ops::{ControlFlow, Range};
use std::rc::Rc;

const UNKNOWN_DATE: &str = "????.??.??";

#[macro_export]
macro_rules! pgn_visitor_skip_variations {
    () => {
        fn nag(&mut self, _: &mut Self::Movetext, _: Nag) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn comment(
            &mut self,
            _: &mut Self::Movetext,
            _: RawComment<'_>,
        ) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn partial_comment(
            &mut self,
            _: &mut Self::Movetext,
            _: RawComment<'_>,
        ) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
            ControlFlow::Continue(Skip(true))
        }
    };
}

/// How a parser result is treated before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Game,
    /// Undated (`????.??.??` or no `Date` tag) or entirely empty entry.
    Placeholder,
    /// The parser gave up on this entry.
    Failed,
}

/// One entry of the archive as seen by the structured parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub date: Option<String>,
    pub result: Option<String>,
    pub white_elo: Option<String>,
    pub black_elo: Option<String>,
    pub tag_count: usize,
    pub ply_count: u32,
    pub parse_error: Option<String>,
    /// Byte range of the archive text the parser consumed for this entry.
    pub span: Range<usize>,
}

impl ArchiveEntry {
    pub fn failed(error: String) -> Self {
        Self {
            parse_error: Some(error),
            ..Self::default()
        }
    }

    pub fn kind(&self) -> EntryKind {
        if self.parse_error.is_some() {
            return EntryKind::Failed;
        }
        if self.has_unknown_date() || (self.tag_count == 0 && self.ply_count == 0) {
            return EntryKind::Placeholder;
        }
        EntryKind::Game
    }

    /// A missing tag counts as `????.??.??`.
    fn has_unknown_date(&self) -> bool {
        self.date
            .as_deref()
            .is_none_or(|date| date.trim() == UNKNOWN_DATE)
    }
}

#[derive(Default)]
struct HeaderFields {
    date: String,
    result: String,
    white_elo: String,
    black_elo: String,
    count: usize,
}

impl HeaderFields {
    fn clear(&mut self) {
        *self = Self::default();
    }

    fn opt_take(field: &mut String) -> Option<String> {
        if field.is_empty() {
            None
        } else {
            Some(mem::take(field))
        }
    }

    fn set_known_tag(&mut self, key: &[u8], value: RawTag<'_>) {
        self.count += 1;

        let slot: &mut String = match key {
            b"Date" => &mut self.date,
            b"Result" => &mut self.result,
            b"WhiteElo" => &mut self.white_elo,
            b"BlackElo" => &mut self.black_elo,
            _ => return,
        };

        if !slot.is_empty() {
            return;
        }

        let value = String::from_utf8_lossy(value.as_bytes());
        *slot = value.trim().to_string();
    }
}

/// Streaming visitor collecting the tags needed for selection and the number
/// of mainline plies. Movetext itself is rebuilt from raw lines elsewhere.
pub struct EntryVisitor {
    headers: HeaderFields,
    ply_count: u32,
    pub current_entry: Option<ArchiveEntry>,
}

impl EntryVisitor {
    pub fn new() -> Self {
        Self {
            headers: HeaderFields::default(),
            ply_count: 0,
            current_entry: None,
        }
    }

    fn build_entry(&mut self) {
        self.current_entry = Some(ArchiveEntry {
            date: HeaderFields::opt_take(&mut self.headers.date),
            result: HeaderFields::opt_take(&mut self.headers.result),
            white_elo: HeaderFields::opt_take(&mut self.headers.white_elo),
            black_elo: HeaderFields::opt_take(&mut self.headers.black_elo),
            tag_count: self.headers.count,
            ply_count: self.ply_count,
            parse_error: None,
            span: 0..0,
        });
    }
}

impl Default for EntryVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor for EntryVisitor {
    type Tags = ();
    type Movetext = ();
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        self.headers.clear();
        self.ply_count = 0;
        self.current_entry = None;
        ControlFlow::Continue(())
    }

    fn tag(
        &mut self,
        _: &mut Self::Tags,
        key: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        self.headers.set_known_tag(key, value);
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, _: &mut Self::Movetext, _: SanPlus) -> ControlFlow<Self::Output> {
        self.ply_count += 1;
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, _: Self::Movetext) -> Self::Output {
        self.build_entry();
    }
}

/// Byte source that records how much the parser has pulled from it.
pub struct CountingReader<R> {
    inner: R,
    consumed: Rc<Cell<usize>>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed.set(self.consumed.get() + n);
        Ok(n)
    }
}

/// Parser state for one archive text.
pub struct EntryReaderState<R: Read> {
    pub pgn_reader: Reader<CountingReader<R>>,
    pub next_entry_index: usize,
    pub visitor: EntryVisitor,
    consumed: Rc<Cell<usize>>,
}

impl<R: Read> EntryReaderState<R> {
    pub fn new(input: R) -> Self {
        let consumed = Rc::new(Cell::new(0));
        Self {
            pgn_reader: Reader::new(CountingReader {
                inner: input,
                consumed: Rc::clone(&consumed),
            }),
            next_entry_index: 1,
            visitor: EntryVisitor::new(),
            consumed,
        }
    }

    /// Offset of the next byte the parser will look at.
    pub fn position(&self) -> usize {
        self.consumed.get() - self.pgn_reader.buffer().len()
    }
}
