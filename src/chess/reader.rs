use super::{
    error::{ArchiveError, ErrorAccumulator},
    filter::{movetext_from_lines, opens_with_first_move},
    types::GameRecord,
    visitor::{ArchiveEntry, EntryKind, EntryReaderState},
};
use log::{debug, info, warn};
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use zstd::stream::read::Decoder as ZstdDecoder;

/// Parse steps between two progress lines.
pub const PARSE_PROGRESS_INTERVAL: usize = 10_000;

static EVENT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[Event\s").expect("valid event tag regex"));

static YEAR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}").expect("valid year regex"));

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CompressionMode {
    Plain,
    Zstd,
}

impl CompressionMode {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("zst") => Self::Zstd,
            _ => Self::Plain,
        }
    }
}

fn resolve_paths(pattern: &str) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut paths: Vec<PathBuf> = if pattern.contains('*') || pattern.contains('?') {
        glob::glob(pattern)
            .map_err(|source| ArchiveError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?
            .filter_map(|entry| entry.ok())
            .collect()
    } else {
        vec![PathBuf::from(pattern)]
    };

    if paths.is_empty() {
        return Err(ArchiveError::NoMatch(pattern.to_string()));
    }

    paths.sort();
    Ok(paths)
}

fn read_source(path: &Path) -> Result<String, ArchiveError> {
    let read_err = |source| ArchiveError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_err)?;
    let mut bytes = Vec::new();
    match CompressionMode::from_path(path) {
        CompressionMode::Plain => {
            let mut file = file;
            file.read_to_end(&mut bytes).map_err(read_err)?;
        }
        CompressionMode::Zstd => {
            let mut decoder = ZstdDecoder::new(file).map_err(read_err)?;
            decoder.read_to_end(&mut bytes).map_err(read_err)?;
        }
    }

    let text = String::from_utf8_lossy(&bytes);
    Ok(text.strip_prefix('\u{feff}').unwrap_or(&text).to_string())
}

/// Counters describing what happened to the archive's entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub entries: usize,
    pub placeholders: usize,
    pub failures: usize,
    pub dropped: usize,
}

impl ArchiveStats {
    pub fn games(&self) -> usize {
        self.entries - self.placeholders - self.failures
    }
}

pub struct ArchiveReport {
    pub games: Vec<GameRecord>,
    pub stats: ArchiveStats,
}

/// The whole archive held in memory. Each parsed entry keeps the byte range
/// it was read from, and its movetext is rebuilt from those lines.
pub struct Archive {
    text: String,
}

impl Archive {
    /// Opens a path or glob pattern. Matching files are read in sorted order,
    /// `.zst` files decompressed, and joined into one archive.
    pub fn open(pattern: &str) -> Result<Self, ArchiveError> {
        let mut text = String::new();
        for path in resolve_paths(pattern)? {
            debug!("reading archive '{}'", path.display());
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&read_source(&path)?);
        }
        Ok(Self { text })
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of `[Event ...]` tag lines. Only used to size progress output.
    pub fn count_games(&self) -> usize {
        self.text
            .lines()
            .filter(|line| EVENT_TAG.is_match(line))
            .count()
    }

    pub fn parse_entries(&self) -> Vec<ArchiveEntry> {
        let expected = self.count_games();
        let mut state = EntryReaderState::new(self.text.as_bytes());
        let mut entries = Vec::with_capacity(expected);

        while let ReadNextEntryOutcome::EntryReady(entry) = read_next_entry(&mut state) {
            entries.push(entry);
            if entries.len().is_multiple_of(PARSE_PROGRESS_INTERVAL) {
                info!("progress: {} out of {}", entries.len(), expected);
            }
        }

        entries
    }

    /// Raw text an entry was parsed from.
    pub fn entry_text(&self, entry: &ArchiveEntry) -> &str {
        self.text.get(entry.span.clone()).unwrap_or_default()
    }

    /// A blank line ends a game for the parser, so moves after one come back
    /// as a separate tagless entry. Those are folded into the entry before.
    fn merge_continuations(&self, entries: Vec<ArchiveEntry>) -> Vec<ArchiveEntry> {
        let mut merged: Vec<ArchiveEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            let continues = entry.tag_count == 0
                && entry.parse_error.is_none()
                && !opens_with_first_move(self.entry_text(&entry));

            match merged.last_mut() {
                Some(previous) if continues => {
                    debug!(
                        "joining movetext at bytes {:?} onto the previous entry",
                        entry.span
                    );
                    previous.span.end = entry.span.end;
                    previous.ply_count += entry.ply_count;
                }
                _ => merged.push(entry),
            }
        }
        merged
    }

    /// Parses, filters and validates every game of the archive. Malformed
    /// entries are counted and skipped; they never stop the read.
    pub fn read_games(&self) -> ArchiveReport {
        info!("number of games = {}", self.count_games());

        let entries = self.merge_continuations(self.parse_entries());
        let mut stats = ArchiveStats {
            entries: entries.len(),
            ..ArchiveStats::default()
        };

        let mut real = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.kind() {
                EntryKind::Game => real.push(entry),
                EntryKind::Placeholder => stats.placeholders += 1,
                EntryKind::Failed => stats.failures += 1,
            }
        }

        let mut games = Vec::with_capacity(real.len());
        for (index, entry) in real.into_iter().enumerate() {
            let game = index + 1;
            let movetext = movetext_from_lines(self.entry_text(&entry));
            match validate_entry(game, entry, movetext) {
                Ok(record) => games.push(record),
                Err(reason) => {
                    debug!("dropping game {}: {}", game, reason);
                    stats.dropped += 1;
                }
            }
        }

        info!(
            "archive: {} entries, {} placeholders, {} parse failures, {} dropped, {} valid games",
            stats.entries,
            stats.placeholders,
            stats.failures,
            stats.dropped,
            games.len()
        );

        ArchiveReport { games, stats }
    }
}

enum ReadNextEntryOutcome {
    EntryReady(ArchiveEntry),
    ReaderFinished,
}

fn read_next_entry<R: Read>(reader: &mut EntryReaderState<R>) -> ReadNextEntryOutcome {
    let entry_index = reader.next_entry_index;
    let start = reader.position();

    match reader.pgn_reader.read_game(&mut reader.visitor) {
        Ok(Some(_)) => {
            reader.next_entry_index += 1;
            match reader.visitor.current_entry.take() {
                Some(mut entry) => {
                    entry.span = start..reader.position();
                    ReadNextEntryOutcome::EntryReady(entry)
                }
                None => ReadNextEntryOutcome::ReaderFinished,
            }
        }
        Ok(None) => ReadNextEntryOutcome::ReaderFinished,
        Err(error) => {
            reader.next_entry_index += 1;
            let error_msg = format!(
                "Parser-stage error: stage=read_game; entry_index={}; error={}",
                entry_index, error
            );
            warn!("{}", error_msg);
            let mut entry = ArchiveEntry::failed(error_msg);
            entry.span = start..reader.position();
            ReadNextEntryOutcome::EntryReady(entry)
        }
    }
}

fn parse_year(date: &str) -> Option<i32> {
    YEAR_PREFIX.find(date.trim())?.as_str().parse().ok()
}

fn parse_rating(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok()).unwrap_or(0)
}

/// Turns an entry into a record, or explains why it is dropped. Year and
/// result are required; a missing or non-numeric rating becomes 0.
pub fn validate_entry(
    game: usize,
    entry: ArchiveEntry,
    movetext: String,
) -> Result<GameRecord, String> {
    let mut issues = ErrorAccumulator::default();

    let year = entry.date.as_deref().and_then(parse_year);
    if year.is_none() {
        match entry.date.as_deref() {
            Some(date) => issues.push(&format!("no year in Date='{date}'")),
            None => issues.push("missing Date"),
        }
    }
    if entry.result.is_none() {
        issues.push("missing Result");
    }

    match (year, entry.result) {
        (Some(year), Some(result)) => Ok(GameRecord {
            game,
            year,
            white_elo: parse_rating(entry.white_elo.as_deref()),
            black_elo: parse_rating(entry.black_elo.as_deref()),
            result,
            movetext,
        }),
        _ => Err(issues.take().unwrap_or_default()),
    }
}
