use std::io;
use std::path::PathBuf;

/// Collects the reasons a candidate game is dropped, joined with `"; "`.
#[derive(Debug, Clone, Default)]
pub struct ErrorAccumulator(Option<String>);

impl ErrorAccumulator {
    pub fn push(&mut self, msg: &str) {
        match &mut self.0 {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(msg);
            }
            None => {
                self.0 = Some(msg.to_string());
            }
        }
    }

    pub fn take(&mut self) -> Option<String> {
        self.0.take()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("invalid archive pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("no archive matches '{0}'")]
    NoMatch(String),

    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum OracleError {
    #[error("failed to launch engine '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("engine pipe unavailable: {0}")]
    MissingPipe(&'static str),

    #[error("engine exited unexpectedly")]
    Disconnected,

    #[error("engine finished the search without reporting a score")]
    NoScore,

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    DuckDb(#[from] duckdb::Error),

    #[error("output path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
