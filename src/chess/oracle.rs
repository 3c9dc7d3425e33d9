//! Engine side of the analysis: the [`Oracle`] seam, a UCI child process
//! implementing it, and the conversion of raw scores into [`MoveScore`]s.
//!
//! Queries are synchronous: a search blocks until the engine prints
//! `bestmove`. There is no timeout and no cancellation; an engine that hangs
//! stalls the batch.

use log::debug;
use shakmaty::{Chess, Color};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use super::error::OracleError;
use super::moves::{fen, side_to_move};
use super::types::MoveScore;

/// Raw engine score, from the point of view of the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Centipawns(i32),
    /// Mate in n plies for the side to move (negative: getting mated).
    Mate(i32),
}

pub trait Oracle {
    /// Scores `position` searching to `depth` plies.
    fn analyse(&mut self, position: &Chess, depth: u32) -> Result<Evaluation, OracleError>;

    /// Called before the first query of each game.
    fn new_game(&mut self) -> Result<(), OracleError> {
        Ok(())
    }
}

impl<O: Oracle + ?Sized> Oracle for &mut O {
    fn analyse(&mut self, position: &Chess, depth: u32) -> Result<Evaluation, OracleError> {
        (**self).analyse(position, depth)
    }

    fn new_game(&mut self) -> Result<(), OracleError> {
        (**self).new_game()
    }
}

/// Ply used with the WDL model, as the engine's own default.
const WDL_PLY: u32 = 30;
const NORMALIZE_TO_PAWN_VALUE: f64 = 328.0;

/// Stockfish 16 logistic model parameters at `ply`. At move 32 (`m == 1`)
/// `a` is the centipawn value of a pawn, `NORMALIZE_TO_PAWN_VALUE`.
fn win_rate_params(ply: u32) -> (f64, f64) {
    let m = f64::from(ply.min(240)) / 64.0;
    let a = (((0.380_365_25 * m - 2.820_150_70) * m + 23.178_821_35) * m) + 307.367_684_07;
    let b = (((-2.294_347_33 * m + 13.276_897_88) * m - 14.268_289_04) * m) + 63.453_183_30;
    (a, b)
}

/// Win rate, in permille, for `cp` from the mover's side.
fn win_rate_permille(cp: i32, ply: u32) -> f64 {
    let (a, b) = win_rate_params(ply);
    let x = (f64::from(cp) * NORMALIZE_TO_PAWN_VALUE / 100.0).clamp(-4000.0, 4000.0);
    (0.5 + 1000.0 / (1.0 + ((a - x) / b).exp())).floor()
}

/// Expected score in `[0, 1]` for the side to move.
pub fn wdl_expectation(cp: i32) -> f64 {
    let wins = win_rate_permille(cp, WDL_PLY);
    let losses = win_rate_permille(-cp, WDL_PLY);
    let draws = 1000.0 - wins - losses;
    (wins + draws / 2.0) / 1000.0
}

/// Maps an evaluation of a position where `turn` is to move onto `[-1, 1]`
/// from White's side. Mate scores carry no centipawns and stay unscored.
pub fn normalize(evaluation: Evaluation, turn: Color) -> MoveScore {
    match evaluation {
        Evaluation::Centipawns(cp) => {
            let mut expectation = wdl_expectation(cp);
            if turn == Color::Black {
                expectation = 1.0 - expectation;
            }
            MoveScore::Scored(expectation * 2.0 - 1.0)
        }
        Evaluation::Mate(_) => MoveScore::Unscored,
    }
}

/// Reads the `score` of a UCI `info` line, ignoring lines without one.
pub fn parse_info_score(line: &str) -> Option<Evaluation> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "info" {
        return None;
    }
    while let Some(token) = tokens.next() {
        if token != "score" {
            continue;
        }
        let kind = tokens.next()?;
        let value: i32 = tokens.next()?.parse().ok()?;
        return match kind {
            "cp" => Some(Evaluation::Centipawns(value)),
            "mate" => Some(Evaluation::Mate(value)),
            _ => None,
        };
    }
    None
}

/// A long-lived UCI engine process. Dropping it sends `quit` and waits for
/// the child to exit.
pub struct UciEngine {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    name: String,
}

impl UciEngine {
    pub fn spawn(command: &str) -> Result<Self, OracleError> {
        let mut child = Command::new(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| OracleError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(OracleError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(OracleError::MissingPipe("stdout"))?;

        let mut engine = Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            name: command.to_string(),
        };
        engine.initialize()?;
        Ok(engine)
    }

    fn initialize(&mut self) -> Result<(), OracleError> {
        self.write_line("uci")?;
        loop {
            let line = self.read_line()?;
            if let Some(name) = line.strip_prefix("id name ") {
                self.name = name.trim().to_string();
            } else if line.trim() == "uciok" {
                break;
            }
        }
        self.sync_ready()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sync_ready(&mut self) -> Result<(), OracleError> {
        self.write_line("isready")?;
        loop {
            if self.read_line()?.trim() == "readyok" {
                return Ok(());
            }
        }
    }

    fn write_line(&mut self, msg: &str) -> Result<(), OracleError> {
        self.stdin.write_all(msg.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, OracleError> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(OracleError::Disconnected);
        }
        Ok(line)
    }
}

impl Oracle for UciEngine {
    fn analyse(&mut self, position: &Chess, depth: u32) -> Result<Evaluation, OracleError> {
        self.write_line(&format!("position fen {}", fen(position)))?;
        self.write_line(&format!("go depth {depth}"))?;

        let mut score = None;
        loop {
            let line = self.read_line()?;
            if line.starts_with("bestmove") {
                break;
            }
            if let Some(evaluation) = parse_info_score(&line) {
                score = Some(evaluation);
            }
        }

        let score = score.ok_or(OracleError::NoScore)?;
        debug!("{:?} to move: {:?}", side_to_move(position), score);
        Ok(score)
    }

    fn new_game(&mut self) -> Result<(), OracleError> {
        self.write_line("ucinewgame")?;
        self.sync_ready()
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.write_line("quit");
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_position_is_zero() {
        assert!((wdl_expectation(0) - 0.5).abs() < 1e-12);
        assert_eq!(
            normalize(Evaluation::Centipawns(0), Color::White),
            MoveScore::Scored(0.0)
        );
    }

    #[test]
    fn test_white_advantage_maps_near_plus_one() {
        let score = normalize(Evaluation::Centipawns(200), Color::White)
            .value()
            .unwrap();
        assert!(score > 0.5, "got {score}");
        assert!(score <= 1.0);
    }

    #[test]
    fn test_black_to_move_mirrors_sign() {
        let white = normalize(Evaluation::Centipawns(200), Color::White)
            .value()
            .unwrap();
        let black = normalize(Evaluation::Centipawns(200), Color::Black)
            .value()
            .unwrap();
        assert!(black < -0.5, "got {black}");
        assert!((white + black).abs() < 1e-12);
    }

    #[test]
    fn test_expectation_is_monotonic_and_bounded() {
        let mut previous = 0.0;
        for cp in (-3000..=3000).step_by(50) {
            let e = wdl_expectation(cp);
            assert!((0.0..=1.0).contains(&e));
            assert!(e >= previous);
            previous = e;
        }
    }

    #[test]
    fn test_mate_is_unscored() {
        assert_eq!(
            normalize(Evaluation::Mate(3), Color::White),
            MoveScore::Unscored
        );
        assert_eq!(
            normalize(Evaluation::Mate(0), Color::Black),
            MoveScore::Unscored
        );
    }

    #[test]
    fn test_parse_info_score() {
        assert_eq!(
            parse_info_score("info depth 17 seldepth 22 multipv 1 score cp -35 nodes 1 pv e7e5"),
            Some(Evaluation::Centipawns(-35))
        );
        assert_eq!(
            parse_info_score("info depth 0 score mate 0"),
            Some(Evaluation::Mate(0))
        );
        assert_eq!(
            parse_info_score("info depth 12 score cp 20 lowerbound nodes 10"),
            Some(Evaluation::Centipawns(20))
        );
        assert_eq!(parse_info_score("info depth 3 currmove e2e4 currmovenumber 1"), None);
        assert_eq!(parse_info_score("bestmove e2e4"), None);
        assert_eq!(parse_info_score("info string score cp unknown"), None);
    }

    #[test]
    fn test_model_matches_pawn_normalization() {
        let (a, _) = win_rate_params(64);
        assert_eq!(a.trunc(), NORMALIZE_TO_PAWN_VALUE);
        // One pawn up at move 32 is a 50% win chance.
        assert_eq!(win_rate_permille(100, 64), 500.0);
    }

    #[cfg(unix)]
    mod uci {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};
        use std::thread;
        use std::time::Duration;

        const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

        /// Writes a shell engine that logs every command and answers `go`
        /// with `on_go`.
        fn scripted_engine(dir: &Path, name: &str, on_go: &str) -> PathBuf {
            let path = dir.join(name);
            let log = dir.join(format!("{name}.log"));
            let script = format!(
                r#"#!/bin/sh
while read -r cmd; do
  echo "$cmd" >> '{log}'
  case "$cmd" in
    uci) echo "id name Scripted 1.0"; echo "option name Hash type spin default 16"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) {on_go} ;;
    quit) exit 0 ;;
  esac
done
"#,
                log = log.display(),
            );
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn commands(engine: &Path) -> String {
            fs::read_to_string(format!("{}.log", engine.display())).unwrap_or_default()
        }

        // A freshly written script can be briefly busy while another test
        // thread forks.
        fn spawn(path: &Path) -> Result<UciEngine, OracleError> {
            let command = path.display().to_string();
            let mut attempts = 0;
            loop {
                match UciEngine::spawn(&command) {
                    Err(OracleError::Spawn { source, .. })
                        if source.raw_os_error() == Some(26) && attempts < 10 =>
                    {
                        attempts += 1;
                        thread::sleep(Duration::from_millis(20));
                    }
                    result => return result,
                }
            }
        }

        #[test]
        fn test_handshake_and_last_score_wins() {
            let dir = tempfile::tempdir().unwrap();
            let path = scripted_engine(
                dir.path(),
                "engine",
                r#"echo "info depth 1 score cp 10"; echo "info depth 2 score cp -42 pv e7e5"; echo "bestmove e7e5""#,
            );

            let mut engine = spawn(&path).unwrap();
            assert_eq!(engine.name(), "Scripted 1.0");

            engine.new_game().unwrap();
            assert_eq!(
                engine.analyse(&Chess::default(), 5).unwrap(),
                Evaluation::Centipawns(-42)
            );
            drop(engine);

            let log = commands(&path);
            let sent: Vec<&str> = log.lines().collect();
            let position = format!("position fen {START_FEN}");
            assert_eq!(
                sent,
                vec![
                    "uci",
                    "isready",
                    "ucinewgame",
                    "isready",
                    position.as_str(),
                    "go depth 5",
                    "quit",
                ]
            );
        }

        #[test]
        fn test_mate_score_is_reported() {
            let dir = tempfile::tempdir().unwrap();
            let path = scripted_engine(
                dir.path(),
                "engine",
                r#"echo "info depth 9 score mate -2"; echo "bestmove (none)""#,
            );

            let mut engine = spawn(&path).unwrap();
            assert_eq!(
                engine.analyse(&Chess::default(), 9).unwrap(),
                Evaluation::Mate(-2)
            );
        }

        #[test]
        fn test_search_without_score_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = scripted_engine(
                dir.path(),
                "engine",
                r#"echo "info depth 1 nodes 20"; echo "bestmove e2e4""#,
            );

            let mut engine = spawn(&path).unwrap();
            assert!(matches!(
                engine.analyse(&Chess::default(), 1),
                Err(OracleError::NoScore)
            ));
        }

        #[test]
        fn test_engine_exit_mid_search_is_disconnected() {
            let dir = tempfile::tempdir().unwrap();
            let path = scripted_engine(dir.path(), "engine", "exit 0");

            let mut engine = spawn(&path).unwrap();
            assert!(matches!(
                engine.analyse(&Chess::default(), 1),
                Err(OracleError::Disconnected)
            ));
        }

        #[test]
        fn test_engine_exit_during_handshake_is_disconnected() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("engine");
            fs::write(&path, "#!/bin/sh\nread -r cmd\nexit 0\n").unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

            assert!(matches!(spawn(&path), Err(OracleError::Disconnected)));
        }
    }
}
