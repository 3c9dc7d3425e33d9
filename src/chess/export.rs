use duckdb::types::Value;
use duckdb::{Connection, params_from_iter};
use log::info;
use std::path::Path;

use super::error::ExportError;
use super::types::AnalyzedGame;

const TABLE_NAME: &str = "analysed";
const ROW_INDEX_COLUMN: &str = "row_index";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ExportLogicalType {
    BigInt,
    Integer,
    Varchar,
    Double,
}

impl ExportLogicalType {
    fn sql(self) -> &'static str {
        match self {
            Self::BigInt => "BIGINT",
            Self::Integer => "INTEGER",
            Self::Varchar => "VARCHAR",
            Self::Double => "DOUBLE",
        }
    }
}

struct ExportColumnDef {
    name: &'static str,
    logical_type: ExportLogicalType,
}

const LEADING_COLUMNS: [ExportColumnDef; 8] = [
    ExportColumnDef {
        name: "game",
        logical_type: ExportLogicalType::BigInt,
    },
    ExportColumnDef {
        name: "year",
        logical_type: ExportLogicalType::Integer,
    },
    ExportColumnDef {
        name: "w_elo",
        logical_type: ExportLogicalType::BigInt,
    },
    ExportColumnDef {
        name: "b_elo",
        logical_type: ExportLogicalType::BigInt,
    },
    ExportColumnDef {
        name: "outcome",
        logical_type: ExportLogicalType::Varchar,
    },
    ExportColumnDef {
        name: "moves",
        logical_type: ExportLogicalType::Varchar,
    },
    ExportColumnDef {
        name: "total_elo",
        logical_type: ExportLogicalType::BigInt,
    },
    ExportColumnDef {
        name: "n_moves",
        logical_type: ExportLogicalType::BigInt,
    },
];

/// The wide result table: fixed metadata columns, then one score column per
/// ply index. Cells a game does not reach are NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    pub ply_columns: usize,
    pub rows: Vec<Vec<Value>>,
}

impl ScoreTable {
    pub fn column_names(&self) -> Vec<String> {
        LEADING_COLUMNS
            .iter()
            .map(|column| column.name.to_string())
            .chain((0..self.ply_columns).map(|ply| ply.to_string()))
            .collect()
    }

    fn column_types(&self) -> impl Iterator<Item = ExportLogicalType> + '_ {
        LEADING_COLUMNS
            .iter()
            .map(|column| column.logical_type)
            .chain((0..self.ply_columns).map(|_| ExportLogicalType::Double))
    }
}

/// Lays the analysed games out as rows, in the given order.
pub fn build_table(games: &[AnalyzedGame]) -> ScoreTable {
    let ply_columns = games.iter().map(AnalyzedGame::move_count).max().unwrap_or(0);

    let rows = games
        .iter()
        .map(|analysed| {
            let record = &analysed.record;
            let mut row = Vec::with_capacity(LEADING_COLUMNS.len() + ply_columns);
            row.push(Value::BigInt(record.game as i64));
            row.push(Value::Int(record.year));
            row.push(Value::BigInt(i64::from(record.white_elo)));
            row.push(Value::BigInt(i64::from(record.black_elo)));
            row.push(Value::Text(record.result.clone()));
            row.push(Value::Text(record.movetext.clone()));
            row.push(Value::BigInt(i64::from(record.combined_rating())));
            row.push(Value::BigInt(analysed.move_count() as i64));

            row.extend(
                analysed
                    .scores
                    .iter()
                    .map(|score| score.value().map_or(Value::Null, Value::Double)),
            );
            row.resize(LEADING_COLUMNS.len() + ply_columns, Value::Null);
            row
        })
        .collect();

    ScoreTable { ply_columns, rows }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn create_table_sql(table: &ScoreTable) -> String {
    let columns: Vec<String> = std::iter::once(format!(
        "{} BIGINT",
        quote_identifier(ROW_INDEX_COLUMN)
    ))
    .chain(
        table
            .column_names()
            .iter()
            .zip(table.column_types())
            .map(|(name, logical_type)| {
                format!("{} {}", quote_identifier(name), logical_type.sql())
            }),
    )
    .collect();

    format!("CREATE TABLE {TABLE_NAME} ({})", columns.join(", "))
}

/// Loads the table into an in-memory DuckDB and writes it to `path` as CSV
/// with a header row in one `COPY`. Rows are numbered 0.. in table order and
/// written in that order; the numbering itself is not exported.
pub fn write_csv(table: &ScoreTable, path: &Path) -> Result<(), ExportError> {
    let target = path
        .to_str()
        .ok_or_else(|| ExportError::NonUtf8Path(path.to_path_buf()))?;

    let mut conn = Connection::open_in_memory()?;
    conn.execute_batch(&create_table_sql(table))?;

    let width = 1 + LEADING_COLUMNS.len() + table.ply_columns;
    let placeholders = vec!["?"; width].join(", ");
    let insert_sql = format!("INSERT INTO {TABLE_NAME} VALUES ({placeholders})");

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&insert_sql)?;
        for (row_index, row) in table.rows.iter().enumerate() {
            let values = std::iter::once(Value::BigInt(row_index as i64)).chain(row.iter().cloned());
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    conn.execute_batch(&format!(
        "COPY (SELECT * EXCLUDE ({row}) FROM {TABLE_NAME} ORDER BY {row}) TO {target} (HEADER, DELIMITER ',')",
        row = quote_identifier(ROW_INDEX_COLUMN),
        target = quote_literal(target),
    ))?;

    info!(
        "saved {} rows x {} ply columns to '{}'",
        table.rows.len(),
        table.ply_columns,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::types::{GameRecord, MoveScore};

    fn analysed(game: usize, scores: Vec<MoveScore>) -> AnalyzedGame {
        AnalyzedGame {
            record: GameRecord {
                game,
                year: 1965,
                white_elo: 2600,
                black_elo: 0,
                result: "1/2-1/2".to_string(),
                movetext: "1. e4, e5".to_string(),
            },
            scores,
        }
    }

    #[test]
    fn test_build_table_pads_short_games_with_null() {
        let games = vec![
            analysed(9, vec![MoveScore::Scored(0.25), MoveScore::Unscored, MoveScore::Scored(-0.5)]),
            analysed(4, vec![MoveScore::Scored(0.1)]),
        ];

        let table = build_table(&games);

        assert_eq!(table.ply_columns, 3);
        assert_eq!(
            table.column_names(),
            vec![
                "game", "year", "w_elo", "b_elo", "outcome", "moves", "total_elo", "n_moves",
                "0", "1", "2"
            ]
        );
        assert_eq!(table.rows[0][0], Value::BigInt(9));
        assert_eq!(table.rows[0][6], Value::BigInt(2600));
        assert_eq!(table.rows[0][7], Value::BigInt(3));
        assert_eq!(table.rows[0][9], Value::Null);
        assert_eq!(table.rows[1][7], Value::BigInt(1));
        assert_eq!(table.rows[1][8], Value::Double(0.1));
        assert_eq!(table.rows[1][9], Value::Null);
        assert_eq!(table.rows[1][10], Value::Null);
    }

    #[test]
    fn test_move_count_matches_score_columns() {
        let games = vec![
            analysed(1, vec![MoveScore::Scored(0.0); 5]),
            analysed(2, vec![MoveScore::Unscored; 2]),
        ];

        let table = build_table(&games);

        for (row, game) in table.rows.iter().zip(&games) {
            assert_eq!(row.len(), LEADING_COLUMNS.len() + table.ply_columns);
            assert_eq!(row[7], Value::BigInt(game.scores.len() as i64));
        }
    }

    #[test]
    fn test_write_csv_header_and_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let table = build_table(&[
            analysed(3, vec![MoveScore::Scored(0.5), MoveScore::Unscored]),
            analysed(1, vec![MoveScore::Scored(-1.0)]),
        ]);

        write_csv(&table, &path).unwrap();

        let csv = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "game,year,w_elo,b_elo,outcome,moves,total_elo,n_moves,0,1"
        );
        assert_eq!(lines[1], "3,1965,2600,0,1/2-1/2,\"1. e4, e5\",2600,2,0.5,");
        assert_eq!(lines[2], "1,1965,2600,0,1/2-1/2,\"1. e4, e5\",2600,1,-1.0,");
    }

    #[test]
    fn test_write_csv_without_games() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        write_csv(&build_table(&[]), &path).unwrap();

        let csv = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            csv.lines().next(),
            Some("game,year,w_elo,b_elo,outcome,moves,total_elo,n_moves")
        );
    }

    #[test]
    fn test_quote_literal_escapes_single_quotes() {
        assert_eq!(quote_literal("/tmp/it's.csv"), "'/tmp/it''s.csv'");
    }
}
