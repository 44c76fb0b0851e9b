use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{params, Connection, OpenFlags};

use super::{Instruction, LineRange, Mode, ResultRow, SourceLine, Store, StoreError};

/// Tables a usable campaign database has to carry.
const REQUIRED_TABLES: &[&str] = &[
    "variant",
    "trace",
    "fsppilot",
    "objdump",
    "fulltrace",
    "dbg_filename",
    "dbg_mapping",
    "dbg_source",
];

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    result_table: String,
}

impl SqliteStore {
    /// Opens the campaign database read-only.
    ///
    /// `result_table` is server configuration, not request input, but it is
    /// the one identifier that ends up in query text, so it is checked
    /// against an identifier grammar before anything runs.
    pub fn open(path: &Path, result_table: &str) -> Result<Self, StoreError> {
        check_table_name(result_table)?;
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self {
            conn,
            result_table: result_table.to_string(),
        })
    }

    #[cfg(test)]
    fn open_in_memory(result_table: &str) -> Result<Self, StoreError> {
        check_table_name(result_table)?;
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            result_table: result_table.to_string(),
        })
    }

    /// The weight of a qualifying interval is its duration, so a count is
    /// exposure time, not a number of occurrences. Only read accesses
    /// qualify. Grouping by (key, resulttype) replaces the pivot columns
    /// the original query built out of the kind names.
    fn aggregate_sql(&self, mode: Mode) -> String {
        match mode {
            Mode::RightEdge => format!(
                "SELECT t.instr2_absolute, r.resulttype, SUM(t.time2 - t.time1 + 1) \
                 FROM trace t \
                 JOIN fsppilot p ON p.variant_id = t.variant_id \
                   AND p.data_address = t.data_address \
                   AND p.instr2 = t.instr2 \
                 JOIN {r} r ON r.pilot_id = p.id \
                 WHERE t.variant_id = ?1 AND t.accesstype = 'R' \
                 GROUP BY t.instr2_absolute, r.resulttype",
                r = self.result_table
            ),
            Mode::LatestIp => format!(
                "SELECT r.latest_ip, r.resulttype, SUM(t.time2 - t.time1 + 1) \
                 FROM trace t \
                 JOIN fsppilot p ON p.variant_id = t.variant_id \
                   AND p.data_address = t.data_address \
                   AND p.instr2 = t.instr2 \
                 JOIN {r} r ON r.pilot_id = p.id \
                 WHERE t.variant_id = ?1 AND t.accesstype = 'R' \
                 GROUP BY r.latest_ip, r.resulttype",
                r = self.result_table
            ),
            Mode::FullTrace => format!(
                "SELECT ft.instr_absolute, r.resulttype, SUM(t.time2 - t.time1 + 1) \
                 FROM fulltrace ft \
                 LEFT JOIN trace t ON t.variant_id = ft.variant_id \
                   AND ft.instr BETWEEN t.instr1 AND t.instr2 \
                   AND t.accesstype = 'R' \
                 JOIN fsppilot p ON p.variant_id = t.variant_id \
                   AND p.data_address = t.data_address \
                   AND p.instr2 = t.instr2 \
                 JOIN {r} r ON r.pilot_id = p.id \
                 WHERE ft.variant_id = ?1 \
                 GROUP BY ft.instr_absolute, r.resulttype",
                r = self.result_table
            ),
        }
    }
}

fn check_table_name(name: &str) -> Result<(), StoreError> {
    lazy_static! {
        static ref IDENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    }

    if IDENT.is_match(name) {
        Ok(())
    } else {
        Err(StoreError::BadTableName(name.to_string()))
    }
}

impl Store for SqliteStore {
    fn result_kinds(&self) -> Result<Vec<String>, StoreError> {
        let sql = format!(
            "SELECT resulttype FROM {} GROUP BY resulttype ORDER BY resulttype",
            self.result_table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn aggregate_results(&self, variant: i64, mode: Mode) -> Result<Vec<ResultRow>, StoreError> {
        let sql = self.aggregate_sql(mode);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![variant], |row| {
            Ok(ResultRow {
                key: row.get(0)?,
                kind: row.get(1)?,
                weight: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn instructions(&self, variant: i64) -> Result<Vec<Instruction>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT instr_address, disassemble FROM objdump \
             WHERE variant_id = ?1 ORDER BY instr_address",
        )?;
        let rows = stmt.query_map(params![variant], |row| {
            Ok(Instruction {
                address: row.get(0)?,
                disassembly: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn min_instruction_address(&self, variant: i64) -> Result<Option<u64>, StoreError> {
        let min = self.conn.query_row(
            "SELECT MIN(instr_address) FROM objdump WHERE variant_id = ?1",
            params![variant],
            |row| row.get(0),
        )?;
        Ok(min)
    }

    fn source_lines(&self, variant: i64, file: i64) -> Result<Vec<SourceLine>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT linenumber, line FROM dbg_source \
             WHERE variant_id = ?1 AND file_id = ?2 ORDER BY linenumber",
        )?;
        let rows = stmt.query_map(params![variant, file], |row| {
            Ok(SourceLine {
                number: row.get(0)?,
                text: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn line_ranges(
        &self,
        variant: i64,
        file: i64,
        min_address: u64,
    ) -> Result<Vec<LineRange>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT linenumber, instr_absolute, line_range_size FROM dbg_mapping \
             WHERE variant_id = ?1 AND file_id = ?2 AND instr_absolute >= ?3 \
             ORDER BY instr_absolute",
        )?;
        let rows = stmt.query_map(params![variant, file, min_address], |row| {
            let line: u32 = row.get(0)?;
            let start: u64 = row.get(1)?;
            let size: u64 = row.get(2)?;
            Ok(LineRange {
                line,
                start,
                end: start + size,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn binaries(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT benchmark FROM variant ORDER BY benchmark")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn variants(&self, binary: &str) -> Result<Vec<(i64, String)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, variant FROM variant WHERE benchmark = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![binary], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn source_files(&self, variant: i64) -> Result<Vec<(i64, String)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT file_id, path FROM dbg_filename WHERE variant_id = ?1 ORDER BY file_id")?;
        let rows = stmt.query_map(params![variant], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn missing_tables(&self) -> Result<Vec<String>, StoreError> {
        let mut missing = Vec::new();

        let tables = REQUIRED_TABLES
            .iter()
            .copied()
            .chain(std::iter::once(self.result_table.as_str()));

        for table in tables {
            // names come from the fixed list or validated configuration
            let sql = format!("SELECT 1 FROM {} LIMIT 1", table);
            if self.conn.prepare(&sql).is_err() {
                missing.push(table.to_string());
            }
        }

        Ok(missing)
    }
}
