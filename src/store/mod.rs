//! Read-only access to a campaign database.
//!
//! Everything the views need goes through the `Store` trait; the sqlite
//! implementation behind it is the only place query text exists.

pub mod sqlite;

use thiserror::Error;

/// One disassembled instruction of a variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub disassembly: String,
}

/// One line of a high-level source file.
#[derive(Clone, Debug)]
pub struct SourceLine {
    pub number: u32,
    pub text: String,
}

/// Addresses `[start, end)` generated for one source line. A line may own
/// any number of these, and they need not be contiguous.
#[derive(Clone, Copy, Debug)]
pub struct LineRange {
    pub line: u32,
    pub start: u64,
    pub end: u64,
}

/// One `(group key, result kind, weight)` row of an aggregation query.
/// `key` is None when the trace row had no matching result join.
#[derive(Clone, Debug)]
pub struct ResultRow {
    pub key: Option<u64>,
    pub kind: String,
    pub weight: u64,
}

/// How error counts are attributed to instruction addresses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// group by the right edge of each trace interval
    RightEdge,
    /// group by the result row's own latest_ip field. that field is a
    /// correlation key, not necessarily a code address.
    LatestIp,
    /// attribute to every dynamic occurrence inside an interval. the most
    /// expensive and the most precise.
    #[default]
    FullTrace,
}

impl argh::FromArgValue for Mode {
    fn from_arg_value(value: &str) -> Result<Self, String> {
        match value {
            "right-edge" | "right_edge" => Ok(Mode::RightEdge),
            "latest-ip" | "latest_ip" => Ok(Mode::LatestIp),
            "full-trace" | "full_trace" => Ok(Mode::FullTrace),
            _ => Err(format!("unknown mode: {}", value)),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("'{0}' is not a valid table name")]
    BadTableName(String),
}

/// The queries the views consume. All read-only, all parameterized.
pub trait Store {
    /// distinct result kinds of the configured result table, in a stable order
    fn result_kinds(&self) -> Result<Vec<String>, StoreError>;

    /// per-mode aggregation rows, grouped by (key, kind)
    fn aggregate_results(&self, variant: i64, mode: Mode) -> Result<Vec<ResultRow>, StoreError>;

    /// all instructions of a variant, ordered by address
    fn instructions(&self, variant: i64) -> Result<Vec<Instruction>, StoreError>;

    fn min_instruction_address(&self, variant: i64) -> Result<Option<u64>, StoreError>;

    /// the text of one source file, ordered by line number
    fn source_lines(&self, variant: i64, file: i64) -> Result<Vec<SourceLine>, StoreError>;

    /// line ranges of one file starting at or above `min_address`, ordered
    /// by start address
    fn line_ranges(
        &self,
        variant: i64,
        file: i64,
        min_address: u64,
    ) -> Result<Vec<LineRange>, StoreError>;

    /// distinct benchmark names
    fn binaries(&self) -> Result<Vec<String>, StoreError>;

    /// (id, name) of every variant of one benchmark
    fn variants(&self, binary: &str) -> Result<Vec<(i64, String)>, StoreError>;

    /// (file id, path) of every source file of a variant
    fn source_files(&self, variant: i64) -> Result<Vec<(i64, String)>, StoreError>;

    /// names of required tables missing from the database
    fn missing_tables(&self) -> Result<Vec<String>, StoreError>;
}
