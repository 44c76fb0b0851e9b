//! Folds the per-mode aggregation rows into per-address error counts.

use std::collections::HashMap;

use crate::store::{Mode, ResultRow, Store, StoreError};

/// Aggregated error exposure of one variant under one mode.
///
/// `records` maps a group key (an instruction address, except in latest-ip
/// mode) to counts parallel to `kinds`; `maxima` is the per-kind maximum
/// over all records, also parallel to `kinds`.
#[derive(Clone, Debug, Default)]
pub struct ErrorData {
    pub kinds: Vec<String>,
    pub records: HashMap<u64, Vec<u64>>,
    pub maxima: Vec<u64>,
}

impl ErrorData {
    pub fn counts(&self, key: u64) -> Option<&[u64]> {
        self.records.get(&key).map(Vec::as_slice)
    }
}

/// One aggregation round trip: the kinds come first because they define the
/// column set, then the mode's grouped rows are folded per key.
pub fn aggregate(store: &dyn Store, variant: i64, mode: Mode) -> Result<ErrorData, StoreError> {
    let kinds = store.result_kinds()?;
    let rows = store.aggregate_results(variant, mode)?;
    Ok(fold(kinds, rows))
}

fn fold(kinds: Vec<String>, rows: Vec<ResultRow>) -> ErrorData {
    let mut records: HashMap<u64, Vec<u64>> = HashMap::new();
    let mut maxima = vec![0u64; kinds.len()];

    for row in rows {
        // a row without a group key had no matching result join
        let key = if let Some(key) = row.key {
            key
        } else {
            continue;
        };

        let idx = if let Some(idx) = kinds.iter().position(|k| *k == row.kind) {
            idx
        } else {
            continue;
        };

        let counts = records.entry(key).or_insert_with(|| vec![0; kinds.len()]);
        counts[idx] += row.weight;

        if counts[idx] > maxima[idx] {
            maxima[idx] = counts[idx];
        }
    }

    ErrorData {
        kinds,
        records,
        maxima,
    }
}
