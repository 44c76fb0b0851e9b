//! Builds the two renderable views: the flat disassembly of a whole
//! variant, and one source file with its mapped instructions per line.
//! Rendering the views (colors, markup) is the client's job; everything
//! here is plain data.

use serde::Serialize;

use crate::aggregate::{self, ErrorData};
use crate::collapse::{Collapsed, Collapser};
use crate::mapping::{self, MappedLine};
use crate::store::{Instruction, Mode, Store, StoreError};

/// One listing row. `counts` is parallel to the listing's `kinds` and
/// present when errors were recorded at this address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub address: u64,
    pub disassembly: String,
    pub counts: Option<Vec<u64>>,
}

impl Entry {
    pub(crate) fn plain(insn: &Instruction) -> Self {
        Self {
            address: insn.address,
            disassembly: insn.disassembly.clone(),
            counts: None,
        }
    }

    pub(crate) fn annotated(insn: &Instruction, counts: Vec<u64>) -> Self {
        Self {
            address: insn.address,
            disassembly: insn.disassembly.clone(),
            counts: Some(counts),
        }
    }
}

/// Whole-variant disassembly with per-address annotations.
#[derive(Clone, Debug, Serialize)]
pub struct AsmListing {
    pub kinds: Vec<String>,
    pub maxima: Vec<u64>,
    pub entries: Vec<Collapsed<Entry>>,
}

/// One source file, line by line, with mapped instructions wherever the
/// line generated code.
#[derive(Clone, Debug, Serialize)]
pub struct SourceListing {
    pub kinds: Vec<String>,
    pub maxima: Vec<u64>,
    pub lines: Vec<LineView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LineView {
    pub number: u32,
    pub text: String,
    pub mapped: Option<MappedLine>,
}

pub fn asm_listing(store: &dyn Store, variant: i64, mode: Mode) -> Result<AsmListing, StoreError> {
    let errors = aggregate::aggregate(store, variant, mode)?;

    let mut collapser = Collapser::new();
    for insn in store.instructions(variant)? {
        match errors.counts(insn.address) {
            Some(counts) => collapser.force(Entry::annotated(&insn, counts.to_vec())),
            None => collapser.push(&insn.disassembly, Entry::plain(&insn)),
        }
    }

    let ErrorData { kinds, maxima, .. } = errors;
    Ok(AsmListing {
        kinds,
        maxima,
        entries: collapser.finish(),
    })
}

pub fn source_listing(
    store: &dyn Store,
    variant: i64,
    file: i64,
    mode: Mode,
) -> Result<SourceListing, StoreError> {
    let errors = aggregate::aggregate(store, variant, mode)?;

    // mapping rows below the variant's first instruction belong to other
    // link units and would map nothing
    let ranges = match store.min_instruction_address(variant)? {
        Some(min) => store.line_ranges(variant, file, min)?,
        None => Vec::new(),
    };
    let instructions = store.instructions(variant)?;

    let mut mapped = mapping::map_lines(&ranges, &instructions, &errors);

    let lines = store
        .source_lines(variant, file)?
        .into_iter()
        .map(|line| LineView {
            mapped: mapped.remove(&line.number),
            number: line.number,
            text: line.text,
        })
        .collect();

    let ErrorData { kinds, maxima, .. } = errors;
    Ok(SourceListing {
        kinds,
        maxima,
        lines,
    })
}
