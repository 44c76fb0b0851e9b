//! Maps source lines to the instructions generated for them.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::aggregate::ErrorData;
use crate::collapse::{Collapsed, Collapser};
use crate::listing::Entry;
use crate::store::{Instruction, LineRange};

/// The instructions of one source line, collapsed, plus the line's summed
/// counts per kind. The totals are local severity; the global maxima live
/// on the surrounding listing.
#[derive(Clone, Debug, serde::Serialize)]
pub struct MappedLine {
    pub entries: Vec<Collapsed<Entry>>,
    pub totals: Vec<u64>,
}

/// For every line owning at least one range: the instructions whose address
/// falls into one of the line's ranges, in range order, annotated from
/// `errors`. Collapsing restarts at every range boundary. Lines without
/// ranges are simply absent from the result.
pub fn map_lines(
    ranges: &[LineRange],
    instructions: &[Instruction],
    errors: &ErrorData,
) -> BTreeMap<u32, MappedLine> {
    // a line may own several disjoint ranges (inlining, unrolling)
    let per_line = ranges
        .iter()
        .map(|r| (r.line, (r.start, r.end)))
        .into_group_map();

    let mut mapped = BTreeMap::new();

    for (line, line_ranges) in per_line {
        let mut totals = vec![0u64; errors.kinds.len()];
        let mut collapser = Collapser::new();

        for (start, end) in line_ranges {
            for insn in slice_range(instructions, start, end) {
                match errors.counts(insn.address) {
                    Some(counts) => {
                        for (total, count) in totals.iter_mut().zip(counts) {
                            *total += *count;
                        }
                        collapser.force(Entry::annotated(insn, counts.to_vec()));
                    }
                    None => collapser.push(&insn.disassembly, Entry::plain(insn)),
                }
            }
            collapser.boundary();
        }

        mapped.insert(
            line,
            MappedLine {
                entries: collapser.finish(),
                totals,
            },
        );
    }

    mapped
}

/// The instruction stream is address-ordered, so a range is a window found
/// by binary search.
fn slice_range(instructions: &[Instruction], start: u64, end: u64) -> &[Instruction] {
    let lo = instructions.partition_point(|i| i.address < start);
    let hi = instructions.partition_point(|i| i.address < end);
    &instructions[lo..hi]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insn(address: u64, disassembly: &str) -> Instruction {
        Instruction {
            address,
            disassembly: disassembly.to_string(),
        }
    }

    fn range(line: u32, start: u64, end: u64) -> LineRange {
        LineRange { line, start, end }
    }

    fn addresses(entries: &[Collapsed<Entry>]) -> Vec<u64> {
        entries
            .iter()
            .map(|e| match e {
                Collapsed::Item(entry) => entry.address,
                Collapsed::Omitted { .. } => panic!("unexpected omission"),
            })
            .collect()
    }

    #[test]
    fn ranges_select_their_instructions() {
        let instructions = vec![insn(0x100, "push"), insn(0x104, "add"), insn(0x108, "ret")];
        let ranges = vec![range(10, 0x100, 0x108), range(11, 0x108, 0x10c)];
        let errors = ErrorData {
            kinds: vec!["SDC".to_string()],
            ..ErrorData::default()
        };

        let mapped = map_lines(&ranges, &instructions, &errors);

        assert_eq!(mapped.len(), 2);
        assert_eq!(addresses(&mapped[&10].entries), vec![0x100, 0x104]);
        assert_eq!(addresses(&mapped[&11].entries), vec![0x108]);
        assert_eq!(mapped[&10].totals, vec![0]);
        assert_eq!(mapped[&11].totals, vec![0]);
    }

    #[test]
    fn totals_sum_annotated_counts() {
        let instructions = vec![
            insn(0x100, "ldr r0, [r1]"),
            insn(0x104, "add r0, r0, #1"),
            insn(0x108, "str r0, [r1]"),
        ];
        // one line, two disjoint ranges
        let ranges = vec![range(7, 0x100, 0x104), range(7, 0x108, 0x10c)];
        let errors = ErrorData {
            kinds: vec!["OK".to_string(), "SDC".to_string()],
            records: [(0x100, vec![1, 2]), (0x108, vec![3, 4])].into(),
            maxima: vec![3, 4],
        };

        let mapped = map_lines(&ranges, &instructions, &errors);
        let line = &mapped[&7];

        assert_eq!(line.totals, vec![4, 6]);
        assert_eq!(addresses(&line.entries), vec![0x100, 0x108]);
        assert!(matches!(
            &line.entries[0],
            Collapsed::Item(Entry { counts: Some(c), .. }) if c == &vec![1, 2]
        ));
    }

    #[test]
    fn collapsing_resets_between_ranges() {
        let instructions: Vec<_> = (0..10).map(|i| insn(0x100 + 4 * i, "nop")).collect();
        // ten identical entries, but split over two ranges of the same line
        let ranges = vec![range(3, 0x100, 0x114), range(3, 0x114, 0x128)];
        let errors = ErrorData::default();

        let mapped = map_lines(&ranges, &instructions, &errors);

        // five per range is below the collapse threshold, so nothing
        // may be omitted here
        assert_eq!(mapped[&3].entries.len(), 10);
    }

    #[test]
    fn a_long_run_inside_one_range_collapses() {
        let instructions: Vec<_> = (0..10).map(|i| insn(0x100 + 4 * i, "nop")).collect();
        let ranges = vec![range(3, 0x100, 0x128)];
        let errors = ErrorData::default();

        let mapped = map_lines(&ranges, &instructions, &errors);

        let entries = &mapped[&3].entries;
        assert_eq!(entries.len(), 7);
        assert!(matches!(
            entries[3],
            Collapsed::Omitted { count: 4, .. }
        ));
    }

    #[test]
    fn lines_without_ranges_are_absent() {
        let instructions = vec![insn(0x100, "nop")];
        let mapped = map_lines(&[], &instructions, &ErrorData::default());
        assert!(mapped.is_empty());
    }
}
