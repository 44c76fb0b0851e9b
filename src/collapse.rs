//! Collapses long runs of identical listing lines.
//!
//! Disassembly of unrolled loops can repeat the same text thousands of
//! times. Runs longer than `before + after + 1` keep both ends and get an
//! omission marker in between, so the listing stays bounded without losing
//! the context around a run.

/// An output slot: a passed-through entry, or the marker standing in for an
/// elided part of a run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collapsed<T> {
    Item(T),
    Omitted { count: usize, text: String },
}

/// The original tool kept this state in process-wide statics. A collapser
/// instead lives for exactly one listing and is dropped with it.
pub struct Collapser<T> {
    before: usize,
    after: usize,
    last_key: String,
    pending: Vec<T>,
    out: Vec<Collapsed<T>>,
}

impl<T> Collapser<T> {
    pub fn new() -> Self {
        Self::with_limits(3, 3)
    }

    pub fn with_limits(before: usize, after: usize) -> Self {
        Self {
            before,
            after,
            last_key: String::new(),
            pending: Vec::new(),
            out: Vec::new(),
        }
    }

    /// Buffer an entry. A key change ends the previous run.
    pub fn push(&mut self, key: &str, item: T) {
        if key != self.last_key {
            self.flush_pending();
            self.last_key = key.to_string();
        }
        self.pending.push(item);
    }

    /// Emit an entry verbatim, closing any pending run first. Annotated
    /// entries go through here, so they never take part in a run.
    pub fn force(&mut self, item: T) {
        self.flush_pending();
        self.last_key.clear();
        self.out.push(Collapsed::Item(item));
    }

    /// Close the current run without emitting anything, so entries from
    /// both sides of a boundary never collapse together.
    pub fn boundary(&mut self) {
        self.flush_pending();
        self.last_key.clear();
    }

    /// The final flush. Every listing ends with this, otherwise a trailing
    /// run would be lost in the buffer.
    pub fn finish(mut self) -> Vec<Collapsed<T>> {
        self.flush_pending();
        self.out
    }

    fn flush_pending(&mut self) {
        let n = self.pending.len();

        if n > self.before + self.after + 1 {
            let tail = self.pending.split_off(n - self.after);
            let mut head = std::mem::take(&mut self.pending);
            head.truncate(self.before);

            self.out.extend(head.into_iter().map(Collapsed::Item));
            self.out.push(Collapsed::Omitted {
                count: n - self.before - self.after,
                text: self.last_key.clone(),
            });
            self.out.extend(tail.into_iter().map(Collapsed::Item));
        } else {
            self.out.extend(self.pending.drain(..).map(Collapsed::Item));
        }
    }
}

impl<T> Default for Collapser<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_runs_stay_verbatim() {
        for len in 0..=7 {
            let mut c = Collapser::new();
            for i in 0..len {
                c.push("nop", i);
            }
            assert_eq!(c.finish().len(), len);
        }
    }

    #[test]
    fn long_run_keeps_both_ends() {
        let mut c = Collapser::new();
        for i in 0..10 {
            c.push("nop", i);
        }
        let out = c.finish();

        assert_eq!(out.len(), 7);
        assert_eq!(out[0], Collapsed::Item(0));
        assert_eq!(out[2], Collapsed::Item(2));
        assert_eq!(
            out[3],
            Collapsed::Omitted {
                count: 4,
                text: "nop".to_string()
            }
        );
        assert_eq!(out[4], Collapsed::Item(7));
        assert_eq!(out[6], Collapsed::Item(9));
    }

    #[test]
    fn key_change_ends_the_run() {
        let mut c = Collapser::new();
        for i in 0..8 {
            c.push("add", i);
        }
        for i in 8..11 {
            c.push("sub", i);
        }
        let out = c.finish();

        // the add run collapses to 7 slots, the sub run is too short to
        assert_eq!(out.len(), 10);
        assert!(matches!(out[3], Collapsed::Omitted { count: 2, .. }));
        assert_eq!(out[7], Collapsed::Item(8));
    }

    #[test]
    fn forced_entries_are_never_collapsed() {
        let mut c = Collapser::new();
        for i in 0..20 {
            c.force(i);
        }
        assert_eq!(c.finish().len(), 20);
    }

    #[test]
    fn force_interrupts_a_run() {
        let mut c = Collapser::new();
        for i in 0..8 {
            c.push("nop", i);
        }
        c.force(100);
        for i in 8..16 {
            c.push("nop", i);
        }
        let out = c.finish();

        assert_eq!(out.len(), 7 + 1 + 7);
        assert_eq!(out[7], Collapsed::Item(100));
    }

    #[test]
    fn boundary_splits_runs() {
        let mut c = Collapser::new();
        for i in 0..5 {
            c.push("nop", i);
        }
        c.boundary();
        for i in 5..10 {
            c.push("nop", i);
        }
        let out = c.finish();

        // ten in total, but neither side is long enough on its own
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|e| matches!(e, Collapsed::Item(_))));
    }
}
