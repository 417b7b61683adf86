//! Run-length compaction of indexed table entries for display.
//!
//! Interrupt and page tables are mostly repetition: hundreds of gates
//! pointing at the same stub, hundreds of empty page-table slots.
//! [`compact`] folds adjacent equal entries into a single
//! [`CompactedRun`] so a dump stays readable.

use serde::Serialize;
use std::fmt;

/// Closed range `start..=end` of adjacent indices whose entries are all
/// equal to `entry` under the comparison passed to [`compact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactedRun<T> {
    pub start: usize,
    pub end: usize,
    /// First entry of the run.
    pub entry: T,
}

impl<T: fmt::Display> fmt::Display for CompactedRun<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "[{}]:\t{}", self.start, self.entry)
        } else {
            write!(f, "[{}-{}]:\t{}", self.start, self.end, self.entry)
        }
    }
}

/// Fold adjacent equal entries into runs.
///
/// Single pass, order preserving.  Two entries share a run only when
/// `eq` holds between the run's first entry and the new one *and* the
/// new index directly follows the run's end; a gap in the indices always
/// starts a new run.
///
/// ```
/// use guestscope::compact::compact;
///
/// let entries = [(0, 'A'), (1, 'A'), (2, 'B'), (3, 'B'), (4, 'B')];
/// let runs = compact(entries, |a, b| a == b);
/// let ranges: Vec<_> = runs.iter().map(|r| (r.start, r.end, r.entry)).collect();
/// assert_eq!(ranges, [(0, 1, 'A'), (2, 4, 'B')]);
/// ```
pub fn compact<T, I, F>(entries: I, mut eq: F) -> Vec<CompactedRun<T>>
where
    I: IntoIterator<Item = (usize, T)>,
    F: FnMut(&T, &T) -> bool,
{
    let mut runs: Vec<CompactedRun<T>> = Vec::new();
    for (index, entry) in entries {
        if let Some(last) = runs.last_mut() {
            if last.end.checked_add(1) == Some(index) && eq(&last.entry, &entry) {
                last.end = index;
                continue;
            }
        }
        runs.push(CompactedRun {
            start: index,
            end: index,
            entry,
        });
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges<T: Copy>(runs: &[CompactedRun<T>]) -> Vec<(usize, usize, T)> {
        runs.iter().map(|r| (r.start, r.end, r.entry)).collect()
    }

    #[test]
    fn empty_input() {
        let runs = compact(Vec::<(usize, u8)>::new(), |a, b| a == b);
        assert!(runs.is_empty());
    }

    #[test]
    fn folds_adjacent_runs() {
        let runs = compact(
            [(0, 'A'), (1, 'A'), (2, 'B'), (3, 'B'), (4, 'B')],
            |a, b| a == b,
        );
        assert_eq!(ranges(&runs), [(0, 1, 'A'), (2, 4, 'B')]);
    }

    #[test]
    fn gap_in_indices_splits_run() {
        let runs = compact([(0, 7u8), (1, 7), (5, 7), (6, 7)], |a, b| a == b);
        assert_eq!(ranges(&runs), [(0, 1, 7), (5, 6, 7)]);
    }

    #[test]
    fn alternating_values_never_merge() {
        let runs = compact([(0, 1u8), (1, 2), (2, 1), (3, 2)], |a, b| a == b);
        assert_eq!(runs.len(), 4);
    }

    #[test]
    fn representative_is_first_of_run() {
        // Compare on the key only; the payload of the first entry survives.
        let runs = compact([(0, (1u8, 'x')), (1, (1, 'y')), (2, (2, 'z'))], |a, b| {
            a.0 == b.0
        });
        assert_eq!(ranges(&runs), [(0, 1, (1, 'x')), (2, 2, (2, 'z'))]);
    }

    #[test]
    fn display_single_and_range() {
        let runs = compact([(0, "a"), (1, "a"), (2, "b")], |a, b| a == b);
        assert_eq!(runs[0].to_string(), "[0-1]:\ta");
        assert_eq!(runs[1].to_string(), "[2]:\tb");
    }
}
