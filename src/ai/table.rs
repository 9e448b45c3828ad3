use std::collections::HashMap;

use super::SearchResult;

/// Meaning of a stored value relative to the window it was searched with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Exact,
    /// Search failed high: the true value is at least the stored one
    Lower,
    /// Search failed low: the true value is at most the stored one
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry<A> {
    /// Remaining depth the result was searched to
    pub depth: usize,
    pub result: SearchResult<A>,
    pub bound: Bound,
}

/// Search results by position hash
#[derive(Debug, Clone)]
pub struct TranspositionTable<A> {
    entries: HashMap<u64, Entry<A>>,
    capacity: usize,
}

impl<A: Copy> TranspositionTable<A> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, hash: u64) -> Option<&Entry<A>> {
        self.entries.get(&hash)
    }

    /// Stored result usable for a search of `depth` within `(alpha, beta)`.
    ///
    /// Bounds narrow the window; a result is returned when it is exact or
    /// the narrowed window is empty.
    pub fn probe(
        &self,
        hash: u64,
        depth: usize,
        alpha: &mut f64,
        beta: &mut f64,
    ) -> Option<SearchResult<A>> {
        let entry = self.entries.get(&hash).filter(|entry| entry.depth >= depth)?;
        match entry.bound {
            Bound::Exact => return Some(entry.result),
            Bound::Lower => *alpha = alpha.max(entry.result.value),
            Bound::Upper => *beta = beta.min(entry.result.value),
        }
        (*alpha >= *beta).then_some(entry.result)
    }

    /// Stores an entry, keeping the deeper one on collision.
    /// A full table is cleared first.
    pub fn insert(&mut self, hash: u64, entry: Entry<A>) {
        if let Some(stored) = self.entries.get(&hash) {
            if stored.depth > entry.depth {
                return;
            }
        } else if self.entries.len() >= self.capacity {
            log::debug!("Transposition table full ({} entries), clearing", self.capacity);
            self.entries.clear();
        }
        self.entries.insert(hash, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(depth: usize, value: f64, bound: Bound) -> Entry<u8> {
        Entry {
            depth,
            result: SearchResult {
                value,
                action: Some(depth as u8),
            },
            bound,
        }
    }

    #[test]
    fn deeper_entries_win() {
        let mut table = TranspositionTable::new(8);
        table.insert(1, entry(3, 0.5, Bound::Exact));
        table.insert(1, entry(2, 0.1, Bound::Exact));
        assert_eq!(table.get(1).map(|e| e.depth), Some(3));
        table.insert(1, entry(4, 0.2, Bound::Exact));
        assert_eq!(table.get(1).map(|e| e.result.value), Some(0.2));
    }

    #[test]
    fn probe_respects_depth_and_bounds() {
        let mut table = TranspositionTable::new(8);
        table.insert(1, entry(3, 0.5, Bound::Exact));
        table.insert(2, entry(3, 0.5, Bound::Lower));
        table.insert(3, entry(3, -0.5, Bound::Upper));

        let (mut alpha, mut beta) = (-1.0, 1.0);
        assert_eq!(table.probe(1, 4, &mut alpha, &mut beta), None);
        assert_eq!(
            table.probe(1, 3, &mut alpha, &mut beta).map(|r| r.value),
            Some(0.5)
        );

        // A lower bound only narrows a wide window
        assert_eq!(table.probe(2, 2, &mut alpha, &mut beta), None);
        assert_eq!(alpha, 0.5);

        // and cuts off a window below it
        let (mut alpha, mut beta) = (-1.0, 0.25);
        assert!(table.probe(2, 2, &mut alpha, &mut beta).is_some());

        let (mut alpha, mut beta) = (-0.25, 1.0);
        assert!(table.probe(3, 1, &mut alpha, &mut beta).is_some());
        assert_eq!(beta, -0.5);

        assert_eq!(table.probe(9, 0, &mut alpha, &mut beta), None);
    }

    #[test]
    fn full_table_is_cleared() {
        let mut table = TranspositionTable::new(2);
        table.insert(1, entry(1, 0.0, Bound::Exact));
        table.insert(2, entry(1, 0.0, Bound::Exact));
        // Updating a stored key never clears
        table.insert(2, entry(2, 0.0, Bound::Exact));
        assert_eq!(table.len(), 2);

        table.insert(3, entry(1, 0.0, Bound::Exact));
        assert_eq!(table.len(), 1);
        assert!(table.get(3).is_some());
        table.clear();
        assert!(table.is_empty());
    }
}
