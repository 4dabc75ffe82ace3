use std::collections::HashSet;

/// Stored ids not yet consumed by the history walk, in their original order.
///
/// Removal only marks an id; the cursor skips marked ids lazily so `head` stays
/// amortized O(1).
struct RemainingIds<'a> {
    order: Vec<&'a str>,
    removed: HashSet<&'a str>,
    cursor: usize,
}

impl<'a> RemainingIds<'a> {
    fn new(stored: &'a [impl AsRef<str>]) -> Self {
        let mut seen = HashSet::new();
        let order = stored
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| seen.insert(*id))
            .collect();
        Self {
            order,
            removed: HashSet::new(),
            cursor: 0,
        }
    }

    fn head(&mut self) -> Option<&'a str> {
        while let Some(id) = self.order.get(self.cursor) {
            if !self.removed.contains(id) {
                return Some(id);
            }
            self.cursor += 1;
        }
        None
    }

    fn remove(&mut self, id: &'a str) {
        self.removed.insert(id);
    }
}

/// Index in `history` where it starts overlapping `stored`, both newest-first.
///
/// Each history id is compared with the oldest-unconsumed head of `stored`; a run
/// of `min_match` consecutive hits returns the index where the run began. Every
/// visited history id is consumed from `stored` whether or not it matched, so an
/// id seen once cannot match again further down. Items before the returned index
/// are new; `None` means no confident overlap.
pub(crate) fn find_overlap_start(
    history: &[impl AsRef<str>],
    stored: &[impl AsRef<str>],
    min_match: usize,
) -> Option<usize> {
    if history.is_empty() || stored.is_empty() || min_match == 0 {
        return None;
    }

    let mut remaining = RemainingIds::new(stored);
    let mut streak = 0;
    let mut start = None;

    for (idx, id) in history.iter().enumerate() {
        let id = id.as_ref();
        if remaining.head() == Some(id) {
            start.get_or_insert(idx);
            streak += 1;
        } else {
            streak = 0;
            start = None;
        }

        if streak >= min_match {
            return start;
        }

        remaining.remove(id);
    }

    None
}
