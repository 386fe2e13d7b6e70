//! Citations collected while answering one request.

use indexchat_core::types::SourceRef;
use std::collections::HashSet;

/// Chunks cited so far, unique by id, in first-seen order.
#[derive(Debug, Default)]
pub struct SourceSet {
    seen: HashSet<i64>,
    order: Vec<SourceRef>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a citation. Returns `false` if its chunk id was already present.
    pub fn insert(&mut self, source: SourceRef) -> bool {
        if !self.seen.insert(source.id) {
            return false;
        }
        self.order.push(source);
        true
    }

    pub fn extend(&mut self, sources: impl IntoIterator<Item = SourceRef>) {
        for s in sources {
            self.insert(s);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_vec(self) -> Vec<SourceRef> {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(id: i64, file: &str) -> SourceRef {
        SourceRef {
            id,
            file_name: file.into(),
        }
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let mut set = SourceSet::new();
        set.extend([src(3, "a.pdf"), src(1, "a.pdf"), src(7, "b.png")]);
        set.extend([src(1, "a.pdf"), src(9, "c.mp3"), src(3, "a.pdf")]);

        assert_eq!(set.len(), 4);
        let ids: Vec<i64> = set.into_vec().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![3, 1, 7, 9]);
    }

    #[test]
    fn test_insert_reports_duplicates() {
        let mut set = SourceSet::new();
        assert!(set.is_empty());
        assert!(set.insert(src(1, "report.pdf")));
        assert!(!set.insert(src(1, "report.pdf")));
    }
}
