use crate::models::Product;
use std::collections::HashSet;

/// Identities observed during one ingestion run, including any reloaded
/// from a checkpoint.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeding with committed items makes a resumed run look, to the
    /// deduplicator, as if those items were processed in this run.
    pub fn seeded_from(items: &[Product]) -> Self {
        let mut dedup = Self::new();
        for item in items {
            dedup.mark(&item.id);
        }
        dedup
    }

    pub fn seen(&self, identity: &str) -> bool {
        self.seen.contains(identity)
    }

    /// Returns `true` when the identity was not seen before.
    pub fn mark(&mut self, identity: &str) -> bool {
        self.seen.insert(identity.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_product;

    #[test]
    fn marks_each_identity_once() {
        let mut dedup = Deduplicator::new();
        assert!(!dedup.seen("a"));
        assert!(dedup.mark("a"));
        assert!(!dedup.mark("a"));
        assert!(dedup.seen("a"));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn seeding_matches_in_run_processing() {
        let items = vec![sample_product("1"), sample_product("2")];
        let seeded = Deduplicator::seeded_from(&items);

        let mut in_run = Deduplicator::new();
        for item in &items {
            in_run.mark(&item.id);
        }

        for id in ["1", "2", "3"] {
            assert_eq!(seeded.seen(id), in_run.seen(id));
        }
        assert_eq!(seeded.len(), in_run.len());
    }
}
