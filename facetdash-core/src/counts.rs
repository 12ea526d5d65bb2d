use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Entity, EntityId, FacetTotals};
use crate::tokens::{normalize_key, Token};

/// Label and entity-incidence count of one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub label: String,
    pub count: usize,
}

/// Per-token entity counts for one facet, keyed by normalized key.
///
/// Counts are entity incidence, not occurrences: an entity that repeats a
/// tag in its raw field still contributes one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountIndex {
    entries: BTreeMap<String, CountEntry>,
}

impl CountIndex {
    /// Count tokens of `facet` across all entities.
    pub fn build(entities: &[Entity], facet: &str) -> Self {
        Self::build_with(entities, |entity| entity.tokens(facet))
    }

    /// Count tokens produced by an arbitrary accessor.
    ///
    /// The accessor's output is deduplicated again per entity, so callers may
    /// hand back raw, repeating token lists.
    pub fn build_with<F>(entities: &[Entity], accessor: F) -> Self
    where
        F: Fn(&Entity) -> Vec<Token>,
    {
        let mut entries: BTreeMap<String, CountEntry> = BTreeMap::new();

        for entity in entities {
            let mut seen = BTreeSet::new();
            for token in accessor(entity) {
                if !seen.insert(token.key.clone()) {
                    continue;
                }
                entries
                    .entry(token.key)
                    .or_insert_with(|| CountEntry {
                        label: token.label,
                        count: 0,
                    })
                    .count += 1;
            }
        }

        tracing::debug!(tokens = entries.len(), entities = entities.len(), "built count index");
        Self { entries }
    }

    /// Fallback index from the backend's precomputed leaf totals.
    ///
    /// Display labels are unknown at this point, so the key doubles as label
    /// until [`CountIndex::relabel`] is called.
    pub fn from_totals(totals: &FacetTotals) -> Self {
        let mut entries: BTreeMap<String, CountEntry> = BTreeMap::new();

        for (token, count) in &totals.totals_by_token {
            let key = normalize_key(token);
            if key.is_empty() {
                continue;
            }
            // Totals keyed by variants of the same token fold together
            entries
                .entry(key.clone())
                .or_insert_with(|| CountEntry {
                    label: key,
                    count: 0,
                })
                .count += count;
        }

        Self { entries }
    }

    /// Replace labels for keys that have a known display label.
    pub fn relabel<'a>(&mut self, labels: impl IntoIterator<Item = &'a Token>) {
        for token in labels {
            if let Some(entry) = self.entries.get_mut(&token.key) {
                entry.label = token.label.clone();
            }
        }
    }

    pub fn get(&self, token: &str) -> Option<&CountEntry> {
        self.entries.get(&normalize_key(token))
    }

    /// Count for `token`, zero when unseen.
    pub fn count(&self, token: &str) -> usize {
        self.get(token).map(|e| e.count).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CountEntry)> {
        self.entries.iter()
    }
}

/// Map from leaf token key to the set of entity IDs carrying it.
///
/// Unlike [`CountIndex`], postings keep identities, which is what union
/// counts over several leaves need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Postings {
    sets: BTreeMap<String, BTreeSet<EntityId>>,
}

impl Postings {
    pub fn build(entities: &[Entity], facet: &str) -> Self {
        let mut sets: BTreeMap<String, BTreeSet<EntityId>> = BTreeMap::new();

        for entity in entities {
            for token in entity.tokens(facet) {
                sets.entry(token.key).or_default().insert(entity.id.clone());
            }
        }

        Self { sets }
    }

    pub fn entities(&self, token: &str) -> Option<&BTreeSet<EntityId>> {
        self.sets.get(&normalize_key(token))
    }

    /// `|⋃ postings[t] for t in tokens|`
    pub fn union_count<'a>(&self, tokens: impl IntoIterator<Item = &'a str>) -> usize {
        let mut union: BTreeSet<&EntityId> = BTreeSet::new();
        for token in tokens {
            if let Some(ids) = self.sets.get(&normalize_key(token)) {
                union.extend(ids.iter());
            }
        }
        union.len()
    }

    /// Collapse postings into plain counts.
    pub fn to_count_index(&self, labels: &[Token]) -> CountIndex {
        let mut index = CountIndex {
            entries: self
                .sets
                .iter()
                .map(|(key, ids)| {
                    (
                        key.clone(),
                        CountEntry {
                            label: key.clone(),
                            count: ids.len(),
                        },
                    )
                })
                .collect(),
        };
        index.relabel(labels);
        index
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
