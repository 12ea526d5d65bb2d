use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::models::{Entity, MatchMode};
use crate::tokens::normalize_key;

/// Selected tokens and match mode of one facet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FacetSelection {
    pub selected: BTreeSet<String>,
    pub match_mode: MatchMode,
}

impl FacetSelection {
    pub fn is_active(&self) -> bool {
        !self.selected.is_empty()
    }

    /// Per-facet predicate over an entity's token keys
    pub fn matches(&self, entity_keys: &HashSet<String>) -> bool {
        if self.selected.is_empty() {
            return true;
        }

        match self.match_mode {
            MatchMode::Any => self.selected.iter().any(|k| entity_keys.contains(k)),
            MatchMode::All => self.selected.iter().all(|k| entity_keys.contains(k)),
        }
    }
}

/// User-driven filter state across all facets.
///
/// Facets are combined with AND; within a facet the match mode decides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterState {
    facets: BTreeMap<String, FacetSelection>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a single token in or out of the facet's selection
    pub fn toggle(&mut self, facet: &str, token: &str) {
        let key = normalize_key(token);
        if key.is_empty() {
            return;
        }

        let selection = self.facets.entry(facet.to_string()).or_default();
        if !selection.selected.remove(&key) {
            selection.selected.insert(key);
        }
    }

    /// Add a token to the facet's selection; selecting it again is a no-op
    pub fn select(&mut self, facet: &str, token: &str) {
        let key = normalize_key(token);
        if key.is_empty() {
            return;
        }

        self.facets
            .entry(facet.to_string())
            .or_default()
            .selected
            .insert(key);
    }

    /// Toggle a group of tokens as one unit.
    ///
    /// If every member is already selected, all are deselected; otherwise
    /// every unselected member is selected.
    pub fn toggle_group<'a>(&mut self, facet: &str, tokens: impl IntoIterator<Item = &'a str>) {
        let keys: BTreeSet<String> = tokens
            .into_iter()
            .map(normalize_key)
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return;
        }

        let selection = self.facets.entry(facet.to_string()).or_default();
        if keys.is_subset(&selection.selected) {
            for key in &keys {
                selection.selected.remove(key);
            }
        } else {
            selection.selected.extend(keys);
        }
    }

    pub fn set_match_mode(&mut self, facet: &str, mode: MatchMode) {
        self.facets.entry(facet.to_string()).or_default().match_mode = mode;
    }

    /// Drop the facet's selected tokens; its match mode is kept.
    pub fn clear(&mut self, facet: &str) {
        if let Some(selection) = self.facets.get_mut(facet) {
            selection.selected.clear();
        }
    }

    pub fn clear_all(&mut self) {
        self.facets.clear();
    }

    pub fn selection(&self, facet: &str) -> Option<&FacetSelection> {
        self.facets.get(facet)
    }

    pub fn is_selected(&self, facet: &str, token: &str) -> bool {
        self.facets
            .get(facet)
            .is_some_and(|s| s.selected.contains(&normalize_key(token)))
    }

    pub fn match_mode(&self, facet: &str) -> MatchMode {
        self.facets
            .get(facet)
            .map(|s| s.match_mode)
            .unwrap_or_default()
    }

    /// Facets with a non-empty selection
    pub fn active_facets(&self) -> impl Iterator<Item = (&String, &FacetSelection)> {
        self.facets.iter().filter(|(_, s)| s.is_active())
    }

    pub fn is_active(&self) -> bool {
        self.active_facets().next().is_some()
    }

    /// Whether any active facet requires ALL semantics
    pub fn has_all_mode(&self) -> bool {
        self.active_facets()
            .any(|(_, s)| s.match_mode == MatchMode::All)
    }

    /// Predicate for a single facet.
    pub fn matches_facet(&self, entity: &Entity, facet: &str) -> bool {
        match self.facets.get(facet) {
            Some(selection) if selection.is_active() => {
                selection.matches(&entity_keys(entity, facet))
            }
            _ => true,
        }
    }

    /// AND across every active facet.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.active_facets()
            .all(|(facet, selection)| selection.matches(&entity_keys(entity, facet)))
    }

    /// AND across active facets whose mode is ALL.
    pub fn matches_all_mode_facets(&self, entity: &Entity) -> bool {
        self.active_facets()
            .filter(|(_, s)| s.match_mode == MatchMode::All)
            .all(|(facet, selection)| selection.matches(&entity_keys(entity, facet)))
    }
}

fn entity_keys(entity: &Entity, facet: &str) -> HashSet<String> {
    entity.tokens(facet).into_iter().map(|t| t.key).collect()
}

/// Apply filters to a list of entities, returning only those that match
pub fn apply_filters(entities: &[Entity], filters: &FilterState) -> Vec<Entity> {
    entities
        .iter()
        .filter(|entity| filters.matches(entity))
        .cloned()
        .collect()
}

/// Parse facet filter strings in the format "key=value" into a filter map
/// Multiple values for the same key are collected into a vector
pub fn parse_facet_filters(facet_strings: &[String]) -> HashMap<String, Vec<String>> {
    let mut facet_map = HashMap::new();

    for facet_str in facet_strings {
        if let Some((key, value)) = facet_str.split_once('=') {
            facet_map
                .entry(key.trim().to_string())
                .or_insert_with(Vec::new)
                .push(value.trim().to_string());
        }
    }

    facet_map
}

/// Parse "facet=any|all" strings. Malformed entries are reported back
/// instead of being silently dropped.
pub fn parse_match_modes(mode_strings: &[String]) -> Result<HashMap<String, MatchMode>, Vec<String>> {
    let mut modes = HashMap::new();
    let mut errors = Vec::new();

    for mode_str in mode_strings {
        match mode_str.split_once('=') {
            Some((facet, mode)) => match mode.parse::<MatchMode>() {
                Ok(mode) => {
                    modes.insert(facet.trim().to_string(), mode);
                }
                Err(e) => errors.push(format!("{}: {}", mode_str, e)),
            },
            None => errors.push(format!("{}: expected 'facet=any' or 'facet=all'", mode_str)),
        }
    }

    if errors.is_empty() {
        Ok(modes)
    } else {
        Err(errors)
    }
}
