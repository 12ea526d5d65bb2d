use crate::models::Entity;
use std::collections::HashMap;

/// Group entities by the tokens of a facet
/// Entities with multiple tokens appear in multiple groups
/// Returns a HashMap keyed by the first-seen display label of each token
pub fn group_entities_by_facet(entities: &[Entity], facet: &str) -> HashMap<String, Vec<Entity>> {
    let mut labels: HashMap<String, String> = HashMap::new();
    let mut groups: HashMap<String, Vec<Entity>> = HashMap::new();

    for entity in entities {
        let tokens = entity.tokens(facet);

        if tokens.is_empty() {
            // Entities without this facet go to "unspecified" group
            groups
                .entry("_unspecified_".to_string())
                .or_default()
                .push(entity.clone());
        } else {
            for token in tokens {
                let label = labels.entry(token.key).or_insert(token.label).clone();
                groups.entry(label).or_default().push(entity.clone());
            }
        }
    }

    groups
}

/// Get sorted group names from a grouped entities map
pub fn get_sorted_group_names(groups: &HashMap<String, Vec<Entity>>) -> Vec<String> {
    let mut group_names: Vec<String> = groups.keys().cloned().collect();
    group_names.sort();
    group_names
}
