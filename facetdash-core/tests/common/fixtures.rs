//! Dataset fixtures shared by the harnesses.

use facetdash_core::{Entity, TaxonomyRow};

/// `n` entities with IDs `{prefix}{i}` tagged with `services`.
pub fn studios(prefix: &str, n: usize, services: &str) -> Vec<Entity> {
    (0..n)
        .map(|i| Entity::new(format!("{}{}", prefix, i)).with_field("services", services))
        .collect()
}

/// A small mixed dataset: 5 use 2D Animation, 4 use Rigging, 2 use both.
pub fn animation_dataset() -> Vec<Entity> {
    let mut entities = studios("flat", 3, "2D Animation");
    entities.extend(studios("rig", 2, "Rigging"));
    entities.extend(studios("both", 2, "2D Animation, Rigging, 2d animation"));
    entities.extend(studios("vfx", 4, "VFX"));
    entities
}

pub fn animation_taxonomy() -> Vec<TaxonomyRow> {
    vec![
        TaxonomyRow::new("Animation", "2D Animation", "").with_description("Flat work"),
        TaxonomyRow::new("Animation", "Rigging", "").with_description("Character setup"),
        TaxonomyRow::new("Visual Effects", "VFX", ""),
    ]
}
