use crate::models::TaxonomyRow;
use crate::tokens::normalize_key;
use std::collections::HashMap;

/// Validate the taxonomy reference table
/// Returns Ok(()) if valid, or Err(Vec<String>) with validation errors
///
/// Problems reported here do not stop the tree from being built; they point
/// at rows whose rollups are likely to be misleading.
pub fn validate_taxonomy(rows: &[TaxonomyRow]) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if rows.is_empty() {
        errors.push("Taxonomy table must contain at least one row".to_string());
    }

    // leaf key -> (parent path, row number) of its first appearance
    let mut leaf_parents: HashMap<String, (String, usize)> = HashMap::new();
    // node path -> first non-empty description
    let mut descriptions: HashMap<String, String> = HashMap::new();

    for (idx, row) in rows.iter().enumerate() {
        let row_ref = format!("Row #{}", idx + 1);

        if normalize_key(&row.l1).is_empty() {
            errors.push(format!("{}: L1 cannot be empty", row_ref));
            continue;
        }

        let l2 = row.l2.as_deref().map(normalize_key).filter(|k| !k.is_empty());
        let l3 = row.l3.as_deref().map(normalize_key).filter(|k| !k.is_empty());

        if l2.is_none() && l3.is_some() {
            errors.push(format!("{}: L3 '{}' has no L2 parent", row_ref, row.l3.as_deref().unwrap_or_default()));
        }

        let path: Vec<String> = std::iter::once(normalize_key(&row.l1))
            .chain(l2)
            .chain(l3)
            .collect();

        if path.len() > 1 {
            let leaf = path[path.len() - 1].clone();
            let parent = path[..path.len() - 1].join(" > ");

            match leaf_parents.get(&leaf) {
                Some((first_parent, first_row)) if *first_parent != parent => {
                    errors.push(format!(
                        "{}: leaf '{}' is under '{}' but row #{} puts it under '{}'",
                        row_ref, leaf, parent, first_row, first_parent
                    ));
                }
                Some(_) => {}
                None => {
                    leaf_parents.insert(leaf, (parent, idx + 1));
                }
            }
        }

        if let Some(description) = row.description.as_deref().map(str::trim) {
            if !description.is_empty() {
                let node = path.join(" > ");
                match descriptions.get(&node) {
                    Some(first) if first != description => {
                        errors.push(format!(
                            "{}: '{}' has conflicting description (first seen: '{}')",
                            row_ref, node, first
                        ));
                    }
                    Some(_) => {}
                    None => {
                        descriptions.insert(node, description.to_string());
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
