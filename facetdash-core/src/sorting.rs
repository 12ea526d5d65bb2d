use unicode_normalization::UnicodeNormalization;

use crate::counts::{CountEntry, CountIndex};

/// Order a count index for display: highest count first, ties broken by
/// [`label_sort_key`] and then by the raw label.
pub fn rank_counts(index: &CountIndex) -> Vec<(&String, &CountEntry)> {
    let mut ranked: Vec<_> = index.iter().collect();
    ranked.sort_by(|(_, a), (_, b)| {
        b.count
            .cmp(&a.count)
            .then_with(|| label_sort_key(&a.label).cmp(&label_sort_key(&b.label)))
            .then_with(|| a.label.cmp(&b.label))
    });
    ranked
}

/// Normalize a label for alphabetical ordering
/// - Normalize unicode (NFD then lowercase)
/// - Drop combining marks so accented labels sort beside their base letter
/// - Collapse whitespace
pub fn label_sort_key(label: &str) -> String {
    let decomposed: String = label
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    decomposed.split_whitespace().collect::<Vec<_>>().join(" ")
}
