use colored::Colorize;
use facetdash_core::{
    get_sorted_group_names, group_entities_by_facet, rank_counts, CountIndex, Entity,
    FacetCatalog, FilterState, MatchMode, NodeSelection, Page, PagingStrategy,
};

/// Format a count index as a ranked list, highest count first
pub fn format_counts(facet: &str, counts: &CountIndex) -> String {
    if counts.is_empty() {
        return format!("No values recorded for '{}'.", facet);
    }

    let ranked = rank_counts(counts);
    let width = ranked
        .iter()
        .map(|(_, entry)| entry.count.to_string().len())
        .max()
        .unwrap_or(1);

    let mut lines = vec![format!("{} ({} values)", facet.bold(), ranked.len())];
    for (_, entry) in ranked {
        lines.push(format!("  {:>width$}  {}", entry.count, entry.label, width = width));
    }
    lines.join("\n")
}

fn selection_marker(selection: NodeSelection) -> &'static str {
    match selection {
        NodeSelection::All => "[x]",
        NodeSelection::Partial => "[-]",
        NodeSelection::None => "[ ]",
    }
}

/// Format the rolled-up taxonomy as an indented tree
///
/// Approximate counts are prefixed with `~`.
pub fn format_rollup_tree(catalog: &FacetCatalog, filters: &FilterState) -> String {
    let taxonomy = catalog.taxonomy();
    let mut lines = Vec::new();

    for row in catalog.rollup_tree() {
        let selection = taxonomy.selection(row.id, filters, catalog.facet());
        let count = if row.count.exact {
            row.count.count.to_string()
        } else {
            format!("~{}", row.count.count)
        };

        let name = match row.depth {
            0 => row.name.bold().to_string(),
            _ => row.name.clone(),
        };

        lines.push(format!(
            "{}{} {} ({})",
            "  ".repeat(row.depth),
            selection_marker(selection),
            name,
            count.cyan()
        ));
    }

    if !catalog.is_exact() {
        lines.push(String::new());
        lines.push("~ leaf sums; entities in several leaves are counted more than once".dimmed().to_string());
    }

    lines.join("\n")
}

/// Format the active filters, one line per facet
pub fn format_active_filters(filters: &FilterState) -> String {
    filters
        .active_facets()
        .map(|(facet, selection)| {
            let joiner = match selection.match_mode {
                MatchMode::Any => " OR ",
                MatchMode::All => " AND ",
            };
            let values: Vec<&str> = selection.selected.iter().map(String::as_str).collect();
            format!("- {} ({}): {}", facet.bold(), selection.match_mode, values.join(joiner))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format a single entity with its display facets
pub fn format_entity(entity: &Entity, facets: &[String]) -> String {
    let mut lines = vec![format!("• {} {}", entity.display_name().bold(), format!("#{}", entity.id).dimmed())];

    for facet in facets {
        let tokens = entity.tokens(facet);
        if tokens.is_empty() {
            continue;
        }
        let labels: Vec<&str> = tokens.iter().map(|t| t.label.as_str()).collect();
        lines.push(format!("    {}: {}", facet, labels.join(", ")));
    }
    lines.join("\n")
}

/// Format one page of results, with a footer describing the window
pub fn format_page(page: &Page, facets: &[String]) -> String {
    let mut sections: Vec<String> = page
        .items
        .iter()
        .map(|entity| format_entity(entity, facets))
        .collect();

    if sections.is_empty() {
        sections.push("No entities match the current filters.".italic().to_string());
    }

    sections.push(format_page_footer(page));
    sections.join("\n")
}

/// Format one page of results grouped by a facet
pub fn format_grouped_page(page: &Page, group_by: &str, facets: &[String]) -> String {
    let groups = group_entities_by_facet(&page.items, group_by);
    let mut sections = Vec::new();

    for name in get_sorted_group_names(&groups) {
        if let Some(entities) = groups.get(&name) {
            sections.push(format!("\n## {}: {}", group_by, name).bold().to_string());
            for entity in entities {
                sections.push(format_entity(entity, facets));
            }
        }
    }

    sections.push(format_page_footer(page));
    sections.join("\n")
}

fn format_page_footer(page: &Page) -> String {
    let source = match page.strategy {
        PagingStrategy::Backend => "backend",
        PagingStrategy::Local => "local",
    };
    format!(
        "\nPage {}/{} ({} entities, {} paging)",
        page.page,
        page.page_count().max(1),
        page.total,
        source
    )
    .dimmed()
    .to_string()
}
