mod errors;
mod operations;
mod state;
mod ui;

use clap::{Parser, Subcommand};
use colored::Colorize;
use facetdash_core::*;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use errors::{map_fetch_error, map_load_error};
use operations::{current_page, refresh_aggregate};
use state::AppState;

/// Facet dashboard - counts, taxonomy rollups and filtered listings
///
/// Examples:
///   # Ranked service counts from a local dataset
///   facetdash --data orgs.json counts --facet-name services
///
///   # Rollup tree against a running backend
///   facetdash --url http://localhost:8080 --taxonomy services.json tree --facet-name services
///
///   # Organizations offering both VFX and Rigging, second page
///   facetdash --data orgs.json list --facet services=VFX --facet services=Rigging \
///       --match services=all --page 2
///
///   # Select a whole taxonomy branch and group by region
///   facetdash --data orgs.json --taxonomy services.json list \
///       --toggle-node "services=Animation" --group-by regions
#[derive(Parser, Debug)]
#[command(name = "facetdash")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Filtering Logic:\n  \
    - Multiple --facet values for the SAME facet are combined with the facet's match mode\n  \
    - The default match mode is any (OR); --match F=all switches a facet to AND\n  \
    - Different facets are combined with AND\n\n\
Paging:\n  \
    - Without all-mode facets the backend paginates\n  \
    - With an active all-mode facet the full set is fetched and paged locally\n\n\
Rollups:\n  \
    - Counts prefixed with ~ are leaf sums and may count an entity more than once")]
struct Cli {
    /// Entity dataset JSON (bare array or {\"data\": [...]})
    #[arg(short, long, value_name = "FILE", global = true, conflicts_with = "url")]
    data: Option<PathBuf>,

    /// Backend base URL (overrides backend.base_url)
    #[arg(short, long, value_name = "URL", global = true)]
    url: Option<String>,

    /// Taxonomy rows JSON ([{\"L1\": ..., \"L2\": ..., \"L3\": ...}])
    #[arg(short, long, value_name = "FILE", global = true)]
    taxonomy: Option<PathBuf>,

    /// Engine configuration TOML
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Offline only: honor _MATCH=all for this facet like a consistent backend
    #[arg(long = "honor-all", value_name = "FACET", global = true)]
    honor_all: Vec<String>,

    /// Log debug output to stderr (RUST_LOG overrides the level)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ranked value counts for one facet
    Counts {
        #[arg(short = 'n', long = "facet-name", value_name = "FACET", default_value = "services")]
        facet_name: String,

        /// Use the backend's precomputed totals instead of counting entities
        #[arg(long)]
        totals: bool,
    },

    /// Taxonomy rollup tree for one facet
    Tree {
        #[arg(short = 'n', long = "facet-name", value_name = "FACET", default_value = "services")]
        facet_name: String,

        /// Roll up precomputed totals (approximate) instead of entity postings
        #[arg(long)]
        totals: bool,
    },

    /// Filtered, paged entity listing
    List {
        /// Select a facet value (format: facet=value, repeatable)
        #[arg(short, long = "facet", value_name = "NAME=VALUE")]
        facets: Vec<String>,

        /// Match mode for a facet (format: facet=any|all)
        #[arg(short, long = "match", value_name = "NAME=MODE")]
        matches: Vec<String>,

        /// Toggle a taxonomy node (format: facet=Node or facet=L1 > L2)
        #[arg(long = "toggle-node", value_name = "NAME=NODE")]
        toggle_nodes: Vec<String>,

        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Entities per page (defaults to display.page_size)
        #[arg(long = "page-size", value_name = "N")]
        page_size: Option<usize>,

        /// Group the page by a facet
        #[arg(short = 'G', long = "group-by", value_name = "FACET")]
        group_by: Option<String>,
    },
}

impl Command {
    /// Facet whose totals the offline source reports; `list` needs none
    fn count_facet(&self) -> Option<&str> {
        match self {
            Command::Counts { facet_name, .. } | Command::Tree { facet_name, .. } => {
                Some(facet_name.as_str())
            }
            Command::List { .. } => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.url {
        config.backend.base_url = url.clone();
    }

    let source = build_source(&cli, &config);
    let taxonomy_rows = load_rows(&cli);
    let mut state = AppState::new(config, source, taxonomy_rows);

    match cli.command {
        Command::Counts { ref facet_name, totals } => {
            let catalog = build_catalog(&state, facet_name, !totals).await;
            println!("{}", ui::format_counts(facet_name, catalog.counts()));
        }
        Command::Tree { ref facet_name, totals } => {
            if state.taxonomy_rows.is_empty() {
                anyhow::bail!("the tree command needs --taxonomy");
            }
            let catalog = build_catalog(&state, facet_name, !totals).await;
            println!("{}", ui::format_rollup_tree(&catalog, &state.filters));
        }
        Command::List {
            ref facets,
            ref matches,
            ref toggle_nodes,
            page,
            page_size,
            ref group_by,
        } => {
            apply_list_filters(&mut state, facets, matches, toggle_nodes);
            if let Some(size) = page_size {
                state.pager.set_page_size(size);
            }
            state.pager.set_page(page);

            print_listing(&mut state, group_by.as_deref()).await;
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn fail(title: &str, message: &str, details: &str) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), title.bold());
    eprintln!("{}\n", message);
    eprintln!("{}", details);
    process::exit(1);
}

fn build_source(cli: &Cli, config: &EngineConfig) -> Arc<dyn EntitySource> {
    let Some(path) = &cli.data else {
        tracing::debug!(base_url = %config.backend.base_url, "using HTTP backend");
        return Arc::new(HttpEntitySource::new(config.backend.base_url.clone()));
    };

    let entities = load_entities(path).unwrap_or_else(|err| {
        let (title, message, details) = map_load_error(&err);
        fail(&title, &message, &details);
    });
    tracing::debug!(entities = entities.len(), path = %path.display(), "loaded dataset");

    let source = cli
        .honor_all
        .iter()
        .fold(InMemorySource::new(entities), |source, facet| source.honor_all(facet));
    match cli.command.count_facet() {
        Some(facet) => Arc::new(source.with_count_facet(facet)),
        None => Arc::new(source),
    }
}

fn load_rows(cli: &Cli) -> Vec<TaxonomyRow> {
    let Some(path) = &cli.taxonomy else {
        return Vec::new();
    };

    let rows = load_taxonomy_rows(path).unwrap_or_else(|err| {
        let (title, message, details) = map_load_error(&err);
        fail(&title, &message, &details);
    });

    // Problems here make rollups misleading but do not stop the tree from building
    if let Err(errors) = validate_taxonomy(&rows) {
        eprintln!("{}", "Taxonomy warnings:".yellow().bold());
        for (i, error) in errors.iter().enumerate() {
            eprintln!("  {}. {}", i + 1, error);
        }
        eprintln!();
    }

    rows
}

async fn build_catalog(state: &AppState, facet: &str, exact: bool) -> FacetCatalog {
    state.build_catalog(facet, exact).await.unwrap_or_else(|err| {
        let (title, message, details) = map_fetch_error(&err);
        fail(&title, &message, &details);
    })
}

fn apply_list_filters(
    state: &mut AppState,
    facets: &[String],
    matches: &[String],
    toggle_nodes: &[String],
) {
    for facet_str in facets {
        if !facet_str.contains('=') {
            eprintln!("Warning: Invalid facet format '{}'. Expected 'name=value'", facet_str);
        }
    }

    let modes = parse_match_modes(matches).unwrap_or_else(|errors| {
        fail("Invalid Match Mode", "Some --match arguments could not be read.", &errors.join("\n"));
    });
    state.apply_filters(&parse_facet_filters(facets), &modes);

    for toggle in toggle_nodes {
        let Some((facet, node)) = toggle.split_once('=') else {
            eprintln!("Warning: Invalid node format '{}'. Expected 'facet=node'", toggle);
            continue;
        };
        if let Err(err) = state.toggle_node(facet.trim(), node.trim()) {
            eprintln!("Warning: {}", err);
        }
    }
}

async fn print_listing(state: &mut AppState, group_by: Option<&str>) {
    println!("# Filtered Results\n");

    if state.filters.is_active() {
        println!("## Active Filters\n");
        println!("{}\n", ui::format_active_filters(&state.filters));
    }

    refresh_aggregate(state).await;
    if state.aggregate.truncated {
        eprintln!(
            "{} the aggregate hit the page ceiling; results are incomplete\n",
            "Warning:".yellow().bold()
        );
    }

    let page = current_page(state).await.unwrap_or_else(|err| {
        let (title, message, details) = map_fetch_error(&err);
        fail(&title, &message, &details);
    });

    let facets = &state.config.display.facets;
    match group_by {
        Some(group) => println!("{}", ui::format_grouped_page(&page, group, facets)),
        None => println!("{}", ui::format_page(&page, facets)),
    }
}
