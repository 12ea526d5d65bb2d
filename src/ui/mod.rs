pub mod formatting;

pub use formatting::{
    format_active_filters, format_counts, format_grouped_page, format_page, format_rollup_tree,
};
