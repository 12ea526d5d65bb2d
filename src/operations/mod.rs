pub mod fetch_ops;

pub use fetch_ops::{current_page, refresh_aggregate};
