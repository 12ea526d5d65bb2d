pub mod error_mapper;

pub use error_mapper::{map_fetch_error, map_load_error};
