//! Terminal presentation: bordered tables and record formatters.

pub mod format;
pub mod table;

pub use format::{
    format_discoveries, format_hosts, format_search_results, format_subnets, format_sweep,
};
pub use table::Table;
