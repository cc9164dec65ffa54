pub mod cache_handlers;
pub mod health_handlers;
pub mod scan_handlers;

pub use cache_handlers::{cleanup_cache, get_cache_stats};
pub use health_handlers::{health_check, health_check_simple};
