pub mod plan;
pub mod report;
pub mod scan;
pub mod service;

// Re-export commonly used types
pub use plan::*;
pub use report::*;
pub use scan::*;
pub use service::*;
