pub mod cors;
pub mod logging;
pub mod rate_limit;

pub use cors::create_cors_layer;
pub use logging::{create_logging_layer, init_logging, request_logging_middleware};
pub use rate_limit::{extract_client_ip, ip_rate_limit_middleware, IpRateLimiter};
