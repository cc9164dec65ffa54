use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::QuantaClock, middleware::NoOpMiddleware, Quota, RateLimiter,
};
use std::{net::IpAddr, num::NonZeroU32, sync::Arc, time::Duration};

use crate::config::Settings;

/// Transport-level guard applied per client IP, in front of the
/// plan-aware limiter inside the scan service. Keeps abusive clients from
/// reaching request parsing at all.
pub struct IpRateLimiter {
    limiter: RateLimiter<
        IpAddr,
        governor::state::keyed::DashMapStateStore<IpAddr>,
        QuantaClock,
        NoOpMiddleware,
    >,
}

impl IpRateLimiter {
    pub fn new(settings: &Settings) -> Self {
        let requests_per_window = NonZeroU32::new(settings.rate_limit_requests)
            .unwrap_or_else(|| NonZeroU32::new(100).unwrap());

        let window_duration = Duration::from_secs(settings.rate_limit_window_seconds as u64);

        let quota = Quota::with_period(window_duration)
            .unwrap_or_else(|| Quota::per_minute(requests_per_window))
            .allow_burst(requests_per_window);

        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn check_ip(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }
}

/// Extract client IP from request headers
pub fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    // Check X-Forwarded-For header first (for proxies)
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // Take the first IP in the chain
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }

    // Check X-Real-IP header
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            if let Ok(ip) = ip_str.parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    None
}

/// IP-based rate limiting middleware
pub async fn ip_rate_limit_middleware(
    State(ip_limiter): State<Arc<IpRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let client_ip =
        extract_client_ip(request.headers()).unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]));

    if ip_limiter.check_ip(client_ip) {
        let response = next.run(request).await;
        Ok(response)
    } else {
        tracing::warn!("Rate limit exceeded for IP: {}", client_ip);
        Err(StatusCode::TOO_MANY_REQUESTS)
    }
}
