//! Per-client rate limiting middleware using the Governor crate

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::{
    net::SocketAddr,
    num::NonZeroU32,
    sync::{Arc, Weak},
    task::{Context, Poll},
    time::Duration,
};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::AppError;

type SharedRateLimiter =
    Arc<RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock, NoOpMiddleware>>;

/// Paths that are never limited
const EXEMPT_PATHS: [&str; 1] = ["/health"];

/// Rate limiting layer keyed by client address
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: SharedRateLimiter,
}

impl RateLimitLayer {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(burst_size).unwrap_or(NonZeroU32::MIN));

        let limiter = Arc::new(RateLimiter::keyed(quota));

        Self { limiter }
    }

    /// Periodically drop state for clients whose budget has fully refilled.
    ///
    /// Without this the keyed store grows with every distinct client key. The
    /// task stops once every clone of the layer is gone.
    pub fn start_cleanup(&self, every: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; rate limiter state will not be pruned");
            return;
        };
        let limiter: Weak<_> = Arc::downgrade(&self.limiter);

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                limiter.retain_recent();
                limiter.shrink_to_fit();
                debug!(clients = limiter.len(), "Pruned idle rate limit state");
            }
        });
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Rate limiting middleware service
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: SharedRateLimiter,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if EXEMPT_PATHS.contains(&request.uri().path()) {
            let future = self.inner.call(request);
            return Box::pin(future);
        }

        let client = client_key(&request);
        match self.limiter.check_key(&client) {
            Ok(_) => {
                let future = self.inner.call(request);
                Box::pin(future)
            }
            Err(_) => {
                warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
                Box::pin(async move { Ok(AppError::RateLimitExceeded.into_response()) })
            }
        }
    }
}

/// Identify the caller: forwarding headers first, then the peer address
pub fn client_key(request: &Request<Body>) -> String {
    let headers = request.headers();

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
