use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;

use crate::{config::Config, error::AppError};

const KEY_PREFIX: &str = "rate_limit:";

/// 基于 Redis 的固定窗口限流，按客户端IP计数
#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<redis::Client>,
    window_secs: u64,
    max_requests: u32,
}

/// 客户端标识：优先取反向代理头，其次取连接地址
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
        })
        .map(|ip| ip.trim().to_string())
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

impl RateLimiter {
    pub fn new(redis: Arc<redis::Client>, config: &Config) -> Self {
        Self {
            redis,
            window_secs: config.rate_limit_window().as_secs(),
            max_requests: config.rate_limit_requests,
        }
    }

    /// 计数并返回是否超限；Redis 不可用时放行
    async fn hit(&self, client: &str) -> bool {
        let key = format!("{}{}", KEY_PREFIX, client);

        let result: redis::RedisResult<i64> = async {
            let mut conn = self.redis.get_multiplexed_async_connection().await?;
            let count: i64 = conn.incr(&key, 1).await?;
            if count == 1 {
                let _: () = conn.expire(&key, self.window_secs as i64).await?;
            }
            Ok::<i64, redis::RedisError>(count)
        }
        .await;

        match result {
            Ok(count) => count > i64::from(self.max_requests),
            Err(e) => {
                tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
                false
            }
        }
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let client = client_ip(req.headers(), remote);

    if limiter.hit(&client).await {
        tracing::info!("Rate limit exceeded for {}", client);
        return AppError::RateLimited(limiter.window_secs).into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn real_ip_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.7"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.8"));
        let remote: SocketAddr = "192.168.1.2:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(remote)), "10.0.0.7");
    }

    #[test]
    fn first_forwarded_address_is_used() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" , 203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, None), "203.0.113.9");
    }

    #[test]
    fn falls_back_to_connection_then_unknown() {
        let headers = HeaderMap::new();
        let remote: SocketAddr = "192.168.1.2:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(remote)), "192.168.1.2");
        assert_eq!(client_ip(&headers, None), "unknown");
    }
}
