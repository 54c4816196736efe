use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db;

use super::AppState;

/// Name of the admin session cookie.
pub const ADMIN_COOKIE: &str = "modehaus_admin";

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The admin behind a request, stored as a request extension by [`require_admin`].
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub username: String,
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter keyed by client address.
///
/// The client is the TCP peer unless that peer is a trusted proxy, in which
/// case it is the right-most `X-Forwarded-For` hop that is not itself
/// trusted.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    trusted_proxies: Arc<[IpAddr]>,
    clients: Arc<Mutex<HashMap<String, RateLimitWindow>>>,
}

const MAX_TRACKED_CLIENTS: usize = 10_000;

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            trusted_proxies: Arc::from(Vec::<IpAddr>::new()),
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = Arc::from(proxies);
        self
    }

    /// Counts one request for `client`; `false` once the window is exhausted.
    ///
    /// At most [`MAX_TRACKED_CLIENTS`] windows are kept. When the map is full
    /// expired windows go first, then the oldest live one.
    async fn hit(&self, client: &str) -> bool {
        let mut clients = self.clients.lock().await;
        if clients.len() >= MAX_TRACKED_CLIENTS && !clients.contains_key(client) {
            let window = self.window;
            clients.retain(|_, w| w.started_at.elapsed() < window);
            if clients.len() >= MAX_TRACKED_CLIENTS {
                let oldest = clients
                    .iter()
                    .min_by_key(|(_, w)| w.started_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    clients.remove(&oldest);
                }
            }
        }

        let entry = clients.entry(client.to_string()).or_insert(RateLimitWindow {
            started_at: Instant::now(),
            count: 0,
        });
        if entry.started_at.elapsed() >= self.window {
            entry.started_at = Instant::now();
            entry.count = 0;
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
    meta: MiddlewareMeta,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct MiddlewareMeta {
    request_id: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

fn reject(status: StatusCode, code: &'static str, message: &'static str, req: &Request) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default();
    (
        status,
        Json(MiddlewareErrorBody {
            error: MiddlewareError { code, message },
            meta: MiddlewareMeta {
                request_id,
                timestamp: chrono::Utc::now(),
            },
        }),
    )
        .into_response()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware gating the admin API behind a valid session.
///
/// The token comes from `Authorization: Bearer` or the admin cookie. When no
/// admin credentials are configured (development only) every request passes.
pub async fn require_admin(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if state.config.admin.is_none() {
        req.extensions_mut().insert(AdminSession {
            username: "development".to_string(),
        });
        return next.run(req).await;
    }

    let Some(token) = session_token(req.headers()).map(str::to_string) else {
        return reject(StatusCode::UNAUTHORIZED, "unauthorized", "admin login required", &req);
    };

    match db::admin_sessions::find_valid_session(&state.pool, &token).await {
        Ok(Some(session)) => {
            req.extensions_mut().insert(AdminSession {
                username: session.username,
            });
            next.run(req).await
        }
        Ok(None) => reject(StatusCode::UNAUTHORIZED, "unauthorized", "session expired or invalid", &req),
        Err(e) => {
            tracing::error!(error = %e, "admin session lookup failed");
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "session lookup failed",
                &req,
            )
        }
    }
}

/// Middleware enforcing a per-client request limit on state-changing methods.
/// Reads pass through untouched.
pub async fn limit_writes(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(req).await;
    }

    let client = client_key(&req, &rate_limit.trusted_proxies);
    if !rate_limit.hit(&client).await {
        tracing::warn!(client = %client, path = %req.uri().path(), "rate limit exceeded");
        return reject(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "rate limit exceeded", &req);
    }

    next.run(req).await
}

/// Peer address, or the right-most untrusted `X-Forwarded-For` hop when the
/// peer is a trusted proxy. Without a peer address every request shares one
/// bucket.
fn client_key(req: &Request, trusted: &[IpAddr]) -> String {
    let Some(peer) = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return "unknown".to_string();
    };
    if !trusted.contains(&peer) {
        return peer.to_string();
    }

    let hops: Vec<&str> = req
        .headers()
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .collect();
    for hop in hops.iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) if trusted.contains(&ip) => continue,
            Ok(ip) => return ip.to_string(),
            Err(_) => break,
        }
    }
    peer.to_string()
}

/// Session token from `Authorization: Bearer <token>` or the admin cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    extract_bearer_token(headers.get(header::AUTHORIZATION)).or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == ADMIN_COOKIE)
            .map(|(_, value)| value.trim())
            .filter(|v| !v.is_empty())
    })
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `Set-Cookie` value for a new admin session.
#[must_use]
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{ADMIN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age_secs}{secure}")
}

/// `Set-Cookie` value that removes the admin cookie.
#[must_use]
pub fn clear_session_cookie() -> String {
    format!("{ADMIN_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer test-token");
        assert_eq!(extract_bearer_token(Some(&header)), Some("test-token"));
    }

    #[test]
    fn extract_bearer_token_rejects_non_bearer_header() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
    }

    #[test]
    fn session_token_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("lang=de; modehaus_admin=abc123; x=1"));
        assert_eq!(session_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer fromheader"));
        assert_eq!(session_token(&headers), Some("fromheader"));

        let mut empty = HeaderMap::new();
        empty.insert(header::COOKIE, HeaderValue::from_static("modehaus_admin="));
        assert_eq!(session_token(&empty), None);
    }

    #[test]
    fn cookies_are_strict_and_http_only() {
        let cookie = session_cookie("tok", 3600, true);
        assert!(cookie.starts_with("modehaus_admin=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.ends_with("; Secure"));
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn rate_limit_is_per_client() {
        let limiter = RateLimitState::new(2, Duration::from_secs(60));
        assert!(limiter.hit("10.0.0.1").await);
        assert!(limiter.hit("10.0.0.1").await);
        assert!(!limiter.hit("10.0.0.1").await);
        assert!(limiter.hit("10.0.0.2").await);
    }

    #[tokio::test]
    async fn rate_limit_caps_tracked_clients() {
        let limiter = RateLimitState::new(5, Duration::from_secs(60));
        for i in 0..MAX_TRACKED_CLIENTS + 500 {
            assert!(limiter.hit(&format!("client-{i}")).await);
        }
        assert_eq!(limiter.clients.lock().await.len(), MAX_TRACKED_CLIENTS);
        assert!(limiter.clients.lock().await.contains_key("client-10499"));
    }

    fn request_from(peer: &str, forwarded: Option<&str>) -> Request {
        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/write")
            .body(axum::body::Body::empty())
            .unwrap();
        if let Some(xff) = forwarded {
            req.headers_mut().insert("x-forwarded-for", HeaderValue::from_str(xff).unwrap());
        }
        let addr: SocketAddr = format!("{peer}:40000").parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn client_key_ignores_forwarded_for_from_untrusted_peer() {
        let req = request_from("203.0.113.9", Some("1.2.3.4"));
        assert_eq!(client_key(&req, &[]), "203.0.113.9");
    }

    #[test]
    fn client_key_takes_right_most_untrusted_hop_behind_proxy() {
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let inner: IpAddr = "10.0.0.2".parse().unwrap();
        let req = request_from("10.0.0.1", Some("6.6.6.6, 198.51.100.7, 10.0.0.2"));
        assert_eq!(client_key(&req, &[proxy, inner]), "198.51.100.7");

        let req = request_from("10.0.0.1", None);
        assert_eq!(client_key(&req, &[proxy]), "10.0.0.1");

        let req = request_from("10.0.0.1", Some("not-an-ip"));
        assert_eq!(client_key(&req, &[proxy]), "10.0.0.1");
    }

    #[tokio::test]
    async fn rotating_forwarded_for_does_not_escape_the_limit() {
        use axum::{routing::post, Router};
        use tower::ServiceExt;

        let limiter = RateLimitState::new(1, Duration::from_secs(60));
        let app: Router = Router::new()
            .route("/write", post(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn_with_state(limiter, limit_writes));

        let mut accepted = 0;
        for i in 0..50 {
            let req = request_from("203.0.113.9", Some(&format!("1.2.3.{i}")));
            let res = app.clone().oneshot(req).await.unwrap();
            if res.status() == StatusCode::OK {
                accepted += 1;
            } else {
                assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn rate_limit_window_resets() {
        let limiter = RateLimitState::new(1, Duration::from_millis(20));
        assert!(limiter.hit("c").await);
        assert!(!limiter.hit("c").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.hit("c").await);
    }
}
