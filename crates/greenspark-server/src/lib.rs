//! GreenSpark Web Server
//!
//! Axum-based REST API for the GreenSpark electricity bill service.
//!
//! Security features:
//! - Bearer JWT authentication with a revocation denylist
//! - Per-IP rate limits and failed-login lockout
//! - Restrictive CORS policy
//! - Input validation (pagination limits, file size limits)
//! - Sanitized error responses carrying a request id

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Request},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use greenspark_core::{
    AIBackend, AIClient, CacheService, Database, JobQueue, Settings, Storage, TaskContext,
    TokenService,
};

mod auth;
mod error;
mod handlers;
mod maintenance;
mod ratelimit;

pub use auth::CurrentUser;
pub use error::{AppError, ErrorCode};
pub use maintenance::{run_sweep, start_maintenance, MaintenanceConfig};
pub use ratelimit::RateLimits;

/// Maximum file upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Header carrying the request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub settings: Settings,
    pub tokens: TokenService,
    pub cache: CacheService,
    pub storage: Storage,
    pub ai: Option<AIClient>,
    pub queue: JobQueue,
    pub limits: RateLimits,
    /// Proxies whose X-Forwarded-For headers are trusted
    pub trusted_proxies: Vec<ipnet::IpNet>,
}

impl AppState {
    /// Assemble state from settings and the job context the workers share
    pub fn new(
        settings: Settings,
        ctx: &TaskContext,
        queue: JobQueue,
        trusted_proxies: Vec<ipnet::IpNet>,
    ) -> greenspark_core::Result<Self> {
        let tokens = TokenService::new(&settings.jwt_secret, settings.tokens.clone())?;
        let limits = RateLimits::new(settings.rate_limits.clone());
        Ok(Self {
            db: ctx.db.clone(),
            tokens,
            cache: ctx.cache.clone(),
            storage: ctx.storage.clone(),
            ai: ctx.ai.clone(),
            queue,
            limits,
            trusted_proxies,
            settings,
        })
    }
}

/// Request id assigned by the request-id middleware
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Plain message response
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Extract client IP address, respecting trusted proxies
///
/// SECURITY: X-Forwarded-For headers are ONLY trusted when the TCP connection
/// comes from a configured trusted proxy. Otherwise, only the actual TCP
/// peer address is used (to prevent header spoofing attacks).
pub(crate) fn get_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trusted_proxies: &[ipnet::IpNet],
) -> Option<IpAddr> {
    let peer_ip = connect_info.map(|ci| ci.0.ip())?;

    if trusted_proxies.is_empty() || !trusted_proxies.iter().any(|net| net.contains(&peer_ip)) {
        return Some(peer_ip);
    }

    // X-Forwarded-For format: "client, proxy1, proxy2" - take the first (original client)
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
    if forwarded.is_some() {
        return forwarded;
    }

    // Fallback: try X-Real-IP header
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
    Some(real_ip.unwrap_or(peer_ip))
}

/// Client IP of a request; unknown peers share the unspecified address
pub(crate) fn client_ip(state: &AppState, request: &Request) -> IpAddr {
    get_client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        &state.trusted_proxies,
    )
    .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Parse a comma-separated list of IP addresses and CIDR networks
///
/// Examples:
/// - "10.42.0.0/16" - entire subnet
/// - "10.0.0.5" - single IP (parsed as /32 for IPv4 or /128 for IPv6)
pub fn parse_trusted_networks(input: &str) -> Vec<ipnet::IpNet> {
    input
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(net) = s.parse::<ipnet::IpNet>() {
                return Some(net);
            }
            if let Ok(ip) = s.parse::<IpAddr>() {
                return Some(ipnet::IpNet::from(ip));
            }
            warn!(input = s, "Failed to parse trusted network entry");
            None
        })
        .collect()
}

/// Assign every request an id, echoing the caller's when present
async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = [REQUEST_ID_HEADER, CORRELATION_ID_HEADER]
        .iter()
        .find_map(|name| request.headers().get(*name))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ]);

    if origins.is_empty() {
        // Restrictive default: only allow same-origin
        return layer;
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    layer.allow_origin(origins).allow_credentials(true)
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let require_user = || middleware::from_fn_with_state(state.clone(), auth::require_user);

    let auth_routes = Router::new()
        .route("/signup", post(handlers::signup))
        .route("/login", post(handlers::login))
        .route("/admin/login", post(handlers::admin_login))
        .route("/refresh", post(handlers::refresh))
        .route(
            "/password-reset-request",
            post(handlers::password_reset_request),
        )
        .route(
            "/password-reset-confirm",
            post(handlers::password_reset_confirm),
        )
        .route("/email/confirm-change", post(handlers::confirm_email_change))
        .route(
            "/email/request-verification-email",
            post(handlers::request_verification_email),
        )
        .route("/email/verify-email", post(handlers::verify_email))
        .merge(
            Router::new()
                .route("/logout", post(handlers::logout))
                .route("/email", post(handlers::request_email_change))
                .route_layer(require_user()),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::auth_rate_limit,
        ));

    let protected = Router::new()
        // Users
        .route(
            "/users/me",
            get(handlers::get_me)
                .patch(handlers::update_me)
                .delete(handlers::delete_me),
        )
        .route("/users/change-password", post(handlers::change_password))
        .route("/users/me/bills", get(handlers::list_my_bills))
        // Admin
        .route("/admin/users/all", get(handlers::list_all_users))
        .route("/admin/catalog", post(handlers::create_catalog_entry))
        .route(
            "/admin/catalog/:catalog_id",
            axum::routing::delete(handlers::delete_catalog_entry),
        )
        .route("/admin/:user_id", get(handlers::get_user))
        .route("/admin/:user_id/change-role", post(handlers::change_role))
        .route("/admin/:user_id/activate", post(handlers::activate_user))
        .route("/admin/:user_id/deactivate", post(handlers::deactivate_user))
        .route(
            "/admin/:user_id/delete",
            axum::routing::delete(handlers::delete_user),
        )
        .route(
            "/admin/:user_id/appliances",
            get(handlers::admin_user_appliances),
        )
        // Bills
        .route("/bills/all", get(handlers::list_bills))
        .route("/bills/upload", post(handlers::request_upload_url))
        .route("/bills/confirm", post(handlers::confirm_upload))
        .route(
            "/bills/direct-upload",
            post(handlers::direct_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE + 64 * 1024)),
        )
        .route("/bills/manual", post(handlers::create_manual_bill))
        .route(
            "/bills/:id",
            get(handlers::get_bill).delete(handlers::delete_bill),
        )
        .route("/bills/:id/estimate", post(handlers::trigger_estimation))
        // Appliances
        .route("/appliances", post(handlers::create_appliance))
        .route("/appliances/catalog", get(handlers::list_catalog))
        .route("/appliances/bulk", post(handlers::bulk_create_appliances))
        .route("/appliances/bulk/update", put(handlers::bulk_update_appliances))
        .route("/appliances/bulk/delete", post(handlers::bulk_delete_appliances))
        .route("/appliances/my", get(handlers::list_my_appliances))
        .route("/appliances/list", get(handlers::list_appliances_paginated))
        .route("/appliances/statistics", get(handlers::my_appliance_statistics))
        .route("/appliances/estimate-bill", post(handlers::estimate_bill_impact))
        .route("/appliances/admin/all", get(handlers::admin_list_appliances))
        .route(
            "/appliances/admin/statistics",
            get(handlers::admin_appliance_statistics),
        )
        .route(
            "/appliances/admin/user/:user_id/appliances",
            get(handlers::admin_user_appliances),
        )
        .route(
            "/appliances/:id",
            get(handlers::get_appliance)
                .put(handlers::update_appliance)
                .delete(handlers::delete_appliance),
        )
        .route(
            "/appliances/:id/consumption",
            get(handlers::appliance_consumption),
        )
        // Insights
        .route("/insights/status/:bill_id", get(handlers::insight_status))
        .route("/insights/report/:bill_id", get(handlers::insight_report))
        .route(
            "/insights/report/:bill_id/refresh",
            post(handlers::refresh_insight),
        )
        .route_layer(require_user())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::api_rate_limit,
        ));

    let api_routes = Router::new().nest("/auth", auth_routes).merge(protected);

    let csp_value = HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'");

    Router::new()
        .route("/health", get(handlers::health))
        .nest(&state.settings.api_prefix, api_routes)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .map(|id| id.0.as_str())
                .unwrap_or("-");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        }))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors_layer(&state.settings.cors_origins))
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ))
}

/// Start the server
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    if let Err(e) = state.storage.ensure_bucket().await {
        warn!("⚠️  Could not ensure storage bucket '{}': {}", state.storage.bucket(), e);
    }

    check_ai_connection(state.ai.as_ref()).await;

    if let Some(config) = MaintenanceConfig::from_env(state.settings.stuck_parse_after) {
        start_maintenance(state.clone(), config);
    }

    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Check and log AI backend connection status
async fn check_ai_connection(ai: Option<&AIClient>) {
    match ai {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "✅ AI backend connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "⚠️  AI backend configured but not responding: {} (model: {})",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("ℹ️  AI backend not configured (set GEMINI_API_KEY to enable bill parsing)");
        }
    }
}
