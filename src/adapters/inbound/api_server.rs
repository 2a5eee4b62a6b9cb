//! Geocoding API Server
//!
//! HTTP surface over the geocoding service: forward search, reverse
//! lookup and a health endpoint.

use crate::application::GeocodingService;
use crate::domain::entities::{GeocodeResult, SearchOptions};
use crate::domain::errors::GeocodeError;
use crate::domain::value_objects::Coordinates;
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Forward search query string. Numbers arrive as text so a malformed
/// value becomes a validation error rather than a bare 400.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    /// `lon,lat`
    #[serde(default)]
    pub proximity: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Reverse lookup query string.
#[derive(Debug, Default, Deserialize)]
pub struct ReverseParams {
    #[serde(default)]
    pub lat: Option<String>,
    #[serde(default)]
    pub lon: Option<String>,
}

/// Search response.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<GeocodeResult>,
}

/// Reverse response. `result` is `null` when nothing is there.
#[derive(Debug, Serialize)]
pub struct ReverseResponse {
    pub result: Option<GeocodeResult>,
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub provider: String,
    pub cache_entries: usize,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Wrapper giving `GeocodeError` an HTTP shape.
pub struct ApiError(pub GeocodeError);

impl From<GeocodeError> for ApiError {
    fn from(err: GeocodeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::BAD_GATEWAY);
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code(),
                message: self.0.to_string(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let GeocodeError::RateLimit { retry_after_ms } = self.0 {
            let secs = retry_after_ms.div_ceil(1000).max(1);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// API server state.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<GeocodingService>,
}

impl ApiState {
    pub fn new(service: Arc<GeocodingService>) -> Self {
        Self { service }
    }
}

/// Build the router with all routes, request tracing and permissive CORS
/// for browser clients.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/geocode/search", get(search_handler))
        .route("/api/v1/geocode/reverse", get(reverse_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API server for the geocoding service.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, service: Arc<GeocodingService>) -> Self {
        Self {
            listen_addr,
            state: ApiState::new(service),
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// The final Ok(()) is excluded from coverage since axum::serve runs
    /// until shutdown.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run<S>(&self, shutdown: S) -> anyhow::Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state.clone());

        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("geocoding API listening on {}", self.listen_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("geocoding API stopped");
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, GeocodeError> {
    raw.trim()
        .parse()
        .map_err(|_| GeocodeError::validation(format!("{} must be a number, got {:?}", name, raw)))
}

// Handler functions

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: state.service.active_provider().to_string(),
        cache_entries: state.service.cache().len(),
    };
    Json(response)
}

async fn search_handler(
    State(state): State<ApiState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let mut options = SearchOptions::new();
    if let Some(country) = params.country {
        options = options.country(country);
    }
    if let Some(limit) = params.limit.as_deref().filter(|l| !l.trim().is_empty()) {
        options = options.limit(parse_number("limit", limit)?);
    }
    if let Some(raw) = params.proximity.as_deref().filter(|p| !p.trim().is_empty()) {
        let proximity = Coordinates::parse_lon_lat(raw).ok_or_else(|| {
            GeocodeError::validation(format!("proximity must be lon,lat, got {:?}", raw))
        })?;
        options = options.proximity(proximity);
    }
    if let Some(language) = params.language {
        options = options.language(language);
    }

    let text = params.q.unwrap_or_default();
    let results = state.service.search(&text, options).await?;
    Ok(Json(SearchResponse { results }))
}

async fn reverse_handler(
    State(state): State<ApiState>,
    Query(params): Query<ReverseParams>,
) -> Result<Json<ReverseResponse>, ApiError> {
    let lat: f64 = parse_number("lat", params.lat.as_deref().unwrap_or_default())?;
    let lon: f64 = parse_number("lon", params.lon.as_deref().unwrap_or_default())?;

    let result = state.service.reverse(lat, lon).await?;
    Ok(Json(ReverseResponse { result }))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::entities::{GeocodeQuery, ProviderOutcome};
    use crate::domain::errors::ProviderError;
    use crate::domain::ports::{GeocodingProvider, ReverseGeocoder};
    use crate::domain::value_objects::ProviderKind;
    use crate::infrastructure::{RateLimitConfig, RateLimiter};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode as HttpStatusCode};
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    // ===== Mock Implementations =====

    struct StubProvider {
        kind: ProviderKind,
        answer: Result<ProviderOutcome, ProviderError>,
        seen: Mutex<Vec<GeocodeQuery>>,
    }

    #[async_trait]
    impl GeocodingProvider for StubProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn is_rate_limited(&self) -> bool {
            self.kind == ProviderKind::Nominatim
        }

        async fn forward_geocode(
            &self,
            query: &GeocodeQuery,
        ) -> Result<ProviderOutcome, ProviderError> {
            self.seen.lock().unwrap().push(query.clone());
            self.answer.clone()
        }
    }

    struct StubReverse(Option<GeocodeResult>);

    #[async_trait]
    impl ReverseGeocoder for StubReverse {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Nominatim
        }

        async fn reverse_geocode(
            &self,
            _point: Coordinates,
        ) -> Result<Option<GeocodeResult>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    fn sample(id: &str) -> GeocodeResult {
        GeocodeResult {
            id: id.to_string(),
            label: "Eyre Square, Galway, Ireland".to_string(),
            name: "Eyre Square".to_string(),
            coordinates: Coordinates::new(-9.05, 53.27),
            bbox: None,
            address: None,
            provider: ProviderKind::Mapbox,
        }
    }

    fn stub(
        kind: ProviderKind,
        answer: Result<ProviderOutcome, ProviderError>,
    ) -> Arc<StubProvider> {
        Arc::new(StubProvider {
            kind,
            answer,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn create_test_app_with(
        provider: Arc<StubProvider>,
        reverse: Option<GeocodeResult>,
        limiter: RateLimiter,
    ) -> Router {
        let service = GeocodingService::builder(provider, Arc::new(StubReverse(reverse)))
            .rate_limiter(Arc::new(limiter))
            .build();
        router(ApiState::new(Arc::new(service)))
    }

    fn create_test_app() -> Router {
        create_test_app_with(
            stub(
                ProviderKind::Mapbox,
                Ok(ProviderOutcome::Found(vec![sample("mapbox:poi.1")])),
            ),
            None,
            RateLimiter::default(),
        )
    }

    async fn get(app: Router, uri: &str) -> (HttpStatusCode, HeaderMap, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, headers, json)
    }

    // ===== Health Tests =====

    #[tokio::test]
    async fn test_health_handler() {
        let (status, _, body) = get(create_test_app(), "/health").await;
        assert_eq!(status, HttpStatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["provider"], "mapbox");
        assert_eq!(body["cache_entries"], 0);
    }

    // ===== Search Tests =====

    #[tokio::test]
    async fn test_search_handler_returns_results() {
        let (status, _, body) =
            get(create_test_app(), "/api/v1/geocode/search?q=eyre%20square&limit=3").await;

        assert_eq!(status, HttpStatusCode::OK);
        assert_eq!(body["results"][0]["id"], "mapbox:poi.1");
        assert_eq!(body["results"][0]["coordinates"], serde_json::json!([-9.05, 53.27]));
    }

    #[tokio::test]
    async fn test_search_handler_passes_options() {
        let provider = stub(ProviderKind::Mapbox, Ok(ProviderOutcome::Empty));
        let app = create_test_app_with(provider.clone(), None, RateLimiter::default());

        let (status, _, body) = get(
            app,
            "/api/v1/geocode/search?q=galway&country=IE&limit=50&proximity=-9.05,53.27&language=ga",
        )
        .await;
        assert_eq!(status, HttpStatusCode::OK);
        assert_eq!(body["results"], serde_json::json!([]));

        let seen = provider.seen.lock().unwrap();
        let q = &seen[0];
        assert_eq!(q.country.as_deref(), Some("ie"));
        assert_eq!(q.limit.get(), 10);
        assert_eq!(q.proximity, Some(Coordinates::new(-9.05, 53.27)));
        assert_eq!(q.language.as_deref(), Some("ga"));
    }

    #[tokio::test]
    async fn test_search_handler_missing_query() {
        let (status, _, body) = get(create_test_app(), "/api/v1/geocode/search").await;
        assert_eq!(status, HttpStatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_search_handler_non_numeric_limit() {
        let (status, _, body) =
            get(create_test_app(), "/api/v1/geocode/search?q=cork&limit=lots").await;
        assert_eq!(status, HttpStatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_search_handler_bad_proximity() {
        let (status, _, _) =
            get(create_test_app(), "/api/v1/geocode/search?q=cork&proximity=north").await;
        assert_eq!(status, HttpStatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_handler_provider_error_status() {
        let provider = stub(
            ProviderKind::Mapbox,
            Err(ProviderError::Http {
                provider: ProviderKind::Mapbox,
                status: 401,
                message: "Not Authorized - Invalid Token".to_string(),
            }),
        );
        let app = create_test_app_with(provider, None, RateLimiter::default());

        let (status, _, body) = get(app, "/api/v1/geocode/search?q=cork").await;
        assert_eq!(status, HttpStatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "GEOCODE_ERROR");
    }

    #[tokio::test]
    async fn test_search_handler_transport_error_is_bad_gateway() {
        let provider = stub(
            ProviderKind::Mapbox,
            Err(ProviderError::Transport {
                provider: ProviderKind::Mapbox,
                message: "connection refused".to_string(),
            }),
        );
        let app = create_test_app_with(provider, None, RateLimiter::default());

        let (status, _, _) = get(app, "/api/v1/geocode/search?q=cork").await;
        assert_eq!(status, HttpStatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_search_handler_rate_limited_sets_retry_after() {
        let limiter = RateLimiter::new(RateLimitConfig::with_interval(Duration::from_secs(5)));
        let provider = stub(ProviderKind::Nominatim, Ok(ProviderOutcome::Empty));
        let app = create_test_app_with(provider, None, limiter);

        let (first, _, _) = get(app.clone(), "/api/v1/geocode/search?q=a").await;
        assert_eq!(first, HttpStatusCode::OK);

        let (second, headers, body) = get(app, "/api/v1/geocode/search?q=b").await;
        assert_eq!(second, HttpStatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "RATE_LIMIT");
        let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
        assert!((1..=5).contains(&retry_after));
    }

    #[tokio::test]
    async fn test_forwarded_for_does_not_bypass_rate_limit() {
        let provider = stub(ProviderKind::Nominatim, Ok(ProviderOutcome::Empty));
        let app = create_test_app_with(provider.clone(), None, RateLimiter::default());

        let mut statuses = Vec::new();
        for (ip, q) in [("203.0.113.7", "cork"), ("198.51.100.2", "dublin")] {
            let request = Request::builder()
                .uri(format!("/api/v1/geocode/search?q={}", q))
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            statuses.push(response.status());
        }

        assert_eq!(
            statuses,
            vec![HttpStatusCode::OK, HttpStatusCode::TOO_MANY_REQUESTS]
        );
        assert_eq!(provider.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_search_served_from_cache_within_interval() {
        let provider = stub(
            ProviderKind::Nominatim,
            Ok(ProviderOutcome::Found(vec![sample("nominatim:1")])),
        );
        let app = create_test_app_with(provider.clone(), None, RateLimiter::default());

        for _ in 0..3 {
            let (status, _, body) = get(app.clone(), "/api/v1/geocode/search?q=cork").await;
            assert_eq!(status, HttpStatusCode::OK);
            assert_eq!(body["results"][0]["id"], "nominatim:1");
        }
        assert_eq!(provider.seen.lock().unwrap().len(), 1);
    }

    // ===== Reverse Tests =====

    #[tokio::test]
    async fn test_reverse_handler_match() {
        let app = create_test_app_with(
            stub(ProviderKind::Nominatim, Ok(ProviderOutcome::Empty)),
            Some(sample("nominatim:9")),
            RateLimiter::default(),
        );

        let (status, _, body) = get(app, "/api/v1/geocode/reverse?lat=53.27&lon=-9.05").await;
        assert_eq!(status, HttpStatusCode::OK);
        assert_eq!(body["result"]["id"], "nominatim:9");
    }

    #[tokio::test]
    async fn test_reverse_handler_no_match_is_null() {
        let (status, _, body) =
            get(create_test_app(), "/api/v1/geocode/reverse?lat=0&lon=0").await;
        assert_eq!(status, HttpStatusCode::OK);
        assert!(body["result"].is_null());
    }

    #[tokio::test]
    async fn test_reverse_handler_out_of_range() {
        let (status, _, body) =
            get(create_test_app(), "/api/v1/geocode/reverse?lat=200&lon=100").await;
        assert_eq!(status, HttpStatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_reverse_handler_non_numeric() {
        let (status, _, body) =
            get(create_test_app(), "/api/v1/geocode/reverse?lat=abc&lon=1").await;
        assert_eq!(status, HttpStatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _, _) = get(create_test_app(), "/api/v1/geocode/reverse?lat=1").await;
        assert_eq!(status, HttpStatusCode::BAD_REQUEST);
    }

    // ===== Helper Tests =====

    #[test]
    fn test_api_error_codes() {
        let response = ApiError(GeocodeError::RateLimit {
            retry_after_ms: 1500,
        })
        .into_response();
        assert_eq!(response.status(), HttpStatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");

        let response = ApiError(GeocodeError::Provider {
            status: Some(503),
            message: "down".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), HttpStatusCode::SERVICE_UNAVAILABLE);
    }
}
