//! End-to-end tests for the geocoding service with Wiremock
//!
//! Builds the service from configuration, pointing both providers at one
//! mock server (their paths do not overlap). The rate limiter keeps its
//! default 1000 ms interval throughout.

use futures::future::join_all;
use site_geocoder::{Config, GeocodeError, GeocodingService, ProviderKind, ProviderSelector, SearchOptions};
use std::sync::Arc;
use wiremock::matchers::{any, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MAPBOX_SEARCH: &str = r"^/geocoding/v5/mapbox\.places/.+\.json$";

fn config(server: &MockServer, token: Option<&str>) -> Config {
    Config {
        mapbox_access_token: token.map(str::to_string),
        mapbox_base_url: server.uri(),
        nominatim_base_url: server.uri(),
        ..Config::default()
    }
}

fn service(cfg: &Config) -> GeocodingService {
    GeocodingService::from_config(cfg).unwrap()
}

fn mapbox_postcode_features() -> serde_json::Value {
    serde_json::json!({
        "features": [{
            "id": "postcode.9204",
            "text": "E91 VF83",
            "place_name": "E91 VF83, Clonmel, County Tipperary, Ireland",
            "center": [-7.7032, 52.3551],
            "context": [
                {"id": "place.3391", "text": "Clonmel"},
                {"id": "country.8738", "text": "Ireland", "short_code": "ie"}
            ]
        }]
    })
}

fn nominatim_places() -> serde_json::Value {
    serde_json::json!([{
        "place_id": 42,
        "lat": "52.3551",
        "lon": "-7.7032",
        "display_name": "E91 VF83, Clonmel, Ireland",
        "address": {"town": "Clonmel", "postcode": "E91 VF83", "country_code": "ie"}
    }])
}

/// Scenario A: a spaced Eircode runs a postal-scoped search
#[tokio::test]
async fn test_structured_postal_code_search() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("postalcode", "E91VF83"))
        .and(query_param("countrycodes", "ie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_places()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, None));
    let results = svc
        .search("E91 VF83", SearchOptions::new().country("ie").limit(5))
        .await
        .unwrap();

    assert!(!results.is_empty() && results.len() <= 5);
    for result in &results {
        let postcode = result.address.as_ref().and_then(|a| a.postcode.clone());
        assert_eq!(postcode.as_deref(), Some("E91 VF83"));
    }
}

/// Scenario A through Mapbox: the display form is searched with postcode types
#[tokio::test]
async fn test_structured_postal_code_search_mapbox() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geocoding/v5/mapbox.places/E91%20VF83.json"))
        .and(query_param("types", "postcode,address"))
        .and(query_param("country", "ie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mapbox_postcode_features()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, Some("pk.test")));
    let results = svc.search("e91vf83", SearchOptions::new()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].provider, ProviderKind::Mapbox);
    assert_eq!(
        results[0].address.as_ref().unwrap().postcode.as_deref(),
        Some("E91 VF83")
    );
}

/// Scenario B: the limit sent upstream is clamped to 10
#[tokio::test]
async fn test_limit_clamped_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(MAPBOX_SEARCH))
        .and(query_param("limit", "10"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"features": []})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, Some("pk.test")));
    let results = svc
        .search("test", SearchOptions::new().limit(100))
        .await
        .unwrap();
    assert!(results.is_empty());
}

/// Scenario C: a burst on the rate-limited path is rejected
#[tokio::test]
async fn test_burst_is_rate_limited() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&mock_server)
        .await;

    let svc = Arc::new(service(&config(&mock_server, None)));

    let calls = (0..15).map(|i| {
        let svc = svc.clone();
        async move { svc.search(&format!("street {}", i), SearchOptions::new()).await }
    });
    let outcomes = join_all(calls).await;

    let limited = outcomes
        .iter()
        .filter(|o| matches!(o, Err(GeocodeError::RateLimit { .. })))
        .count();
    assert!(limited >= 1);
    assert_eq!(limited, 14);

    let upstream = mock_server.received_requests().await.unwrap();
    assert_eq!(upstream.len(), 1);
}

/// Scenario D: out-of-range reverse fails before any network call
#[tokio::test]
async fn test_reverse_out_of_range() {
    let mock_server = MockServer::start().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, None));
    let err = svc.reverse(200.0, 100.0).await.unwrap_err();
    assert!(matches!(err, GeocodeError::Validation(_)));
}

/// Test identical searches hit the provider once
#[tokio::test]
async fn test_cache_idempotence() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(MAPBOX_SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(mapbox_postcode_features()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, Some("pk.test")));
    let first = svc.search("E91 VF83", SearchOptions::new()).await.unwrap();
    let second = svc.search("e91vf83", SearchOptions::new()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(svc.cache().len(), 1);
}

/// Test an empty Mapbox answer for an Eircode falls back to Nominatim
#[tokio::test]
async fn test_structured_fallback() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(MAPBOX_SEARCH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"features": []})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("postalcode", "E91VF83"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_places()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, Some("pk.test")));
    let results = svc.search("E91 VF83", SearchOptions::new()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].provider, ProviderKind::Nominatim);
}

/// Test Nominatim as the active provider uses Mapbox for an Eircode it misses
#[tokio::test]
async fn test_nominatim_primary_structured_fallback() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(MAPBOX_SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(mapbox_postcode_features()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let cfg = Config {
        provider: ProviderSelector::Nominatim,
        ..config(&mock_server, Some("pk.test"))
    };
    let svc = service(&cfg);
    let results = svc.search("E91VF83", SearchOptions::new()).await.unwrap();
    assert_eq!(results[0].provider, ProviderKind::Mapbox);
}

/// Test Mapbox outages fall back to Nominatim after retries
#[tokio::test]
async fn test_primary_outage_falls_back() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(MAPBOX_SEARCH))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Patrick Street Cork"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_places()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, Some("pk.test")));
    let results = svc
        .search("Patrick Street Cork", SearchOptions::new())
        .await
        .unwrap();
    assert_eq!(results[0].provider, ProviderKind::Nominatim);
}

/// Test both providers failing propagates the last error
#[tokio::test]
async fn test_both_providers_fail() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(MAPBOX_SEARCH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, Some("pk.test")));
    let err = svc.search("cork", SearchOptions::new()).await.unwrap_err();

    assert_eq!(err.code(), "GEOCODE_ERROR");
    assert_eq!(err.status(), 503);
    assert!(svc.cache().is_empty());
}

/// Test provider throttling short-circuits without fallback
#[tokio::test]
async fn test_provider_429_short_circuits() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(MAPBOX_SEARCH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_places()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, Some("pk.test")));
    let err = svc.search("E91 VF83", SearchOptions::new()).await.unwrap_err();
    assert_eq!(err, GeocodeError::RateLimit { retry_after_ms: 3000 });
}

/// Test reverse with no address is `None`, not an error
#[tokio::test]
async fn test_reverse_no_match() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"error": "Unable to geocode"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, Some("pk.test")));
    assert_eq!(svc.reverse(50.0, -20.0).await.unwrap(), None);
}

/// Test reverse shares the provider-wide rate limit
#[tokio::test]
async fn test_reverse_rate_limited() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_places()[0].clone()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, None));

    assert!(svc.reverse(52.35, -7.70).await.unwrap().is_some());
    let err = svc.reverse(53.27, -9.05).await.unwrap_err();
    assert_eq!(err.code(), "RATE_LIMIT");
}

/// Test a repeated Nominatim search inside the interval is answered from cache
#[tokio::test]
async fn test_repeated_search_within_interval_uses_cache() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "cork"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_places()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, None));
    assert_eq!(svc.active_provider(), ProviderKind::Nominatim);

    let first = svc.search("cork", SearchOptions::new()).await.unwrap();
    let second = svc.search("cork", SearchOptions::new()).await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
}

/// Test Mapbox-backed free-text searches are not throttled by the unused fallback
#[tokio::test]
async fn test_mapbox_burst_not_rate_limited() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(MAPBOX_SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(mapbox_postcode_features()))
        .expect(5)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_places()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let svc = service(&config(&mock_server, Some("pk.test")));
    for text in ["cork", "dublin", "galway", "limerick", "waterford"] {
        let results = svc.search(text, SearchOptions::new()).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}

/// Test concurrent searches from many clients send one Nominatim request per interval
#[tokio::test]
async fn test_nominatim_interval_is_global() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_places()))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_places()[0].clone()))
        .mount(&mock_server)
        .await;

    let svc = Arc::new(service(&config(&mock_server, None)));

    let searches = (0..10).map(|i| {
        let svc = svc.clone();
        async move { svc.search(&format!("10.0.0.{} street", i), SearchOptions::new()).await }
    });
    let outcomes = join_all(searches).await;
    let reverse = svc.reverse(52.35, -7.70).await;

    let allowed = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(allowed, 1);
    assert!(matches!(reverse, Err(GeocodeError::RateLimit { .. })));

    let upstream = mock_server.received_requests().await.unwrap();
    assert_eq!(upstream.len(), 1);
}
