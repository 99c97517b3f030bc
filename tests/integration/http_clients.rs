//! HTTP clients against local mock servers

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{logging, test_data};
use swig_tracker::api::{
    BiznesradarClient, ClassificationSource, CompositionSource, FetchError, GpwBenchmarkClient, PriceFeed,
    YahooChartClient,
};
use swig_tracker::models::Config;

fn config_for(server: &MockServer) -> Config {
    Config {
        feed_base_url: server.uri(),
        classification_base_url: server.uri(),
        composition_url: format!("{}/karta-indeksu", server.uri()),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_chart_client_batch_skips_failed_symbols() {
    logging::init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/XTB.WA"))
        .and(query_param("range", "1d"))
        .and(query_param("interval", "1d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_data::chart_json(60.0, 62.0, 59.5, 61.2, 150_000.0)))
        .mount(&server)
        .await;

    // last bar incomplete, the one before it is used
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/CDR.WA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "chart": { "result": [{ "indicators": { "quote": [{
                "open": [100.0, 104.0],
                "high": [106.0, null],
                "low": [99.0, 103.0],
                "close": [105.0, 104.5],
                "volume": [1000.0, 10.0]
            }]}}], "error": null }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/BOS.WA"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/EMPTY.WA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "chart": { "result": null, "error": { "code": "Not Found" } }
        })))
        .mount(&server)
        .await;

    let client = YahooChartClient::new(&config_for(&server)).unwrap();
    let symbols: Vec<String> = ["XTB.WA", "CDR.WA", "BOS.WA", "EMPTY.WA"].iter().map(|s| s.to_string()).collect();
    let bars = client.fetch_daily_bars(&symbols).await.unwrap();

    assert_eq!(bars.len(), 2);
    assert_eq!(bars["XTB.WA"].close, 61.2);
    assert_eq!(bars["XTB.WA"].volume, 150_000.0);
    assert_eq!(bars["CDR.WA"].close, 105.0);
    assert_eq!(bars["CDR.WA"].open, 100.0);
}

#[tokio::test]
async fn test_chart_client_unreachable_feed_is_an_error() {
    logging::init_test_logging();
    let config = Config {
        feed_base_url: "http://127.0.0.1:9".to_string(),
        feed_timeout: std::time::Duration::from_secs(2),
        ..Config::default()
    };

    let client = YahooChartClient::new(&config).unwrap();
    let result = client.fetch_daily_bars(&["XTB.WA".to_string(), "BOS.WA".to_string()]).await;
    assert_matches!(result, Err(FetchError::Transport(_)));
}

#[tokio::test]
async fn test_profile_client_statuses() {
    logging::init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notowania/PLAYWAY"))
        .respond_with(ResponseTemplate::new(200).set_body_string(test_data::profile_page(&["WIG-GRY"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notowania/GHOST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notowania/BROKEN"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = BiznesradarClient::new(&config_for(&server)).unwrap();

    let page = client.fetch_profile("PLAYWAY").await.unwrap().expect("profile page");
    assert!(page.contains("indeks:WIG-GRY"));
    assert_eq!(client.fetch_profile("GHOST").await.unwrap(), None);
    assert_matches!(
        client.fetch_profile("BROKEN").await,
        Err(FetchError::Status { status: 503, .. })
    );
}

const PORTFOLIO_PAGE: &str = r#"
<html><body>
<table><tr><th>Notowania</th></tr><tr><td>1</td><td>2</td><td>3</td><td>4</td><td>5</td></tr></table>
<table class="table">
  <tr><th>Nazwa</th><th>ISIN</th><th>Liczba akcji</th><th>Wartość</th><th>Udział w portfelu (%)</th></tr>
  <tr><td>PLAYWAY</td><td>PLPLAYW00015</td><td>1 234</td><td>5 678</td><td>3,215</td></tr>
  <tr><td>XTB</td><td>PLXTRDM00011</td><td>9</td><td>9</td><td>2,5</td></tr>
</table>
</body></html>
"#;

#[tokio::test]
async fn test_composition_client_parses_portfolio() {
    logging::init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/karta-indeksu"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PORTFOLIO_PAGE))
        .mount(&server)
        .await;

    let client = GpwBenchmarkClient::new(&config_for(&server)).unwrap();
    let basket = client.fetch_composition().await.unwrap();

    let view: Vec<(&str, f64)> = basket.iter().map(|c| (c.ticker.as_str(), c.share)).collect();
    assert_eq!(view, vec![("PLAYWAY", 3.215), ("XTB", 2.5)]);
    assert_eq!(basket[1].isin.as_deref(), Some("PLXTRDM00011"));
}

#[tokio::test]
async fn test_composition_client_without_table_fails() {
    logging::init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/karta-indeksu"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><p>Przerwa techniczna</p></html>"))
        .mount(&server)
        .await;

    let client = GpwBenchmarkClient::new(&config_for(&server)).unwrap();
    assert_matches!(client.fetch_composition().await, Err(FetchError::Shape(_)));
}
