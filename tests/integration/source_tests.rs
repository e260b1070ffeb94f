//! Integration tests for the HTTP catalog source
//!
//! These tests use wiremock to serve prefecture, line and station pages and check page
//! parsing, error classification and a full crawl through `build_coordinator`.

use eki_atlas::config::{Config, UserAgentConfig};
use eki_atlas::crawler::{
    build_coordinator, build_http_client, CatalogSource, CrawlOptions, FetchError,
    FetchErrorKind, HttpCatalogSource, Prefecture, RailLine,
};
use eki_atlas::state::CrawlStatus;
use eki_atlas::storage::StationCsv;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PREFECTURE_PAGE: &str = r#"<html><head><title>東京都の路線</title></head><body>
    <ul>
      <li><a href="/station/13/line/jy">JR山手線</a></li>
      <li><a href="/station/13/line/g">東京メトロ銀座線</a></li>
      <li><a href="/station/13/line/jy">JR山手線</a></li>
      <li><a href="/station/13/area">エリアから探す</a></li>
      <li><a href="/about">About</a></li>
    </ul>
    </body></html>"#;

const YAMANOTE_PAGE: &str = r#"<html><body>
    <h1>JR山手線</h1>
    <a href="/station/22500/?pref=13&amp;company=JR">新宿</a>
    <a href="/station/22500/?pref=13&amp;company=JR">駅情報</a>
    <a href="/station/22501/?pref=13&amp;company=JR">渋谷</a>
    <a href="/station/22500/?pref=13&amp;company=JR">新宿</a>
    <a href="/station/22502/timetable">時刻表</a>
    </body></html>"#;

const GINZA_PAGE: &str = r#"<html><body>
    <a href="/station/22600/?pref=13&amp;company=TM">浅草</a>
    <a href="/station/22501/?pref=13&amp;company=TM">渋谷</a>
    </body></html>"#;

const SHINJUKU_PAGE: &str = r#"<html><head><title>新宿駅の駅周辺情報 - 路線情報</title></head><body>
    <a href="/">路線情報</a>
    <h1>新宿</h1>
    <dl><dt>所在地</dt><dd>東京都新宿区新宿3丁目38-1</dd></dl>
    <dl><dt>駅番号</dt><dd>JY17</dd></dl>
    <ul>
      <li><a href="/rail/jy">JR山手線</a></li>
      <li><a href="/rail/jc">JR中央線快速</a></li>
      <li><a href="/rail/m">東京メトロ丸ノ内線</a></li>
      <li><a href="/map">路線図</a></li>
    </ul>
    <span>#80C241</span>
    <script>var center = "35.6896,139.7006";</script>
    </body></html>"#;

fn test_user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn source_for(server: &MockServer) -> HttpCatalogSource {
    let client = build_http_client(&test_user_agent()).expect("Failed to build client");
    let base = Url::parse(&format!("{}/", server.uri())).expect("Failed to parse base URL");
    HttpCatalogSource::new(client, base)
}

fn tokyo() -> Prefecture {
    Prefecture::new("13", "東京都")
}

async fn mount_page(server: &MockServer, page_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_list_lines_from_prefecture_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/station/pref/13", PREFECTURE_PAGE).await;

    let source = source_for(&server);
    let lines = source
        .list_lines(&tokyo(), Duration::from_secs(5))
        .await
        .unwrap();

    let names: Vec<&str> = lines.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["JR山手線", "東京メトロ銀座線"]);
    assert_eq!(
        lines[0].locator,
        format!("{}/station/13/line/jy", server.uri())
    );
}

#[tokio::test]
async fn test_fetch_stations_from_line_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/station/13/line/jy", YAMANOTE_PAGE).await;

    let source = source_for(&server);
    let line = RailLine::new("JR山手線", format!("{}/station/13/line/jy", server.uri()));
    let stations = source
        .fetch_stations(&tokyo(), &line, Duration::from_secs(5))
        .await
        .unwrap();

    let names: Vec<&str> = stations.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["新宿", "渋谷"]);

    let shinjuku = &stations[0];
    assert_eq!(shinjuku.prefecture.as_deref(), Some("東京都"));
    assert_eq!(shinjuku.station_code.as_deref(), Some("22500"));
    assert_eq!(shinjuku.railway_company.as_deref(), Some("JR東日本"));
    assert_eq!(shinjuku.line_name.as_deref(), Some("JR山手線"));
    assert_eq!(shinjuku.line.line_type.as_deref(), Some("JR"));
    assert_eq!(shinjuku.line.company_code.as_deref(), Some("JR-E"));
    assert_eq!(shinjuku.line.all_lines, vec!["JR山手線"]);
}

#[tokio::test]
async fn test_enrich_station_from_station_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/station/13/line/jy", YAMANOTE_PAGE).await;
    mount_page(&server, "/station/22500/", SHINJUKU_PAGE).await;
    Mock::given(method("GET"))
        .and(path("/station/22501/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let source = source_for(&server).with_station_details(Duration::ZERO);
    let line = RailLine::new("JR山手線", format!("{}/station/13/line/jy", server.uri()));
    let stations = source
        .fetch_stations(&tokyo(), &line, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(
        stations[0].source_url.as_deref(),
        Some(format!("{}/station/22500/?pref=13&company=JR", server.uri()).as_str())
    );

    let mut enriched = Vec::new();
    for station in stations {
        enriched.push(source.enrich_station(station, Duration::from_secs(5)).await);
    }

    let shinjuku = &enriched[0];
    assert_eq!(shinjuku.city.as_deref(), Some("新宿区"));
    assert_eq!(shinjuku.station_code.as_deref(), Some("JY17"));
    assert_eq!(shinjuku.line.color.as_deref(), Some("#80C241"));
    assert_eq!(
        shinjuku.line.all_lines,
        vec!["JR山手線", "JR中央線快速", "東京メトロ丸ノ内線"]
    );
    let coordinates = shinjuku.coordinates.unwrap();
    assert!((coordinates.latitude - 35.6896).abs() < 1e-9);
    assert!((coordinates.longitude - 139.7006).abs() < 1e-9);
    // Line listing data survives
    assert_eq!(shinjuku.railway_company.as_deref(), Some("JR東日本"));

    // A failed station page keeps the line listing record as it was
    let shibuya = &enriched[1];
    assert_eq!(shibuya.name, "渋谷");
    assert_eq!(shibuya.city, None);
    assert_eq!(shibuya.station_code.as_deref(), Some("22501"));
    assert_eq!(shibuya.line.all_lines, vec!["JR山手線"]);
}

#[tokio::test]
async fn test_enrich_station_disabled_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SHINJUKU_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let source = source_for(&server);
    let mut station = eki_atlas::Station::new("新宿").with_prefecture("東京都");
    station.source_url = Some(format!("{}/station/22500/", server.uri()));

    let enriched = source
        .enrich_station(station.clone(), Duration::from_secs(5))
        .await;
    assert_eq!(enriched, station);
}

#[tokio::test]
async fn test_page_without_links_is_empty_not_error() {
    let server = MockServer::start().await;
    mount_page(&server, "/station/pref/13", "<html><body>メンテナンス中</body></html>").await;

    let source = source_for(&server);
    let lines = source
        .list_lines(&tokyo(), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(lines.is_empty());
}

#[tokio::test]
async fn test_server_error_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/station/pref/13"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let source = source_for(&server);
    let err = source
        .list_lines(&tokyo(), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FetchErrorKind::Http);
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_missing_page_is_http_error() {
    let server = MockServer::start().await;

    let source = source_for(&server);
    let line = RailLine::new("JR山手線", format!("{}/station/13/line/none", server.uri()));
    let err = source
        .fetch_stations(&tokyo(), &line, Duration::from_secs(5))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_undecodable_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/station/pref/13"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, 0x00, 0x80]))
        .mount(&server)
        .await;

    let source = source_for(&server);
    let err = source
        .list_lines(&tokyo(), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Parse { .. }));
}

#[tokio::test]
async fn test_slow_response_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/station/pref/13"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(PREFECTURE_PAGE)
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let source = source_for(&server);
    let err = source
        .list_lines(&tokyo(), Duration::from_millis(100))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FetchErrorKind::Timeout);
}

#[tokio::test]
async fn test_full_crawl_against_mock_site() {
    let server = MockServer::start().await;
    mount_page(&server, "/station/pref/13", PREFECTURE_PAGE).await;
    mount_page(&server, "/station/13/line/jy", YAMANOTE_PAGE).await;

    // The Ginza line page fails once, then recovers
    Mock::given(method("GET"))
        .and(path("/station/13/line/g"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, "/station/13/line/g", GINZA_PAGE).await;

    let dir = TempDir::new().unwrap();
    let stations_path = dir.path().join("data").join("stations.csv");
    let checkpoint_path = dir.path().join("data").join("crawl_state.json");

    let mut config = Config::default();
    config.user_agent = test_user_agent();
    config.source.base_url = server.uri();
    config.source.detail_delay_ms = 0;
    config.output.stations_path = stations_path.display().to_string();
    config.output.checkpoint_path = checkpoint_path.display().to_string();
    config.crawler.request_delay_ms = 0;
    config.crawler.retry_base_delay_ms = 1;
    config.crawler.retry_max_delay_ms = 2;
    config.prefectures = vec![tokyo()];

    let options = CrawlOptions::from_config(&config, None);
    let mut coordinator = build_coordinator(&config, options).unwrap();
    let result = coordinator.run(&config.hierarchy()).await.unwrap();

    assert_eq!(result.status, CrawlStatus::Completed);
    assert_eq!(result.errors, 0);
    assert_eq!(result.stations_found, 3);
    assert_eq!(result.duplicates_filtered, 1);
    assert_eq!(result.lines_completed, 2);

    let stored = StationCsv::new(&stations_path).read_all().unwrap();
    let names: Vec<&str> = stored.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["新宿", "渋谷", "浅草"]);
    assert_eq!(stored[2].railway_company.as_deref(), Some("東京メトロ"));
    assert!(!checkpoint_path.exists());
}
