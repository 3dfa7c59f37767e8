use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};
use youtube_api::pagination::CursorState;
use youtube_api::{ErrorKind, RequestOptions, SearchClient, SearchResult};

fn result(video_id: &str) -> Value {
    json!({
        "kind": "youtube#searchResult",
        "etag": format!("etag-{video_id}"),
        "id": { "kind": "youtube#video", "videoId": video_id },
        "snippet": { "title": format!("video {video_id}"), "channelId": "UC1", "channelTitle": "c" }
    })
}

fn page(etag: &str, next: Option<&str>, ids: &[&str]) -> Value {
    let mut page = json!({
        "kind": "youtube#searchListResponse",
        "etag": etag,
        "pageInfo": { "totalResults": 1000, "resultsPerPage": ids.len() },
        "items": ids.iter().map(|id| result(id)).collect::<Vec<_>>(),
    });
    if let Some(next) = next {
        page["nextPageToken"] = json!(next);
    }
    page
}

/// Mounts a two-page result set for `q`.
async fn mount_series(server: &MockServer, q: &str, first: &[&str], second: &[&str]) {
    let token = format!("{q}-T1");
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", q))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            &format!("{q}-e1"),
            Some(&token),
            first,
        )))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", q))
        .and(query_param("pageToken", token.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            &format!("{q}-e2"),
            None,
            second,
        )))
        .expect(1)
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> SearchClient {
    let defaults = RequestOptions::new()
        .with("part", "snippet")
        .with("maxResults", 2);
    SearchClient::new(defaults)
        .unwrap()
        .with_endpoint_url(format!("{}/search", server.uri()))
}

fn ids(results: Vec<SearchResult>) -> Vec<String> {
    results
        .into_iter()
        .map(|r| r.id.video_id.unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn same_query_advances_and_new_query_restarts() {
    let server = MockServer::start().await;
    mount_series(&server, "cats", &["c1", "c2"], &["c3"]).await;
    mount_series(&server, "dogs", &["d1", "d2"], &["d3"]).await;

    let mut search = client(&server);
    let results = search.search("cats").await.unwrap().unwrap();
    assert_eq!(ids(results), ["c1", "c2"]);
    assert_eq!(ids(search.search("cats").await.unwrap().unwrap()), ["c3"]);
    let results = search.search("dogs").await.unwrap().unwrap();
    assert_eq!(ids(results), ["d1", "d2"]);
    assert_eq!(search.cursor().unwrap().query(), "dogs");
    assert_eq!(search.cursor().unwrap().etag(), Some("dogs-e1"));
    assert_eq!(ids(search.search("dogs").await.unwrap().unwrap()), ["d3"]);
}

#[tokio::test]
async fn exhausted_query_returns_empty_without_requests() {
    let server = MockServer::start().await;
    mount_series(&server, "cats", &["c1"], &["c2"]).await;

    let mut search = client(&server);
    search.search("cats").await.unwrap();
    search.search("cats").await.unwrap();
    assert_eq!(search.cursor().unwrap().state(), CursorState::Exhausted);
    for _ in 0..3 {
        assert_eq!(search.search("cats").await.unwrap(), Some(vec![]));
    }
    // the `.expect(1)` on each page verifies no further calls on drop
}

#[tokio::test]
async fn api_error_leaves_cursor_in_place() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "Invalid value",
                "errors": [{ "domain": "global", "reason": "invalid" }]
            }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_series(&server, "cats", &["c1"], &["c2"]).await;

    let mut search = client(&server);
    let err = search.search("cats").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Api);
    assert_eq!(search.cursor().unwrap().state(), CursorState::Fresh);
    assert_eq!(ids(search.search("cats").await.unwrap().unwrap()), ["c1"]);
    assert_eq!(ids(search.search("cats").await.unwrap().unwrap()), ["c2"]);
}

#[tokio::test]
async fn seeded_page_token_starts_mid_series() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("pageToken", "CAUQAA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page("e", None, &["d4"])))
        .expect(1)
        .mount(&server)
        .await;

    let mut search = SearchClient::new(RequestOptions::new().with("pageToken", "CAUQAA"))
        .unwrap()
        .with_endpoint_url(format!("{}/search", server.uri()));
    assert_eq!(ids(search.search("cats").await.unwrap().unwrap()), ["d4"]);
}

#[tokio::test]
async fn search_all_streams_every_page() {
    let server = MockServer::start().await;
    mount_series(&server, "cats", &["c1", "c2"], &["c3"]).await;

    let search = client(&server);
    let all: Vec<SearchResult> = search
        .search_all("cats")
        .collect::<Result<_, _>>()
        .await
        .unwrap();
    assert_eq!(ids(all), ["c1", "c2", "c3"]);
    // the page-by-page cursor is untouched
    assert!(search.cursor().is_none());
}
