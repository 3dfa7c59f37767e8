use pretty_assertions::assert_eq;
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::MakeWriter;
use wiremock::matchers::{body_string, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};
use youtube_api::{
    ApiRequest, ClientOptions, Error, ErrorKind, Payload, RequestExecutor, RequestOptions,
};

fn empty_page() -> serde_json::Value {
    json!({ "items": [] })
}

fn executor(options: RequestOptions) -> RequestExecutor {
    RequestExecutor::new(&ClientOptions::try_from(options).unwrap()).unwrap()
}

#[tokio::test]
async fn json_success_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/videos"))
        .and(query_param("id", "a,b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
        .expect(1)
        .mount(&server)
        .await;

    let payload = executor(RequestOptions::new())
        .execute(
            ApiRequest::get(format!("{}/videos", server.uri()))
                .with_params(RequestOptions::new().with("id", "a,b")),
        )
        .await
        .unwrap();
    assert_eq!(payload, Some(Payload::Json(empty_page())));
}

#[tokio::test]
async fn non_json_success_is_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/captions/abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("WEBVTT\n\n00:00.000 --> 00:01.000\nhi\n", "text/vtt"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let payload = executor(RequestOptions::new())
        .execute(ApiRequest::get(format!("{}/captions/abc", server.uri())))
        .await
        .unwrap()
        .unwrap();
    let Payload::Raw { content_type, .. } = &payload else {
        panic!("Expected raw payload, got {:?}", payload);
    };
    assert_eq!(content_type.as_deref(), Some("text/vtt"));
    assert!(payload.text().unwrap().starts_with("WEBVTT"));
}

#[tokio::test]
async fn structured_failure_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "The request cannot be completed because you have exceeded your quota.",
                "errors": [{
                    "message": "The request cannot be completed because you have exceeded your quota.",
                    "domain": "youtube.quota",
                    "reason": "quotaExceeded"
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = executor(RequestOptions::new())
        .execute(ApiRequest::get(server.uri()))
        .await
        .unwrap_err();
    match err {
        Error::Api {
            code,
            ref message,
            ref errors,
        } => {
            assert_eq!(code, 403);
            assert!(message.contains("quota"));
            assert_eq!(errors[0].reason.as_deref(), Some("quotaExceeded"));
        }
        other => panic!("Expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn unstructured_failure_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(502).set_body_raw("<html>Bad Gateway</html>", "text/html"),
        )
        .mount(&server)
        .await;

    let err = executor(RequestOptions::new())
        .execute(ApiRequest::get(server.uri()))
        .await
        .unwrap_err();
    match &err {
        Error::Transport { status, .. } => {
            assert_eq!(*status, Some(http::StatusCode::BAD_GATEWAY));
        }
        other => panic!("Expected transport error, got {:?}", other),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn defaults_merge_and_reserved_keys_stay_out_of_the_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer ya29.token"))
        .and(query_param("key", "AIza"))
        .and(query_param("maxResults", "50"))
        .and(query_param("q", "cats"))
        .and(query_param_is_missing("access_token"))
        .and(query_param_is_missing("timeout"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let exec = executor(
        RequestOptions::new()
            .with("key", "AIza")
            .with("maxResults", 10)
            .with("timeout", 1000)
            .with("access_token", "ya29.token")
            .with("pageToken", "CAUQAA"),
    );
    let overrides = RequestOptions::new()
        .with("maxResults", 50)
        .with("q", "cats");
    exec.execute(ApiRequest::get(server.uri()).with_params(overrides))
        .await
        .unwrap();
}

/// Collects formatted log lines in memory.
#[derive(Clone, Default)]
struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn request_trace_names_parameters_but_not_their_values() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("key", "AIza-secret"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(logs.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let exec = executor(RequestOptions::new().with("key", "AIza-secret"));
    let query = RequestOptions::new().with("q", "cats");
    let request = ApiRequest::get(server.uri()).with_params(query);
    exec.execute(request).await.unwrap();

    let logs = logs.contents();
    assert!(logs.contains("issuing request"), "{logs}");
    assert!(logs.contains("\"key\""), "{logs}");
    assert!(!logs.contains("AIza-secret"), "{logs}");
    assert!(!logs.contains("cats"), "{logs}");
}

#[tokio::test]
async fn form_bodies_are_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("access_token=a+b%26c"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    executor(RequestOptions::new())
        .execute(
            ApiRequest::post(server.uri())
                .with_form(RequestOptions::new().with("access_token", "a b&c")),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let exec = executor(RequestOptions::new().with("timeout", 50));
    let started = Instant::now();
    let err = exec
        .execute(ApiRequest::get(server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.is_retryable());
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert!(exec.pending().is_none());
}

#[tokio::test]
async fn cancelled_request_resolves_to_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let exec = executor(RequestOptions::new().with("timeout", 5000));
    let canceller = exec.canceller();
    let cancel = tokio::spawn(async move {
        while canceller.pending().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        canceller.cancel()
    });

    let started = Instant::now();
    let outcome = exec.execute(ApiRequest::get(server.uri())).await.unwrap();
    assert_eq!(outcome, None);
    assert!(cancel.await.unwrap());
    assert!(started.elapsed() < Duration::from_secs(2));
    // nothing left to cancel
    assert!(!exec.cancel());
}
