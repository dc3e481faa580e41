//! Integration tests using wiremock to simulate HTTP servers.

use http::Method;
use ricochet::cache::cache_key;
use ricochet::{
    CachePolicy, Client, Deadline, Error, ErrorKind, Payload, PollConfig, RequestOptions,
    RetryConfig, RetryContext,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> Client {
    Client::builder()
        .base_url(server.uri())
        .unwrap()
        .build()
        .unwrap()
}

fn fast_retries(times: usize) -> RetryConfig {
    RetryConfig::times(times).delays(Duration::from_millis(1), Duration::from_millis(5))
}

#[tokio::test]
async fn test_successful_get_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/hello"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hello": "world"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = client_for(&mock_server).get("/hello").await.unwrap();

    assert_eq!(response.data.field("hello").unwrap(), "world");
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.attempts, 1);
    assert!(!response.was_retried());

    #[derive(Deserialize)]
    struct Hello {
        hello: String,
    }
    assert_eq!(response.json::<Hello>().unwrap().hello, "world");
}

#[tokio::test]
async fn test_successful_post_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = client_for(&mock_server)
        .post("/users", json!({"name": "New"}))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 201);
    assert_eq!(response.data.field("id").unwrap(), 1);
}

#[tokio::test]
async fn test_http_error_4xx_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"reason": "gone"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let options = RequestOptions::default().retries(fast_retries(3));
    let failure = client_for(&mock_server)
        .call("/missing", options)
        .await
        .unwrap_err();

    match &failure.error {
        Error::Http {
            status,
            status_text,
            body,
        } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(status_text, "Not Found");
            assert_eq!(body.field("reason").unwrap(), "gone");
        }
        other => panic!("Expected HTTP error, got {:?}", other),
    }
    assert_eq!(failure.response.as_ref().unwrap().status.as_u16(), 404);
}

#[tokio::test]
async fn test_unparseable_error_body_degrades_to_null() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_string("<html>bad</html>"))
        .mount(&mock_server)
        .await;

    let failure = client_for(&mock_server).get("/x").await.unwrap_err();
    assert_eq!(failure.error.body(), Some(&Payload::Null));
    assert_eq!(failure.response.unwrap().text(), "<html>bad</html>");
}

#[tokio::test]
async fn test_retry_on_5xx_then_success() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count == 0 {
                ResponseTemplate::new(500).set_body_string("Server error")
            } else {
                ResponseTemplate::new(200).set_body_json(json!({"success": true}))
            }
        })
        .mount(&mock_server)
        .await;

    let options = RequestOptions::default().retries(fast_retries(2));
    let response = client_for(&mock_server)
        .call("/flaky", options)
        .await
        .unwrap();

    assert_eq!(response.data.field("success").unwrap(), true);
    assert_eq!(response.attempts, 2);
    assert!(response.was_retried());
    assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retry_budget_is_respected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&mock_server)
        .await;

    let options = RequestOptions::default().retries(fast_retries(4));
    let failure = client_for(&mock_server)
        .call("/down", options)
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::Http);
    assert_eq!(failure.error.status().unwrap().as_u16(), 503);
}

#[tokio::test]
async fn test_retry_on_success_until_ready() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    Mock::given(method("GET"))
        .and(path("/job"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            let status = if count < 2 { "pending" } else { "ready" };
            ResponseTemplate::new(200).set_body_json(json!({"status": status}))
        })
        .mount(&mock_server)
        .await;

    let stale = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&stale);
    let policy = CachePolicy::unlimited().on_stale(move |cached| {
        seen.lock().unwrap().push(cached.clone());
    });
    let options = RequestOptions::default()
        .retries(fast_retries(5).retry_on(|ctx: &RetryContext<'_>| {
            ctx.data
                .and_then(|d| d.field("status"))
                .is_some_and(|s| s == "pending")
        }))
        .cached(policy);

    let client = client_for(&mock_server);
    let response = client.call("/job", options.clone()).await.unwrap();

    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    assert_eq!(response.attempts, 3);
    assert_eq!(response.data.field("status").unwrap(), "ready");
    assert!(stale.lock().unwrap().is_empty());

    // Only the accepted result was cached, never an intermediate "pending".
    client.call("/job", options).await.unwrap();
    assert_eq!(
        stale.lock().unwrap().as_slice(),
        &[Payload::Json(json!({"status": "ready"}))]
    );
}

#[tokio::test]
async fn test_total_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&mock_server)
        .await;

    let options = RequestOptions::default().total_timeout(Duration::from_millis(10));
    let failure = client_for(&mock_server)
        .call("/slow", options)
        .await
        .unwrap_err();

    match &failure.error {
        Error::Timeout { deadline, after } => {
            assert_eq!(*deadline, Deadline::Total);
            assert_eq!(*after, Duration::from_millis(10));
        }
        other => panic!("Expected timeout, got {:?}", other),
    }
    assert!(failure.error.message().contains("10"));
    assert!(failure.response.is_none());
}

#[tokio::test]
async fn test_per_attempt_timeout_from_client_default() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .timeout(Duration::from_millis(20))
        .build()
        .unwrap();

    let options = RequestOptions::default().retries(fast_retries(2));
    let failure = client.call("/slow", options).await.unwrap_err();

    match failure.error {
        Error::Timeout { deadline, after } => {
            assert_eq!(deadline, Deadline::Attempt);
            assert_eq!(after, Duration::from_millis(20));
        }
        other => panic!("Expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_retry_after_overrides_backoff() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    Mock::given(method("GET"))
        .respond_with(move |_req: &wiremock::Request| {
            if attempt_count_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(429).insert_header("retry-after", "0")
            } else {
                ResponseTemplate::new(200).set_body_json(json!({"ok": true}))
            }
        })
        .mount(&mock_server)
        .await;

    // Without the header the first backoff would be at least two seconds.
    let options = RequestOptions::default().retries(
        RetryConfig::times(2).delays(Duration::from_secs(2), Duration::from_secs(2)),
    );
    let started = Instant::now();
    let response = client_for(&mock_server)
        .call("/limited", options)
        .await
        .unwrap();

    assert_eq!(response.attempts, 2);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": "alice"})))
        .with_priority(1)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    let token = Arc::new(RwLock::new(String::from("stale")));
    let refreshes = Arc::new(AtomicUsize::new(0));

    let reader = Arc::clone(&token);
    let writer = Arc::clone(&token);
    let counter = Arc::clone(&refreshes);
    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .auth_headers(move || {
            let value = format!("Bearer {}", reader.read().unwrap());
            async move {
                let mut headers = http::HeaderMap::new();
                headers.insert("authorization", value.parse().unwrap());
                headers
            }
        })
        .refresh_token(move || {
            let writer = Arc::clone(&writer);
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                *writer.write().unwrap() = String::from("fresh");
                Ok::<(), std::io::Error>(())
            }
        })
        .build()
        .unwrap();

    let (first, second) = tokio::join!(client.get("/me"), client.get("/me"));

    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(first.unwrap().data.field("user").unwrap(), "alice");
    assert_eq!(second.unwrap().data.field("user").unwrap(), "alice");
}

#[tokio::test]
async fn test_stale_while_revalidate() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(move |_req: &wiremock::Request| {
            let value = if attempt_count_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                "a"
            } else {
                "b"
            };
            ResponseTemplate::new(200).set_body_json(json!({"data": value}))
        })
        .mount(&mock_server)
        .await;

    let stale = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&stale);
    let options = RequestOptions::default().cached(
        CachePolicy::for_duration(Duration::from_secs(5)).on_stale(move |cached| {
            seen.lock().unwrap().push(cached.clone());
        }),
    );

    let client = client_for(&mock_server);
    let first = client.call("/data", options.clone()).await.unwrap();
    assert_eq!(first.data.field("data").unwrap(), "a");
    assert!(stale.lock().unwrap().is_empty());

    let second = client.call("/data", options).await.unwrap();
    assert_eq!(second.data.field("data").unwrap(), "b");
    assert_eq!(
        stale.lock().unwrap().as_slice(),
        &[Payload::Json(json!({"data": "a"}))]
    );
    assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_long_polling_delivers_updates_until_cancelled() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(move |_req: &wiremock::Request| {
            let n = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if n == 2 {
                // A failed poll is dropped silently.
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200).set_body_json(json!({"n": n}))
            }
        })
        .mount(&mock_server)
        .await;

    let stop = CancellationToken::new();
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    let poll = PollConfig::new(Duration::from_millis(20), stop.clone(), move |response| {
        if let Some(n) = response.data.field("n").and_then(|n| n.as_u64()) {
            sink.lock().unwrap().push(n);
        }
    });
    let options = RequestOptions::default()
        .cached(CachePolicy::unlimited())
        .long_polling(poll);

    let client = client_for(&mock_server);
    let first = client.call("/feed", options).await.unwrap();
    assert_eq!(first.data.field("n").unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    stop.cancel();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let delivered = updates.lock().unwrap().clone();
    assert!(delivered.len() >= 2, "got {delivered:?}");
    assert_eq!(delivered[0], 1);
    assert!(!delivered.contains(&2));

    let polls = attempt_count.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(attempt_count.load(Ordering::SeqCst), polls);

    // Polls bypass the cache: the stored value is still the first result.
    let url = Url::parse(&format!("{}/feed", mock_server.uri())).unwrap();
    let cached = client.cache().lookup(&cache_key(&Method::GET, &url), None);
    assert_eq!(cached, Some(Payload::Json(json!({"n": 0}))));
}

#[tokio::test]
async fn test_default_headers_and_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("user-agent", "test-agent"))
        .and(wiremock::matchers::query_param("key", "k1"))
        .and(wiremock::matchers::query_param("q", "rust"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": 1})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .default_header("User-Agent", "test-agent")
        .unwrap()
        .default_query_param("key", "k1")
        .build()
        .unwrap();

    let options = RequestOptions::default().with_query_param("q", "rust");
    let response = client.call("/search", options).await.unwrap();
    assert_eq!(response.data.field("hits").unwrap(), 1);
}

#[tokio::test]
async fn test_all_http_methods() {
    let mock_server = MockServer::start().await;

    for verb in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
        Mock::given(method(verb))
            .and(path("/thing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"method": verb})))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let client = client_for(&mock_server);
    let body = json!({"id": 1});

    let responses = [
        client.get("/thing").await.unwrap(),
        client.post("/thing", body.clone()).await.unwrap(),
        client.put("/thing", body.clone()).await.unwrap(),
        client.patch("/thing", body).await.unwrap(),
        client.delete("/thing").await.unwrap(),
    ];
    let methods: Vec<_> = responses
        .iter()
        .map(|r| r.data.field("method").unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(methods, ["GET", "POST", "PUT", "PATCH", "DELETE"]);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Nothing listens on port 1.
    let uri = "http://127.0.0.1:1";

    let client = Client::builder().base_url(uri).unwrap().build().unwrap();
    let failure = client.get("/nothing").await.unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::Network);
    assert!(failure.response.is_none());
}
