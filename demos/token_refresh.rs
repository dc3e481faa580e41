//! Credential refresh shared across concurrent calls.
//!
//! This example shows how to:
//! - Attach authentication headers to every attempt
//! - Refresh credentials once when several calls hit 401 together
//!
//! Run with: `cargo run --example token_refresh`

use http::{HeaderMap, HeaderValue};
use ricochet::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("ricochet=debug,token_refresh=info")
        .init();

    // httpbin accepts any bearer token except this one.
    let token = Arc::new(RwLock::new(String::new()));
    let refreshes = Arc::new(AtomicUsize::new(0));

    let reader = Arc::clone(&token);
    let writer = Arc::clone(&token);
    let counter = Arc::clone(&refreshes);
    let client = Client::builder()
        .base_url("https://httpbin.org")?
        .auth_headers(move || {
            let token = reader.read().map(|t| t.clone()).unwrap_or_default();
            async move {
                let mut headers = HeaderMap::new();
                if !token.is_empty() {
                    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                        headers.insert("authorization", value);
                    }
                }
                headers
            }
        })
        .refresh_token(move || {
            let writer = Arc::clone(&writer);
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                if let Ok(mut token) = writer.write() {
                    *token = "demo-token".to_string();
                }
                Ok::<(), std::io::Error>(())
            }
        })
        .build()?;

    let calls = (0..5).map(|_| client.get("/bearer"));
    let results = futures::future::join_all(calls).await;

    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(response) => println!("call {i}: {:?}", response.data.field("token")),
            Err(failure) => println!("call {i} failed: {}", failure.error),
        }
    }
    println!("refreshes: {}", refreshes.load(Ordering::SeqCst));

    Ok(())
}
