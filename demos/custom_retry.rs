//! Retry configuration: attempt budgets, backoff and custom predicates.
//!
//! This example shows how to:
//! - Retry transient failures with exponential backoff
//! - Combine built-in predicates
//! - Retry on a successful payload until a job is ready
//!
//! Run with: `cargo run --example custom_retry`

use ricochet::retry::{OrPredicate, RetryOn5xx, RetryOnTimeout};
use ricochet::{Client, RequestOptions, RetryConfig, RetryContext, RetryPredicate};
use std::time::Duration;

/// Retries rate-limited responses only.
struct RetryOnRateLimit;

impl RetryPredicate for RetryOnRateLimit {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        ctx.status().is_some_and(|s| s.as_u16() == 429)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("ricochet=info,custom_retry=info")
        .init();

    let client = Client::builder()
        .base_url("https://httpbin.org")?
        .timeout(Duration::from_secs(5))
        .build()?;

    println!("=== Default retry policy ===");
    // Network errors, timeouts, 5xx and 429 are retried; three attempts in total.
    let options = RequestOptions::default().retries(
        RetryConfig::times(3).delays(Duration::from_millis(200), Duration::from_secs(2)),
    );
    match client.call("/status/503", options).await {
        Ok(response) => println!("Succeeded after {} attempts", response.attempts),
        Err(failure) => println!("Gave up: {}", failure.error),
    }

    println!("\n=== Combined predicates ===");
    let predicate = OrPredicate::new(vec![
        Box::new(RetryOn5xx),
        Box::new(RetryOnTimeout),
        Box::new(RetryOnRateLimit),
    ]);
    let options = RequestOptions::default().retries(RetryConfig::times(4).retry_on(predicate));
    match client.call("/status/429", options).await {
        Ok(response) => println!("Succeeded after {} attempts", response.attempts),
        Err(failure) => println!("Gave up: {}", failure.error),
    }

    println!("\n=== Poll until ready ===");
    // Retrying on success: keep asking while the payload says "pending".
    let options = RequestOptions::default().retries(RetryConfig::times(5).retry_on(
        |ctx: &RetryContext<'_>| {
            ctx.data
                .and_then(|d| d.field("json"))
                .and_then(|j| j.get("status"))
                .is_some_and(|s| s == "pending")
        },
    ));
    let response = client
        .call(
            "/anything",
            options.with_json(&serde_json::json!({"status": "ready"}))?,
        )
        .await?;
    println!("Finished after {} attempt(s)", response.attempts);

    Ok(())
}
