//! Stale-while-revalidate caching and long-polling.
//!
//! This example shows how to:
//! - Receive the cached value while a fresh one is fetched
//! - Keep polling an endpoint after the first success
//! - Stop the poller with a cancellation token
//!
//! Run with: `cargo run --example cached_polling`

use ricochet::{CachePolicy, Client, PollConfig, RequestOptions};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("ricochet=debug,cached_polling=info")
        .init();

    let client = Client::builder()
        .base_url("https://httpbin.org")?
        .build()?;

    println!("=== Stale-while-revalidate ===");
    let cached = RequestOptions::default().cached(
        CachePolicy::for_duration(Duration::from_secs(30)).on_stale(|stale| {
            println!("cached uuid: {:?}", stale.field("uuid"));
        }),
    );
    let first = client.call("/uuid", cached.clone()).await?;
    println!("first uuid: {:?}", first.data.field("uuid"));
    let second = client.call("/uuid", cached).await?;
    println!("fresh uuid: {:?}", second.data.field("uuid"));

    println!("\n=== Long-polling ===");
    let stop = CancellationToken::new();
    let poll = PollConfig::new(Duration::from_secs(1), stop.clone(), |update| {
        println!("update: {:?}", update.data.field("uuid"));
    });
    let initial = client
        .call("/uuid", RequestOptions::default().long_polling(poll))
        .await?;
    println!("initial: {:?}", initial.data.field("uuid"));

    tokio::time::sleep(Duration::from_secs(5)).await;
    stop.cancel();
    println!("poller stopped");

    Ok(())
}
