//! Error handling: the four error kinds, error mapping and observers.
//!
//! This example shows how to:
//! - Match on normalized errors
//! - Inspect the raw response that caused a failure
//! - Translate server error bodies with an error mapper
//! - Reject successful payloads with a validator
//!
//! Run with: `cargo run --example error_handling`

use ricochet::{Client, Deadline, Error, Failure, Payload, RequestOptions};
use std::time::Duration;

fn report(label: &str, failure: &Failure) {
    println!("[{label}] kind = {}", failure.kind());
    match &failure.error {
        Error::Network { message, .. } => println!("  network: {message}"),
        Error::Timeout { deadline, after } => match deadline {
            Deadline::Attempt => println!("  one attempt exceeded {after:?}"),
            Deadline::Total => println!("  the whole call exceeded {after:?}"),
        },
        Error::Http { status, body, .. } => println!("  HTTP {status}, body = {body:?}"),
        Error::Validation { cause } => println!("  rejected: {cause}"),
    }
    if let Some(raw) = &failure.response {
        println!("  raw response: {} ({} bytes)", raw.status, raw.body.len());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("ricochet=info,error_handling=info")
        .init();

    let client = Client::builder()
        .base_url("https://httpbin.org")?
        .on_error(|failure: &Failure| {
            tracing::info!(kind = %failure.kind(), "call failed");
        })
        .map_error(|error: &Error| match error {
            Error::Http { status, .. } if status.as_u16() == 418 => {
                Some(Error::validation("the server is a teapot"))
            }
            _ => None,
        })
        .build()?;

    if let Err(failure) = client.get("/status/404").await {
        report("not found", &failure);
    }

    if let Err(failure) = client.get("/status/418").await {
        report("mapped", &failure);
    }

    let options = RequestOptions::default().timeout(Duration::from_millis(500));
    if let Err(failure) = client.call("/delay/3", options).await {
        report("slow", &failure);
    }

    let options = RequestOptions::default().validate(|data: &Payload| {
        if data.field("slideshow").is_some() {
            Err("unexpected slideshow".to_string())
        } else {
            Ok(())
        }
    });
    if let Err(failure) = client.call("/json", options).await {
        report("validated", &failure);
    }

    let offline = Client::builder().network_check(|| false).build()?;
    if let Err(failure) = offline.get("https://httpbin.org/get").await {
        report("offline", &failure);
    }

    Ok(())
}
