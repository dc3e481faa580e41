//! Basic example demonstrating simple GET and POST requests.
//!
//! This example shows how to:
//! - Create a client with basic configuration
//! - Make GET requests and read the parsed payload
//! - Make POST requests with a JSON body
//! - Access response metadata
//!
//! Run with: `cargo run --example basic_call`

use ricochet::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("ricochet=debug,basic_call=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .build()?;

    println!("=== GET Request Example ===");
    let response = client.get("/posts/1").await?;
    let post: Post = response.json()?;

    println!("Post ID: {}", post.id);
    println!("Title: {}", post.title);
    println!("Status: {}", response.status());
    println!("Latency: {:?}", response.latency);
    println!("Attempts: {}", response.attempts);

    println!("\n=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post".to_string(),
        user_id: 1,
    };
    let created = client
        .post("/posts", serde_json::to_value(&new_post)?)
        .await?;

    println!("Created post with ID: {:?}", created.data.field("id"));
    println!("Status: {}", created.status());

    Ok(())
}
