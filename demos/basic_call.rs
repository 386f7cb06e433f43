//! Basic example demonstrating simple GET and POST requests.
//!
//! This example shows how to:
//! - Create a client with basic configuration
//! - Describe requests with `HttpRequest::builder`
//! - Send a JSON payload
//! - Read status, headers and typed bodies from the final attempt
//!
//! Run with: `cargo run --example basic_call`

use redial::{
    Error, ExecutionContext, HttpClient, HttpMethod, HttpRequest, OutcomeHandler, Payload,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

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
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("redial=debug,basic_call=info")
        .init();

    let client = HttpClient::builder()
        .timeout(Duration::from_secs(10))
        .user_agent("redial-demo/0.1")?
        .build()?;
    let mut context = ExecutionContext::new();

    println!("=== GET Request Example ===");
    let get = HttpRequest::builder("GetPost", HttpMethod::Get)
        .host("https://jsonplaceholder.typicode.com")?
        .endpoint("/posts/1")
        .header("Accept", "application/json")?
        .build()?;

    let outcome = client.execute(&mut context, &get, &mut OutcomeHandler).await?;
    match outcome.response() {
        Some(response) => {
            println!("Status code: {}", response.status());
            println!("Content-Type: {:?}", response.header("content-type"));
            match response.json::<Post>() {
                Ok(post) => println!("Post {}: {}", post.id, post.title),
                Err(e) => println!("Unexpected body ({}): {}", e, response.text()),
            }
        }
        None => println!("No response: {:?}", outcome.record().error()),
    }
    println!("Attempt took {:?}", outcome.record().elapsed());
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let body = serde_json::to_string(&new_post)
        .map_err(|e| Error::ConfigurationError(format!("Failed to serialize post: {}", e)))?;
    let post = HttpRequest::builder("CreatePost", HttpMethod::Post)
        .host("https://jsonplaceholder.typicode.com")?
        .endpoint("/posts")
        .payload(Payload::json(body))
        .build()?;

    let outcome = client.execute(&mut context, &post, &mut OutcomeHandler).await?;
    if let Some(response) = outcome.response() {
        println!("Status code: {}", response.status());
        println!("Created: {}", response.text());
    }

    Ok(())
}
