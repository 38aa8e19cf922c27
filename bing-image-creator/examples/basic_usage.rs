//! Basic usage example for the image creator client
//!
//! This example demonstrates how to:
//! - Read configuration from the environment
//! - Authenticate with a cookie copied from a logged-in browser
//! - Create images asynchronously
//! - Cancel a creation that takes too long
//!
//! Note: This example requires a valid `_U` cookie to run.
//! Copy the `Cookie` header of a request to bing.com from your browser's developer tools.

use bing_image_creator::{CancellationToken, ClientConfig, Cookies, ImageCreator, ImageCreatorError};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Get cookies from environment variable
    let cookie_header =
        std::env::var("BING_COOKIES").expect("BING_COOKIES environment variable not set");
    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "a red apple on a wooden table".to_string());

    // Example 1: Configuration from BING_PROXY, BING_POLL_TIMEOUT, ...
    println!("=== Example 1: Configuration ===");
    let config = ClientConfig::from_env()?;
    println!("✓ Polling timeout: {:?}", config.polling_timeout);

    // Example 2: Client with a cancellation token
    println!("\n=== Example 2: Client ===");
    let cancel = CancellationToken::new();
    let creator = ImageCreator::builder()
        .config(config)
        .cookies(Cookies::parse_header(&cookie_header))
        .cancellation(cancel.clone())
        .build()?;
    println!("✓ Client created");

    // Give up after two minutes regardless of the configured timeouts
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(120)).await;
        cancel.cancel();
    });

    // Example 3: Create images
    println!("\n=== Example 3: Create Images ===");
    println!("Prompt: {}", prompt);
    match creator.create(&prompt).await {
        Ok(response) => {
            println!("✓ {} image(s) created", response.images.len());
            println!("{}", response);
        }
        Err(ImageCreatorError::MissingAccessToken) => {
            println!("✗ BING_COOKIES has no _U cookie");
        }
        Err(ImageCreatorError::ContentRejected { phrase }) => {
            println!("✗ Prompt rejected: {}", phrase);
        }
        Err(e) => {
            println!("✗ Failed to create images: {}", e);
        }
    }

    watchdog.abort();
    Ok(())
}
