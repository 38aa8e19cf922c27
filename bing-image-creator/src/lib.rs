//! Bing Image Creator client library
//!
//! This library drives the browser-facing Bing Image Creator flow: it submits a
//! prompt with the cookies of a logged-in session, waits for the asynchronous
//! job to finish and scrapes the resulting image URLs.
//!
//! # Features
//!
//! - Cookie-based authentication, from explicit cookies or a [`CookieStore`]
//! - Interactive login through a pluggable [`BrowserLauncher`] when no cookie is available
//! - Async API plus a blocking entry point for synchronous callers
//! - Explicit per-client configuration, optionally read from the environment
//! - Cooperative cancellation of every request and wait
//! - Secure TLS using rustls (no OpenSSL dependencies)
//! - Well-typed errors using thiserror
//!
//! # Example
//!
//! ```no_run
//! use bing_image_creator::{ClientConfig, Cookies, ImageCreator};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let creator = ImageCreator::builder()
//!     .config(ClientConfig::from_env()?)
//!     .cookies(Cookies::parse_header("_U=your_cookie_value"))
//!     .build()?;
//!
//! let response = creator.create("a red apple").await?;
//! println!("{}", response);
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod config;
mod cookies;
mod error;
mod parser;
mod response;
mod session;

pub use auth::{BrowserLauncher, LoginBrowser, harvest_cookies, wait_for_login};
pub use client::{CreatorEvent, ImageCreator, ImageCreatorBuilder};
pub use config::{
    COOKIE_DOMAIN, ClientConfig, DEFAULT_BASE_URL, ENV_CREATE_TIMEOUT, ENV_LOGIN_TIMEOUT,
    ENV_LOGIN_URL, ENV_POLL_TIMEOUT, ENV_PROXY,
};
pub use cookies::{AUTH_COOKIE, CookieStore, Cookies, MemoryCookieStore};
pub use error::{ImageCreatorError, Stage};
pub use response::ImageResponse;
pub use tokio_util::sync::CancellationToken;
