//! Image creator client implementation

use crate::auth::{BrowserLauncher, harvest_cookies};
use crate::config::ClientConfig;
use crate::cookies::{CookieStore, Cookies};
use crate::error::ImageCreatorError;
use crate::parser::ResponseParser;
use crate::response::ImageResponse;
use crate::session::Session;
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Notifications emitted while a creation is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatorEvent {
    /// An interactive login is about to start; the user should open `login_url`
    LoginRequired {
        /// Page the user is asked to log in on
        login_url: String,
    },
}

impl fmt::Display for CreatorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreatorEvent::LoginRequired { login_url } => {
                write!(f, "Please login: [Bing]({login_url})\n\n")
            }
        }
    }
}

/// Client for the Bing Image Creator web flow
///
/// Each call builds its own HTTP session from the client's cookies, so one
/// client can serve concurrent `create` calls. Nothing is shared between
/// clients.
///
/// # Example
///
/// ```no_run
/// use bing_image_creator::{Cookies, ImageCreator};
///
/// # async fn example() -> Result<(), bing_image_creator::ImageCreatorError> {
/// let creator = ImageCreator::builder()
///     .cookies(Cookies::parse_header("_U=your_cookie_value"))
///     .build()?;
///
/// let response = creator.create("a red apple").await?;
/// for url in &response.images {
///     println!("{}", url);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ImageCreator {
    config: ClientConfig,
    cookies: Option<Cookies>,
    cookie_store: Option<Arc<dyn CookieStore>>,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    cancel: CancellationToken,
    parser: ResponseParser,
}

impl ImageCreator {
    /// Create a client with default configuration and no cookies
    ///
    /// # Errors
    ///
    /// Returns `ImageCreatorError::ClientInit` if the client cannot be initialized.
    pub fn new() -> Result<Self, ImageCreatorError> {
        Self::builder().build()
    }

    /// Create a builder for configuring the client
    pub fn builder() -> ImageCreatorBuilder {
        ImageCreatorBuilder::new()
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Cookies set explicitly or captured by [`login`](Self::login)
    pub fn cookies(&self) -> Option<&Cookies> {
        self.cookies.as_ref()
    }

    /// Explicit cookies win; otherwise the cookie store is asked for the cookie domain
    fn resolve_cookies(&self) -> Result<Cookies, ImageCreatorError> {
        if let Some(cookies) = self.cookies.as_ref().filter(|c| !c.is_empty()) {
            return Ok(cookies.clone());
        }
        match &self.cookie_store {
            Some(store) => store.cookies_for_domain(&self.config.cookie_domain),
            None => Ok(Cookies::new()),
        }
    }

    /// Create images for a prompt
    ///
    /// # Errors
    ///
    /// * `ImageCreatorError::MissingAccessToken` - No `_U` cookie available
    /// * `ImageCreatorError::ContentRejected` - The prompt was refused
    /// * `ImageCreatorError::SubmissionFailed` - The prompt was not accepted
    /// * `ImageCreatorError::Timeout` - Submission or polling took too long
    /// * `ImageCreatorError::PromptBlocked` / `Upstream` - The service reported an error
    /// * `ImageCreatorError::BadImages` / `NoImages` - No usable images were returned
    /// * `ImageCreatorError::Cancelled` - The cancellation token fired
    pub async fn create(&self, prompt: &str) -> Result<ImageResponse, ImageCreatorError> {
        let cookies = self.resolve_cookies()?;
        if !cookies.has_auth() {
            return Err(ImageCreatorError::MissingAccessToken);
        }

        debug!("Creating images for prompt of {} chars", prompt.len());
        let session = Session::new(&self.config, &cookies, &self.parser, self.cancel.clone())?;
        let images = session.create_images(prompt).await?;
        Ok(ImageResponse::new(images, prompt))
    }

    /// Capture fresh cookies through an interactive browser login
    ///
    /// Emits [`CreatorEvent::LoginRequired`] first when a login URL is configured.
    /// On success the captured cookies replace the client's cookies.
    ///
    /// # Errors
    ///
    /// * `ImageCreatorError::BrowserUnavailable` - No launcher configured or the browser failed to start
    /// * `ImageCreatorError::Timeout` - The user did not log in within the login timeout
    pub async fn login<F>(&mut self, mut on_event: F) -> Result<(), ImageCreatorError>
    where
        F: FnMut(CreatorEvent),
    {
        if let Some(login_url) = &self.config.login_url {
            on_event(CreatorEvent::LoginRequired {
                login_url: login_url.clone(),
            });
        }

        let launcher = self.launcher.clone().ok_or_else(|| {
            ImageCreatorError::BrowserUnavailable("no browser launcher configured".to_string())
        })?;
        let cookies = harvest_cookies(launcher.as_ref(), &self.config, &self.cancel).await?;
        self.cookies = Some(cookies);
        Ok(())
    }

    /// Create images for a prompt, blocking the current thread
    ///
    /// Falls back to an interactive login when no `_U` cookie is available,
    /// reporting progress through `on_event`. Drives its own single-threaded
    /// runtime, so it must not be called from within an async context.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create). A login that cannot start a browser is
    /// reported as `ImageCreatorError::MissingAccessToken`; calling from inside
    /// an async runtime yields `ImageCreatorError::Runtime`.
    pub fn create_blocking<F>(
        &mut self,
        prompt: &str,
        on_event: F,
    ) -> Result<ImageResponse, ImageCreatorError>
    where
        F: FnMut(CreatorEvent),
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(ImageCreatorError::Runtime(std::io::Error::other(
                "blocking call made from within an async runtime",
            )));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ImageCreatorError::Runtime)?;

        runtime.block_on(async {
            if !self.resolve_cookies()?.has_auth() {
                match self.login(on_event).await {
                    Ok(()) => {}
                    Err(ImageCreatorError::BrowserUnavailable(reason)) => {
                        warn!("Cannot log in interactively: {}", reason);
                        return Err(ImageCreatorError::MissingAccessToken);
                    }
                    Err(e) => return Err(e),
                }
            }
            self.create(prompt).await
        })
    }
}

impl fmt::Debug for ImageCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCreator")
            .field("config", &self.config)
            .field("cookies", &self.cookies)
            .field("has_cookie_store", &self.cookie_store.is_some())
            .field("has_launcher", &self.launcher.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for configuring an [`ImageCreator`]
///
/// # Example
///
/// ```no_run
/// use bing_image_creator::{ClientConfig, ImageCreator, MemoryCookieStore};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryCookieStore::new();
/// let config = ClientConfig {
///     polling_timeout: Duration::from_secs(120),
///     ..ClientConfig::from_env()?
/// };
///
/// let creator = ImageCreator::builder()
///     .config(config)
///     .cookie_store(store)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ImageCreatorBuilder {
    config: Option<ClientConfig>,
    base_url: Option<reqwest::Url>,
    cookies: Option<Cookies>,
    cookie_store: Option<Arc<dyn CookieStore>>,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    cancel: Option<CancellationToken>,
}

impl ImageCreatorBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a complete configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the service origin, e.g. to point at a mock server
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn base_url(mut self, url: impl reqwest::IntoUrl) -> Result<Self, ImageCreatorError> {
        self.base_url = Some(url.into_url()?);
        Ok(self)
    }

    /// Use these cookies instead of asking the cookie store
    pub fn cookies(mut self, cookies: Cookies) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// Look cookies up here when none were set explicitly
    pub fn cookie_store(mut self, store: impl CookieStore + 'static) -> Self {
        self.cookie_store = Some(Arc::new(store));
        self
    }

    /// Browser launcher used for interactive login
    pub fn browser_launcher(mut self, launcher: impl BrowserLauncher + 'static) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    /// Token that aborts every wait and request of this client when cancelled
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the client with the configured settings
    ///
    /// # Errors
    ///
    /// Returns `ImageCreatorError::ClientInit` if the base URL cannot carry paths.
    pub fn build(self) -> Result<ImageCreator, ImageCreatorError> {
        let mut config = self.config.unwrap_or_default();
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if config.base_url.cannot_be_a_base() {
            return Err(ImageCreatorError::ClientInit(format!(
                "Base URL cannot carry paths: {}",
                config.base_url
            )));
        }

        Ok(ImageCreator {
            config,
            cookies: self.cookies,
            cookie_store: self.cookie_store,
            launcher: self.launcher,
            cancel: self.cancel.unwrap_or_default(),
            parser: ResponseParser::new(),
        })
    }
}
