//! Interactive login through a real browser

use crate::config::ClientConfig;
use crate::cookies::{AUTH_COOKIE, Cookies};
use crate::error::{ImageCreatorError, Stage};
use crate::session::{cancellable, pause};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// A browser window the user can log in with
#[async_trait]
pub trait LoginBrowser: Send {
    /// Load `url` in the browser
    async fn navigate(&mut self, url: &str) -> Result<(), ImageCreatorError>;

    /// Value of the cookie called `name`, if the browser has one
    async fn cookie(&mut self, name: &str) -> Result<Option<String>, ImageCreatorError>;

    /// Every cookie of the current browsing session
    async fn all_cookies(&mut self) -> Result<Cookies, ImageCreatorError>;

    /// Shut the browser down
    async fn close(&mut self) -> Result<(), ImageCreatorError>;
}

/// Starts browsers for interactive login
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a visible browser, routed through `proxy` when given
    ///
    /// Implementations return `ImageCreatorError::BrowserUnavailable` when no
    /// browser can be started.
    async fn launch(
        &self,
        proxy: Option<&reqwest::Url>,
    ) -> Result<Box<dyn LoginBrowser>, ImageCreatorError>;
}

/// Navigate to the service and wait until the authentication cookie appears
pub async fn wait_for_login(
    browser: &mut dyn LoginBrowser,
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> Result<(), ImageCreatorError> {
    cancellable(cancel, browser.navigate(config.base_url.as_str())).await??;

    let started = Instant::now();
    while cancellable(cancel, browser.cookie(AUTH_COOKIE))
        .await??
        .is_none_or(|value| value.is_empty())
    {
        if started.elapsed() > config.login_timeout {
            return Err(ImageCreatorError::Timeout {
                stage: Stage::Login,
                after: config.login_timeout,
            });
        }
        pause(cancel, config.login_poll_interval).await?;
    }

    debug!("Login detected after {:?}", started.elapsed());
    Ok(())
}

/// Launch a browser, let the user log in, and return the session cookies
///
/// The browser is closed whether or not the login succeeds.
pub async fn harvest_cookies(
    launcher: &dyn BrowserLauncher,
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> Result<Cookies, ImageCreatorError> {
    let mut browser = cancellable(cancel, launcher.launch(config.proxy.as_ref())).await??;

    let harvested = async {
        wait_for_login(browser.as_mut(), config, cancel).await?;
        pause(cancel, config.login_settle).await?;
        let cookies = cancellable(cancel, browser.all_cookies()).await??;
        Ok::<_, ImageCreatorError>(cookies)
    }
    .await;

    if let Err(e) = browser.close().await {
        warn!("Failed to close login browser: {}", e);
    }

    let cookies = harvested?;
    info!("Captured {} cookie(s) from browser login", cookies.len());
    Ok(cookies)
}
