//! Error types for the image creator client

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Step of the creation flow a timeout belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Prompt submission and redirect resolution
    Submission,
    /// Waiting for the results endpoint to return content
    Polling,
    /// Waiting for a human to log in through the browser
    Login,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Submission => "submission",
            Stage::Polling => "polling",
            Stage::Login => "login",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while creating images
#[derive(Error, Debug)]
pub enum ImageCreatorError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// No `_U` authentication cookie available
    #[error("Missing \"_U\" cookie")]
    MissingAccessToken,

    /// Interactive login is impossible because no browser could be started
    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    /// The service refused the prompt
    #[error("Create images failed: {phrase}")]
    ContentRejected {
        /// The rejection phrase found in the response
        phrase: &'static str,
    },

    /// Submission was not answered with a redirect
    #[error("Create images failed. Code: {status}")]
    SubmissionFailed {
        /// The status code of the last submission attempt
        status: reqwest::StatusCode,
    },

    /// Redirect response did not carry a `Location` header
    #[error("Submission redirect has no location")]
    MissingRedirect,

    /// Redirect location has no `id` query parameter
    #[error("No request id in redirect location: {location}")]
    MissingRequestId {
        /// The offending location
        location: String,
    },

    /// Following the redirect returned an error status
    #[error("Redirect request failed. Code: {status}")]
    RedirectFailed {
        /// The status code that was received
        status: reqwest::StatusCode,
    },

    /// A stage ran out of time
    #[error("Timeout error during {stage} after {secs} sec", secs = .after.as_secs())]
    Timeout {
        /// Which stage timed out
        stage: Stage,
        /// The configured limit
        after: Duration,
    },

    /// Results endpoint returned something other than 200
    #[error("Polling images failed. Code: {status}")]
    PollingFailed {
        /// The status code that was received
        status: reqwest::StatusCode,
    },

    /// The service reported the prompt as pending review
    #[error("Prompt is been blocked")]
    PromptBlocked,

    /// Any other error message reported by the service
    #[error("{0}")]
    Upstream(String),

    /// A known placeholder image was returned
    #[error("Bad images found")]
    BadImages,

    /// The result page contained no images
    #[error("No images found")]
    NoImages,

    /// The operation was cancelled through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Client initialization failed
    #[error("Client initialization failed: {0}")]
    ClientInit(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cookie store lookup failed
    #[error("Cookie store error: {0}")]
    CookieStore(String),

    /// The runtime driving a blocking call could not be created
    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl ImageCreatorError {
    /// Map a reqwest error, turning its timeouts into [`ImageCreatorError::Timeout`]
    pub(crate) fn from_request(err: reqwest::Error, stage: Stage, after: Duration) -> Self {
        if err.is_timeout() {
            ImageCreatorError::Timeout { stage, after }
        } else {
            ImageCreatorError::Request(err)
        }
    }
}
