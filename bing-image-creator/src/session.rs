//! Browser-like HTTP session and the steps of the creation flow

use crate::config::ClientConfig;
use crate::cookies::Cookies;
use crate::error::{ImageCreatorError, Stage};
use crate::parser::ResponseParser;
use log::{debug, info, warn};
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Headers a desktop Edge sends when submitting the creation form
const BROWSER_HEADERS: [(&str, &str); 12] = [
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    (
        "accept-language",
        "en-US,en;q=0.9,zh-CN;q=0.8,zh-TW;q=0.7,zh;q=0.6",
    ),
    ("content-type", "application/x-www-form-urlencoded"),
    ("referrer-policy", "origin-when-cross-origin"),
    (
        "user-agent",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36 Edg/111.0.1661.54",
    ),
    (
        "sec-ch-ua",
        "\"Microsoft Edge\";v=\"111\", \"Not(A:Brand\";v=\"8\", \"Chromium\";v=\"111\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "same-origin"),
    ("sec-fetch-user", "?1"),
    ("upgrade-insecure-requests", "1"),
];

/// `rt` value of the first submission attempt
const PRIMARY_RATE: &str = "4";
/// `rt` value of the single retry
const FALLBACK_RATE: &str = "3";
/// Fixed `FORM` value of the creation form
const FORM_CODE: &str = "GENCRE";
/// Notification flag appended to the redirect location
const TRACKING_PARAM: &str = "nfy";
/// Query parameter carrying the request id
const REQUEST_ID_PARAM: &str = "id";

/// Race a future against a cancellation token
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ImageCreatorError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ImageCreatorError::Cancelled),
        output = fut => Ok(output),
    }
}

/// Sleep unless cancelled first
pub(crate) async fn pause(
    cancel: &CancellationToken,
    duration: Duration,
) -> Result<(), ImageCreatorError> {
    cancellable(cancel, tokio::time::sleep(duration)).await
}

/// Outcome of one submission attempt
#[derive(Debug)]
struct Submission {
    status: StatusCode,
    location: Option<String>,
}

/// An authenticated session used for one creation request
///
/// The underlying HTTP client is owned by the session and released when it is dropped.
pub(crate) struct Session<'a> {
    http: reqwest::Client,
    config: &'a ClientConfig,
    parser: &'a ResponseParser,
    cancel: CancellationToken,
}

impl<'a> Session<'a> {
    /// Build a session with browser headers and the given cookies
    ///
    /// Redirects are never followed so the submission redirect can be inspected.
    pub fn new(
        config: &'a ClientConfig,
        cookies: &Cookies,
        parser: &'a ResponseParser,
        cancel: CancellationToken,
    ) -> Result<Self, ImageCreatorError> {
        let mut headers = browser_headers(&config.base_url)?;
        headers.insert(header::COOKIE, cookies.to_header()?);

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none());

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.clone())
                .map_err(|e| ImageCreatorError::ClientInit(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| ImageCreatorError::ClientInit(e.to_string()))?;

        Ok(Self {
            http,
            config,
            parser,
            cancel,
        })
    }

    /// Run the whole flow for a prompt and return the image URLs
    pub async fn create_images(&self, prompt: &str) -> Result<Vec<String>, ImageCreatorError> {
        let request_id = self.submit(prompt).await?;
        let body = self.poll(&request_id, prompt).await?;
        let images = self.parser.parse_poll_body(&body)?;
        info!("Extracted {} image(s) for request {}", images.len(), request_id);
        Ok(images)
    }

    /// Submit the prompt and follow the redirect; returns the request id
    ///
    /// The `rt=3` retry carries the form only in its query string and sends
    /// an empty body.
    pub async fn submit(&self, prompt: &str) -> Result<String, ImageCreatorError> {
        let mut submission = self.post_prompt(prompt, PRIMARY_RATE, true).await?;

        if submission.status != StatusCode::FOUND {
            warn!(
                "Submission answered with {} instead of a redirect, retrying with rt={}",
                submission.status, FALLBACK_RATE
            );
            submission = self.post_prompt(prompt, FALLBACK_RATE, false).await?;
            if submission.status != StatusCode::FOUND {
                return Err(ImageCreatorError::SubmissionFailed {
                    status: submission.status,
                });
            }
        }

        let location = submission
            .location
            .ok_or(ImageCreatorError::MissingRedirect)?;
        let request_id = self.follow_redirect(&location).await?;
        info!("Submission accepted, request id {}", request_id);
        Ok(request_id)
    }

    /// POST the creation form once
    async fn post_prompt(
        &self,
        prompt: &str,
        rate: &str,
        with_body: bool,
    ) -> Result<Submission, ImageCreatorError> {
        let url = self.endpoint(&["images", "create"])?;
        let form = [("q", prompt), ("rt", rate), ("FORM", FORM_CODE)];
        let timeout = self.config.submission_timeout;

        debug!("POST {} (rt={})", url.path(), rate);
        let mut request = self.http.post(url).query(&form).timeout(timeout);
        if with_body {
            request = request.form(&form);
        }
        let response = cancellable(&self.cancel, request.send())
            .await?
            .map_err(|e| ImageCreatorError::from_request(e, Stage::Submission, timeout))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ImageCreatorError::SubmissionFailed { status });
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = cancellable(&self.cancel, response.text())
            .await?
            .map_err(|e| ImageCreatorError::from_request(e, Stage::Submission, timeout))?;
        if let Some(phrase) = self.parser.find_rejection(&body) {
            return Err(ImageCreatorError::ContentRejected { phrase });
        }

        Ok(Submission { status, location })
    }

    /// GET the redirect target so the service registers the request
    async fn follow_redirect(&self, location: &str) -> Result<String, ImageCreatorError> {
        let (url, request_id) = resolve_redirect(&self.config.base_url, location)?;
        let timeout = self.config.submission_timeout;

        debug!("GET {} (redirect)", url.path());
        let response = cancellable(&self.cancel, self.http.get(url).timeout(timeout).send())
            .await?
            .map_err(|e| ImageCreatorError::from_request(e, Stage::Submission, timeout))?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(ImageCreatorError::RedirectFailed { status });
        }
        Ok(request_id)
    }

    /// Poll the results endpoint until it returns a non-empty body
    pub async fn poll(&self, request_id: &str, prompt: &str) -> Result<String, ImageCreatorError> {
        let mut url = self.endpoint(&["images", "create", "async", "results", request_id])?;
        url.query_pairs_mut().append_pair("q", prompt);

        let timeout = self.config.polling_timeout;
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            let elapsed = started.elapsed();
            if elapsed > timeout {
                return Err(ImageCreatorError::Timeout {
                    stage: Stage::Polling,
                    after: timeout,
                });
            }
            attempt += 1;

            let response = cancellable(
                &self.cancel,
                self.http
                    .get(url.clone())
                    .timeout(timeout.saturating_sub(elapsed))
                    .send(),
            )
            .await?
            .map_err(|e| ImageCreatorError::from_request(e, Stage::Polling, timeout))?;

            let status = response.status();
            if status != StatusCode::OK {
                return Err(ImageCreatorError::PollingFailed { status });
            }

            let body = cancellable(&self.cancel, response.text())
                .await?
                .map_err(|e| ImageCreatorError::from_request(e, Stage::Polling, timeout))?;
            if !body.is_empty() {
                debug!("Results for {} ready after {} poll(s)", request_id, attempt);
                return Ok(body);
            }

            debug!("Results for {} not ready (poll {})", request_id, attempt);
            pause(&self.cancel, self.config.poll_interval).await?;
        }
    }

    /// Build an absolute URL from path segments under the base URL
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ImageCreatorError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ImageCreatorError::ClientInit("Cannot modify base URL path".to_string()))?
            .clear()
            .extend(segments);
        Ok(url)
    }
}

/// Headers sent with every request of a session
fn browser_headers(base_url: &reqwest::Url) -> Result<HeaderMap, ImageCreatorError> {
    let mut headers = HeaderMap::new();
    for (name, value) in BROWSER_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    let origin = base_url.origin().ascii_serialization();
    let referer = base_url
        .join("/images/create/")
        .map_err(|e| ImageCreatorError::ClientInit(e.to_string()))?;
    let invalid = |_| ImageCreatorError::ClientInit("Invalid base URL for headers".to_string());
    headers.insert(header::ORIGIN, HeaderValue::from_str(&origin).map_err(invalid)?);
    headers.insert(
        header::REFERER,
        HeaderValue::from_str(referer.as_str()).map_err(invalid)?,
    );

    Ok(headers)
}

/// Resolve a redirect location against the base URL
///
/// Drops the notification flag and returns the URL to request together with
/// the value of its `id` query parameter.
pub(crate) fn resolve_redirect(
    base_url: &reqwest::Url,
    location: &str,
) -> Result<(reqwest::Url, String), ImageCreatorError> {
    let missing = || ImageCreatorError::MissingRequestId {
        location: location.to_string(),
    };
    let mut url = base_url.join(location).map_err(|_| missing())?;

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != TRACKING_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    let request_id = pairs
        .iter()
        .find(|(name, _)| name == REQUEST_ID_PARAM)
        .map(|(_, value)| value.clone())
        .filter(|value| !value.is_empty())
        .ok_or_else(missing)?;

    url.query_pairs_mut().clear().extend_pairs(&pairs);
    Ok((url, request_id))
}
