//! Response classification and image extraction

use crate::error::ImageCreatorError;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::OnceLock;

/// Phrases in a submission response that mean the prompt was refused
pub(crate) const REJECTION_PHRASES: [&str; 4] = [
    "this prompt is being reviewed",
    "this prompt has been blocked",
    "we're working hard to offer image creator in more languages",
    "we can't create your images right now",
];

/// Placeholder images served instead of real results
pub(crate) const BAD_IMAGES: [&str; 2] = [
    "https://r.bing.com/rp/in-2zU3AJUdkgFe7ZKv19yPBHVs.png",
    "https://r.bing.com/rp/TX9QuO3WzcCJz1uaaSwQAz39Kb0.jpg",
];

/// Error message the results endpoint uses for prompts held for review
const PENDING_MESSAGE: &str = "Pending";

/// Separator between an image URL and its size selector
const SIZE_SUFFIX: &str = "?w=";

/// A non-empty body returned by the results endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PollBody<'a> {
    /// JSON envelope with an error message
    Error(String),
    /// Anything else; treated as the result HTML
    Html(&'a str),
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

/// Parser for image creator responses with cached selectors
#[derive(Clone, Debug)]
pub(crate) struct ResponseParser {
    image_selector: OnceLock<Selector>,
}

impl ResponseParser {
    /// Create a new parser with uninitialized caches
    pub fn new() -> Self {
        Self {
            image_selector: OnceLock::new(),
        }
    }

    /// Get or compile the generated image selector
    fn image_selector(&self) -> &Selector {
        self.image_selector
            .get_or_init(|| Selector::parse("img.mimg").unwrap())
    }

    /// Find the first rejection phrase contained in a submission response
    pub fn find_rejection(&self, body: &str) -> Option<&'static str> {
        let body = body.to_lowercase();
        REJECTION_PHRASES
            .into_iter()
            .find(|phrase| body.contains(phrase))
    }

    /// Classify a non-empty polling body
    ///
    /// A body that is not a JSON envelope, or an envelope without a message,
    /// falls back to being treated as HTML.
    pub fn classify_poll_body<'a>(&self, body: &'a str) -> PollBody<'a> {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(ErrorEnvelope {
                error_message: Some(message),
            }) if !message.is_empty() => PollBody::Error(message),
            _ => PollBody::Html(body),
        }
    }

    /// Turn a polling body into image URLs, surfacing reported errors
    pub fn parse_poll_body(&self, body: &str) -> Result<Vec<String>, ImageCreatorError> {
        match self.classify_poll_body(body) {
            PollBody::Error(message) if message == PENDING_MESSAGE => {
                Err(ImageCreatorError::PromptBlocked)
            }
            PollBody::Error(message) => Err(ImageCreatorError::Upstream(message)),
            PollBody::Html(html) => self.extract_images(html),
        }
    }

    /// Extract canonical image URLs from result HTML, in document order
    pub fn extract_images(&self, html: &str) -> Result<Vec<String>, ImageCreatorError> {
        let document = Html::parse_fragment(html);

        let images: Vec<String> = document
            .select(self.image_selector())
            .filter_map(|img| img.value().attr("src"))
            .map(|src| canonical_image_url(src).to_string())
            .collect();

        if images.iter().any(|url| BAD_IMAGES.contains(&url.as_str())) {
            return Err(ImageCreatorError::BadImages);
        }
        if images.is_empty() {
            return Err(ImageCreatorError::NoImages);
        }
        Ok(images)
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip the size selector from an image URL
fn canonical_image_url(src: &str) -> &str {
    src.split(SIZE_SUFFIX).next().unwrap_or(src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn image_tag(src: &str) -> String {
        format!(r#"<div class="img_cont"><img class="mimg" src="{}" alt="a red apple"></div>"#, src)
    }

    #[test]
    fn test_single_valid_image() {
        let parser = ResponseParser::new();
        let html = image_tag("https://tse1.mm.bing.net/th/id/OIG.abc?w=270&h=270&c=6&r=0&o=5&pid=ImgGn");
        let images = parser.extract_images(&html).unwrap();
        assert_eq!(images, vec!["https://tse1.mm.bing.net/th/id/OIG.abc".to_string()]);
    }

    #[test]
    fn test_images_in_document_order() {
        let parser = ResponseParser::new();
        let html = [
            image_tag("https://tse1.mm.bing.net/th/id/OIG.one?w=270"),
            r#"<img src="https://tse1.mm.bing.net/th/id/ignored.png">"#.to_string(),
            image_tag("https://tse2.mm.bing.net/th/id/OIG.two?w=270"),
            image_tag("https://tse3.mm.bing.net/th/id/OIG.three"),
        ]
        .concat();
        let images = parser.extract_images(&html).unwrap();
        assert_eq!(
            images,
            vec![
                "https://tse1.mm.bing.net/th/id/OIG.one",
                "https://tse2.mm.bing.net/th/id/OIG.two",
                "https://tse3.mm.bing.net/th/id/OIG.three",
            ]
        );
    }

    #[test]
    fn test_no_images() {
        let parser = ResponseParser::new();
        let html = r#"<div><img class="other" src="https://example.com/a.png"></div>"#;
        assert!(matches!(
            parser.extract_images(html),
            Err(ImageCreatorError::NoImages)
        ));
    }

    #[test]
    fn test_only_bad_images() {
        let parser = ResponseParser::new();
        let html = BAD_IMAGES
            .iter()
            .map(|url| image_tag(&format!("{}?w=270", url)))
            .collect::<String>();
        assert!(matches!(
            parser.extract_images(&html),
            Err(ImageCreatorError::BadImages)
        ));
    }

    #[test]
    fn test_bad_image_poisons_valid_ones() {
        let parser = ResponseParser::new();
        let html = [
            image_tag("https://tse1.mm.bing.net/th/id/OIG.good?w=270"),
            image_tag(BAD_IMAGES[0]),
        ]
        .concat();
        assert!(matches!(
            parser.extract_images(&html),
            Err(ImageCreatorError::BadImages)
        ));
    }

    #[test]
    fn test_pending_is_prompt_blocked() {
        let parser = ResponseParser::new();
        assert!(matches!(
            parser.parse_poll_body(r#"{"errorMessage":"Pending"}"#),
            Err(ImageCreatorError::PromptBlocked)
        ));
    }

    #[test]
    fn test_other_error_is_surfaced_verbatim() {
        let parser = ResponseParser::new();
        match parser.parse_poll_body(r#"{"errorMessage":"X"}"#) {
            Err(ImageCreatorError::Upstream(message)) => assert_eq!(message, "X"),
            other => panic!("Expected Upstream error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_falls_back_to_html() {
        let parser = ResponseParser::new();
        let body = format!(r#"{{"errorMessage": {}"#, image_tag("https://tse1.mm.bing.net/th/id/OIG.x?w=1"));
        assert_eq!(parser.classify_poll_body(&body), PollBody::Html(body.as_str()));
        assert_eq!(
            parser.parse_poll_body(&body).unwrap(),
            vec!["https://tse1.mm.bing.net/th/id/OIG.x".to_string()]
        );
    }

    #[test]
    fn test_envelope_without_message_falls_back_to_html() {
        let parser = ResponseParser::new();
        for body in [r#"{"errorMessage":""}"#, r#"{"errorMessage":null}"#, r#"{}"#, "[1,2]"] {
            assert_eq!(parser.classify_poll_body(body), PollBody::Html(body));
            assert!(matches!(
                parser.parse_poll_body(body),
                Err(ImageCreatorError::NoImages)
            ));
        }
    }

    #[test]
    fn test_no_rejection_in_normal_page() {
        let parser = ResponseParser::new();
        assert_eq!(
            parser.find_rejection("<html><body>Image Creator</body></html>"),
            None
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10))]

        #[test]
        fn prop_rejection_detected_case_insensitively(
            prefix in "[a-zA-Z0-9 .,!?\\n]{0,100}",
            suffix in "[a-zA-Z0-9 .,!?\\n]{0,100}",
            phrase in prop::sample::select(REJECTION_PHRASES.to_vec()),
            upper in prop::bool::ANY,
        ) {
            let shown = if upper { phrase.to_uppercase() } else { phrase.to_string() };
            let body = format!("<html><body>{} {} {}</body></html>", prefix, shown, suffix);

            let parser = ResponseParser::new();
            prop_assert_eq!(parser.find_rejection(&body), Some(phrase));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10))]

        #[test]
        fn prop_size_suffix_is_stripped(
            id in "[A-Za-z0-9]{8,24}",
            width in 1u32..2000u32,
            tail in "(&[a-z]=[0-9]{1,3}){0,4}",
        ) {
            let canonical = format!("https://tse1.mm.bing.net/th/id/OIG.{}", id);
            let html = image_tag(&format!("{}?w={}{}", canonical, width, tail));

            let parser = ResponseParser::new();
            let images = parser.extract_images(&html).unwrap();
            prop_assert_eq!(images, vec![canonical]);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10))]

        #[test]
        fn prop_error_messages_surface(
            message in "[A-Za-z][A-Za-z0-9 ]{0,40}",
        ) {
            prop_assume!(message != PENDING_MESSAGE);
            let body = serde_json::json!({ "errorMessage": &message }).to_string();

            let parser = ResponseParser::new();
            match parser.parse_poll_body(&body) {
                Err(ImageCreatorError::Upstream(found)) => prop_assert_eq!(found, message),
                other => prop_assert!(false, "Expected Upstream error, got {:?}", other),
            }
        }
    }
}
