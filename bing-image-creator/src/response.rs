//! Result of a successful creation

use std::fmt;

const IMAGES_START: &str = "<!-- generated images start -->";
const IMAGES_END: &str = "<!-- generated images end -->";

/// Images created for a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResponse {
    /// Canonical image URLs in the order the service listed them
    pub images: Vec<String>,
    /// The prompt the images were created from
    pub prompt: String,
}

impl ImageResponse {
    /// Pair image URLs with their prompt
    pub fn new(images: Vec<String>, prompt: impl Into<String>) -> Self {
        Self {
            images,
            prompt: prompt.into(),
        }
    }
}

/// Renders the images as markdown links between marker comments
impl fmt::Display for ImageResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{IMAGES_START}")?;
        for (idx, image) in self.images.iter().enumerate() {
            writeln!(f, "[![#{} {}]({image})]({image})", idx + 1, self.prompt)?;
        }
        writeln!(f, "{IMAGES_END}")
    }
}
