//! The single text payload that travels from the operator to the agent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator placed between the text body and an attached image.
pub const IMAGE_MARKER: &str = "\n\n[IMAGE]\n";

/// A normalized operator message.
///
/// Images are not modeled separately: an attached image (usually a data URI)
/// is flattened into the text after [`IMAGE_MARKER`], so the consumer always
/// receives exactly one string.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Message(String);

impl Message {
    /// Build a message from submitted text and an optional image payload.
    ///
    /// The image is appended verbatim; an empty image string counts as absent.
    pub fn compose(content: &str, image: Option<&str>) -> Self {
        match image {
            Some(image) if !image.is_empty() => {
                Self(format!("{}{}{}", content, IMAGE_MARKER, image))
            }
            _ => Self(content.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_text(self) -> String {
        self.0
    }

    pub fn has_image(&self) -> bool {
        self.0.contains(IMAGE_MARKER)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
