//! Domain error types for the tree-construction pipeline.

use std::fmt;

/// No usable HAR document was found across an entire capture request
/// (every HAR supplied had zero entries).
#[derive(Debug)]
pub struct Har2TreeError {
    pub detail: String,
}

impl Har2TreeError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Har2TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no usable HAR capture: {}", self.detail)
    }
}

impl std::error::Error for Har2TreeError {}

/// A Chromium `_initiator.type` this crate does not model: `"redirect"`, or
/// any value other than `"other"`, `"parser"`, `"script"`.
#[derive(Debug)]
pub struct UnsupportedInitiatorError {
    pub url: String,
    pub initiator_type: String,
}

impl fmt::Display for UnsupportedInitiatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported _initiator.type {:?} on entry {}",
            self.initiator_type, self.url
        )
    }
}

impl std::error::Error for UnsupportedInitiatorError {}
