//! Chromium `_initiator` extension parsing (§4.4 step 9).

use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::error::UnsupportedInitiatorError;

/// Parse the Chromium `_initiator` extension of an entry, if present.
/// Returns `Ok(None)` when there is no usable initiator URL (absent field,
/// `type == "other"`, or a `"script"` stack with no URL anywhere on its
/// frame chain). Fails on `"redirect"` or any unrecognized type.
pub fn parse_initiator(
    initiator: Option<&Value>,
    entry_url: &str,
) -> Result<Option<String>, UnsupportedInitiatorError> {
    let Some(initiator) = initiator else {
        return Ok(None);
    };
    let Some(kind) = initiator["type"].as_str() else {
        return Ok(None);
    };

    match kind {
        "other" => Ok(None),
        "parser" => Ok(initiator["url"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())),
        "script" => Ok(first_call_frame_url(&initiator["stack"])),
        other => Err(UnsupportedInitiatorError {
            url: entry_url.to_string(),
            initiator_type: other.to_string(),
        }),
    }
}

/// Depth-first search of `stack.callFrames`, falling back to `stack.parent`
/// when the current frame carries no URL.
fn first_call_frame_url(stack: &Value) -> Option<String> {
    if let Some(frames) = stack["callFrames"].as_array() {
        for frame in frames {
            if let Some(url) = frame["url"].as_str() {
                if !url.is_empty() {
                    return Some(url.to_string());
                }
            }
        }
    }
    let parent = stack.get("parent")?;
    if parent.is_null() {
        return None;
    }
    first_call_frame_url(parent)
}
