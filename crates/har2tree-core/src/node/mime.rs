//! MIME classification (exclusive, set once at construction) and the
//! additive category flags external-resource context propagation can also
//! set (§4.4 step 8, §4.5).

/// One bool per MIME category. Construction (`classify`) sets exactly one
/// of `js`/`image`/`css`/`json`/`html`/`font`/`octet_stream`/`text`/`video`/
/// `livestream`/`unset_mimetype`/`unknown_mimetype`. `audio` and `iframe`
/// are never set by `classify` — they only ever come from context
/// propagation — and propagation may additionally flip any of
/// `image`/`js`/`video`/`audio`/`iframe`/`octet_stream`/`css` on top of
/// whatever `classify` chose, without touching the others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimeFlags {
    pub js: bool,
    pub image: bool,
    pub css: bool,
    pub json: bool,
    pub html: bool,
    pub font: bool,
    pub octet_stream: bool,
    pub text: bool,
    pub video: bool,
    pub livestream: bool,
    pub unset_mimetype: bool,
    pub unknown_mimetype: bool,
    pub audio: bool,
    pub iframe: bool,
}

impl MimeFlags {
    pub fn classify(mimetype: &str) -> Self {
        let mut flags = Self::default();

        if mimetype.contains("javascript") || mimetype.contains("ecmascript") {
            flags.js = true;
        } else if mimetype.starts_with("image") {
            flags.image = true;
        } else if mimetype.starts_with("text/css") {
            flags.css = true;
        } else if mimetype.contains("json") {
            flags.json = true;
        } else if mimetype.starts_with("text/html") {
            flags.html = true;
        } else if mimetype.contains("font") {
            flags.font = true;
        } else if mimetype.contains("octet-stream") {
            flags.octet_stream = true;
        } else if mimetype.contains("text/plain") || mimetype.contains("xml") {
            flags.text = true;
        } else if mimetype.contains("video") {
            flags.video = true;
        } else if mimetype.to_ascii_lowercase().contains("mpegurl") {
            flags.livestream = true;
        } else if mimetype.is_empty() {
            flags.unset_mimetype = true;
        } else {
            flags.unknown_mimetype = true;
        }

        flags
    }
}
