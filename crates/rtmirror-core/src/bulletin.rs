//! Ledger-bound bulletin construction.
//!
//! A bulletin is the text persisted to the ledger for one relayed record:
//!
//! ```text
//! #RTMirror of [@author](https://twitter.com/author/status/123)
//! record text with [#tags](https://twitter.com/hashtag/tags) rewritten
//! ```
//!
//! Inline entity spans are rewritten into link markup so references stay
//! resolvable once the text is detached from the platform.

use crate::record::{EntityKind, EventRecord};

/// Provenance marker prefixed to every bulletin.
pub const PROVENANCE_TAG: &str = "#RTMirror";

/// Default platform web base used for links.
pub const DEFAULT_WEB_BASE: &str = "https://twitter.com";

/// Payload submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bulletin {
    /// Free text body, provenance line first.
    pub message: String,
    /// Unix seconds at build time.
    pub timestamp: u64,
    /// Link to the original post.
    pub reference: Option<String>,
}

/// Link to a record on the platform's web front end.
pub fn post_url(web_base: &str, record: &EventRecord) -> String {
    format!(
        "{}/{}/status/{}",
        web_base.trim_end_matches('/'),
        record.author_handle,
        record.id
    )
}

/// Rewrite entity spans of `record.text` into link markup.
///
/// Entity offsets are byte offsets into `record.text`. Decoders must convert
/// the platform's character-counted indices before building the record
/// (`parse` does). Spans that fall outside the text, overlap an earlier span
/// or split a UTF-8 sequence are left as plain text.
pub fn rewrite_entities(web_base: &str, record: &EventRecord) -> String {
    let base = web_base.trim_end_matches('/');
    let text = record.text.as_str();
    let mut out = String::with_capacity(text.len() + record.entities.len() * 32);
    let mut cursor = 0usize;

    for entity in &record.entities {
        let usable = entity.start >= cursor
            && entity.end <= text.len()
            && entity.start < entity.end
            && text.is_char_boundary(entity.start)
            && text.is_char_boundary(entity.end);
        if !usable {
            tracing::debug!(
                record_id = %record.id,
                label = %entity.label,
                start = entity.start,
                end = entity.end,
                "skipping unusable entity span"
            );
            continue;
        }

        out.push_str(&text[cursor..entity.start]);
        match entity.kind {
            EntityKind::Hashtag => {
                out.push_str(&format!("[#{0}]({1}/hashtag/{0})", entity.label, base))
            }
            EntityKind::Mention => out.push_str(&format!("[@{0}]({1}/{0})", entity.label, base)),
        }
        cursor = entity.end;
    }

    out.push_str(&text[cursor..]);
    out
}

/// Build the bulletin persisted for `record`.
pub fn build_bulletin(web_base: &str, record: &EventRecord, timestamp: u64) -> Bulletin {
    let link = post_url(web_base, record);
    let message = format!(
        "{} of [@{}]({})\n{}",
        PROVENANCE_TAG,
        record.author_handle,
        link,
        rewrite_entities(web_base, record)
    );

    Bulletin {
        message,
        timestamp,
        reference: Some(link),
    }
}
