//! Stream record model, decoding and the relay filter.
//!
//! The stream delivers one platform status per line as JSON. [`parse`]
//! decodes a line into an [`EventRecord`]; [`accept`] decides whether a
//! well-formed record is eligible for relaying at all.
//!
//! Parent identifiers are validated for shape only. They are never
//! resolved here; fetching the parent is the relay pipeline's job and may
//! fail on its own.

use crate::error::{Error, Result};
use serde::Deserialize;
use serde::de::IgnoredAny;
use std::fmt;
use std::str::FromStr;

/// Platform-unique identifier of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(RecordId)
            .map_err(|e| Error::InvalidField {
                field: "id",
                reason: format!("'{}' is not a numeric identifier: {}", s, e),
            })
    }
}

/// Kind of an inline span annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// `#label`
    Hashtag,
    /// `@label`
    Mention,
}

/// Inline span annotation over a record's text.
///
/// Offsets are byte positions into the text; `end` is exclusive. The
/// platform's character indices are converted while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub kind: EntityKind,
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// One parsed inbound record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id: RecordId,
    pub author_handle: String,
    pub text: String,
    pub is_repost: bool,
    pub parent_id: Option<RecordId>,
    /// Sorted by start offset.
    pub entities: Vec<Entity>,
}

/// Why a well-formed record was not accepted for relaying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Written by the relay's own account.
    SelfAuthored,
    /// A repost of someone else's content.
    Repost,
}

impl RejectReason {
    /// Short label used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfAuthored => "self_authored",
            Self::Repost => "repost",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WireStatus {
    id: RecordId,
    text: String,
    user: WireUser,
    #[serde(default)]
    retweeted: bool,
    #[serde(default)]
    retweeted_status: Option<IgnoredAny>,
    #[serde(default)]
    in_reply_to_status_id: Option<RecordId>,
    #[serde(default)]
    in_reply_to_status_id_str: Option<String>,
    #[serde(default)]
    entities: WireEntities,
}

#[derive(Deserialize)]
struct WireUser {
    screen_name: String,
}

#[derive(Deserialize, Default)]
struct WireEntities {
    #[serde(default)]
    hashtags: Vec<WireHashtag>,
    #[serde(default)]
    user_mentions: Vec<WireMention>,
}

#[derive(Deserialize)]
struct WireHashtag {
    text: String,
    indices: [usize; 2],
}

#[derive(Deserialize)]
struct WireMention {
    screen_name: String,
    indices: [usize; 2],
}

/// Byte offset of the `index`-th character of `text`.
///
/// Indices past the end stay past the end so the span is later skipped.
fn char_to_byte(text: &str, index: usize) -> usize {
    let mut count = 0;
    for (offset, _) in text.char_indices() {
        if count == index {
            return offset;
        }
        count += 1;
    }
    text.len() + (index - count)
}

/// Platform indices count characters; entities carry byte offsets.
fn make_entity(text: &str, kind: EntityKind, label: String, indices: [usize; 2]) -> Result<Entity> {
    let [start, end] = indices;
    if start > end {
        return Err(Error::InvalidField {
            field: "entities",
            reason: format!("span for '{}' ends before it starts ({}..{})", label, start, end),
        });
    }
    Ok(Entity {
        kind,
        label,
        start: char_to_byte(text, start),
        end: char_to_byte(text, end),
    })
}

impl TryFrom<WireStatus> for EventRecord {
    type Error = Error;

    fn try_from(wire: WireStatus) -> Result<Self> {
        if wire.user.screen_name.is_empty() {
            return Err(Error::InvalidField {
                field: "user.screen_name",
                reason: "empty author handle".to_string(),
            });
        }

        // The string form is authoritative; the numeric form loses precision
        // in some producers.
        let parent_id = match wire.in_reply_to_status_id_str.as_deref() {
            Some(s) if !s.is_empty() => {
                Some(s.parse::<RecordId>().map_err(|_| Error::InvalidField {
                    field: "in_reply_to_status_id_str",
                    reason: format!("'{}' is not a numeric identifier", s),
                })?)
            }
            _ => wire.in_reply_to_status_id,
        };

        let mut entities = Vec::with_capacity(
            wire.entities.hashtags.len() + wire.entities.user_mentions.len(),
        );
        for tag in wire.entities.hashtags {
            entities.push(make_entity(
                &wire.text,
                EntityKind::Hashtag,
                tag.text,
                tag.indices,
            )?);
        }
        for mention in wire.entities.user_mentions {
            entities.push(make_entity(
                &wire.text,
                EntityKind::Mention,
                mention.screen_name,
                mention.indices,
            )?);
        }
        entities.sort_by_key(|e| e.start);

        Ok(Self {
            id: wire.id,
            author_handle: wire.user.screen_name,
            text: wire.text,
            is_repost: wire.retweeted || wire.retweeted_status.is_some(),
            parent_id,
            entities,
        })
    }
}

/// Decode one raw stream line into a record.
///
/// # Errors
///
/// Fails when the line is not JSON of the status shape, or when a field
/// holds an unusable value (empty author, non-numeric parent id, inverted
/// entity span).
pub fn parse(raw_line: &str) -> Result<EventRecord> {
    let wire: WireStatus = serde_json::from_str(raw_line.trim())?;
    EventRecord::try_from(wire)
}

/// Return the reason a record must not be relayed, if any.
pub fn rejection(record: &EventRecord, self_handle: &str) -> Option<RejectReason> {
    if record.author_handle == self_handle {
        Some(RejectReason::SelfAuthored)
    } else if record.is_repost {
        Some(RejectReason::Repost)
    } else {
        None
    }
}

/// Whether a well-formed record is eligible for relaying.
pub fn accept(record: &EventRecord, self_handle: &str) -> bool {
    rejection(record, self_handle).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_json(id: u64, author: &str, text: &str) -> String {
        serde_json::json!({
            "id": id,
            "text": text,
            "user": { "screen_name": author },
            "retweeted": false,
            "entities": { "hashtags": [], "user_mentions": [] }
        })
        .to_string()
    }

    #[test]
    fn test_parse_minimal_status() {
        let record = parse(&status_json(100, "alice", "hello")).unwrap();
        assert_eq!(record.id, RecordId(100));
        assert_eq!(record.author_handle, "alice");
        assert_eq!(record.text, "hello");
        assert!(!record.is_repost);
        assert_eq!(record.parent_id, None);
        assert!(record.entities.is_empty());
    }

    #[test]
    fn test_parse_entities_sorted_by_offset() {
        let line = r##"{
            "id": 7,
            "text": "@bob look #tag",
            "user": {"screen_name": "alice"},
            "entities": {
                "hashtags": [{"text": "tag", "indices": [10, 14]}],
                "user_mentions": [{"screen_name": "bob", "indices": [0, 4]}]
            }
        }"##;
        let record = parse(line).unwrap();
        assert_eq!(record.entities.len(), 2);
        assert_eq!(record.entities[0].kind, EntityKind::Mention);
        assert_eq!(record.entities[0].label, "bob");
        assert_eq!(record.entities[1].kind, EntityKind::Hashtag);
        assert_eq!((record.entities[1].start, record.entities[1].end), (10, 14));
    }

    #[test]
    fn test_parse_converts_character_indices() {
        let line = r##"{
            "id": 8,
            "text": "héllo #tag ✓",
            "user": {"screen_name": "alice"},
            "entities": {"hashtags": [
                {"text": "tag", "indices": [6, 10]},
                {"text": "gone", "indices": [13, 17]}
            ]}
        }"##;
        let record = parse(line).unwrap();
        let tag = &record.entities[0];
        assert_eq!((tag.start, tag.end), (7, 11));
        assert_eq!(&record.text[tag.start..tag.end], "#tag");

        // Past the end stays past the end.
        let gone = &record.entities[1];
        assert!(gone.start > record.text.len());
        assert!(gone.end > gone.start);
    }

    #[test]
    fn test_parse_parent_prefers_string_form() {
        let line = r#"{"id": 5, "text": "re", "user": {"screen_name": "a"},
            "in_reply_to_status_id": 1, "in_reply_to_status_id_str": "9007199254740993"}"#;
        let record = parse(line).unwrap();
        assert_eq!(record.parent_id, Some(RecordId(9007199254740993)));
    }

    #[test]
    fn test_parse_parent_numeric_and_null() {
        let line = r#"{"id": 5, "text": "re", "user": {"screen_name": "a"},
            "in_reply_to_status_id": 4, "in_reply_to_status_id_str": null}"#;
        assert_eq!(parse(line).unwrap().parent_id, Some(RecordId(4)));

        let line = r#"{"id": 5, "text": "x", "user": {"screen_name": "a"},
            "in_reply_to_status_id": null}"#;
        assert_eq!(parse(line).unwrap().parent_id, None);
    }

    #[test]
    fn test_parse_repost_markers() {
        let line = r#"{"id": 1, "text": "x", "user": {"screen_name": "a"}, "retweeted": true}"#;
        assert!(parse(line).unwrap().is_repost);

        let line = r#"{"id": 1, "text": "RT x", "user": {"screen_name": "a"},
            "retweeted_status": {"id": 2}}"#;
        assert!(parse(line).unwrap().is_repost);

        let line = r#"{"id": 1, "text": "x", "user": {"screen_name": "a"},
            "retweeted_status": null}"#;
        assert!(!parse(line).unwrap().is_repost);
    }

    #[test]
    fn test_parse_malformed_lines() {
        let cases = [
            "",
            "not json",
            "{\"id\": 1",
            "[]",
            r#"{"delete": {"status": {"id": 1}}}"#,
            r#"{"limit": {"track": 12}}"#,
            r#"{"id": "abc", "text": "x", "user": {"screen_name": "a"}}"#,
            r#"{"id": -1, "text": "x", "user": {"screen_name": "a"}}"#,
            r#"{"id": 1, "user": {"screen_name": "a"}}"#,
            r#"{"id": 1, "text": "x", "user": {"screen_name": ""}}"#,
            r#"{"id": 1, "text": "x", "user": {"screen_name": "a"},
                "in_reply_to_status_id_str": "12x"}"#,
            r#"{"id": 1, "text": "x", "user": {"screen_name": "a"},
                "entities": {"hashtags": [{"text": "t", "indices": [5, 2]}]}}"#,
            r#"{"id": 1, "text": "x", "user": {"screen_name": "a"},
                "entities": {"hashtags": [{"text": "t", "indices": [1]}]}}"#,
        ];
        for line in cases {
            assert!(parse(line).is_err(), "expected malformed: {}", line);
        }
    }

    #[test]
    fn test_accept_policy() {
        let mut record = parse(&status_json(1, "alice", "hi")).unwrap();
        assert!(accept(&record, "relaybot"));

        record.author_handle = "relaybot".to_string();
        assert!(!accept(&record, "relaybot"));
        assert_eq!(
            rejection(&record, "relaybot"),
            Some(RejectReason::SelfAuthored)
        );

        record.author_handle = "alice".to_string();
        record.is_repost = true;
        assert!(!accept(&record, "relaybot"));
        assert_eq!(rejection(&record, "relaybot"), Some(RejectReason::Repost));
    }

    #[test]
    fn test_accept_ignores_parent_and_entities() {
        let line = r##"{"id": 3, "text": "#x", "user": {"screen_name": "carol"},
            "in_reply_to_status_id_str": "2",
            "entities": {"hashtags": [{"text": "x", "indices": [0, 2]}]}}"##;
        let record = parse(line).unwrap();
        assert!(accept(&record, "relaybot"));
    }

    #[test]
    fn test_record_id_from_str() {
        assert_eq!("42".parse::<RecordId>().unwrap(), RecordId(42));
        assert_eq!(" 42 ".parse::<RecordId>().unwrap(), RecordId(42));
        assert!("".parse::<RecordId>().is_err());
        assert!("4.2".parse::<RecordId>().is_err());
        assert_eq!(RecordId(42).to_string(), "42");
    }
}
