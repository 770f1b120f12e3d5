//! Event model for the Jetstream feed.
//!
//! Messages are decoded in two steps. The wire JSON is first read into a flat
//! `RawEvent` carrying one optional payload per kind, then folded into
//! [`Event`] whose [`EventBody`] holds exactly the payload named by `kind`.
//! Commit records stay as raw JSON until the collection is known; see
//! [`PostRecord::from_commit`].

use serde::Deserialize;
use serde_json::value::RawValue;
use time::OffsetDateTime;

use crate::error::{JetstreamError, Result};

/// Collection identifier of feed posts.
pub const FEED_POST: &str = "app.bsky.feed.post";

// ************* Wire shapes *************** | START
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    did: String,
    #[serde(default)]
    time_us: i64,
    kind: Option<String>,
    commit: Option<Commit>,
    identity: Option<Identity>,
    account: Option<Account>,
}
// ************* Wire shapes *************** | END

// ************* Event *************** | START
#[derive(Debug)]
pub struct Event {
    pub did: String,
    /// Microseconds since the Unix epoch.
    pub time_us: i64,
    pub body: EventBody,
}

#[derive(Debug)]
pub enum EventBody {
    Commit(Commit),
    Identity(Identity),
    Account(Account),
    /// Kind absent, unrecognized, or its payload missing.
    Unknown { kind: Option<String> },
}

impl Event {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(bytes).map_err(JetstreamError::Decode)?;
        Ok(Event::from_raw(raw))
    }

    pub fn kind(&self) -> &str {
        match &self.body {
            EventBody::Commit(_) => "commit",
            EventBody::Identity(_) => "identity",
            EventBody::Account(_) => "account",
            EventBody::Unknown { kind } => kind.as_deref().unwrap_or("unknown"),
        }
    }

    fn from_raw(raw: RawEvent) -> Self {
        let body = match (raw.kind.as_deref(), raw.commit, raw.identity, raw.account) {
            (Some("commit"), Some(commit), _, _) => EventBody::Commit(commit),
            (Some("identity"), _, Some(identity), _) => EventBody::Identity(identity),
            (Some("account"), _, _, Some(account)) => EventBody::Account(account),
            _ => EventBody::Unknown { kind: raw.kind },
        };

        Event {
            did: raw.did,
            time_us: raw.time_us,
            body,
        }
    }
}
// ************* Event *************** | END

// ************* Commit *************** | START
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub collection: String,
    #[serde(rename = "rkey", default)]
    pub record_key: String,
    #[serde(rename = "cid", default)]
    pub content_id: String,
    #[serde(rename = "rev", default)]
    pub revision: String,
    /// Left undecoded; its schema depends on `collection`.
    #[serde(default)]
    pub record: Option<Box<RawValue>>,
}
// ************* Commit *************** | END

// ************* Identity / Account *************** | START
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub handle: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "seq", default)]
    pub sequence: i64,
    #[serde(default)]
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub active: bool,
    #[serde(rename = "seq", default)]
    pub sequence: i64,
    #[serde(default)]
    pub time: String,
}
// ************* Identity / Account *************** | END

// ************* PostRecord *************** | START
#[derive(Debug, Clone, Deserialize)]
pub struct PostRecord {
    #[serde(rename = "$type", default)]
    pub record_type: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PostRecord {
    /// Second-stage decode of a commit's record into a feed post.
    pub fn from_commit(commit: &Commit) -> Result<Self> {
        let record = commit.record.as_ref().ok_or_else(|| JetstreamError::Record {
            collection: commit.collection.clone(),
            reason: "record is missing".to_string(),
        })?;

        serde_json::from_str(record.get()).map_err(|e| JetstreamError::Record {
            collection: commit.collection.clone(),
            reason: e.to_string(),
        })
    }
}
// ************* PostRecord *************** | END

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_account_event() {
        let json = br#"{"did":"abc","time_us":1000,"kind":"account","account":{"active":false,"seq":5,"time":"2024-01-01T00:00:00Z"}}"#;
        let event = Event::decode(json).unwrap();

        assert_eq!(event.did, "abc");
        assert_eq!(event.time_us, 1000);
        match event.body {
            EventBody::Account(account) => {
                assert!(!account.active);
                assert_eq!(account.sequence, 5);
                assert_eq!(account.time, "2024-01-01T00:00:00Z");
            }
            other => panic!("expected account body, got {other:?}"),
        }
    }

    #[test]
    fn identity_fills_missing_fields_with_empty_values() {
        let json = br#"{"did":"did:plc:x","time_us":7,"kind":"identity","identity":{"handle":"alice.test","seq":9,"time":"t"}}"#;
        let event = Event::decode(json).unwrap();

        let EventBody::Identity(identity) = event.body else {
            panic!("expected identity body");
        };
        assert_eq!(identity.handle, "alice.test");
        assert_eq!(identity.display_name, "");
        assert_eq!(identity.description, "");
        assert_eq!(identity.sequence, 9);
    }

    #[test]
    fn commit_keeps_record_raw() {
        let json = br#"{"did":"abc","time_us":2000,"kind":"commit","commit":{"rev":"r1","operation":"create","collection":"app.bsky.feed.like","rkey":"k1","cid":"c1","record":{"subject":{"uri":"at://x"}}}}"#;
        let event = Event::decode(json).unwrap();

        let EventBody::Commit(commit) = event.body else {
            panic!("expected commit body");
        };
        assert_eq!(commit.operation, Operation::Create);
        assert_eq!(commit.collection, "app.bsky.feed.like");
        assert_eq!(commit.record_key, "k1");
        assert_eq!(commit.content_id, "c1");
        assert_eq!(commit.revision, "r1");
        assert_eq!(commit.record.unwrap().get(), r#"{"subject":{"uri":"at://x"}}"#);
    }

    #[test]
    fn unrecognized_operation_is_unknown() {
        let json = br#"{"did":"abc","time_us":1,"kind":"commit","commit":{"operation":"rebase","collection":"x"}}"#;
        let EventBody::Commit(commit) = Event::decode(json).unwrap().body else {
            panic!("expected commit body");
        };
        assert_eq!(commit.operation, Operation::Unknown);
    }

    #[test]
    fn unknown_kind_and_missing_payload_decode_as_unknown() {
        let unknown = Event::decode(br#"{"did":"abc","time_us":1,"kind":"labels"}"#).unwrap();
        assert!(matches!(unknown.body, EventBody::Unknown { kind: Some(ref k) } if k == "labels"));

        let absent = Event::decode(br#"{"did":"abc","time_us":1}"#).unwrap();
        assert!(matches!(absent.body, EventBody::Unknown { kind: None }));

        // Kind names one payload, the message carries another.
        let mismatched = Event::decode(
            br#"{"did":"abc","time_us":1,"kind":"identity","account":{"active":true,"seq":1,"time":"t"}}"#,
        )
        .unwrap();
        assert!(matches!(mismatched.body, EventBody::Unknown { .. }));
        assert_eq!(mismatched.kind(), "identity");
    }

    #[test]
    fn malformed_message_is_a_decode_error() {
        let err = Event::decode(b"{not json").unwrap_err();
        assert!(matches!(err, JetstreamError::Decode(_)));
        assert!(err.is_per_message());
    }

    #[test]
    fn post_record_second_stage_decode() {
        let json = br#"{"did":"abc","time_us":2000,"kind":"commit","commit":{"operation":"create","collection":"app.bsky.feed.post","record":{"$type":"app.bsky.feed.post","text":"hello","createdAt":"2024-01-01T00:00:00Z"}}}"#;
        let EventBody::Commit(commit) = Event::decode(json).unwrap().body else {
            panic!("expected commit body");
        };

        let post = PostRecord::from_commit(&commit).unwrap();
        assert_eq!(post.text, "hello");
        assert_eq!(post.record_type.as_deref(), Some(FEED_POST));
        assert_eq!(post.created_at.unix_timestamp(), 1_704_067_200);
    }

    #[test]
    fn malformed_post_record_is_a_record_error() {
        let json = br#"{"did":"abc","time_us":1,"kind":"commit","commit":{"operation":"create","collection":"app.bsky.feed.post","record":{"text":5,"createdAt":"yesterday"}}}"#;
        let EventBody::Commit(commit) = Event::decode(json).unwrap().body else {
            panic!("expected commit body");
        };

        let err = PostRecord::from_commit(&commit).unwrap_err();
        assert!(matches!(err, JetstreamError::Record { ref collection, .. } if collection == FEED_POST));
    }
}
