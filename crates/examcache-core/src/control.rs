//! Messages posted by the hosting page.
//!
//! Messages are JSON objects discriminated by `type`. Anything that does not
//! decode into a known message is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ControlMessage {
    /// Activate the waiting version now
    SkipWaiting,
    /// Reply with the active cache generation
    GetVersion,
    /// Keep a record available offline under `/exam-data/<id>`
    CacheExamData {
        #[serde(rename = "examData")]
        exam_data: Value,
    },
}

impl ControlMessage {
    pub fn parse(raw: &Value) -> Option<Self> {
        match serde_json::from_value(raw.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized message");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct VersionReply {
    pub version: String,
}

/// Path an exam record is cached under, if the record has a usable id.
/// Ids may be strings or numbers.
pub fn exam_data_path(record: &Value) -> Option<String> {
    let id = match record.get("id")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(format!("/exam-data/{}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_messages() {
        assert_eq!(
            ControlMessage::parse(&json!({"type": "SKIP_WAITING"})),
            Some(ControlMessage::SkipWaiting)
        );
        assert_eq!(
            ControlMessage::parse(&json!({"type": "GET_VERSION"})),
            Some(ControlMessage::GetVersion)
        );
        assert_eq!(
            ControlMessage::parse(&json!({"type": "CACHE_EXAM_DATA", "examData": {"id": 12, "title": "Math"}})),
            Some(ControlMessage::CacheExamData {
                exam_data: json!({"id": 12, "title": "Math"})
            })
        );
    }

    #[test]
    fn test_parse_ignores_unknown_and_malformed() {
        assert_eq!(ControlMessage::parse(&json!({"type": "REFRESH_EVERYTHING"})), None);
        assert_eq!(ControlMessage::parse(&json!({"kind": "GET_VERSION"})), None);
        assert_eq!(ControlMessage::parse(&json!("SKIP_WAITING")), None);
        assert_eq!(ControlMessage::parse(&json!({"type": "CACHE_EXAM_DATA"})), None);
    }

    #[test]
    fn test_version_reply_shape() {
        let reply = VersionReply {
            version: "exam-app-v1.0.0".to_string(),
        };
        assert_eq!(serde_json::to_value(&reply).unwrap(), json!({"version": "exam-app-v1.0.0"}));
    }

    #[test]
    fn test_exam_data_path() {
        assert_eq!(exam_data_path(&json!({"id": "abc"})).as_deref(), Some("/exam-data/abc"));
        assert_eq!(exam_data_path(&json!({"id": 42})).as_deref(), Some("/exam-data/42"));
        assert_eq!(exam_data_path(&json!({"id": ""})), None);
        assert_eq!(exam_data_path(&json!({"id": null})), None);
        assert_eq!(exam_data_path(&json!({"title": "no id"})), None);
        assert_eq!(exam_data_path(&json!([1, 2])), None);
    }
}
