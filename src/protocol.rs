/// The wire protocol: request and response document shapes, and parsing of
/// the case-insensitive `action` field into a typed [`Request`].
///
/// Modeled as a sum type with a per-variant payload (spec §9, "Polymorphic
/// action dispatch") rather than dispatching on a raw string throughout the
/// coordinator. `action` is serialized/deserialized as an internally tagged
/// enum discriminant, which also fixes the wire spelling of each action
/// (`put`, `get`, `delete`, `replica_put`, `replica_delete`, `list_keys`,
/// `get_status`, `get_all_data`) to the reference's snake_case names.
use crate::error::{CoreError, CoreResult};
use crate::types::{Key, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Actions that carry no key: list_keys, get_status, get_all_data.
const KEYLESS_ACTIONS: &[&str] = &["list_keys", "get_status", "get_all_data"];

/// A decoded inbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    Put {
        key: Key,
        value: JsonValue,
        #[serde(default)]
        forwarded: bool,
    },
    Get {
        key: Key,
        #[serde(default)]
        internal: bool,
    },
    Delete {
        key: Key,
        #[serde(default)]
        forwarded: bool,
    },
    ReplicaPut {
        key: Key,
        value: JsonValue,
        version: u64,
    },
    ReplicaDelete {
        key: Key,
        version: u64,
    },
    ListKeys,
    GetStatus,
    GetAllData,
}

impl Request {
    /// The key this request concerns, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Request::Put { key, .. }
            | Request::Get { key, .. }
            | Request::Delete { key, .. }
            | Request::ReplicaPut { key, .. }
            | Request::ReplicaDelete { key, .. } => Some(key),
            Request::ListKeys | Request::GetStatus | Request::GetAllData => None,
        }
    }

    /// Return a copy of this request with `forwarded` set, for `put` and
    /// `delete`. A no-op for every other variant.
    pub fn mark_forwarded(&self) -> Request {
        match self {
            Request::Put { key, value, .. } => Request::Put {
                key: key.clone(),
                value: value.clone(),
                forwarded: true,
            },
            Request::Delete { key, .. } => Request::Delete {
                key: key.clone(),
                forwarded: true,
            },
            other => other.clone(),
        }
    }

    /// Return a copy of this `get` request with `internal` set. A no-op for
    /// every other variant (forwarding internal-ness only matters for GET).
    pub fn mark_internal(&self) -> Request {
        match self {
            Request::Get { key, .. } => Request::Get {
                key: key.clone(),
                internal: true,
            },
            other => other.clone(),
        }
    }
}

/// Parse one line of the wire protocol into a [`Request`].
///
/// Implements the common prologue from spec §4.6: `action` is
/// case-insensitive; missing `action`, or a missing `key` on an action that
/// requires one, is a [`CoreError::BadRequest`]; an `action` outside the
/// recognized set is a [`CoreError::UnknownAction`].
pub fn parse_request(line: &str) -> CoreResult<Request> {
    let value: JsonValue = serde_json::from_str(line)?;
    let obj = value
        .as_object()
        .ok_or_else(|| CoreError::BadRequest("request must be a JSON object".to_string()))?;

    let action_raw = obj
        .get("action")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| CoreError::BadRequest("missing action".to_string()))?;
    let action = action_raw.to_lowercase();

    let needs_key = !KEYLESS_ACTIONS.contains(&action.as_str());
    let has_key = matches!(obj.get("key"), Some(JsonValue::String(_)));
    if needs_key && !has_key {
        return Err(CoreError::BadRequest("missing action or key".to_string()));
    }

    let known = matches!(
        action.as_str(),
        "put" | "get" | "delete" | "replica_put" | "replica_delete" | "list_keys" | "get_status" | "get_all_data"
    );
    if !known {
        return Err(CoreError::UnknownAction(action_raw.to_string()));
    }

    let mut retagged = value;
    retagged
        .as_object_mut()
        .expect("already checked this is an object")
        .insert("action".to_string(), JsonValue::String(action));

    serde_json::from_value(retagged).map_err(|e| CoreError::BadRequest(e.to_string()))
}

/// A response document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Record>,
        #[serde(skip_serializing_if = "Option::is_none")]
        keys: Option<Vec<Key>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<JsonValue>,
    },
    NotFound {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        message: String,
    },
}

impl Response {
    pub fn ok_message(message: impl Into<String>) -> Self {
        Response::Ok {
            message: Some(message.into()),
            value: None,
            keys: None,
            data: None,
        }
    }

    pub fn ok_value(record: Record) -> Self {
        Response::Ok {
            message: None,
            value: Some(record),
            keys: None,
            data: None,
        }
    }

    pub fn ok_keys(keys: Vec<Key>) -> Self {
        Response::Ok {
            message: None,
            value: None,
            keys: Some(keys),
            data: None,
        }
    }

    pub fn ok_data(data: JsonValue) -> Self {
        Response::Ok {
            message: None,
            value: None,
            keys: None,
            data: Some(data),
        }
    }

    pub fn ok_status(statuses: HashMap<String, &'static str>) -> Self {
        Response::ok_data(serde_json::to_value(statuses).expect("status map is always serializable"))
    }

    pub fn not_found() -> Self {
        Response::NotFound { message: None }
    }

    pub fn not_found_msg(message: impl Into<String>) -> Self {
        Response::NotFound {
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    /// True iff this is an `Ok` response, used by `get` fan-out and
    /// anti-entropy to pick the first successful reply.
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}

impl From<CoreError> for Response {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => Response::not_found_msg(msg),
            other => Response::error(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_is_case_insensitive() {
        let req = parse_request(r#"{"action":"PuT","key":"k","value":1}"#).unwrap();
        assert!(matches!(req, Request::Put { .. }));
    }

    #[test]
    fn missing_action_is_bad_request() {
        let err = parse_request(r#"{"key":"k"}"#).unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
    }

    #[test]
    fn missing_key_is_bad_request_for_put() {
        let err = parse_request(r#"{"action":"put","value":1}"#).unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
    }

    #[test]
    fn keyless_actions_do_not_require_key() {
        let req = parse_request(r#"{"action":"list_keys"}"#).unwrap();
        assert!(matches!(req, Request::ListKeys));
        let req = parse_request(r#"{"action":"get_status"}"#).unwrap();
        assert!(matches!(req, Request::GetStatus));
        let req = parse_request(r#"{"action":"get_all_data"}"#).unwrap();
        assert!(matches!(req, Request::GetAllData));
    }

    #[test]
    fn unrecognized_action_with_key_is_unknown_action() {
        let err = parse_request(r#"{"action":"nuke","key":"k"}"#).unwrap_err();
        assert!(matches!(err, CoreError::UnknownAction(_)));
    }

    #[test]
    fn unrecognized_action_without_key_is_bad_request() {
        // Matches the reference's evaluation order: the missing-key check
        // runs before the unknown-action check.
        let err = parse_request(r#"{"action":"nuke"}"#).unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
    }

    #[test]
    fn get_internal_defaults_to_false() {
        let req = parse_request(r#"{"action":"get","key":"k"}"#).unwrap();
        match req {
            Request::Get { internal, .. } => assert!(!internal),
            _ => panic!("expected Get"),
        }
    }

    #[test]
    fn mark_forwarded_sets_flag_on_put_and_delete_only() {
        let put = parse_request(r#"{"action":"put","key":"k","value":1}"#).unwrap();
        match put.mark_forwarded() {
            Request::Put { forwarded, .. } => assert!(forwarded),
            _ => panic!("expected Put"),
        }

        let get = parse_request(r#"{"action":"get","key":"k"}"#).unwrap();
        match get.mark_forwarded() {
            Request::Get { internal, .. } => assert!(!internal),
            _ => panic!("expected Get"),
        }
    }

    #[test]
    fn response_round_trips_through_json() {
        let resp = Response::ok_value(Record::live(json!("v"), 1));
        let line = serde_json::to_string(&resp).unwrap();
        assert!(line.contains(r#""status":"OK""#));
        let decoded: Response = serde_json::from_str(&line).unwrap();
        assert!(decoded.is_ok());
    }

    #[test]
    fn not_found_serializes_with_expected_status() {
        let line = serde_json::to_string(&Response::not_found()).unwrap();
        assert!(line.contains(r#""status":"NOT_FOUND""#));
    }
}
