use serde::{
    Deserialize,
    Serialize,
};

use crate::types::MutationId;

/// Reply from the upstream push endpoint for one push request.
///
/// Deserialization is untagged: a body carrying an `error` field is a
/// whole-batch error, anything else must carry `mutations`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PushResponse {
    Error(PushError),
    Ok(PushOk),
}

impl PushResponse {
    pub fn ok(mutations: Vec<MutationResponse>) -> Self {
        Self::Ok(PushOk { mutations })
    }
}

/// Per-mutation outcomes, in the order the upstream applied them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushOk {
    pub mutations: Vec<MutationResponse>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationResponse {
    pub id: MutationId,
    pub result: MutationResult,
}

/// Outcome of a single mutation: the empty object on success, an error
/// envelope otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MutationResult {
    Error(MutationError),
    Ok(MutationOk),
}

impl MutationResult {
    pub fn ok() -> Self {
        Self::Ok(MutationOk {})
    }

    pub fn error(kind: MutationErrorKind, details: impl Into<String>) -> Self {
        Self::Error(MutationError {
            error: kind,
            details: Some(details.into()),
        })
    }

    pub fn is_out_of_order(&self) -> bool {
        matches!(
            self,
            Self::Error(MutationError {
                error: MutationErrorKind::OooMutation,
                ..
            })
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutationOk {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationError {
    pub error: MutationErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationErrorKind {
    /// The application mutator failed. The mutation is consumed; the client
    /// must not retry it.
    #[serde(rename = "app")]
    App,
    /// The mutation arrived ahead of the client's next expected ID.
    #[serde(rename = "oooMutation")]
    OooMutation,
}

/// Whole-batch error from the dispatcher or the upstream endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushError {
    pub error: PushErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(rename = "mutationIDs", default, skip_serializing_if = "Option::is_none")]
    pub mutation_ids: Option<Vec<MutationId>>,
}

impl PushError {
    /// Transport-level failure reaching the upstream. The batch remains
    /// unconfirmed and the client retries.
    pub fn transport(details: impl Into<String>, mutation_ids: Vec<MutationId>) -> Self {
        Self {
            error: PushErrorKind::ZeroPusher,
            status: None,
            details: Some(details.into()),
            mutation_ids: Some(mutation_ids),
        }
    }

    /// Non-2xx reply from the upstream. The batch remains unconfirmed and
    /// the client retries.
    pub fn http(status: u16, details: impl Into<String>, mutation_ids: Vec<MutationId>) -> Self {
        Self {
            error: PushErrorKind::Http,
            status: Some(status),
            details: Some(details.into()),
            mutation_ids: Some(mutation_ids),
        }
    }

    pub fn unsupported_push_version(mutation_ids: Vec<MutationId>) -> Self {
        Self {
            error: PushErrorKind::UnsupportedPushVersion,
            status: None,
            details: None,
            mutation_ids: Some(mutation_ids),
        }
    }

    pub fn unsupported_schema_version(mutation_ids: Vec<MutationId>) -> Self {
        Self {
            error: PushErrorKind::UnsupportedSchemaVersion,
            status: None,
            details: None,
            mutation_ids: Some(mutation_ids),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.error.is_fatal()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PushErrorKind {
    /// Fatal: the client speaks a protocol version we don't.
    UnsupportedPushVersion,
    /// Fatal: the client's schema version is not accepted upstream.
    UnsupportedSchemaVersion,
    /// Retriable: upstream replied non-2xx.
    Http,
    /// Retriable: the pusher could not reach the upstream at all.
    ZeroPusher,
}

impl PushErrorKind {
    /// Fatal kinds terminate the per-client downstream stream; retriable
    /// kinds are reported and the client resubmits.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedPushVersion | Self::UnsupportedSchemaVersion
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{
        MutationErrorKind,
        MutationResponse,
        MutationResult,
        PushError,
        PushErrorKind,
        PushResponse,
    };
    use crate::types::MutationId;

    #[test]
    fn test_ok_response_json_shape() {
        let response = PushResponse::ok(vec![
            MutationResponse {
                id: MutationId::new("c1".into(), 1),
                result: MutationResult::ok(),
            },
            MutationResponse {
                id: MutationId::new("c1".into(), 2),
                result: MutationResult::error(MutationErrorKind::App, "boom"),
            },
        ]);
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(
            encoded,
            json!({
                "mutations": [
                    {"id": {"clientID": "c1", "id": 1}, "result": {}},
                    {
                        "id": {"clientID": "c1", "id": 2},
                        "result": {"error": "app", "details": "boom"},
                    },
                ],
            }),
        );
        assert_eq!(serde_json::from_value::<PushResponse>(encoded).unwrap(), response);
    }

    #[test]
    fn test_error_response_parses_before_ok() {
        let parsed: PushResponse = serde_json::from_value(json!({
            "error": "http",
            "status": 503,
            "details": "upstream down",
            "mutationIDs": [{"clientID": "c1", "id": 4}],
        }))
        .unwrap();
        let PushResponse::Error(err) = parsed else {
            panic!("expected an error response");
        };
        assert_eq!(err.error, PushErrorKind::Http);
        assert_eq!(err.status, Some(503));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PushError::unsupported_push_version(vec![]).is_fatal());
        assert!(PushError::unsupported_schema_version(vec![]).is_fatal());
        assert!(!PushError::http(500, "", vec![]).is_fatal());
        assert!(!PushError::transport("refused", vec![]).is_fatal());
    }

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(PushErrorKind::ZeroPusher).unwrap(),
            json!("zeroPusher"),
        );
        assert_eq!(
            serde_json::to_value(PushErrorKind::UnsupportedPushVersion).unwrap(),
            json!("unsupportedPushVersion"),
        );
        assert_eq!(
            serde_json::to_value(MutationErrorKind::OooMutation).unwrap(),
            json!("oooMutation"),
        );
    }

    #[test]
    fn test_ooo_detection() {
        assert!(MutationResult::error(MutationErrorKind::OooMutation, "gap").is_out_of_order());
        assert!(!MutationResult::ok().is_out_of_order());
        assert!(!MutationResult::error(MutationErrorKind::App, "x").is_out_of_order());
    }
}
