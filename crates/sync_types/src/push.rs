use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value as JsonValue;

use crate::types::{
    ClientGroupId,
    ClientId,
    MutationId,
};

/// The protocol version this server speaks. Pushes with any other
/// `pushVersion` are rejected as fatal.
pub const PUSH_VERSION: u32 = 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// Named mutator registered by the application.
    Custom,
    /// Built-in row operations encoded in `args`.
    Crud,
}

/// A single client mutation. Immutable once created; the `id` orders it
/// within its client's stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    #[serde(rename = "type")]
    pub kind: MutationKind,
    pub id: u64,
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
    pub name: String,
    pub args: JsonValue,
    /// Client-side wall clock in milliseconds since the epoch.
    pub timestamp: f64,
}

impl Mutation {
    pub fn mutation_id(&self) -> MutationId {
        MutationId::new(self.client_id.clone(), self.id)
    }
}

/// The body of a push request. All mutations in one body belong to the same
/// client group; they span multiple `clientID`s only when the coalescer has
/// merged compatible entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBody {
    #[serde(rename = "clientGroupID")]
    pub client_group_id: ClientGroupId,
    pub mutations: Vec<Mutation>,
    pub push_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    pub timestamp: f64,
    #[serde(rename = "requestID")]
    pub request_id: String,
}

impl PushBody {
    pub fn mutation_ids(&self) -> Vec<MutationId> {
        self.mutations.iter().map(Mutation::mutation_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{
        Mutation,
        MutationKind,
        PushBody,
    };

    #[test]
    fn test_push_body_json_shape() {
        let body = PushBody {
            client_group_id: "cg1".into(),
            mutations: vec![Mutation {
                kind: MutationKind::Custom,
                id: 3,
                client_id: "c1".into(),
                name: "issue.create".to_owned(),
                args: json!({"title": "hello"}),
                timestamp: 42.0,
            }],
            push_version: 1,
            schema_version: None,
            timestamp: 43.0,
            request_id: "req-1".to_owned(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "clientGroupID": "cg1",
                "mutations": [{
                    "type": "custom",
                    "id": 3,
                    "clientID": "c1",
                    "name": "issue.create",
                    "args": {"title": "hello"},
                    "timestamp": 42.0,
                }],
                "pushVersion": 1,
                "timestamp": 43.0,
                "requestID": "req-1",
            }),
        );
    }

    #[test]
    fn test_push_body_parses_schema_version() {
        let body: PushBody = serde_json::from_value(json!({
            "clientGroupID": "cg1",
            "mutations": [],
            "pushVersion": 1,
            "schemaVersion": 5,
            "timestamp": 0.0,
            "requestID": "r",
        }))
        .unwrap();
        assert_eq!(body.schema_version, Some(5));
    }
}
