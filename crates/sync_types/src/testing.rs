//! Proptest strategies for wire types, available behind the `testing`
//! feature for downstream crates' property tests.

use proptest::prelude::*;
use serde_json::Value as JsonValue;

use crate::{
    ClientGroupId,
    ClientId,
    Mutation,
    MutationKind,
    PushBody,
    PUSH_VERSION,
};

pub fn arb_args() -> impl Strategy<Value = JsonValue> {
    let leaf = prop_oneof![
        Just(JsonValue::Null),
        any::<bool>().prop_map(JsonValue::Bool),
        any::<i64>().prop_map(|v| JsonValue::Number(v.into())),
        "[a-z]{0,8}".prop_map(JsonValue::String),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(JsonValue::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| JsonValue::Object(m.into_iter().collect())),
        ]
    })
}

pub fn arb_mutation(client_id: ClientId) -> impl Strategy<Value = Mutation> {
    (1u64..1000, "[a-z]{1,12}", arb_args()).prop_map(move |(id, name, args)| Mutation {
        kind: MutationKind::Custom,
        id,
        client_id: client_id.clone(),
        name,
        args,
        timestamp: 0.0,
    })
}

pub fn arb_push_body(
    client_group_id: ClientGroupId,
    client_id: ClientId,
) -> impl Strategy<Value = PushBody> {
    prop::collection::vec(arb_mutation(client_id), 1..4).prop_map(move |mutations| PushBody {
        client_group_id: client_group_id.clone(),
        mutations,
        push_version: PUSH_VERSION,
        schema_version: None,
        timestamp: 0.0,
        request_id: "test-request".to_owned(),
    })
}
