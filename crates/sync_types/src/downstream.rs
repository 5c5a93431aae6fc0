use serde::{
    de::Error as _,
    ser::SerializeTuple,
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use serde_json::Value as JsonValue;

use crate::response::PushResponse;

/// A server-to-client message on a client's output stream. Encoded on the
/// wire as a two-element array, `["pushResponse", body]`.
#[derive(Clone, Debug, PartialEq)]
pub enum Downstream {
    PushResponse(PushResponse),
}

impl Serialize for Downstream {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Downstream::PushResponse(response) => {
                let mut tuple = serializer.serialize_tuple(2)?;
                tuple.serialize_element("pushResponse")?;
                tuple.serialize_element(response)?;
                tuple.end()
            },
        }
    }
}

impl<'de> Deserialize<'de> for Downstream {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, body): (String, JsonValue) = Deserialize::deserialize(deserializer)?;
        match tag.as_str() {
            "pushResponse" => {
                let response = serde_json::from_value(body).map_err(D::Error::custom)?;
                Ok(Downstream::PushResponse(response))
            },
            tag => Err(D::Error::custom(format!("Unknown downstream tag: {tag}"))),
        }
    }
}
