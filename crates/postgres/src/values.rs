use bytes::BytesMut;
use db_connection::Row;
use serde_json::Value as JsonValue;
use tokio_postgres::types::{
    to_sql_checked,
    IsNull,
    ToSql,
    Type,
};

/// A JSON parameter value, encoded against whatever column type the
/// statement binds it to.
#[derive(Debug)]
pub(crate) enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(JsonValue),
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(b) => SqlValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            },
            JsonValue::String(s) => SqlValue::Text(s),
            value @ (JsonValue::Array(_) | JsonValue::Object(_)) => SqlValue::Json(value),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => b.to_sql(ty, out),
            SqlValue::Int(i) => {
                if *ty == Type::INT2 {
                    (*i as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*i as i32).to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*i as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*i as f64).to_sql(ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            },
            SqlValue::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            },
            SqlValue::Text(s) => {
                if *ty == Type::JSON || *ty == Type::JSONB {
                    JsonValue::String(s.clone()).to_sql(ty, out)
                } else {
                    s.to_sql(ty, out)
                }
            },
            SqlValue::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Dispatch happens per value in to_sql; a genuinely incompatible
        // binding surfaces as an encode error there.
        true
    }

    to_sql_checked!();
}

/// Convert one result row to JSON, column by column.
pub(crate) fn row_to_json(row: &tokio_postgres::Row) -> anyhow::Result<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(i)?
                .map_or(JsonValue::Null, JsonValue::Bool)
        } else if *ty == Type::INT2 {
            number(row.try_get::<_, Option<i16>>(i)?.map(i64::from))
        } else if *ty == Type::INT4 {
            number(row.try_get::<_, Option<i32>>(i)?.map(i64::from))
        } else if *ty == Type::INT8 {
            number(row.try_get::<_, Option<i64>>(i)?)
        } else if *ty == Type::FLOAT4 {
            float(row.try_get::<_, Option<f32>>(i)?.map(f64::from))
        } else if *ty == Type::FLOAT8 {
            float(row.try_get::<_, Option<f64>>(i)?)
        } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
        {
            row.try_get::<_, Option<String>>(i)?
                .map_or(JsonValue::Null, JsonValue::String)
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            row.try_get::<_, Option<JsonValue>>(i)?
                .unwrap_or(JsonValue::Null)
        } else {
            anyhow::bail!("Unsupported column type {ty} for column {}", column.name());
        };
        out.insert(column.name().to_owned(), value);
    }
    Ok(out)
}

fn number(value: Option<i64>) -> JsonValue {
    value.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()))
}

fn float(value: Option<f64>) -> JsonValue {
    value
        .and_then(serde_json::Number::from_f64)
        .map_or(JsonValue::Null, JsonValue::Number)
}
