use std::fmt;

use postgres_protocol::escape::escape_identifier;

/// Escape an identifier (table or column name) for inclusion in generated
/// SQL.
pub fn escape_ident(name: &str) -> String {
    escape_identifier(name)
}

/// The escaped form of a schema name, validated once at the boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaName {
    escaped: String,
}

impl SchemaName {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        anyhow::ensure!(!name.is_empty(), "Schema name must be nonempty");
        anyhow::ensure!(
            !name.starts_with("pg_"),
            "Schema name must not use the reserved pg_ prefix"
        );
        anyhow::ensure!(!name.contains('\0'), "Schema name must not contain NUL");
        Ok(Self {
            escaped: escape_identifier(name),
        })
    }

    pub fn escaped(&self) -> &str {
        &self.escaped
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.escaped)
    }
}

#[cfg(test)]
mod tests {
    use super::SchemaName;

    #[test]
    fn test_schema_name_validation() {
        assert_eq!(SchemaName::new("app").unwrap().escaped(), "\"app\"");
        assert_eq!(
            SchemaName::new("we\"ird").unwrap().escaped(),
            "\"we\"\"ird\""
        );
        assert!(SchemaName::new("").is_err());
        assert!(SchemaName::new("pg_catalog").is_err());
        assert!(SchemaName::new("a\0b").is_err());
    }
}
