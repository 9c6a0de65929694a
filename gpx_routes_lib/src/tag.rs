use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(tag_id: i64, name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            tag_id,
            name,
            created_at,
        }
    }
}

/// Split comma-separated tag input into trimmed, non-empty names.
/// Uniqueness is case-insensitive and enforced by the database.
pub fn split_tag_input(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_trims_tag_input() {
        assert_eq!(
            split_tag_input(" hiking, mountains ,,california,"),
            vec!["hiking", "mountains", "california"]
        );
        assert!(split_tag_input("  ,  ").is_empty());
        assert!(split_tag_input("").is_empty());
    }
}
