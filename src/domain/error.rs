use thiserror::Error;

/// Failures converting between an entity and its stored row.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("column `{column}` holds an unexpected value: {message}")]
    Column {
        column: &'static str,
        message: String,
    },
    #[error("`{table}` row does not match its entity: {message}")]
    Row {
        table: &'static str,
        message: String,
    },
}

impl DomainError {
    pub fn column(column: &'static str, message: impl Into<String>) -> Self {
        Self::Column {
            column,
            message: message.into(),
        }
    }

    pub fn row(table: &'static str, message: impl Into<String>) -> Self {
        Self::Row {
            table,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_schema_part() {
        let err = DomainError::column("filesize", "expected an integer");
        assert_eq!(
            err.to_string(),
            "column `filesize` holds an unexpected value: expected an integer"
        );
        assert!(DomainError::row("tags", "missing field").to_string().starts_with("`tags` row"));
    }
}
