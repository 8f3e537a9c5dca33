use sqlparser::dialect::ClickHouseDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use crate::api::middleware::AppError;

/// Table aliases the planner assigns in join mode.
pub const JOIN_ALIASES: [&str; 2] = ["t1", "t2"];

/// Guards for the caller-supplied fragments that end up inside planned SQL.
///
/// Planned queries are assembled from identifiers and a join predicate that
/// come straight from request bodies, so every fragment is checked before it
/// is interpolated.
pub struct SqlValidator;

impl SqlValidator {
    /// Accept a plain unquoted identifier: `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn validate_identifier(kind: &str, name: &str) -> Result<(), AppError> {
        let mut chars = name.chars();
        let valid = match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(AppError::Plan(format!("Invalid {} name: '{}'", kind, name)))
        }
    }

    /// Accept a column, optionally qualified with one of the join aliases.
    pub fn validate_column(name: &str) -> Result<(), AppError> {
        match name.split_once('.') {
            Some((alias, column)) if JOIN_ALIASES.contains(&alias) => {
                Self::validate_identifier("column", column)
            }
            Some(_) => Err(AppError::Plan(format!(
                "Invalid column name: '{}'. Only t1/t2 qualifiers are allowed",
                name
            ))),
            None => Self::validate_identifier("column", name),
        }
    }

    /// Parse the join predicate as exactly one expression.
    ///
    /// Trailing tokens such as `; DROP TABLE x` are rejected.
    pub fn validate_join_condition(condition: &str) -> Result<(), AppError> {
        let dialect = ClickHouseDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(condition)
            .map_err(|e| AppError::Plan(format!("Join condition parsing error: {}", e)))?;

        parser
            .parse_expr()
            .map_err(|e| AppError::Plan(format!("Join condition parsing error: {}", e)))?;

        let trailing = parser.peek_token();
        if trailing.token != Token::EOF {
            return Err(AppError::Plan(format!(
                "Join condition must be a single expression, found trailing '{}'",
                trailing.token
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(SqlValidator::validate_identifier("table", "orders").is_ok());
        assert!(SqlValidator::validate_identifier("table", "_tmp_2024").is_ok());
        assert!(SqlValidator::validate_identifier("table", "").is_err());
        assert!(SqlValidator::validate_identifier("table", "2fast").is_err());
        assert!(SqlValidator::validate_identifier("table", "orders; DROP TABLE x").is_err());
        assert!(SqlValidator::validate_identifier("table", "a.b").is_err());
    }

    #[test]
    fn test_columns_allow_join_aliases_only() {
        assert!(SqlValidator::validate_column("id").is_ok());
        assert!(SqlValidator::validate_column("t2.email").is_ok());
        assert!(SqlValidator::validate_column("users.email").is_err());
        assert!(SqlValidator::validate_column("t1.").is_err());
    }

    #[test]
    fn test_join_condition() {
        assert!(SqlValidator::validate_join_condition("t1.user_id = t2.id").is_ok());
        assert!(SqlValidator::validate_join_condition("t1.a = t2.a AND t1.b = t2.b").is_ok());
        assert!(SqlValidator::validate_join_condition("t1.id = t2.id; DROP TABLE users").is_err());
        assert!(SqlValidator::validate_join_condition("= =").is_err());
    }
}
