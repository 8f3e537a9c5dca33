use crate::api::middleware::AppError;
use crate::models::{JoinSpec, QueryMode, TransferSpec};
use crate::validation::SqlValidator;

pub const DEFAULT_PREVIEW_LIMIT: u64 = 5;

/// Builds the SQL text for preview, export and count.
///
/// All three modes share one FROM/JOIN builder so a count taken against a
/// static table matches the number of rows the export returns.
#[derive(Debug, Clone, Copy)]
pub struct QueryPlanner {
    preview_limit: u64,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self {
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

impl QueryPlanner {
    pub fn new(preview_limit: u64) -> Self {
        Self { preview_limit }
    }

    pub fn preview_limit(&self) -> u64 {
        self.preview_limit
    }

    pub fn plan(&self, spec: &TransferSpec, mode: QueryMode) -> Result<String, AppError> {
        let database = spec.database();
        SqlValidator::validate_identifier("database", database)?;

        let join = spec.join();
        let from_clause = Self::from_clause(spec, database, join.as_ref())?;

        let sql = match mode {
            QueryMode::Count => format!("SELECT count() AS count FROM {}", from_clause),
            QueryMode::Export | QueryMode::Preview => {
                let projection = Self::projection(&spec.columns, join.is_some())?;
                let sql = format!("SELECT {} FROM {}", projection, from_clause);
                if mode == QueryMode::Preview {
                    format!("{} LIMIT {}", sql, self.preview_limit)
                } else {
                    sql
                }
            }
        };

        tracing::debug!("Planned {:?} query: {}", mode, sql);
        Ok(sql)
    }

    fn from_clause(
        spec: &TransferSpec,
        database: &str,
        join: Option<&JoinSpec<'_>>,
    ) -> Result<String, AppError> {
        match join {
            Some(join) => {
                SqlValidator::validate_identifier("table", join.left)?;
                SqlValidator::validate_identifier("table", join.right)?;
                SqlValidator::validate_join_condition(join.condition)?;
                Ok(format!(
                    "{db}.{left} AS t1 JOIN {db}.{right} AS t2 ON {condition}",
                    db = database,
                    left = join.left,
                    right = join.right,
                    condition = join.condition,
                ))
            }
            None => {
                let table = spec.table().ok_or_else(|| {
                    AppError::Plan(
                        "A table name or exactly two join tables with a join condition is required"
                            .to_string(),
                    )
                })?;
                SqlValidator::validate_identifier("table", table)?;
                Ok(format!("{}.{}", database, table))
            }
        }
    }

    /// Column list in caller order, qualified with `t1.` in join mode unless
    /// the caller already chose an alias.
    fn projection(columns: &[String], join_mode: bool) -> Result<String, AppError> {
        if columns.is_empty() {
            return Err(AppError::Plan("At least one column must be selected".to_string()));
        }

        let mut parts = Vec::with_capacity(columns.len());
        for column in columns {
            let column = column.trim();
            SqlValidator::validate_column(column)?;
            if join_mode && !column.contains('.') {
                parts.push(format!("t1.{}", column));
            } else if !join_mode && column.contains('.') {
                return Err(AppError::Plan(format!(
                    "Column '{}' uses a join alias but no join was requested",
                    column
                )));
            } else {
                parts.push(column.to_string());
            }
        }

        Ok(parts.join(", "))
    }
}

/// Plan with the default preview limit.
pub fn plan_query(spec: &TransferSpec, mode: QueryMode) -> Result<String, AppError> {
    QueryPlanner::default().plan(spec, mode)
}
