use csv::StringRecord;

use crate::models::Record;

/// Project a header-keyed record onto the requested columns.
///
/// Requested columns missing from the record are left out entirely rather
/// than filled with an empty value.
pub fn project(record: &Record, columns: &[String]) -> Record {
    columns
        .iter()
        .filter_map(|column| {
            record
                .get(column)
                .map(|value| (column.clone(), value.clone()))
        })
        .collect()
}

/// Column projection resolved once against a file header.
///
/// Produces the same output as [`project`] on the header-keyed record while
/// avoiding a full map per row.
#[derive(Debug, Clone)]
pub struct RowProjector {
    /// (column name, field index) for every requested column found in the header.
    fields: Vec<(String, usize)>,
}

impl RowProjector {
    /// Header names are trimmed; for duplicated headers the last occurrence wins.
    pub fn from_headers(headers: &StringRecord, columns: &[String]) -> Self {
        let headers: Vec<&str> = headers.iter().map(str::trim).collect();
        let fields = columns
            .iter()
            .filter_map(|column| {
                headers
                    .iter()
                    .rposition(|h| *h == column.as_str())
                    .map(|idx| (column.clone(), idx))
            })
            .collect();

        Self { fields }
    }

    /// Columns requested but absent from the header.
    pub fn missing<'a>(&self, columns: &'a [String]) -> Vec<&'a str> {
        columns
            .iter()
            .filter(|c| !self.fields.iter().any(|(name, _)| name == *c))
            .map(String::as_str)
            .collect()
    }

    /// Fields beyond the end of a short record are skipped like absent columns.
    pub fn project(&self, record: &StringRecord) -> Record {
        self.fields
            .iter()
            .filter_map(|(name, idx)| record.get(*idx).map(|value| (name.clone(), value.to_string())))
            .collect()
    }
}
