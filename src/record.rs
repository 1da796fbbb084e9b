//! Raw input rows as parsed by an external reader.

use std::{collections::HashMap, sync::Arc};

/// Column layout shared by every row of one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    headers: Vec<String>,
    positions: HashMap<String, usize>,
}

impl RecordLayout {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let mut positions = HashMap::with_capacity(headers.len());
        for (idx, header) in headers.iter().enumerate() {
            // first occurrence wins for duplicated headers
            positions.entry(header.clone()).or_insert(idx);
        }
        Self { headers, positions }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }
}

/// One input row: an ordered mapping from column name to optional raw text.
#[derive(Debug, Clone)]
pub struct RawRecord {
    layout: Arc<RecordLayout>,
    values: Vec<Option<String>>,
}

impl RawRecord {
    /// Values beyond the layout are dropped; missing trailing values read as absent.
    pub fn new(layout: Arc<RecordLayout>, mut values: Vec<Option<String>>) -> Self {
        values.truncate(layout.headers.len());
        Self { layout, values }
    }

    /// Builds a record with its own layout, mostly useful for ad hoc rows.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let (headers, values): (Vec<String>, Vec<Option<String>>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.map(Into::into)))
            .unzip();
        Self::new(Arc::new(RecordLayout::new(headers)), values)
    }

    pub fn layout(&self) -> &Arc<RecordLayout> {
        &self.layout
    }

    /// `None` when the column is structurally absent, `Some(None)` when it is
    /// present but holds no value.
    pub fn field(&self, column: &str) -> Option<Option<&str>> {
        self.layout
            .position(column)
            .map(|idx| self.values.get(idx).and_then(|v| v.as_deref()))
    }

    /// Raw value with structural absence folded into "no value".
    pub fn value(&self, column: &str) -> Option<&str> {
        self.field(column).flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinguishes_missing_column_from_missing_value() {
        let record = RawRecord::from_pairs([("sexo", Some("Masculino")), ("idade", None::<&str>)]);
        assert_eq!(record.field("sexo"), Some(Some("Masculino")));
        assert_eq!(record.field("idade"), Some(None));
        assert_eq!(record.field("raca_cor"), None);
        assert_eq!(record.value("raca_cor"), None);
    }

    #[test]
    fn short_rows_read_trailing_columns_as_absent() {
        let layout = Arc::new(RecordLayout::new(["a", "b", "c"]));
        let record = RawRecord::new(layout, vec![Some("1".to_string())]);
        assert_eq!(record.field("c"), Some(None));
    }
}
