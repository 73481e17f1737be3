//! The wide result table shared by annotation and scoring.
//!
//! On disk it is a CSV file with one row per marker set. Identity columns
//! (`dataset`, `tissue`, `marker`) and any other input columns are kept as
//! text; each method owns a group of columns named `<prefix> <suffix>`.
//!
//! In memory every row carries one [`MethodRecord`] per method prefix, and an
//! index maps each identity to the slots holding it, so an upsert touches
//! exactly the rows whose identity matches as text.

use crate::registry::known_prefixes;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DATASET_COLUMN: &str = "dataset";
pub const TISSUE_COLUMN: &str = "tissue";
pub const MARKER_COLUMN: &str = "marker";
pub const MANUAL_ANNOTATION_COLUMN: &str = "manual annotation";
pub const MANUAL_CLNAME_COLUMN: &str = "manual CLname";
pub const MANUAL_BROADTYPE_COLUMN: &str = "manual broadtype";

/// Tissue value meaning "no tissue".
pub const NO_TISSUE: &str = "NA";

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{} has no {column:?} column", .path.display())]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("{} line {line}: column {column:?} holds {value:?}, not a number", .path.display())]
    InvalidNumber {
        path: PathBuf,
        line: usize,
        column: String,
        value: String,
    },
}

// ============================================================================
// Row identity and references
// ============================================================================

/// Composite identity of a row, compared as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub dataset: String,
    pub tissue: String,
    pub marker: String,
}

impl RowKey {
    pub fn new(dataset: &str, tissue: &str, marker: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            tissue: tissue.to_string(),
            marker: marker.to_string(),
        }
    }

    /// The tissue, or `None` for `NA` and blank cells.
    pub fn tissue(&self) -> Option<&str> {
        let tissue = self.tissue.trim();
        (!tissue.is_empty() && tissue != NO_TISSUE).then_some(tissue)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dataset={}, tissue={}, marker={}",
            self.dataset, self.tissue, self.marker
        )
    }
}

/// Curated labels for one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceAnnotation {
    /// Fine-label synonyms, non-empty only.
    pub fine: Vec<String>,
    pub broad: Option<String>,
}

/// One unit of annotation work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRow {
    pub key: RowKey,
    pub references: ReferenceAnnotation,
}

/// Dataset / tissue equality filter; `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub dataset: Option<String>,
    pub tissue: Option<String>,
}

impl RowFilter {
    pub fn new(dataset: Option<&str>, tissue: Option<&str>) -> Self {
        Self {
            dataset: dataset.map(str::to_string),
            tissue: tissue.map(str::to_string),
        }
    }

    pub fn matches(&self, key: &RowKey) -> bool {
        self.dataset.as_deref().map_or(true, |d| key.dataset == d)
            && self.tissue.as_deref().map_or(true, |t| key.tissue == t)
    }
}

// ============================================================================
// Per-method columns
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodField {
    Annotation,
    Broadtype,
    Bleu1,
    Bleu2,
    BleuAvg,
    BroadtypeBleuAvg,
    BleuAvgFinal,
}

impl MethodField {
    pub const ANNOTATION_GROUP: [MethodField; 2] = [MethodField::Annotation, MethodField::Broadtype];
    pub const SCORE_GROUP: [MethodField; 5] = [
        MethodField::Bleu1,
        MethodField::Bleu2,
        MethodField::BleuAvg,
        MethodField::BroadtypeBleuAvg,
        MethodField::BleuAvgFinal,
    ];
    pub const ALL: [MethodField; 7] = [
        MethodField::Annotation,
        MethodField::Broadtype,
        MethodField::Bleu1,
        MethodField::Bleu2,
        MethodField::BleuAvg,
        MethodField::BroadtypeBleuAvg,
        MethodField::BleuAvgFinal,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            MethodField::Annotation => "annotation",
            MethodField::Broadtype => "broadtype",
            MethodField::Bleu1 => "BLEU-1",
            MethodField::Bleu2 => "BLEU-2",
            MethodField::BleuAvg => "BLEU-avg",
            MethodField::BroadtypeBleuAvg => "broadtype BLEU-avg",
            MethodField::BleuAvgFinal => "BLEU-avg-final",
        }
    }

    pub fn column_name(self, prefix: &str) -> String {
        format!("{prefix} {}", self.suffix())
    }

    fn is_score(self) -> bool {
        !matches!(self, MethodField::Annotation | MethodField::Broadtype)
    }
}

/// One method's cells for one row. `None` is an empty cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodRecord {
    pub annotation: Option<String>,
    pub broadtype: Option<String>,
    pub bleu_1: Option<f64>,
    pub bleu_2: Option<f64>,
    pub bleu_avg: Option<f64>,
    pub broadtype_bleu_avg: Option<f64>,
    pub bleu_avg_final: Option<f64>,
}

impl MethodRecord {
    fn score_slot(&mut self, field: MethodField) -> Option<&mut Option<f64>> {
        match field {
            MethodField::Bleu1 => Some(&mut self.bleu_1),
            MethodField::Bleu2 => Some(&mut self.bleu_2),
            MethodField::BleuAvg => Some(&mut self.bleu_avg),
            MethodField::BroadtypeBleuAvg => Some(&mut self.broadtype_bleu_avg),
            MethodField::BleuAvgFinal => Some(&mut self.bleu_avg_final),
            MethodField::Annotation | MethodField::Broadtype => None,
        }
    }

    pub fn score(&self, field: MethodField) -> Option<f64> {
        match field {
            MethodField::Bleu1 => self.bleu_1,
            MethodField::Bleu2 => self.bleu_2,
            MethodField::BleuAvg => self.bleu_avg,
            MethodField::BroadtypeBleuAvg => self.broadtype_bleu_avg,
            MethodField::BleuAvgFinal => self.bleu_avg_final,
            MethodField::Annotation | MethodField::Broadtype => None,
        }
    }

    fn cell(&self, field: MethodField) -> String {
        match field {
            MethodField::Annotation => self.annotation.clone().unwrap_or_default(),
            MethodField::Broadtype => self.broadtype.clone().unwrap_or_default(),
            score => self.score(score).map(|v| format!("{v:?}")).unwrap_or_default(),
        }
    }

    /// Fill one cell from its CSV text; returns the text back if it should
    /// have been a number and is not.
    fn set_cell(&mut self, field: MethodField, raw: &str) -> Result<(), String> {
        let value = raw.trim();
        match field {
            MethodField::Annotation => self.annotation = non_empty(raw),
            MethodField::Broadtype => self.broadtype = non_empty(raw),
            score => {
                let parsed = if value.is_empty() {
                    None
                } else {
                    let v: f64 = value.parse().map_err(|_| raw.to_string())?;
                    (!v.is_nan()).then_some(v)
                };
                if let Some(slot) = self.score_slot(score) {
                    *slot = parsed;
                }
            }
        }
        Ok(())
    }
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.trim().is_empty()).then(|| raw.to_string())
}

// ============================================================================
// Rows and columns
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Dataset,
    Tissue,
    Marker,
    Field(String),
    Method { prefix: String, field: MethodField },
}

impl Column {
    fn classify(header: &str, prefixes: &[&str]) -> Column {
        match header {
            DATASET_COLUMN => return Column::Dataset,
            TISSUE_COLUMN => return Column::Tissue,
            MARKER_COLUMN => return Column::Marker,
            _ => {}
        }
        for prefix in prefixes {
            for field in MethodField::ALL {
                if header == field.column_name(prefix) {
                    return Column::Method {
                        prefix: prefix.to_string(),
                        field,
                    };
                }
            }
        }
        Column::Field(header.to_string())
    }

    fn name(&self) -> Cow<'_, str> {
        match self {
            Column::Dataset => Cow::Borrowed(DATASET_COLUMN),
            Column::Tissue => Cow::Borrowed(TISSUE_COLUMN),
            Column::Marker => Cow::Borrowed(MARKER_COLUMN),
            Column::Field(name) => Cow::Borrowed(name.as_str()),
            Column::Method { prefix, field } => Cow::Owned(field.column_name(prefix)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub key: RowKey,
    fields: HashMap<String, String>,
    methods: HashMap<String, MethodRecord>,
}

impl TableRow {
    pub fn new(key: RowKey) -> Self {
        Self {
            key,
            fields: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    /// A non-identity input column, if present and non-blank.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn method(&self, prefix: &str) -> Option<&MethodRecord> {
        self.methods.get(prefix)
    }

    pub fn references(&self) -> ReferenceAnnotation {
        ReferenceAnnotation {
            fine: [MANUAL_ANNOTATION_COLUMN, MANUAL_CLNAME_COLUMN]
                .into_iter()
                .filter_map(|c| self.field(c))
                .map(str::to_string)
                .collect(),
            broad: self.field(MANUAL_BROADTYPE_COLUMN).map(str::to_string),
        }
    }

    pub fn marker_row(&self) -> MarkerRow {
        MarkerRow {
            key: self.key.clone(),
            references: self.references(),
        }
    }

    fn cell(&self, column: &Column) -> String {
        match column {
            Column::Dataset => self.key.dataset.clone(),
            Column::Tissue => self.key.tissue.clone(),
            Column::Marker => self.key.marker.clone(),
            Column::Field(name) => self.fields.get(name).cloned().unwrap_or_default(),
            Column::Method { prefix, field } => self
                .methods
                .get(prefix)
                .map(|record| record.cell(*field))
                .unwrap_or_default(),
        }
    }
}

// ============================================================================
// Table
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    columns: Vec<Column>,
    rows: Vec<TableRow>,
    index: HashMap<RowKey, Vec<usize>>,
}

impl Default for ResultTable {
    fn default() -> Self {
        Self {
            columns: vec![Column::Dataset, Column::Tissue, Column::Marker],
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a table from CSV. Method columns of registered prefixes are
    /// recognised, and a partially present column group is completed.
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let csv_error = |source: csv::Error| TableError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
        let prefixes = known_prefixes();
        let columns: Vec<Column> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| Column::classify(h, &prefixes))
            .collect();

        for (required, name) in [
            (Column::Dataset, DATASET_COLUMN),
            (Column::Tissue, TISSUE_COLUMN),
            (Column::Marker, MARKER_COLUMN),
        ] {
            if !columns.contains(&required) {
                return Err(TableError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name,
                });
            }
        }

        let mut table = ResultTable {
            columns,
            rows: Vec::new(),
            index: HashMap::new(),
        };

        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(csv_error)?;
            let mut row = TableRow::new(RowKey::default());
            for (column, value) in table.columns.iter().zip(record.iter()) {
                match column {
                    Column::Dataset => row.key.dataset = value.to_string(),
                    Column::Tissue => row.key.tissue = value.to_string(),
                    Column::Marker => row.key.marker = value.to_string(),
                    Column::Field(name) => {
                        row.fields.insert(name.clone(), value.to_string());
                    }
                    Column::Method { prefix, field } => row
                        .methods
                        .entry(prefix.clone())
                        .or_default()
                        .set_cell(*field, value)
                        .map_err(|value| TableError::InvalidNumber {
                            path: path.to_path_buf(),
                            line: i + 2,
                            column: field.column_name(prefix),
                            value,
                        })?,
                }
            }
            row.methods.retain(|_, record| *record != MethodRecord::default());
            table.push_row(row);
        }

        table.complete_column_groups();
        tracing::debug!(path = %path.display(), rows = table.rows.len(), "loaded result table");
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| TableError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let csv_error = |source: csv::Error| TableError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
        writer
            .write_record(self.columns.iter().map(|c| c.name().into_owned()))
            .map_err(csv_error)?;
        for row in &self.rows {
            writer
                .write_record(self.columns.iter().map(|c| row.cell(c)))
                .map_err(csv_error)?;
        }
        writer.flush().map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), rows = self.rows.len(), "saved result table");
        Ok(())
    }

    /// Append a row, adding any plain columns it introduces.
    pub fn push_row(&mut self, row: TableRow) {
        let mut new_fields: Vec<&String> = row
            .fields
            .keys()
            .filter(|name| !self.columns.iter().any(|c| matches!(c, Column::Field(f) if f == *name)))
            .collect();
        new_fields.sort();
        for name in new_fields {
            self.columns.push(Column::Field(name.clone()));
        }
        self.index.entry(row.key.clone()).or_default().push(self.rows.len());
        self.rows.push(row);
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().into_owned()).collect()
    }

    pub fn has_column(&self, prefix: &str, field: MethodField) -> bool {
        self.columns.iter().any(|c| {
            matches!(c, Column::Method { prefix: p, field: f } if p == prefix && *f == field)
        })
    }

    fn ensure_group(&mut self, prefix: &str, group: &[MethodField]) {
        for &field in group {
            if !self.has_column(prefix, field) {
                self.columns.push(Column::Method {
                    prefix: prefix.to_string(),
                    field,
                });
            }
        }
    }

    /// Add `<prefix> annotation` and `<prefix> broadtype` if missing.
    pub fn ensure_annotation_columns(&mut self, prefix: &str) {
        self.ensure_group(prefix, &MethodField::ANNOTATION_GROUP);
    }

    /// Add the five score columns of `prefix` if missing.
    pub fn ensure_score_columns(&mut self, prefix: &str) {
        self.ensure_group(prefix, &MethodField::SCORE_GROUP);
    }

    fn complete_column_groups(&mut self) {
        let mut annotated = Vec::new();
        let mut scored = Vec::new();
        for column in &self.columns {
            if let Column::Method { prefix, field } = column {
                let bucket = if field.is_score() { &mut scored } else { &mut annotated };
                if !bucket.contains(prefix) {
                    bucket.push(prefix.clone());
                }
            }
        }
        for prefix in annotated {
            self.ensure_annotation_columns(&prefix);
        }
        for prefix in scored {
            self.ensure_score_columns(&prefix);
        }
    }

    /// Apply `update` to the `prefix` record of every row with identity
    /// `key`, after making sure the `group` columns exist. Returns the number
    /// of rows written; an unknown identity writes nothing.
    pub fn upsert_with<F>(
        &mut self,
        key: &RowKey,
        prefix: &str,
        group: &[MethodField],
        mut update: F,
    ) -> usize
    where
        F: FnMut(&mut MethodRecord),
    {
        self.ensure_group(prefix, group);
        let Some(slots) = self.index.get(key) else {
            return 0;
        };
        for &slot in slots {
            update(self.rows[slot].methods.entry(prefix.to_string()).or_default());
        }
        slots.len()
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows with identity `key`, in table order.
    pub fn find(&self, key: &RowKey) -> Vec<&TableRow> {
        self.index
            .get(key)
            .map(|slots| slots.iter().map(|&i| &self.rows[i]).collect())
            .unwrap_or_default()
    }

    pub fn rows_matching(&self, filter: &RowFilter) -> Vec<&TableRow> {
        self.rows.iter().filter(|r| filter.matches(&r.key)).collect()
    }

    pub fn marker_rows(&self, filter: &RowFilter) -> Vec<MarkerRow> {
        self.rows_matching(filter)
            .into_iter()
            .map(TableRow::marker_row)
            .collect()
    }
}
