use serde::{
    Deserialize,
    Serialize,
};

/// Data type of a warehouse column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    /// Calendar date, also the partitioning field
    Date,
    /// Plain text
    String,
    /// 64-bit integer
    Integer,
    /// Double precision float
    Float,
}

/// Definition of a single table column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub required: bool,
}

impl ColumnDefinition {
    pub fn required(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            required: true,
        }
    }
}

/// Date-partitioned warehouse table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    /// Table documentation
    pub description: String,
    pub columns: Vec<ColumnDefinition>,
    /// Column holding the partition date
    pub partition_field: String,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            columns: Vec::new(),
            partition_field: "date".to_string(),
        }
    }

    pub fn add_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Type of the metric value column (the third column)
    pub fn value_type(&self) -> Option<ColumnType> {
        self.columns.get(2).map(|c| c.column_type)
    }

    /// Whether a trailing dimension label column is present
    pub fn has_dimension_column(&self) -> bool {
        self.columns.len() > 3
    }
}

/// Bulk load disposition for a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Append,
    Truncate,
}

impl WriteMode {
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite {
            WriteMode::Truncate
        } else {
            WriteMode::Append
        }
    }
}
