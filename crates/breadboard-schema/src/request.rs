//! Desired-state requests, as submitted by the table editor.

use facet::Facet;

/// What a column request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnAction {
    /// Keep the column, altering it if its attributes changed.
    Keep,
    /// Add a new column.
    Add,
    /// Rename an existing column to the request's name.
    Rename { from: String },
    /// Change the column's type (same as keep, stated explicitly).
    Retype,
    /// Drop the column.
    Drop,
}

/// The desired definition of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRequest {
    /// Column name after the request is applied
    pub name: String,
    /// Requested type, resolved through the type catalog
    pub type_name: String,
    /// Requested length, for types that take one
    pub length: Option<u32>,
    pub nullable: bool,
    /// Default as typed by the user; classified against the column type when planning
    pub default: Option<String>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub action: ColumnAction,
}

impl ColumnRequest {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, action: ColumnAction) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            length: None,
            nullable: false,
            default: None,
            primary_key: false,
            auto_increment: false,
            action,
        }
    }

    pub fn keep(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, type_name, ColumnAction::Keep)
    }

    pub fn add(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, type_name, ColumnAction::Add)
    }

    pub fn rename(
        from: impl Into<String>,
        to: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self::new(to, type_name, ColumnAction::Rename { from: from.into() })
    }

    /// Drop requests carry no type.
    pub fn drop(name: impl Into<String>) -> Self {
        Self::new(name, "", ColumnAction::Drop)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Name of the existing column this request refers to.
    pub fn source_name(&self) -> &str {
        match &self.action {
            ColumnAction::Rename { from } => from,
            _ => &self.name,
        }
    }
}

/// Side actions to run once a table has been created or updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScaffoldRequest {
    pub create_model: bool,
    pub create_migration: bool,
}

impl ScaffoldRequest {
    pub fn is_empty(&self) -> bool {
        !self.create_model && !self.create_migration
    }
}

/// The desired state of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRequest {
    /// Table name after the request is applied
    pub name: String,
    /// Current name, when the request renames the table
    pub original_name: Option<String>,
    /// Column requests; columns not mentioned are left alone
    pub columns: Vec<ColumnRequest>,
    pub scaffold: ScaffoldRequest,
}

impl TableRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            original_name: None,
            columns: Vec::new(),
            scaffold: ScaffoldRequest::default(),
        }
    }

    pub fn renamed_from(mut self, original: impl Into<String>) -> Self {
        self.original_name = Some(original.into());
        self
    }

    pub fn column(mut self, column: ColumnRequest) -> Self {
        self.columns.push(column);
        self
    }

    /// Name the table currently has in the database.
    pub fn current_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.name)
    }
}

/// Errors turning a submitted payload into a [`TableRequest`].
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid table payload: {0}")]
    Json(String),
    #[error("table name must not be empty")]
    EmptyTableName,
    #[error("column #{0} has an empty name")]
    EmptyColumnName(usize),
    #[error("column '{0}' is renamed but has no `from`")]
    MissingRenameSource(String),
    #[error("column '{0}' has no type")]
    MissingType(String),
}

/// The table editor's JSON payload.
#[derive(Debug, Clone, Facet)]
#[facet(rename_all = "camelCase")]
pub struct TablePayload {
    pub table_name: String,
    #[facet(default)]
    pub original_name: Option<String>,
    #[facet(default)]
    pub create_model: bool,
    #[facet(default)]
    pub create_migration: bool,
    pub columns: Vec<ColumnPayload>,
}

#[derive(Debug, Clone, Facet)]
#[facet(rename_all = "camelCase")]
pub struct ColumnPayload {
    pub name: String,
    #[facet(rename = "type", default)]
    pub type_name: String,
    #[facet(default)]
    pub length: Option<u32>,
    #[facet(default)]
    pub nullable: bool,
    #[facet(default)]
    pub default: Option<String>,
    #[facet(default)]
    pub primary_key: bool,
    #[facet(default)]
    pub auto_increment: bool,
    #[facet(default)]
    pub action: Option<ActionKind>,
    #[facet(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[facet(rename_all = "lowercase")]
#[repr(u8)]
pub enum ActionKind {
    Keep,
    Add,
    Rename,
    Retype,
    Drop,
}

impl TablePayload {
    pub fn from_json(json: &str) -> Result<Self, PayloadError> {
        facet_json::from_str(json).map_err(|e| PayloadError::Json(e.to_string()))
    }

    /// Validate the payload and convert it.
    pub fn into_request(self) -> Result<TableRequest, PayloadError> {
        let name = self.table_name.trim().to_string();
        if name.is_empty() {
            return Err(PayloadError::EmptyTableName);
        }
        let original_name = self
            .original_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let mut columns = Vec::with_capacity(self.columns.len());
        for (idx, col) in self.columns.into_iter().enumerate() {
            let col_name = col.name.trim().to_string();
            if col_name.is_empty() {
                return Err(PayloadError::EmptyColumnName(idx));
            }
            let action = match col.action.unwrap_or(ActionKind::Keep) {
                ActionKind::Keep => ColumnAction::Keep,
                ActionKind::Add => ColumnAction::Add,
                ActionKind::Retype => ColumnAction::Retype,
                ActionKind::Drop => ColumnAction::Drop,
                ActionKind::Rename => match col.from.filter(|f| !f.trim().is_empty()) {
                    Some(from) => ColumnAction::Rename {
                        from: from.trim().to_string(),
                    },
                    None => return Err(PayloadError::MissingRenameSource(col_name)),
                },
            };
            if action != ColumnAction::Drop && col.type_name.trim().is_empty() {
                return Err(PayloadError::MissingType(col_name));
            }
            columns.push(ColumnRequest {
                name: col_name,
                type_name: col.type_name.trim().to_string(),
                length: col.length,
                nullable: col.nullable,
                default: col.default,
                primary_key: col.primary_key,
                auto_increment: col.auto_increment,
                action,
            });
        }

        Ok(TableRequest {
            name,
            original_name,
            columns,
            scaffold: ScaffoldRequest {
                create_model: self.create_model,
                create_migration: self.create_migration,
            },
        })
    }
}
