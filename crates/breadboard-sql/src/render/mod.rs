//! Render schema operations to DDL.

use breadboard_schema::{Column, ColumnChange, Dialect, Plan, SchemaOperation, Table};

use crate::{default_sql, quote_ident_for};

/// An operation the target dialect cannot express.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("{dialect} cannot {action}")]
    Unsupported {
        dialect: Dialect,
        action: &'static str,
    },
}

/// Render the SQL type of a column, e.g. `VARCHAR(255)`.
///
/// Types without a catalog entry are rendered as their uppercased name.
pub fn render_type(dialect: Dialect, type_name: &str, length: Option<u32>) -> String {
    match dialect.catalog().get(type_name) {
        Some(entry) => entry.render(length),
        None => type_name.to_uppercase(),
    }
}

/// Render a column definition as used in `CREATE TABLE` and `ADD COLUMN`.
///
/// `inline_pk` puts `PRIMARY KEY` on the column itself; composite keys are
/// rendered as a table constraint by the caller instead.
pub fn column_definition(dialect: Dialect, column: &Column, inline_pk: bool) -> String {
    let q = |name: &str| quote_ident_for(dialect, name);
    let ty = render_type(dialect, &column.type_name, column.length);
    let pk = column.primary_key && inline_pk;

    let mut def = format!("{} ", q(&column.name));
    match (dialect, column.auto_increment) {
        // SQLite only auto-increments an INTEGER PRIMARY KEY.
        (Dialect::Sqlite, true) => {
            def.push_str("INTEGER PRIMARY KEY AUTOINCREMENT");
            return def;
        }
        (Dialect::Postgres, true) => {
            def.push_str(&ty);
            def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }
        (Dialect::MySql, true) => {
            def.push_str(&ty);
            def.push_str(" AUTO_INCREMENT");
        }
        (_, false) => def.push_str(&ty),
    }

    if pk {
        def.push_str(" PRIMARY KEY");
    }

    // Inline primary keys are implicitly NOT NULL.
    if !column.nullable && !pk {
        def.push_str(" NOT NULL");
    }

    if !column.auto_increment
        && let Some(default) = &column.default
    {
        def.push_str(&format!(" DEFAULT {}", default_sql(default)));
    }

    def
}

/// Render a `CREATE TABLE` statement.
pub fn create_table_sql(dialect: Dialect, table: &Table) -> String {
    let q = |name: &str| quote_ident_for(dialect, name);
    let pk_columns = table.primary_key();
    let use_table_pk_constraint = pk_columns.len() > 1;

    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|col| format!("    {}", column_definition(dialect, col, !use_table_pk_constraint)))
        .collect();

    if use_table_pk_constraint {
        let quoted: Vec<_> = pk_columns.iter().map(|c| q(c)).collect();
        parts.push(format!("    PRIMARY KEY ({})", quoted.join(", ")));
    }

    format!("CREATE TABLE {} (\n{}\n);", q(&table.name), parts.join(",\n"))
}

/// Render one operation to the statements that carry it out.
///
/// Most operations are a single statement; the list form leaves room for
/// dialects that need several.
pub fn render_operation(dialect: Dialect, op: &SchemaOperation) -> Result<Vec<String>, RenderError> {
    let q = |name: &str| quote_ident_for(dialect, name);
    let sql = match op {
        SchemaOperation::CreateTable(table) => create_table_sql(dialect, table),
        SchemaOperation::DropTable { table } => format!("DROP TABLE {};", q(table)),
        SchemaOperation::RenameTable { from, to } => match dialect {
            Dialect::MySql => format!("RENAME TABLE {} TO {};", q(from), q(to)),
            Dialect::Postgres | Dialect::Sqlite => {
                format!("ALTER TABLE {} RENAME TO {};", q(from), q(to))
            }
        },
        SchemaOperation::AddColumn { table, column } => {
            if dialect == Dialect::Sqlite && column.primary_key {
                return Err(RenderError::Unsupported {
                    dialect,
                    action: "add a primary key column to an existing table",
                });
            }
            format!(
                "ALTER TABLE {} ADD COLUMN {};",
                q(table),
                column_definition(dialect, column, true)
            )
        }
        SchemaOperation::DropColumn { table, column } => {
            format!("ALTER TABLE {} DROP COLUMN {};", q(table), q(column))
        }
        SchemaOperation::RenameColumn { table, from, to } => format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            q(table),
            q(from),
            q(to)
        ),
        SchemaOperation::AlterColumn {
            table,
            column,
            changes,
        } => match dialect {
            Dialect::Postgres => postgres_alter_column(table, column, changes),
            Dialect::MySql => format!(
                "ALTER TABLE {} MODIFY COLUMN {};",
                q(table),
                column_definition(dialect, column, false)
            ),
            Dialect::Sqlite => {
                return Err(RenderError::Unsupported {
                    dialect,
                    action: "alter a column in place",
                });
            }
        },
    };
    Ok(vec![sql])
}

/// All changes to one column go into a single `ALTER TABLE` so they apply together.
fn postgres_alter_column(table: &str, column: &Column, changes: &[ColumnChange]) -> String {
    let q = |name: &str| quote_ident_for(Dialect::Postgres, name);
    let col = q(&column.name);
    let actions: Vec<String> = changes
        .iter()
        .map(|change| match change {
            ColumnChange::Type { to, length, .. } => {
                let ty = render_type(Dialect::Postgres, to, *length);
                format!("ALTER COLUMN {col} TYPE {ty} USING {col}::{ty}")
            }
            ColumnChange::Nullable { to: true, .. } => format!("ALTER COLUMN {col} DROP NOT NULL"),
            ColumnChange::Nullable { to: false, .. } => format!("ALTER COLUMN {col} SET NOT NULL"),
            ColumnChange::Default { to: Some(d), .. } => {
                format!("ALTER COLUMN {col} SET DEFAULT {}", default_sql(d))
            }
            ColumnChange::Default { to: None, .. } => format!("ALTER COLUMN {col} DROP DEFAULT"),
        })
        .collect();
    format!("ALTER TABLE {} {};", q(table), actions.join(", "))
}

/// Render a whole plan as a script, one statement per line.
pub fn render_plan(dialect: Dialect, plan: &Plan) -> Result<String, RenderError> {
    let mut sql = format!("-- Table: {}\n", plan.table);
    for op in &plan.operations {
        for stmt in render_operation(dialect, op)? {
            sql.push_str(&stmt);
            sql.push('\n');
        }
    }
    Ok(sql)
}

#[cfg(test)]
mod tests;
