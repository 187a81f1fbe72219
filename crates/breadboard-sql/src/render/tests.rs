use crate::*;
use breadboard_schema::{Column, ColumnChange, ColumnDefault, Dialect, Plan, SchemaOperation, Table};

fn posts() -> Table {
    Table::new("posts")
        .with_column(Column::new("id", "integer").primary_key().auto_increment())
        .with_column(Column::new("title", "varchar").length(120))
        .with_column(
            Column::new("status", "varchar").default_value(ColumnDefault::Text("draft".into())),
        )
        .with_column(Column::new("body", "text").nullable())
}

fn one(dialect: Dialect, op: &SchemaOperation) -> String {
    let stmts = render_operation(dialect, op).unwrap();
    assert_eq!(stmts.len(), 1);
    stmts.into_iter().next().unwrap()
}

#[test]
fn test_create_table_postgres() {
    let sql = one(Dialect::Postgres, &SchemaOperation::CreateTable(posts()));
    insta::assert_snapshot!(sql, @r#"
    CREATE TABLE "posts" (
        "id" INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
        "title" VARCHAR(120) NOT NULL,
        "status" VARCHAR(255) NOT NULL DEFAULT 'draft',
        "body" TEXT
    );
    "#);
}

#[test]
fn test_create_table_mysql() {
    let sql = one(Dialect::MySql, &SchemaOperation::CreateTable(posts()));
    insta::assert_snapshot!(sql, @r"
    CREATE TABLE `posts` (
        `id` INT AUTO_INCREMENT PRIMARY KEY,
        `title` VARCHAR(120) NOT NULL,
        `status` VARCHAR(255) NOT NULL DEFAULT 'draft',
        `body` TEXT
    );
    ");
}

#[test]
fn test_create_table_sqlite() {
    let sql = one(Dialect::Sqlite, &SchemaOperation::CreateTable(posts()));
    insta::assert_snapshot!(sql, @r#"
    CREATE TABLE "posts" (
        "id" INTEGER PRIMARY KEY AUTOINCREMENT,
        "title" VARCHAR(120) NOT NULL,
        "status" VARCHAR(255) NOT NULL DEFAULT 'draft',
        "body" TEXT
    );
    "#);
}

#[test]
fn test_create_table_composite_pk() {
    let table = Table::new("post_tags")
        .with_column(Column::new("post_id", "bigint").primary_key())
        .with_column(Column::new("tag_id", "bigint").primary_key());
    let sql = one(Dialect::Postgres, &SchemaOperation::CreateTable(table));
    insta::assert_snapshot!(sql, @r#"
    CREATE TABLE "post_tags" (
        "post_id" BIGINT NOT NULL,
        "tag_id" BIGINT NOT NULL,
        PRIMARY KEY ("post_id", "tag_id")
    );
    "#);
}

#[test]
fn test_rename_table() {
    let op = SchemaOperation::RenameTable {
        from: "posts".into(),
        to: "articles".into(),
    };
    assert_eq!(
        one(Dialect::Postgres, &op),
        r#"ALTER TABLE "posts" RENAME TO "articles";"#
    );
    assert_eq!(one(Dialect::MySql, &op), "RENAME TABLE `posts` TO `articles`;");
}

#[test]
fn test_column_operations() {
    let add = SchemaOperation::AddColumn {
        table: "posts".into(),
        column: Column::new("views", "integer").default_value(ColumnDefault::Raw("0".into())),
    };
    assert_eq!(
        one(Dialect::Postgres, &add),
        r#"ALTER TABLE "posts" ADD COLUMN "views" INTEGER NOT NULL DEFAULT 0;"#
    );

    let drop = SchemaOperation::DropColumn {
        table: "posts".into(),
        column: "legacy".into(),
    };
    assert_eq!(
        one(Dialect::Sqlite, &drop),
        r#"ALTER TABLE "posts" DROP COLUMN "legacy";"#
    );

    let rename = SchemaOperation::RenameColumn {
        table: "posts".into(),
        from: "title".into(),
        to: "headline".into(),
    };
    assert_eq!(
        one(Dialect::MySql, &rename),
        "ALTER TABLE `posts` RENAME COLUMN `title` TO `headline`;"
    );
}

#[test]
fn test_alter_column_postgres_combines_changes() {
    let op = SchemaOperation::AlterColumn {
        table: "posts".into(),
        column: Column::new("title", "text").nullable(),
        changes: vec![
            ColumnChange::Type {
                from: "varchar".into(),
                to: "text".into(),
                length: None,
            },
            ColumnChange::Nullable {
                from: false,
                to: true,
            },
            ColumnChange::Default {
                from: Some(ColumnDefault::Text("untitled".into())),
                to: None,
            },
        ],
    };
    insta::assert_snapshot!(
        one(Dialect::Postgres, &op),
        @r#"ALTER TABLE "posts" ALTER COLUMN "title" TYPE TEXT USING "title"::TEXT, ALTER COLUMN "title" DROP NOT NULL, ALTER COLUMN "title" DROP DEFAULT;"#
    );
}

#[test]
fn test_text_default_is_escaped() {
    let op = SchemaOperation::AlterColumn {
        table: "posts".into(),
        column: Column::new("title", "text"),
        changes: vec![ColumnChange::Default {
            from: None,
            to: Some(ColumnDefault::Text("it's new".into())),
        }],
    };
    insta::assert_snapshot!(
        one(Dialect::Postgres, &op),
        @r#"ALTER TABLE "posts" ALTER COLUMN "title" SET DEFAULT 'it''s new';"#
    );

    let add = SchemaOperation::AddColumn {
        table: "posts".into(),
        column: Column::new("note", "text").default_value(ColumnDefault::Text("o'k".into())),
    };
    assert_eq!(
        one(Dialect::MySql, &add),
        "ALTER TABLE `posts` ADD COLUMN `note` TEXT NOT NULL DEFAULT 'o''k';"
    );
}

#[test]
fn test_alter_column_mysql_restates_definition() {
    let op = SchemaOperation::AlterColumn {
        table: "posts".into(),
        column: Column::new("title", "varchar").length(200),
        changes: vec![ColumnChange::Type {
            from: "varchar".into(),
            to: "varchar".into(),
            length: Some(200),
        }],
    };
    assert_eq!(
        one(Dialect::MySql, &op),
        "ALTER TABLE `posts` MODIFY COLUMN `title` VARCHAR(200) NOT NULL;"
    );
}

#[test]
fn test_alter_column_sqlite_is_unsupported() {
    let op = SchemaOperation::AlterColumn {
        table: "posts".into(),
        column: Column::new("title", "text"),
        changes: vec![ColumnChange::Nullable {
            from: true,
            to: false,
        }],
    };
    let err = render_operation(Dialect::Sqlite, &op).unwrap_err();
    assert_eq!(err.to_string(), "sqlite cannot alter a column in place");
}

#[test]
fn test_unmapped_type_renders_uppercase() {
    assert_eq!(render_type(Dialect::Postgres, "tsrange", None), "TSRANGE");
}

#[test]
fn test_render_plan() {
    let plan = Plan {
        table: "posts".into(),
        operations: vec![
            SchemaOperation::RenameColumn {
                table: "posts".into(),
                from: "title".into(),
                to: "headline".into(),
            },
            SchemaOperation::AddColumn {
                table: "posts".into(),
                column: Column::new("body", "text"),
            },
        ],
    };
    insta::assert_snapshot!(render_plan(Dialect::Postgres, &plan).unwrap(), @r#"
    -- Table: posts
    ALTER TABLE "posts" RENAME COLUMN "title" TO "headline";
    ALTER TABLE "posts" ADD COLUMN "body" TEXT NOT NULL;
    "#);
}
