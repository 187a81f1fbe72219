use super::*;
use proptest::prelude::*;

const DIALECTS: [Dialect; 3] = [Dialect::Postgres, Dialect::MySql, Dialect::Sqlite];

#[test]
fn test_lookup_is_case_insensitive() {
    let catalog = Dialect::Postgres.catalog();
    let lower = catalog.lookup("varchar");
    assert_eq!(lower, catalog.lookup("VARCHAR"));
    assert_eq!(lower, catalog.lookup("  VarChar "));
    assert_eq!(lower.entry().name, "varchar");
}

#[test]
fn test_lookup_matches_aliases() {
    let catalog = Dialect::Postgres.catalog();
    assert_eq!(catalog.lookup("int4").entry().name, "integer");
    assert_eq!(catalog.lookup("Character Varying").entry().name, "varchar");
    assert_eq!(catalog.lookup("decimal").entry().name, "numeric");
}

#[test]
fn test_unknown_type_falls_back_to_first_number() {
    for dialect in DIALECTS {
        let catalog = dialect.catalog();
        let lookup = catalog.lookup("foobar");
        assert!(lookup.is_unknown());
        assert_eq!(lookup.entry().category, DEFAULT_CATEGORY);
        assert_eq!(lookup.entry(), &catalog.entries()[0]);
        assert_eq!(
            lookup,
            TypeLookup::Unknown {
                requested: "foobar".to_string(),
                fallback: catalog.default_entry(),
            }
        );
    }
}

#[test]
fn test_default_entries() {
    assert_eq!(Dialect::Postgres.catalog().default_entry().name, "smallint");
    assert_eq!(Dialect::MySql.catalog().default_entry().name, "tinyint");
    assert_eq!(Dialect::Sqlite.catalog().default_entry().name, "integer");
}

#[test]
fn test_resolve_native_spellings() {
    let pg = Dialect::Postgres.catalog();
    let resolve = |native: &str| pg.resolve_native(native).map(|e| e.name);
    assert_eq!(resolve("character varying"), Some("varchar"));
    assert_eq!(resolve("character varying(40)"), Some("varchar"));
    assert_eq!(resolve("timestamp without time zone"), Some("timestamp"));
    assert_eq!(resolve("timestamp with time zone"), Some("timestamptz"));
    assert_eq!(resolve("int8"), Some("bigint"));
    assert_eq!(resolve("tstzrange"), None);

    let mysql = Dialect::MySql.catalog();
    assert_eq!(
        mysql.resolve_native("int(11) unsigned").map(|e| e.name),
        Some("integer")
    );
}

#[test]
fn test_list_by_category_keeps_order_and_unsupported() {
    let grouped = Dialect::Postgres.catalog().list_by_category();
    let categories: Vec<_> = grouped.keys().copied().collect();
    assert_eq!(categories[0], "Numbers");
    assert!(categories.contains(&"Geometry"));

    let numbers: Vec<_> = grouped["Numbers"].iter().map(|e| e.name).collect();
    assert_eq!(
        numbers,
        [
            "smallint",
            "integer",
            "bigint",
            "numeric",
            "real",
            "double precision",
            "money"
        ]
    );
    assert!(!grouped["Numbers"].last().unwrap().supported);
}

#[test]
fn test_listing_flags_unsupported() {
    let listing = Dialect::Postgres.catalog().listing();
    let objects = &listing.0["Objects"];
    let xml = objects.iter().find(|o| o.name == "xml").unwrap();
    assert!(xml.not_supported);
    let jsonb = objects.iter().find(|o| o.name == "jsonb").unwrap();
    assert!(!jsonb.not_supported);
}

#[test]
fn test_listing_json_shape() {
    let json = Dialect::Sqlite.catalog().listing().to_json().unwrap();
    assert!(json.starts_with(r#"{"Numbers":[{"name":"integer","notSupported":false}"#));
    assert!(json.contains(r#""Binary":[{"name":"blob","notSupported":false}]"#));
}

#[test]
fn test_type_render() {
    let pg = Dialect::Postgres.catalog();
    assert_eq!(pg.get("varchar").unwrap().render(None), "VARCHAR(255)");
    assert_eq!(pg.get("varchar").unwrap().render(Some(40)), "VARCHAR(40)");
    assert_eq!(pg.get("text").unwrap().render(Some(40)), "TEXT");
    assert_eq!(pg.get("double").unwrap().render(None), "DOUBLE PRECISION");
}

#[test]
fn test_default_classification() {
    let pg = Dialect::Postgres.catalog();
    let int = pg.get("integer");
    let varchar = pg.get("varchar");
    let boolean = pg.get("boolean");

    assert_eq!(
        ColumnDefault::from_input("42", int),
        Some(ColumnDefault::Raw("42".into()))
    );
    assert_eq!(
        ColumnDefault::from_input("-1.5", int),
        Some(ColumnDefault::Raw("-1.5".into()))
    );
    assert_eq!(
        ColumnDefault::from_input("42", varchar),
        Some(ColumnDefault::Text("42".into()))
    );
    assert_eq!(
        ColumnDefault::from_input("TRUE", boolean),
        Some(ColumnDefault::Raw("true".into()))
    );
    assert_eq!(
        ColumnDefault::from_input("now()", pg.get("timestamptz")),
        Some(ColumnDefault::Raw("now()".into()))
    );
    assert_eq!(
        ColumnDefault::from_input("current_timestamp", pg.get("timestamp")),
        Some(ColumnDefault::Raw("CURRENT_TIMESTAMP".into()))
    );
    assert_eq!(
        ColumnDefault::from_input("draft", varchar),
        Some(ColumnDefault::Text("draft".into()))
    );
    assert_eq!(
        ColumnDefault::from_input("hello (world)", varchar),
        Some(ColumnDefault::Text("hello (world)".into()))
    );
    assert_eq!(ColumnDefault::from_input("", varchar), None);
    assert_eq!(ColumnDefault::from_input("NULL", int), None);
}

#[test]
fn test_introspected_empty_string_default() {
    let varchar = Dialect::Postgres.catalog().get("varchar");
    assert_eq!(
        ColumnDefault::from_introspected("", true, varchar),
        Some(ColumnDefault::Text(String::new()))
    );
}

#[test]
fn test_default_display_escapes_quotes() {
    assert_eq!(ColumnDefault::Text("it's".into()).to_string(), "'it''s'");
    assert_eq!(ColumnDefault::Raw("0".into()).to_string(), "0");
}

#[test]
fn test_dialect_from_str() {
    assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
    assert_eq!("mariadb".parse::<Dialect>().unwrap(), Dialect::MySql);
    assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
    assert!("oracle".parse::<Dialect>().is_err());
}

#[test]
fn test_payload_parsing() {
    let json = r#"{
        "tableName": "posts",
        "createModel": true,
        "columns": [
            {"name": "id", "type": "integer", "primaryKey": true, "autoIncrement": true},
            {"name": "headline", "type": "varchar", "length": 120, "action": "rename", "from": "title"},
            {"name": "body", "type": "text", "nullable": true, "action": "add"},
            {"name": "legacy", "action": "drop"}
        ]
    }"#;
    let request = TablePayload::from_json(json).unwrap().into_request().unwrap();
    assert_eq!(request.name, "posts");
    assert_eq!(request.original_name, None);
    assert!(request.scaffold.create_model);
    assert!(!request.scaffold.create_migration);
    assert_eq!(request.columns.len(), 4);
    assert_eq!(request.columns[0].action, ColumnAction::Keep);
    assert!(request.columns[0].primary_key);
    assert_eq!(
        request.columns[1].action,
        ColumnAction::Rename {
            from: "title".into()
        }
    );
    assert_eq!(request.columns[1].length, Some(120));
    assert_eq!(request.columns[1].source_name(), "title");
    assert_eq!(request.columns[2].action, ColumnAction::Add);
    assert!(request.columns[2].nullable);
    assert_eq!(request.columns[3].action, ColumnAction::Drop);
}

#[test]
fn test_payload_rename_requires_from() {
    let json = r#"{"tableName": "posts", "columns": [
        {"name": "headline", "type": "varchar", "action": "rename"}
    ]}"#;
    let err = TablePayload::from_json(json)
        .unwrap()
        .into_request()
        .unwrap_err();
    assert!(matches!(err, PayloadError::MissingRenameSource(ref c) if c == "headline"));
}

#[test]
fn test_payload_rejects_empty_names() {
    let json = r#"{"tableName": "  ", "columns": []}"#;
    let err = TablePayload::from_json(json)
        .unwrap()
        .into_request()
        .unwrap_err();
    assert!(matches!(err, PayloadError::EmptyTableName));
}

#[test]
fn test_plan_touched_tables() {
    let plan = Plan {
        table: "articles".into(),
        operations: vec![
            SchemaOperation::RenameTable {
                from: "posts".into(),
                to: "articles".into(),
            },
            SchemaOperation::DropColumn {
                table: "articles".into(),
                column: "legacy".into(),
            },
        ],
    };
    assert_eq!(plan.touched_tables(), ["articles", "posts"]);
    assert_eq!(plan.renamed_from(), Some("posts"));
}

#[test]
fn test_plan_display() {
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
                column: Column::new("body", "text").nullable(),
            },
            SchemaOperation::AlterColumn {
                table: "posts".into(),
                column: Column::new("views", "bigint"),
                changes: vec![
                    ColumnChange::Type {
                        from: "integer".into(),
                        to: "bigint".into(),
                        length: None,
                    },
                    ColumnChange::Default {
                        from: None,
                        to: Some(ColumnDefault::Raw("0".into())),
                    },
                ],
            },
        ],
    };
    insta::assert_snapshot!(plan.to_string(), @r"
    posts:
      ~ rename title -> headline
      + body: text (nullable)
      ~ views: integer -> bigint, default (none) -> 0
    ");
}

fn entry_names() -> Vec<(Dialect, &'static str)> {
    DIALECTS
        .iter()
        .flat_map(|d| {
            d.catalog().entries().iter().flat_map(move |e| {
                std::iter::once((*d, e.name)).chain(e.aliases.iter().map(move |a| (*d, *a)))
            })
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_lookup_ignores_case_and_padding(
        idx in 0usize..1000,
        upper in prop::collection::vec(any::<bool>(), 32),
        left in " {0,3}",
        right in " {0,3}",
    ) {
        let names = entry_names();
        let (dialect, name) = names[idx % names.len()];
        let catalog = dialect.catalog();

        let mixed: String = name
            .chars()
            .zip(upper.iter().cycle())
            .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c })
            .collect();

        let expected = catalog.lookup(name);
        prop_assert!(!expected.is_unknown());
        prop_assert_eq!(&catalog.lookup(&name.to_uppercase()), &expected);
        prop_assert_eq!(&catalog.lookup(&format!(" {name} ")), &expected);
        prop_assert_eq!(&catalog.lookup(&format!("{left}{mixed}{right}")), &expected);
    }
}
