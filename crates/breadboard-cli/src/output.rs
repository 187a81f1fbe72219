//! Terminal rendering for plans, tables and apply results.

use breadboard::{
    ApplyResult, BreadRecord, MetadataOutcome, Plan, SchemaOperation, Table, TableListing,
    TypeCatalog, UpdateOutcome,
};
use owo_colors::OwoColorize;

pub fn print_listing(tables: &[TableListing]) {
    if tables.is_empty() {
        println!("No tables.");
        return;
    }
    for t in tables {
        if t.has_bread {
            println!("  {} {}", t.name, "[bread]".green());
        } else {
            println!("  {}", t.name);
        }
    }
}

pub fn print_table(table: &Table) {
    println!("{} ({} columns)", table.name.bold(), table.columns.len());
    for col in &table.columns {
        let mut attrs = Vec::new();
        if col.primary_key {
            attrs.push("PK".to_string());
        }
        if col.auto_increment {
            attrs.push("AUTO".to_string());
        }
        if !col.nullable {
            attrs.push("NOT NULL".to_string());
        }
        if let Some(default) = &col.default {
            attrs.push(format!("DEFAULT {default}"));
        }

        let ty = match col.length {
            Some(len) => format!("{}({len})", col.type_name),
            None => col.type_name.clone(),
        };
        let attrs_str = if attrs.is_empty() {
            String::new()
        } else {
            format!(" [{}]", attrs.join(", "))
        };
        if col.not_supported {
            println!("  {}: {}{} {}", col.name, ty.red(), attrs_str, "(not supported)".dimmed());
        } else {
            println!("  {}: {}{}", col.name, ty, attrs_str);
        }
    }
}

pub fn print_types(catalog: &TypeCatalog) {
    for (category, entries) in catalog.list_by_category() {
        println!("{}", category.bold());
        for entry in entries {
            if entry.supported {
                println!("  {}", entry.name);
            } else {
                println!("  {} {}", entry.name.dimmed(), "(not supported)".dimmed());
            }
        }
    }
}

pub fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}: {}", plan.table.bold(), "no changes".dimmed());
        return;
    }
    println!("{}:", plan.table.bold());
    for op in plan.iter() {
        print_operation(op);
    }
}

fn print_operation(op: &SchemaOperation) {
    let line = op.to_string();
    match op {
        SchemaOperation::CreateTable(_) | SchemaOperation::AddColumn { .. } => {
            println!("  {}", line.green())
        }
        SchemaOperation::DropTable { .. } | SchemaOperation::DropColumn { .. } => {
            println!("  {}", line.red())
        }
        _ => println!("  {}", line.yellow()),
    }
}

pub fn print_sql(statements: &str) {
    println!("{}", statements.dimmed());
}

/// Returns whether the apply succeeded.
pub fn print_outcome(outcome: &UpdateOutcome) -> bool {
    let ok = match &outcome.result {
        ApplyResult::Applied(applied) => {
            println!(
                "{} {} operation(s) applied",
                "ok".green().bold(),
                applied.operations.len()
            );
            if let Some(table) = &applied.table {
                print_table(table);
            }
            if let Some(err) = &applied.reread_error {
                println!("{} could not re-read table: {err}", "warning".yellow().bold());
            }
            true
        }
        ApplyResult::Failed(failure) => {
            println!("{} {failure}", "failed".red().bold());
            for op in &failure.applied {
                println!("  {} {op}", "applied".green());
            }
            for op in &failure.pending {
                println!("  {} {op}", "pending".dimmed());
            }
            false
        }
    };

    match &outcome.metadata {
        MetadataOutcome::Synced(report) => {
            if !report.orphaned.is_empty() {
                println!(
                    "{} BREAD fields orphaned: {}",
                    "warning".yellow().bold(),
                    report.orphaned.join(", ")
                );
            }
            if !report.restored.is_empty() {
                println!("BREAD fields restored: {}", report.restored.join(", "));
            }
            if let Some(stale) = &report.stale_record {
                println!(
                    "{} BREAD record for '{stale}' no longer matches a table",
                    "warning".yellow().bold()
                );
            }
        }
        MetadataOutcome::Skipped => {}
        MetadataOutcome::Failed(e) => {
            println!("{} metadata sync failed: {e}", "warning".yellow().bold())
        }
    }
    if let Some(e) = &outcome.scaffold_error {
        println!("{} scaffolding failed: {e}", "warning".yellow().bold());
    }
    ok
}

pub fn print_bread(record: &BreadRecord) {
    println!(
        "{} ({} / {}) slug={}",
        record.table.bold(),
        record.display_name_singular,
        record.display_name_plural,
        record.slug
    );
    for field in &record.fields {
        let flags: String = [
            (field.browse, 'B'),
            (field.read, 'R'),
            (field.edit, 'E'),
            (field.add, 'A'),
            (field.delete, 'D'),
        ]
        .iter()
        .map(|(on, c)| if *on { *c } else { '-' })
        .collect();
        let line = format!(
            "  {:<20} {:<12} {} {}",
            field.column, field.widget, flags, field.display_name
        );
        if field.orphaned {
            println!("{} {}", line.red(), "(orphaned)".red());
        } else {
            println!("{line}");
        }
    }
}
