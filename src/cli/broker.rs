use std::path::Path;

use chrono::Utc;
use comfy_table::{Cell, Table};

use crate::db::Database;
use crate::model::broker::StepType;
use crate::registry;

/// Import every definition in `dir`. Nothing is stored if any file is
/// unusable.
pub fn import_brokers(db: &Database, dir: &Path) -> anyhow::Result<()> {
    let brokers = registry::load_definitions(dir)?;
    if brokers.is_empty() {
        println!("No broker definitions found in {}", dir.display());
        return Ok(());
    }

    for broker in &brokers {
        let id = db.upsert_broker(broker)?;
        tracing::info!(broker = %broker.name, id, "Imported broker");
    }
    println!("Imported {} broker definitions from {}", brokers.len(), dir.display());
    Ok(())
}

pub fn list_brokers(db: &Database) -> anyhow::Result<()> {
    let brokers = db.list_brokers()?;

    if brokers.is_empty() {
        println!("No brokers found. Run `broker-scrub broker import <dir>` to load definitions.");
        return Ok(());
    }

    let now = Utc::now();
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "URL", "Version", "Opt-out", "Mirrors"]);

    for b in &brokers {
        let opt_out = if b.performs_opt_out_within_parent() {
            format!("via {}", b.parent.as_deref().unwrap_or("parent"))
        } else if b.opt_out_step().is_some() {
            "form".to_string()
        } else {
            "-".to_string()
        };
        table.add_row(vec![
            Cell::new(b.id.map(|id| id.to_string()).unwrap_or_default()),
            Cell::new(&b.name),
            Cell::new(&b.url),
            Cell::new(&b.version),
            Cell::new(opt_out),
            Cell::new(b.active_mirror_sites(now).len()),
        ]);
    }

    println!("{table}");
    Ok(())
}

pub fn broker_info(db: &Database, name: &str) -> anyhow::Result<()> {
    let Some(b) = db.get_broker(name)? else {
        anyhow::bail!("Broker '{}' not found", name);
    };

    println!("Name:        {}", b.name);
    println!("URL:         {}", b.url);
    println!("Version:     {}", b.version);
    if let Some(parent) = &b.parent {
        println!("Parent:      {parent}");
    }
    if let Some(added) = b.added_datetime {
        println!("Added:       {}", added.to_rfc3339());
    }

    let config = &b.scheduling_config;
    println!(
        "Schedule:    retry {}h, confirm {}h, maintenance {}h",
        config.retry_error, config.confirm_opt_out_scan, config.maintenance_scan
    );
    match config.attempt_limit() {
        Some(limit) => println!("Attempts:    {limit}"),
        None => println!("Attempts:    unlimited"),
    }

    for step in &b.steps {
        let label = match step.step_type {
            StepType::Scan => "Scan step:  ",
            StepType::OptOut => "Opt-out step:",
        };
        let actions: Vec<_> = step.actions.iter().map(|a| a.action_type().to_string()).collect();
        println!("{label} {}", actions.join(" -> "));
    }

    if !b.mirror_sites.is_empty() {
        let now = Utc::now();
        let mut table = Table::new();
        table.set_header(vec!["Mirror Site", "Added", "Status"]);
        for m in &b.mirror_sites {
            let status = match m.removed_at {
                Some(removed) if m.was_removed(now) => format!("removed {}", removed.date_naive()),
                _ => "active".to_string(),
            };
            table.add_row(vec![
                Cell::new(&m.name),
                Cell::new(m.added_at.date_naive()),
                Cell::new(status),
            ]);
        }
        println!("{table}");
    }
    Ok(())
}
