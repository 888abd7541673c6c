use comfy_table::{Cell, Table};

use super::Report;

pub fn render(report: &Report) -> anyhow::Result<String> {
    let mut output = String::new();

    output.push_str(&format!(
        "=== Broker Scrub Report ({}) ===\n\n",
        report.generated_at
    ));

    let summary = &report.summary;
    output.push_str("--- Summary ---\n");
    output.push_str(&format!("Brokers scanned:      {}\n", summary.brokers_scanned));
    output.push_str(&format!("  Active mirrors:     {}\n", summary.mirror_sites_active));
    output.push_str(&format!("Matches found:        {}\n", summary.matches_found));
    output.push_str(&format!("Opt-outs requested:   {}\n", summary.opt_outs_requested));
    output.push_str(&format!("Removals confirmed:   {}\n", summary.removals_confirmed));
    output.push_str(&format!("Jobs in error:        {}\n", summary.jobs_in_error));

    if !report.brokers.is_empty() {
        output.push_str("\n--- Brokers ---\n");
        let mut table = Table::new();
        table.set_header(vec!["Broker", "URL", "Last Scan", "Mirror Sites"]);
        for b in &report.brokers {
            let mirrors = if b.mirror_sites.is_empty() {
                "-".to_string()
            } else {
                b.mirror_sites.join(", ")
            };
            table.add_row(vec![
                Cell::new(&b.name),
                Cell::new(&b.url),
                Cell::new(b.last_scan.as_deref().unwrap_or("-")),
                Cell::new(mirrors),
            ]);
        }
        output.push_str(&table.to_string());
        output.push('\n');
    }

    if !report.jobs.is_empty() {
        output.push_str("\n--- Jobs ---\n");
        let mut table = Table::new();
        table.set_header(vec![
            "Broker", "Query", "Kind", "Profile", "Last Event", "Last Run", "Next Run",
        ]);
        for job in &report.jobs {
            table.add_row(vec![
                Cell::new(&job.broker),
                Cell::new(&job.profile_query),
                Cell::new(job.kind),
                Cell::new(job.profile.as_deref().unwrap_or("-")),
                Cell::new(job.last_event.as_deref().unwrap_or("-")),
                Cell::new(job.last_run.as_deref().unwrap_or("-")),
                Cell::new(job.next_run.as_deref().unwrap_or("-")),
            ]);
        }
        output.push_str(&table.to_string());
        output.push('\n');
    }

    Ok(output)
}
