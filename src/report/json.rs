use super::Report;

/// Pretty-printed JSON with a trailing newline, ready to write to a file.
pub fn render(report: &Report) -> anyhow::Result<String> {
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    Ok(json)
}
