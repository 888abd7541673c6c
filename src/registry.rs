//! Loads broker definitions from a directory of JSON files.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::model::broker::DataBroker;

fn definition_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read broker directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read one definition and check it has exactly one scan step.
pub fn load_definition(path: &Path) -> anyhow::Result<DataBroker> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let broker = DataBroker::from_json_validated(&json)
        .with_context(|| format!("Invalid broker definition {}", path.display()))?;
    debug!(broker = %broker.name, steps = broker.steps.len(), "Loaded broker definition");
    Ok(broker)
}

/// Every `*.json` definition in `dir`, sorted by file name.
///
/// Stops at the first unusable definition so a broken file is never
/// half-imported.
pub fn load_definitions(dir: &Path) -> anyhow::Result<Vec<DataBroker>> {
    let brokers = definition_files(dir)?
        .iter()
        .map(|path| load_definition(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    info!(count = brokers.len(), dir = %dir.display(), "Loaded broker definitions");
    Ok(brokers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    const VALID: &str = r#"{
        "name": "peoplefinder.example",
        "steps": [
            {"stepType": "scan", "scanType": "templatedUrl", "actions": [
                {"actionType": "navigate", "id": "n1", "url": "https://peoplefinder.example/${firstName}"}
            ]},
            {"stepType": "optOut", "optOutType": "formOptOut", "actions": []}
        ],
        "schedulingConfig": {"retryError": 48, "confirmOptOutScan": 72, "maintenanceScan": 240}
    }"#;

    const NO_SCAN: &str = r#"{
        "name": "broken.example",
        "steps": [{"stepType": "optOut", "actions": []}],
        "schedulingConfig": {"retryError": 48, "confirmOptOutScan": 72, "maintenanceScan": 240}
    }"#;

    #[test]
    fn test_loads_json_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), VALID.replace("peoplefinder", "zeta")).unwrap();
        std::fs::write(dir.path().join("a.json"), VALID).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a broker").unwrap();

        let brokers = load_definitions(dir.path()).unwrap();
        let names: Vec<_> = brokers.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["peoplefinder.example", "zeta.example"]);
        assert_eq!(brokers[0].scheduling_config.maintenance_scan, 240);
    }

    #[test]
    fn test_definition_without_scan_step_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), VALID).unwrap();
        std::fs::write(dir.path().join("b.json"), NO_SCAN).unwrap();

        let err = load_definitions(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnrecoverableError(name)) if name == "broken.example"
        ));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_definitions(&dir.path().join("nope")).is_err());
    }
}
