use std::path::Path;

use weaver_core::plan::Plan;

use crate::error::CliError;

/// Read a plan in its JSON form.
pub fn load_plan(path: &Path) -> Result<Plan, CliError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CliError::Plan(format!("read plan {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| CliError::Plan(format!("parse plan {}: {e}", path.display())))
}
