use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::cli::{OutputFormat, UserArgs};
use crate::clues::{ClueInjector, ClueTiming, HeadlessPage, NullBeacon};
use crate::config;
use crate::controller::ChallengeController;
use crate::progress::{KeyValueStore, ProgressStore};
use crate::validator::CheckResult;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            match data {
                Some(Value::Object(fields)) => {
                    if let Some(object) = response.as_object_mut() {
                        object.extend(fields);
                    }
                }
                Some(other) => response["data"] = other,
                None => {}
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(
    output_format: &OutputFormat,
    message: &str,
    error_code: Option<&str>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Print validation checks one per line (text output only)
pub fn print_checks(checks: &[CheckResult]) {
    for check in checks {
        let mark = if check.passed { "✓" } else { "✗" };
        println!("  {} {}: {}", mark, check.field, check.detail);
    }
}

/// Parse repeated `--field key=value` arguments into a JSON object
pub fn parse_fields(pairs: &[String]) -> anyhow::Result<Value> {
    let mut fields = Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid field '{}': expected key=value", pair))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow::anyhow!("Invalid field '{}': empty key", pair));
        }
        fields.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(Value::Object(fields))
}

/// Open the user's challenge without any network side effects
pub fn open_controller(
    user: &UserArgs,
    storage: Arc<dyn KeyValueStore>,
) -> anyhow::Result<ChallengeController> {
    let page = Arc::new(HeadlessPage::new(storage.clone()));
    let injector = ClueInjector::new(page, Arc::new(NullBeacon), ClueTiming::immediate());

    let controller = ChallengeController::open(
        user.challenge_id(),
        Some(user.identity()),
        ProgressStore::new(storage),
        injector,
        config::config().challenge.clone(),
    )?;
    Ok(controller)
}
