//! `kubelink config get/set` — read and modify configuration.

use crate::load_config;
use kubelink_core::KubelinkConfig;
use std::path::Path;

pub(crate) fn cmd_config_get(config_path: &Path, key: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let json = serde_json::to_value(&config)?;

    match navigate_json(&json, key) {
        Some(v) => println!("{}", serde_json::to_string_pretty(v)?),
        None => anyhow::bail!("Unknown config key: {key}"),
    }
    Ok(())
}

pub(crate) fn cmd_config_set(config_path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let updated = with_value(&config, key, value)?;
    updated.save(config_path)?;
    eprintln!("Updated {key} and saved to {}", config_path.display());
    Ok(())
}

/// Apply `key = value` to a copy of the config, validating the result.
fn with_value(config: &KubelinkConfig, key: &str, value: &str) -> anyhow::Result<KubelinkConfig> {
    let mut json = serde_json::to_value(config)?;

    // JSON first (numbers, lists), plain string otherwise
    let new_value: serde_json::Value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    set_json_path(&mut json, key, new_value)?;

    Ok(serde_json::from_value(json)?)
}

/// Navigate a JSON value by a dot-separated path.
fn navigate_json<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |current, part| current.get(part))
}

/// Set a value at a dot-separated JSON path. The key must already exist.
fn set_json_path(
    root: &mut serde_json::Value,
    path: &str,
    value: serde_json::Value,
) -> anyhow::Result<()> {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, sections)) = parts.split_last() else {
        anyhow::bail!("Empty key path");
    };

    let mut current = root;
    for part in sections {
        current = current
            .get_mut(*part)
            .ok_or_else(|| anyhow::anyhow!("Unknown config section: {part}"))?;
    }

    let Some(obj) = current.as_object_mut() else {
        anyhow::bail!("Config path does not lead to an object");
    };
    if !obj.contains_key(*last) {
        anyhow::bail!("Unknown config key: {last}");
    }
    obj.insert((*last).to_string(), value);
    Ok(())
}
