//! `kubelink scan/refs/kustomizations/images` — one-shot queries over a folder.

use crate::{find_resource, label, open_engine};
use colored::Colorize;
use kubelink_core::{KubelinkConfig, RefTarget, Resource, ResourceRef};
use kubelink_index::ResourceEngine;
use std::path::Path;

pub(crate) fn cmd_scan(
    root: &Path,
    config: &KubelinkConfig,
    json: bool,
    show_diagnostics: bool,
) -> anyhow::Result<()> {
    let engine = open_engine(root, config)?;

    if json {
        let resources: Vec<&Resource> = engine.resources().values().collect();
        println!("{}", serde_json::to_string_pretty(&resources)?);
        return Ok(());
    }

    let mut current_file: Option<&str> = None;
    for resource in sorted_local(&engine) {
        if current_file != Some(resource.file_path.as_str()) {
            println!("{}", resource.file_path.bold());
            current_file = Some(resource.file_path.as_str());
        }
        let unsatisfied = resource.unsatisfied_refs().count();
        let marker = if unsatisfied > 0 {
            format!(" ({unsatisfied} unsatisfied)").yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<40} {} out, {} in{marker}",
            label(resource),
            resource.outgoing_refs().count(),
            resource.incoming_refs().count(),
        );
    }

    let diagnostics = engine.diagnostics();
    println!();
    println!(
        "{} resources in {} files, {} diagnostics",
        engine.resources().len(),
        engine.files().values().filter(|f| f.text.is_some()).count(),
        diagnostics.len()
    );
    if show_diagnostics {
        for diagnostic in diagnostics {
            println!(
                "  {} {} {}",
                diagnostic.kind.to_string().red(),
                diagnostic.file_path.as_deref().unwrap_or("-"),
                diagnostic.message
            );
        }
    }
    Ok(())
}

pub(crate) fn cmd_refs(root: &Path, config: &KubelinkConfig, query: &str) -> anyhow::Result<()> {
    let engine = open_engine(root, config)?;
    let resource = find_resource(&engine, query)?;

    println!("{} {}", label(resource).bold(), resource.file_path.dimmed());
    print_section(&engine, "Outgoing", resource.outgoing_refs());
    print_section(&engine, "Incoming", resource.incoming_refs());
    print_section(&engine, "Unsatisfied", resource.unsatisfied_refs());
    Ok(())
}

pub(crate) fn cmd_kustomizations(
    root: &Path,
    config: &KubelinkConfig,
    include_parents: bool,
) -> anyhow::Result<()> {
    let engine = open_engine(root, config)?;
    let kustomizations: Vec<&Resource> = sorted_local(&engine)
        .into_iter()
        .filter(|r| r.is_kustomization())
        .collect();
    if kustomizations.is_empty() {
        println!("No kustomizations found in {}", root.display());
        return Ok(());
    }

    for kustomization in kustomizations {
        let closure = engine.kustomization_refs(&kustomization.id, include_parents)?;
        let cycle = if closure.cycle_detected {
            " (cycle)".red().to_string()
        } else {
            String::new()
        };
        println!("{}{cycle}", kustomization.file_path.bold());
        for id in &closure.ids {
            if let Some(resource) = engine.resource(id) {
                println!("  {:<40} {}", label(resource), resource.file_path.dimmed());
            }
        }
    }
    Ok(())
}

pub(crate) fn cmd_images(root: &Path, config: &KubelinkConfig) -> anyhow::Result<()> {
    let engine = open_engine(root, config)?;
    let images = engine.images();
    if images.is_empty() {
        println!("No container images found in {}", root.display());
        return Ok(());
    }

    for (image, users) in &images {
        println!("{}", image.bold());
        for id in users {
            if let Some(resource) = engine.resource(id) {
                println!("  {:<40} {}", label(resource), resource.file_path.dimmed());
            }
        }
    }
    Ok(())
}

/// Local resources ordered by file, then position in the file.
fn sorted_local(engine: &ResourceEngine) -> Vec<&Resource> {
    let mut resources: Vec<&Resource> = engine
        .resources()
        .values()
        .filter(|r| r.is_local())
        .collect();
    resources.sort_by_key(|r| (r.file_path.clone(), r.range.map(|range| range.start)));
    resources
}

fn print_section<'a>(
    engine: &ResourceEngine,
    title: &str,
    refs: impl Iterator<Item = &'a ResourceRef>,
) {
    let lines: Vec<String> = refs.map(|r| describe_ref(engine, r)).collect();
    if lines.is_empty() {
        return;
    }
    println!("{title}:");
    for line in lines {
        println!("  {line}");
    }
}

/// One-line description of a reference and where it points.
pub(crate) fn describe_ref(engine: &ResourceEngine, reference: &ResourceRef) -> String {
    let at = reference
        .position
        .map(|p| format!(" @{}:{}", p.line, p.column))
        .unwrap_or_default();
    let target = match &reference.target {
        Some(RefTarget::Resource { resource_id, kind }) => match engine.resource(resource_id) {
            Some(resource) => format!("{} ({})", label(resource), resource.file_path),
            None => format!("{kind} {resource_id}"),
        },
        Some(RefTarget::File { file_path }) => format!("file {file_path}"),
        Some(RefTarget::Image { name, tag }) => format!("image {name}:{tag}"),
        None => "unresolved".to_string(),
    };
    format!("{} -> {target}{at}", reference.name)
}
