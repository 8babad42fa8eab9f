//! `kubelink watch` — keep the reference graph current while files change.

use crate::open_engine;
use colored::Colorize;
use kubelink_core::{FileEvent, KubelinkConfig};
use kubelink_index::ResourceEngine;
use std::path::Path;

pub(crate) fn cmd_watch(root: &Path, config: &KubelinkConfig) -> anyhow::Result<()> {
    let mut engine = open_engine(root, config)?;
    println!(
        "{} resources, {} unsatisfied references",
        engine.resources().len(),
        unsatisfied_count(&engine)
    );

    let watcher = kubelink_watch::FileWatcher::with_ignore_dirs(
        root,
        &config.watch,
        ignore_dirs(config),
    )?;
    println!(
        "Watching {} for file changes (Ctrl+C to stop)",
        root.display()
    );

    let receiver = watcher.receiver();
    while let Ok(event) = receiver.recv() {
        let before = engine.resources().len();
        if let Err(e) = engine.handle_event(&event) {
            tracing::warn!("Failed to apply {:?}: {e}", event);
            continue;
        }
        println!(
            "  {} {}",
            event_label(&event),
            event.path().strip_prefix(root).unwrap_or(event.path()).display()
        );
        println!(
            "    {} resources ({:+}), {} unsatisfied references, {} diagnostics",
            engine.resources().len(),
            engine.resources().len() as i64 - before as i64,
            unsatisfied_count(&engine),
            engine.diagnostics().len()
        );
    }

    Ok(())
}

/// Exclusions without glob syntax name whole directories the watcher can skip.
fn ignore_dirs(config: &KubelinkConfig) -> Vec<String> {
    let mut dirs: Vec<String> = kubelink_watch::IGNORE_DIRS
        .iter()
        .map(|d| d.to_string())
        .collect();
    for pattern in &config.scan.scan_excludes {
        let literal = !pattern.contains(['*', '?', '[', '{', '/']);
        if literal && !dirs.contains(pattern) {
            dirs.push(pattern.clone());
        }
    }
    dirs
}

fn event_label(event: &FileEvent) -> String {
    match event {
        FileEvent::Added(_) => "[added]".green().to_string(),
        FileEvent::Changed(_) => "[changed]".yellow().to_string(),
        FileEvent::Removed(_) => "[removed]".red().to_string(),
    }
}

fn unsatisfied_count(engine: &ResourceEngine) -> usize {
    engine
        .resources()
        .values()
        .map(|r| r.unsatisfied_refs().count())
        .sum()
}
