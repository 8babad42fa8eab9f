//! Integration tests for kubelink-index: a real folder on disk driven through
//! the resource engine.

use kubelink_core::{
    FileEvent, KubelinkConfig, KubelinkError, RefTarget, RefType, Resource, ResourceId,
    ResourceRef, PATCH_PREFIX,
};
use kubelink_index::ResourceEngine;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ── Helpers ────────────────────────────────────────────────────────────────

const CONFIG_MAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\ndata:\n  mode: prod\n";

const POD: &str = "\
apiVersion: v1
kind: Pod
metadata:
  name: web
spec:
  containers:
    - name: web
      image: nginx:1.25
      envFrom:
        - configMapRef:
            name: cfg
";

fn write(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn open(files: &[(&str, &str)]) -> (TempDir, ResourceEngine) {
    let dir = tempfile::tempdir().unwrap();
    for (relative, text) in files {
        write(dir.path(), relative, text);
    }
    let mut engine = ResourceEngine::from_config(dir.path(), &KubelinkConfig::default()).unwrap();
    engine.rescan().unwrap();
    (dir, engine)
}

fn find<'a>(engine: &'a ResourceEngine, kind: &str, name: &str) -> &'a Resource {
    engine
        .resources()
        .values()
        .find(|r| r.kind == kind && r.declared_name() == name)
        .unwrap_or_else(|| panic!("no {kind} {name}"))
}

fn id_of(engine: &ResourceEngine, kind: &str, name: &str) -> ResourceId {
    find(engine, kind, name).id.clone()
}

fn targets<'a>(refs: impl Iterator<Item = &'a ResourceRef>) -> Vec<String> {
    let mut ids: Vec<String> = refs
        .filter_map(|r| r.target_resource_id().map(str::to_string))
        .collect();
    ids.sort();
    ids
}

/// Every resolved outgoing ref has a matching incoming ref on its target, and
/// every incoming ref has a matching outgoing ref on its source.
fn assert_bidirectional(engine: &ResourceEngine) {
    let resources = engine.resources();
    for source in resources.values() {
        for reference in source.outgoing_refs() {
            let Some(target_id) = reference.target_resource_id() else {
                continue;
            };
            let target = resources
                .get(target_id)
                .unwrap_or_else(|| panic!("{} points at missing {target_id}", source.name));
            assert!(
                target
                    .incoming_refs()
                    .any(|r| r.target_resource_id() == Some(source.id.as_str())),
                "{} -> {} has no incoming mirror",
                source.name,
                target.name
            );
        }
        for reference in source.incoming_refs() {
            let origin_id = reference.target_resource_id().unwrap();
            let origin = resources.get(origin_id).unwrap();
            assert!(
                origin
                    .outgoing_refs()
                    .any(|r| r.target_resource_id() == Some(source.id.as_str())),
                "{} <- {} has no outgoing original",
                source.name,
                origin.name
            );
        }
    }
}

fn file_text(engine: &ResourceEngine, relative: &str) -> String {
    engine.files()[relative].text.clone().unwrap()
}

// ── Extraction ─────────────────────────────────────────────────────────────

#[test]
fn resource_texts_tile_their_file() {
    let text = format!("# leading comment\n{CONFIG_MAP}\n---\n{POD}---\n");
    let (_dir, engine) = open(&[("app.yaml", &text)]);

    let resources = engine.resources_for_path("/app.yaml");
    assert_eq!(resources.len(), 2);
    let joined: String = resources.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(joined, text);
    for resource in resources {
        let range = resource.range.unwrap();
        assert_eq!(&text[range.start..range.end()], resource.text);
    }
}

#[test]
fn broken_document_reports_and_keeps_the_rest() {
    let text = format!("{CONFIG_MAP}---\nkind: [oops\n---\n{POD}");
    let (_dir, engine) = open(&[("app.yaml", &text)]);

    assert_eq!(engine.resources_for_path("/app.yaml").len(), 2);
    let diagnostics = engine.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].file_path.as_deref(), Some("/app.yaml"));
}

// ── Linking ────────────────────────────────────────────────────────────────

#[test]
fn references_are_bidirectional() {
    let (_dir, engine) = open(&[("cfg.yaml", CONFIG_MAP), ("pod.yaml", POD)]);

    let pod = find(&engine, "Pod", "web");
    let cfg = find(&engine, "ConfigMap", "cfg");
    assert_eq!(targets(pod.outgoing_refs()), vec![cfg.id.clone()]);
    assert_eq!(targets(cfg.incoming_refs()), vec![pod.id.clone()]);
    assert_bidirectional(&engine);
}

#[test]
fn rescan_is_idempotent() {
    let (_dir, mut engine) = open(&[("cfg.yaml", CONFIG_MAP), ("pod.yaml", POD)]);
    let mut before: Vec<(String, usize)> = engine
        .resources()
        .values()
        .map(|r| (format!("{}/{}", r.kind, r.name), r.refs.len()))
        .collect();

    engine.rescan().unwrap();
    let mut after: Vec<(String, usize)> = engine
        .resources()
        .values()
        .map(|r| (format!("{}/{}", r.kind, r.name), r.refs.len()))
        .collect();
    before.sort();
    after.sort();
    assert_eq!(before, after);
}

#[test]
fn missing_target_is_unsatisfied() {
    let (_dir, engine) = open(&[("pod.yaml", POD)]);

    let pod = find(&engine, "Pod", "web");
    let unsatisfied: Vec<&ResourceRef> = pod.unsatisfied_refs().collect();
    assert_eq!(unsatisfied.len(), 1);
    assert_eq!(unsatisfied[0].name, "cfg");
    assert!(unsatisfied[0].target_resource_id().is_none());
    assert!(unsatisfied[0].position.is_some());
}

#[test]
fn other_namespace_does_not_satisfy() {
    let other = CONFIG_MAP.replace("name: cfg\n", "name: cfg\n  namespace: staging\n");
    let (_dir, engine) = open(&[("cfg.yaml", &other), ("pod.yaml", POD)]);

    let pod = find(&engine, "Pod", "web");
    assert_eq!(pod.unsatisfied_refs().count(), 1);
    assert!(find(&engine, "ConfigMap", "cfg").incoming_refs().next().is_none());
}

// ── Kustomize ──────────────────────────────────────────────────────────────

#[test]
fn kustomization_composes_its_resources() {
    let (_dir, engine) = open(&[
        (
            "base/kustomization.yaml",
            "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nresources:\n  - a.yaml\n  - b.yaml\n",
        ),
        ("base/a.yaml", CONFIG_MAP),
        ("base/b.yaml", POD),
    ]);

    let kustomization = id_of(&engine, "Kustomization", "base");
    let cfg = id_of(&engine, "ConfigMap", "cfg");
    let pod = id_of(&engine, "Pod", "web");

    assert!(engine.is_kustomization_file("/base/kustomization.yaml"));
    let closure = engine.kustomization_refs(&kustomization, false).unwrap();
    assert!(!closure.cycle_detected);
    let mut ids = closure.ids.clone();
    ids.sort();
    let mut expected = vec![cfg.clone(), pod.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    let pod = find(&engine, "Pod", "web");
    assert_eq!(targets(pod.outgoing_refs()), vec![cfg]);
    assert_bidirectional(&engine);
}

#[test]
fn overlay_reaches_base_through_folder_entry() {
    let (_dir, engine) = open(&[
        (
            "base/kustomization.yaml",
            "kind: Kustomization\nresources:\n  - cfg.yaml\n",
        ),
        ("base/cfg.yaml", CONFIG_MAP),
        (
            "overlay/kustomization.yaml",
            "kind: Kustomization\nresources:\n  - ../base\n  - ../missing\n",
        ),
    ]);

    let base = id_of(&engine, "Kustomization", "base");
    let overlay = id_of(&engine, "Kustomization", "overlay");
    let cfg = id_of(&engine, "ConfigMap", "cfg");

    let closure = engine.kustomization_refs(&overlay, false).unwrap();
    assert_eq!(closure.ids, vec![base.clone(), cfg]);

    let with_parent = engine.kustomization_refs(&base, true).unwrap();
    assert_eq!(with_parent.ids.first(), Some(&overlay));

    let overlay = find(&engine, "Kustomization", "overlay");
    let unsatisfied: Vec<&ResourceRef> = overlay.unsatisfied_refs().collect();
    assert_eq!(unsatisfied.len(), 1);
    assert!(matches!(
        &unsatisfied[0].target,
        Some(RefTarget::File { file_path }) if file_path == "../missing"
    ));
}

#[test]
fn patches_get_one_file_ref_each_and_a_single_prefix() {
    let (_dir, mut engine) = open(&[
        (
            "kustomization.yaml",
            "kind: Kustomization\npatchesStrategicMerge:\n  - patch-a.yaml\n  - patch-b.yaml\n",
        ),
        ("patch-a.yaml", "kind: Deployment\nmetadata:\n  name: web\n"),
        ("patch-b.yaml", "kind: Service\nmetadata:\n  name: web\n"),
    ]);

    let kustomization = find(&engine, "Kustomization", "kustomization");
    let outgoing: Vec<&ResourceRef> = kustomization
        .refs
        .iter()
        .filter(|r| r.ref_type == RefType::Outgoing)
        .collect();
    assert_eq!(outgoing.len(), 2);

    engine.rescan().unwrap();
    let deployment = find(&engine, "Deployment", "web");
    assert_eq!(deployment.name, format!("{PATCH_PREFIX}web"));
}

// ── Edits ──────────────────────────────────────────────────────────────────

#[test]
fn image_edit_keeps_identity_and_links() {
    let (_dir, mut engine) = open(&[("cfg.yaml", CONFIG_MAP), ("pod.yaml", POD)]);
    let pod = id_of(&engine, "Pod", "web");
    let cfg = id_of(&engine, "ConfigMap", "cfg");
    assert!(engine.images().contains_key("nginx:1.25"));

    engine
        .update_resource(&pod, &POD.replace("nginx:1.25", "nginx:1.26"))
        .unwrap();

    let images = engine.images();
    assert!(!images.contains_key("nginx:1.25"));
    assert_eq!(images["nginx:1.26"], vec![pod.clone()]);
    assert_eq!(targets(engine.resource(&pod).unwrap().outgoing_refs()), vec![cfg.clone()]);
    assert_eq!(targets(engine.resource(&cfg).unwrap().incoming_refs()), vec![pod]);
    assert!(file_text(&engine, "/pod.yaml").contains("nginx:1.26"));
    assert_bidirectional(&engine);
}

#[test]
fn saving_writes_disk_and_ignores_the_echo() {
    let (dir, mut engine) = open(&[("pod.yaml", POD)]);
    let pod = id_of(&engine, "Pod", "web");
    engine
        .update_resource(&pod, &POD.replace("nginx:1.25", "nginx:1.27"))
        .unwrap();
    assert!(engine.resource(&pod).unwrap().is_dirty);

    engine.save_resource(&pod).unwrap();
    let on_disk = fs::read_to_string(dir.path().join("pod.yaml")).unwrap();
    assert!(on_disk.contains("nginx:1.27"));
    assert!(!engine.resource(&pod).unwrap().is_dirty);

    engine
        .handle_event(&FileEvent::Changed(dir.path().join("pod.yaml")))
        .unwrap();
    assert!(engine.resource(&pod).is_some());
}

#[test]
fn failed_save_changes_nothing() {
    let (dir, mut engine) = open(&[("pod.yaml", POD)]);
    let pod = id_of(&engine, "Pod", "web");
    engine
        .update_resource(&pod, &POD.replace("nginx:1.25", "nginx:1.28"))
        .unwrap();
    let pending = file_text(&engine, "/pod.yaml");

    let path = dir.path().join("pod.yaml");
    fs::remove_file(&path).unwrap();
    fs::create_dir(&path).unwrap();

    let err = engine.save_resource(&pod).unwrap_err();
    assert!(matches!(err, KubelinkError::Write { .. }));
    assert!(engine.resource(&pod).unwrap().is_dirty);
    assert!(engine.files()["/pod.yaml"].is_dirty);
    assert_eq!(file_text(&engine, "/pod.yaml"), pending);
}

#[test]
fn saving_a_file_entry_reextracts_it() {
    let (dir, mut engine) = open(&[("cfg.yaml", CONFIG_MAP), ("pod.yaml", POD)]);

    engine
        .save_file_entry("/cfg.yaml", &CONFIG_MAP.replace("name: cfg", "name: other"))
        .unwrap();

    assert!(fs::read_to_string(dir.path().join("cfg.yaml"))
        .unwrap()
        .contains("name: other"));
    let fresh = find(&engine, "ConfigMap", "other");
    assert!(fresh.is_highlighted);
    assert_eq!(find(&engine, "Pod", "web").unsatisfied_refs().count(), 1);
}

// ── Path events ────────────────────────────────────────────────────────────

#[test]
fn removing_a_target_file_leaves_the_source_unsatisfied() {
    let (dir, mut engine) = open(&[("cfg.yaml", CONFIG_MAP), ("pod.yaml", POD)]);
    let pod = id_of(&engine, "Pod", "web");

    let path = dir.path().join("cfg.yaml");
    fs::remove_file(&path).unwrap();
    engine.handle_event(&FileEvent::Removed(path)).unwrap();

    assert!(!engine.files().contains_key("/cfg.yaml"));
    let pod = engine.resource(&pod).unwrap();
    assert_eq!(pod.unsatisfied_refs().count(), 1);
    assert!(pod.outgoing_refs().all(|r| r.target_resource_id().is_none()));
    assert_bidirectional(&engine);
}

#[test]
fn added_file_satisfies_existing_refs() {
    let (dir, mut engine) = open(&[("pod.yaml", POD)]);
    let pod = id_of(&engine, "Pod", "web");

    write(dir.path(), "config/cfg.yaml", CONFIG_MAP);
    engine
        .handle_event(&FileEvent::Added(dir.path().join("config")))
        .unwrap();

    assert!(engine.files().contains_key("/config/cfg.yaml"));
    let cfg = id_of(&engine, "ConfigMap", "cfg");
    assert_eq!(targets(engine.resource(&pod).unwrap().outgoing_refs()), vec![cfg]);
    assert_eq!(engine.resource(&pod).unwrap().unsatisfied_refs().count(), 0);
    assert_bidirectional(&engine);
}

#[test]
fn changed_file_keeps_matching_identities() {
    let (dir, mut engine) = open(&[("app.yaml", &format!("{CONFIG_MAP}---\n{POD}"))]);
    let pod = id_of(&engine, "Pod", "web");
    let cfg = id_of(&engine, "ConfigMap", "cfg");

    write(
        dir.path(),
        "app.yaml",
        &format!("{}---\n{POD}", CONFIG_MAP.replace("mode: prod", "mode: dev")),
    );
    engine
        .handle_event(&FileEvent::Changed(dir.path().join("app.yaml")))
        .unwrap();

    assert_eq!(id_of(&engine, "Pod", "web"), pod);
    assert_eq!(id_of(&engine, "ConfigMap", "cfg"), cfg);
    assert_eq!(engine.resource(&cfg).unwrap().content["data"]["mode"], "dev");
    assert_eq!(targets(engine.resource(&pod).unwrap().outgoing_refs()), vec![cfg]);
}

#[test]
fn events_outside_the_root_are_ignored() {
    let (_dir, mut engine) = open(&[("pod.yaml", POD)]);
    let elsewhere = tempfile::tempdir().unwrap();
    write(elsewhere.path(), "x.yaml", CONFIG_MAP);

    engine
        .handle_event(&FileEvent::Added(elsewhere.path().join("x.yaml")))
        .unwrap();
    assert_eq!(engine.resources().len(), 1);
}
