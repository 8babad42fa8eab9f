//! kubelink-bench: Criterion benchmark harnesses for kubelink.
//!
//! Fixture generators shared by the benches in `benches/`: synthetic
//! multi-document manifest files and kustomization trees, deterministic so
//! runs are comparable.

use kubelink_core::{FileMap, ResourceMap};
use kubelink_index::{extract_resources_from_file, DocumentStore};
use std::path::Path;

/// One manifest file holding a ConfigMap, a Secret, a Deployment using both
/// (and the Secret of the next file), and a Service.
pub fn manifest_file(i: usize, files: usize) -> String {
    let next = (i + 1) % files.max(1);
    format!(
        "apiVersion: v1
kind: ConfigMap
metadata:
  name: cfg-{i}
data:
  mode: bench
---
apiVersion: v1
kind: Secret
metadata:
  name: secret-{i}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app-{i}
spec:
  template:
    spec:
      serviceAccountName: runner
      containers:
        - name: app
          image: registry.local/app-{}:1.{i}
          envFrom:
            - configMapRef:
                name: cfg-{i}
            - secretRef:
                name: secret-{next}
---
apiVersion: v1
kind: Service
metadata:
  name: app-{i}
spec:
  selector:
    app: app-{i}
",
        i % 7
    )
}

/// A folder layout: `files` manifests spread over `groups` folders, each with
/// a kustomization listing its files, and a root kustomization listing the
/// folders.
pub fn project(files: usize, groups: usize) -> Vec<(String, String)> {
    let groups = groups.max(1);
    let mut out = Vec::with_capacity(files + groups + 1);
    let mut listed: Vec<Vec<String>> = vec![Vec::new(); groups];

    for i in 0..files {
        let group = i % groups;
        let name = format!("app-{i}.yaml");
        out.push((format!("/group-{group}/{name}"), manifest_file(i, files)));
        listed[group].push(name);
    }
    for (group, names) in listed.iter().enumerate() {
        out.push((format!("/group-{group}/kustomization.yaml"), kustomization(names)));
    }
    let folders: Vec<String> = (0..groups).map(|g| format!("group-{g}")).collect();
    out.push(("/kustomization.yaml".to_string(), kustomization(&folders)));
    out
}

fn kustomization(entries: &[String]) -> String {
    let mut text = String::from("apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nresources:\n");
    for entry in entries {
        text.push_str("  - ");
        text.push_str(entry);
        text.push('\n');
    }
    text
}

/// Load a generated project into a document store and an unlinked resource map.
pub fn load(files: &[(String, String)]) -> (FileMap, ResourceMap) {
    let mut store = DocumentStore::new(Path::new("/bench"));
    let mut resources = ResourceMap::new();
    for (path, text) in files {
        store.upsert_file(path, Some(text.clone()), None, false);
        for resource in extract_resources_from_file(path, text).resources {
            resources.insert(resource.id.clone(), resource);
        }
    }
    (store.files().clone(), resources)
}
