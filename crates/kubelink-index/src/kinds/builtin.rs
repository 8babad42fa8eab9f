//! Built-in kind descriptors.

use super::{KindDescriptor, RefMapper};

const WORKLOADS: &str = "Workloads";
const CONFIGURATION: &str = "Configuration";
const NETWORK: &str = "Network";
const STORAGE: &str = "Storage";
const ACCESS_CONTROL: &str = "Access Control";
const KUSTOMIZE: &str = "Kustomize";

/// Returns every built-in descriptor.
pub fn all_descriptors() -> Vec<KindDescriptor> {
    let mut all = Vec::new();
    all.extend(workloads());
    all.extend(configuration());
    all.extend(network());
    all.extend(storage());
    all.extend(access_control());
    all.push(descriptor("Kustomization", "kustomize.config.k8s.io/v1beta1", false, KUSTOMIZE, Vec::new()));
    all
}

/// Rules shared by everything that embeds a pod spec, relative to that spec.
pub fn pod_spec_mappers() -> Vec<RefMapper> {
    let mut mappers = vec![
        RefMapper::to_resource(&["volumes", "*", "configMap", "name"], "ConfigMap"),
        RefMapper::to_resource(&["volumes", "*", "secret", "secretName"], "Secret"),
        RefMapper::to_resource(
            &["volumes", "*", "persistentVolumeClaim", "claimName"],
            "PersistentVolumeClaim",
        ),
        RefMapper::to_resource(&["serviceAccountName"], "ServiceAccount"),
        RefMapper::to_resource(&["imagePullSecrets", "*", "name"], "Secret"),
    ];
    for containers in ["containers", "initContainers"] {
        mappers.extend([
            RefMapper::to_image(&[containers, "*", "image"]),
            RefMapper::to_resource(
                &[containers, "*", "env", "*", "valueFrom", "configMapKeyRef", "name"],
                "ConfigMap",
            ),
            RefMapper::to_resource(
                &[containers, "*", "env", "*", "valueFrom", "secretKeyRef", "name"],
                "Secret",
            ),
            RefMapper::to_resource(&[containers, "*", "envFrom", "*", "configMapRef", "name"], "ConfigMap"),
            RefMapper::to_resource(&[containers, "*", "envFrom", "*", "secretRef", "name"], "Secret"),
        ]);
    }
    mappers
}

fn pod_spec_under(prefix: &[&str]) -> Vec<RefMapper> {
    pod_spec_mappers().into_iter().map(|m| m.under(prefix)).collect()
}

fn workloads() -> Vec<KindDescriptor> {
    let template = ["spec", "template", "spec"];
    vec![
        descriptor("Pod", "v1", true, WORKLOADS, pod_spec_under(&["spec"])),
        descriptor("Deployment", "apps/v1", true, WORKLOADS, pod_spec_under(&template)),
        descriptor("StatefulSet", "apps/v1", true, WORKLOADS, pod_spec_under(&template)),
        descriptor("DaemonSet", "apps/v1", true, WORKLOADS, pod_spec_under(&template)),
        descriptor("ReplicaSet", "apps/v1", true, WORKLOADS, pod_spec_under(&template)),
        descriptor("Job", "batch/v1", true, WORKLOADS, pod_spec_under(&template)),
        descriptor(
            "CronJob",
            "batch/v1",
            true,
            WORKLOADS,
            pod_spec_under(&["spec", "jobTemplate", "spec", "template", "spec"]),
        ),
    ]
}

fn configuration() -> Vec<KindDescriptor> {
    vec![
        descriptor("ConfigMap", "v1", true, CONFIGURATION, Vec::new()),
        descriptor("Secret", "v1", true, CONFIGURATION, Vec::new()),
        descriptor("Namespace", "v1", false, CONFIGURATION, Vec::new()),
    ]
}

fn network() -> Vec<KindDescriptor> {
    vec![
        descriptor("Service", "v1", true, NETWORK, Vec::new()),
        descriptor("Endpoints", "v1", true, NETWORK, Vec::new()),
        descriptor(
            "Ingress",
            "networking.k8s.io/v1",
            true,
            NETWORK,
            vec![
                RefMapper::to_resource(
                    &["spec", "rules", "*", "http", "paths", "*", "backend", "service", "name"],
                    "Service",
                ),
                RefMapper::to_resource(&["spec", "defaultBackend", "service", "name"], "Service"),
                RefMapper::to_resource(&["spec", "tls", "*", "secretName"], "Secret"),
            ],
        ),
    ]
}

fn storage() -> Vec<KindDescriptor> {
    vec![
        descriptor(
            "PersistentVolume",
            "v1",
            false,
            STORAGE,
            vec![RefMapper::to_resource(&["spec", "claimRef", "name"], "PersistentVolumeClaim")
                .with_namespace_key("namespace")],
        ),
        descriptor(
            "PersistentVolumeClaim",
            "v1",
            true,
            STORAGE,
            vec![RefMapper::to_resource(&["spec", "volumeName"], "PersistentVolume")],
        ),
    ]
}

fn access_control() -> Vec<KindDescriptor> {
    // User and Group subjects name nothing in the cluster.
    let subjects = || {
        RefMapper::to_resource(&["subjects", "*", "name"], "ServiceAccount")
            .with_namespace_key("namespace")
            .when_sibling("kind", "ServiceAccount")
    };
    let role_ref = |kind: &str| RefMapper::to_resource(&["roleRef", "name"], kind).when_sibling("kind", kind);
    vec![
        descriptor(
            "ServiceAccount",
            "v1",
            true,
            ACCESS_CONTROL,
            vec![
                RefMapper::to_resource(&["secrets", "*", "name"], "Secret"),
                RefMapper::to_resource(&["imagePullSecrets", "*", "name"], "Secret"),
            ],
        ),
        descriptor("Role", "rbac.authorization.k8s.io/v1", true, ACCESS_CONTROL, Vec::new()),
        descriptor("ClusterRole", "rbac.authorization.k8s.io/v1", false, ACCESS_CONTROL, Vec::new()),
        descriptor(
            "RoleBinding",
            "rbac.authorization.k8s.io/v1",
            true,
            ACCESS_CONTROL,
            vec![role_ref("Role"), role_ref("ClusterRole"), subjects()],
        ),
        descriptor(
            "ClusterRoleBinding",
            "rbac.authorization.k8s.io/v1",
            false,
            ACCESS_CONTROL,
            vec![role_ref("ClusterRole"), subjects()],
        ),
    ]
}

fn descriptor(
    kind: &str,
    api_version: &str,
    is_namespaced: bool,
    section: &str,
    outgoing_ref_mappers: Vec<RefMapper>,
) -> KindDescriptor {
    KindDescriptor {
        kind: kind.to_string(),
        cluster_api_version: api_version.to_string(),
        is_namespaced,
        section: section.to_string(),
        outgoing_ref_mappers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::RefMapperTarget;
    use std::collections::HashSet;

    #[test]
    fn kinds_are_unique() {
        let all = all_descriptors();
        let unique: HashSet<&str> = all.iter().map(|d| d.kind.as_str()).collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn deployment_rules_live_under_the_pod_template() {
        let all = all_descriptors();
        let deployment = all.iter().find(|d| d.kind == "Deployment").unwrap();
        assert!(deployment
            .outgoing_ref_mappers
            .iter()
            .all(|m| m.source.starts_with(&["spec".to_string(), "template".to_string(), "spec".to_string()])));
        assert!(deployment
            .outgoing_ref_mappers
            .iter()
            .any(|m| m.target == RefMapperTarget::Image));
    }

    #[test]
    fn cronjob_rules_use_job_template() {
        let all = all_descriptors();
        let cronjob = all.iter().find(|d| d.kind == "CronJob").unwrap();
        assert_eq!(cronjob.outgoing_ref_mappers[0].source[1], "jobTemplate");
    }
}
