//! OCI runtime bundle assembly.
//!
//! The sandbox is an OCI-style container: the executor writes a `config.json`
//! describing root filesystem, mounts, process, and namespaces, then points
//! the container runtime binary at the bundle directory. Only the document
//! subset warpforge needs is modeled here.

use std::path::Path;

use serde::Serialize;

/// The OCI spec version we emit.
const OCI_VERSION: &str = "1.0.2";

/// A `config.json` document.
#[derive(Debug, Clone, Serialize)]
pub struct OciSpec {
    #[serde(rename = "ociVersion")]
    pub oci_version: String,
    pub process: Process,
    pub root: Root,
    pub hostname: String,
    pub mounts: Vec<Mount>,
    pub linux: Linux,
}

#[derive(Debug, Clone, Serialize)]
pub struct Process {
    pub terminal: bool,
    pub user: User,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub cwd: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Root {
    pub path: String,
    pub readonly: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Mount {
    pub destination: String,
    #[serde(rename = "type")]
    pub mount_type: String,
    pub source: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Linux {
    pub namespaces: Vec<Namespace>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Namespace {
    #[serde(rename = "type")]
    pub ns_type: String,
}

impl OciSpec {
    /// A spec with the standard pseudo-filesystem mounts and namespace set.
    ///
    /// `network` controls whether the container shares the host network: when
    /// denied (the default), an empty network namespace isolates it.
    pub fn new(root_path: &Path, terminal: bool, network: bool) -> OciSpec {
        let mut namespaces = vec!["pid", "ipc", "uts", "mount"];
        if !network {
            namespaces.push("network");
        }
        OciSpec {
            oci_version: OCI_VERSION.to_string(),
            process: Process {
                terminal,
                user: User { uid: 0, gid: 0 },
                args: Vec::new(),
                env: vec!["PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string()],
                cwd: "/".to_string(),
            },
            root: Root {
                path: root_path.to_string_lossy().into_owned(),
                readonly: false,
            },
            hostname: "warpforge".to_string(),
            mounts: standard_mounts(),
            linux: Linux {
                namespaces: namespaces
                    .into_iter()
                    .map(|ns| Namespace { ns_type: ns.to_string() })
                    .collect(),
            },
        }
    }

    /// Set the argv the container runs.
    pub fn set_args(&mut self, args: Vec<String>) {
        self.process.args = args;
    }

    /// Append one environment variable.
    pub fn add_env(&mut self, name: &str, value: &str) {
        self.process.env.push(format!("{name}={value}"));
    }

    /// Bind a host path into the container.
    pub fn add_bind_mount(&mut self, destination: &str, source: &Path, read_only: bool) {
        let mut options = vec!["rbind".to_string()];
        if read_only {
            options.push("ro".to_string());
        }
        self.mounts.push(Mount {
            destination: destination.to_string(),
            mount_type: "none".to_string(),
            source: source.to_string_lossy().into_owned(),
            options,
        });
    }

    /// Use a host directory directly as the container root.
    pub fn set_root_bind(&mut self, source: &Path, read_only: bool) {
        self.root = Root {
            path: source.to_string_lossy().into_owned(),
            readonly: read_only,
        };
    }

    /// Back the container root with an overlay: reads come from `lower`
    /// (typically a ware cache directory, which must stay pristine), writes
    /// land in `upper` inside the run directory.
    ///
    /// The overlay is the first mount so later mounts target the overlaid
    /// tree.
    pub fn set_root_overlay(&mut self, lower: &Path, upper: &Path, work: &Path) {
        self.mounts.insert(
            0,
            Mount {
                destination: "/".to_string(),
                mount_type: "overlay".to_string(),
                source: "none".to_string(),
                options: vec![
                    format!("lowerdir={}", lower.display()),
                    format!("upperdir={}", upper.display()),
                    format!("workdir={}", work.display()),
                ],
            },
        );
    }

    /// Mount an overlay: reads hit `lower`, writes land in `upper`.
    pub fn add_overlay_mount(&mut self, destination: &str, lower: &Path, upper: &Path, work: &Path) {
        self.mounts.push(Mount {
            destination: destination.to_string(),
            mount_type: "overlay".to_string(),
            source: "none".to_string(),
            options: vec![
                format!("lowerdir={}", lower.display()),
                format!("upperdir={}", upper.display()),
                format!("workdir={}", work.display()),
            ],
        });
    }
}

fn standard_mounts() -> Vec<Mount> {
    vec![
        Mount {
            destination: "/proc".to_string(),
            mount_type: "proc".to_string(),
            source: "proc".to_string(),
            options: Vec::new(),
        },
        Mount {
            destination: "/dev".to_string(),
            mount_type: "tmpfs".to_string(),
            source: "tmpfs".to_string(),
            options: vec!["nosuid".into(), "strictatime".into(), "mode=755".into(), "size=65536k".into()],
        },
        Mount {
            destination: "/dev/pts".to_string(),
            mount_type: "devpts".to_string(),
            source: "devpts".to_string(),
            options: vec![
                "nosuid".into(),
                "noexec".into(),
                "newinstance".into(),
                "ptmxmode=0666".into(),
                "mode=0620".into(),
            ],
        },
        Mount {
            destination: "/dev/shm".to_string(),
            mount_type: "tmpfs".to_string(),
            source: "shm".to_string(),
            options: vec!["nosuid".into(), "noexec".into(), "nodev".into(), "mode=1777".into(), "size=65536k".into()],
        },
        Mount {
            destination: "/sys".to_string(),
            mount_type: "sysfs".to_string(),
            source: "sysfs".to_string(),
            options: vec!["nosuid".into(), "noexec".into(), "nodev".into(), "ro".into()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_gating_via_namespace() {
        let denied = OciSpec::new(Path::new("/tmp/root"), false, false);
        assert!(denied.linux.namespaces.iter().any(|ns| ns.ns_type == "network"));

        let allowed = OciSpec::new(Path::new("/tmp/root"), false, true);
        assert!(!allowed.linux.namespaces.iter().any(|ns| ns.ns_type == "network"));
    }

    #[test]
    fn test_bind_mount_options() {
        let mut spec = OciSpec::new(Path::new("/tmp/root"), false, false);
        spec.add_bind_mount("/src", Path::new("/host/src"), true);
        let mount = spec.mounts.last().unwrap();
        assert_eq!(mount.destination, "/src");
        assert_eq!(mount.options, vec!["rbind", "ro"]);
    }

    #[test]
    fn test_overlay_mount_options() {
        let mut spec = OciSpec::new(Path::new("/tmp/root"), false, false);
        spec.add_overlay_mount("/", Path::new("/cache/w"), Path::new("/run/up"), Path::new("/run/work"));
        let mount = spec.mounts.last().unwrap();
        assert_eq!(mount.mount_type, "overlay");
        assert_eq!(
            mount.options,
            vec!["lowerdir=/cache/w", "upperdir=/run/up", "workdir=/run/work"]
        );
    }

    #[test]
    fn test_spec_serializes_with_oci_field_names() {
        let spec = OciSpec::new(Path::new("/tmp/root"), true, false);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["ociVersion"], "1.0.2");
        assert_eq!(json["root"]["path"], "/tmp/root");
        assert_eq!(json["mounts"][0]["type"], "proc");
        assert_eq!(json["process"]["terminal"], true);
    }
}
