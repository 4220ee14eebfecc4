//! End-to-end catalog lookup over real workspace directories.
//!
//! Fixtures mirror the documented catalog file shapes: a module record, a
//! release with a replay pointer, and a mirror index, laid out under a
//! scratch home workspace.

use std::path::Path;

use tempfile::TempDir;
use warpforge_api::CatalogRef;
use warpforge_api::Packtype;
use warpforge_api::WareID;
use warpforge_workspace::find_workspace_stack;

const MODULE_DATA: &str = r#"{
    "catalogmodule.v1": {
        "name": "example.com/module",
        "metadata": {},
        "releases": {
            "v1.0": "zM5K3awreLPFS2jSHVkdWZvST3AqJqapCTpZNJbtZjjfFbTiZdFSExhjFoDrkk4bGGQY8M3"
        }
    }
}"#;

const RELEASE_DATA: &str = r#"{
    "releaseName": "v1.0",
    "metadata": {
        "replay": "zM5K3aX2vbXSjAMaFVBAAYccoNpf3h2mQkDZLFmD7pEZdUUWtsx1qk9Dh4KoPq7zmEdR1cQ"
    },
    "items": {
        "x86_64": "tar:abcd"
    }
}"#;

const MIRROR_DATA: &str = r#"{
    "catalogmirrors.v1": {
        "byWare": {
            "tar:abcd": [
                "https://example.com/module/module-v1.0-x86_64.tgz"
            ]
        }
    }
}"#;

const REPLAY_DATA: &str = r#"{
    "plot.v1": {
        "inputs": {
            "rootfs": "catalog:warpsys.org/busybox:v1.35.0:amd64-static"
        },
        "steps": {
            "hello-world": {
                "protoformula": {
                    "inputs": {
                        "/": "pipe::rootfs"
                    },
                    "action": {
                        "script": {
                            "interpreter": "/bin/sh",
                            "contents": [
                                "mkdir /output",
                                "echo 'hello world' | tee /output/file"
                            ],
                            "network": false
                        }
                    },
                    "outputs": {
                        "out": {
                            "from": "/output",
                            "packtype": "tar"
                        }
                    }
                }
            }
        },
        "outputs": {
            "output": "pipe:hello-world:out"
        }
    }
}"#;

fn test_ref() -> CatalogRef {
    CatalogRef::new("example.com/module", "v1.0", "x86_64")
}

async fn write_fixture(base: &Path, rel: &str, data: &str) {
    let path = base.join(rel);
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(path, data).await.unwrap();
}

async fn fixture_catalog(base: &Path, catalog_dir: &str) {
    let module_dir = format!("{catalog_dir}/example.com/module");
    write_fixture(base, &format!("{module_dir}/_module.json"), MODULE_DATA).await;
    write_fixture(base, &format!("{module_dir}/_releases/v1.0.json"), RELEASE_DATA).await;
    write_fixture(base, &format!("{module_dir}/_mirrors.json"), MIRROR_DATA).await;
    write_fixture(
        base,
        &format!("{module_dir}/_replays/zM5K3aX2vbXSjAMaFVBAAYccoNpf3h2mQkDZLFmD7pEZdUUWtsx1qk9Dh4KoPq7zmEdR1cQ.json"),
        REPLAY_DATA,
    )
    .await;
}

#[tokio::test]
async fn test_single_catalog_lookup() {
    let dir = TempDir::new().unwrap();
    let home = dir.path().join("home/user");
    fixture_catalog(dir.path(), "home/user/.warpforge/catalog").await;

    let stack = find_workspace_stack(&home, dir.path(), Path::new("home/user")).await.unwrap();
    let (ware, addr) = stack.get_catalog_ware(&test_ref()).await.unwrap().expect("ware should resolve");

    assert_eq!(ware.packtype, Packtype::from("tar"));
    assert_eq!(ware.hash, "abcd");
    assert_eq!(addr.unwrap().as_str(), "https://example.com/module/module-v1.0-x86_64.tgz");
}

#[tokio::test]
async fn test_named_catalog_wins_over_unnamed() {
    let dir = TempDir::new().unwrap();
    let home = dir.path().join("home/user");
    tokio::fs::create_dir_all(home.join(".warpforge")).await.unwrap();
    tokio::fs::write(home.join(".warpforge/root"), b"").await.unwrap();

    // Same module in a named catalog and the unnamed fallback, with differing
    // wares so the winner is observable.
    fixture_catalog(dir.path(), "home/user/.warpforge/catalogs/test").await;
    fixture_catalog(dir.path(), "home/user/.warpforge/catalog").await;
    let unnamed_release = home.join(".warpforge/catalog/example.com/module/_releases/v1.0.json");
    tokio::fs::write(&unnamed_release, RELEASE_DATA.replace("tar:abcd", "tar:wxyz")).await.unwrap();

    let stack = find_workspace_stack(&home, dir.path(), Path::new("home/user")).await.unwrap();
    let (ware, _) = stack.get_catalog_ware(&test_ref()).await.unwrap().expect("ware should resolve");

    // The named catalog is consulted first, so the unnamed one's ware loses.
    assert_eq!(ware, WareID::new("tar", "abcd"));
}

#[tokio::test]
async fn test_multi_catalog_module_enumeration() {
    let dir = TempDir::new().unwrap();
    let home = dir.path().join("home/user");
    fixture_catalog(dir.path(), "home/user/.warpforge/catalogs/test").await;

    let module_two = "home/user/.warpforge/catalogs/test/example.com/module-two";
    write_fixture(dir.path(), &format!("{module_two}/_module.json"), MODULE_DATA).await;
    write_fixture(dir.path(), &format!("{module_two}/_releases/v1.0.json"), RELEASE_DATA).await;

    let stack = find_workspace_stack(&home, dir.path(), Path::new("home/user")).await.unwrap();
    let catalog = stack.local().open_catalog(Some("test")).unwrap();
    let modules = catalog.list_modules().await.unwrap();
    assert_eq!(modules, vec!["example.com/module", "example.com/module-two"]);
}

#[tokio::test]
async fn test_replay_lookup() {
    let dir = TempDir::new().unwrap();
    let home = dir.path().join("home/user");
    fixture_catalog(dir.path(), "home/user/.warpforge/catalog").await;

    let stack = find_workspace_stack(&home, dir.path(), Path::new("home/user")).await.unwrap();
    let replay = stack.get_catalog_replay(&test_ref()).await.unwrap().expect("replay should resolve");

    let warpforge_api::PlotCapsule::V1(plot) = replay;
    assert!(plot.steps.contains_key("hello-world"));
    assert_eq!(plot.outputs.get("output").unwrap().step_name, "hello-world");
}

#[tokio::test]
async fn test_lookup_miss_is_none() {
    let dir = TempDir::new().unwrap();
    let home = dir.path().join("home/user");
    tokio::fs::create_dir_all(home.join(".warpforge")).await.unwrap();

    let stack = find_workspace_stack(&home, dir.path(), Path::new("home/user")).await.unwrap();
    let missing = CatalogRef::new("example.com/nothing", "v9", "x86_64");
    assert!(stack.get_catalog_ware(&missing).await.unwrap().is_none());
}
