//! Bind failures that never need a working C compiler.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tether_loader::{BindError, BindResult, Binder, BuildJob, ModuleRegistry, Toolchain};

const FOO: &str = r#"{"foo": [["int32", "int32"], "float32"]}"#;

/// Writes fixed bytes where the module should be.
struct Garbage {
    scratch: RefCell<Option<PathBuf>>,
}

impl Toolchain for Garbage {
    fn module_extension(&self) -> &str {
        "so"
    }

    fn compile(&self, job: &BuildJob<'_>) -> BindResult<()> {
        *self.scratch.borrow_mut() = Some(job.scratch.to_path_buf());
        fs::write(job.output, b"definitely not a shared object")?;
        Ok(())
    }
}

/// Fails like a compiler rejecting the unit.
struct Rejecting;

impl Toolchain for Rejecting {
    fn module_extension(&self) -> &str {
        "so"
    }

    fn compile(&self, job: &BuildJob<'_>) -> BindResult<()> {
        Err(BindError::BuildFailure {
            module: job.module.to_string(),
            reason: "cc exited with status 1".into(),
        })
    }
}

#[test]
fn garbage_artifact_is_a_load_failure() {
    let registry = ModuleRegistry::new();
    let binder = Binder::with_toolchain(
        &registry,
        Garbage {
            scratch: RefCell::new(None),
        },
    );
    let lib = NamedTempFile::new().unwrap();

    let err = binder.bind_json(lib.path(), FOO).unwrap_err();
    match err {
        BindError::LoadFailure { module, path, .. } => {
            assert_eq!(module, "module0");
            assert_eq!(path.file_name().unwrap(), "module0.so");
        }
        other => panic!("expected a load failure, got {other}"),
    }
    assert!(registry.is_empty());

    let scratch = binder.toolchain().scratch.borrow().clone().unwrap();
    assert!(!scratch.exists(), "scratch directory survived a failed bind");
}

#[test]
fn build_failures_leave_nothing_registered() {
    let registry = ModuleRegistry::new();
    let binder = Binder::with_toolchain(&registry, Rejecting);
    let lib = NamedTempFile::new().unwrap();

    for _ in 0..3 {
        let err = binder.bind_json(lib.path(), FOO).unwrap_err();
        assert!(matches!(err, BindError::BuildFailure { .. }));
    }
    assert!(registry.is_empty());
    // Failed requests still consume their ids.
    assert_eq!(registry.reserve().module_name().as_str(), "module3");
}

#[cfg(unix)]
mod subprocess {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::{Duration, Instant};

    use tempfile::TempDir;
    use tether_loader::{CcToolchain, ToolchainConfig};

    use super::*;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn toolchain(compiler: PathBuf, timeout_secs: u64) -> CcToolchain {
        CcToolchain::new(ToolchainConfig {
            compiler,
            timeout_secs,
            ..ToolchainConfig::default()
        })
    }

    // One test so no other thread forks while the scripts are being written.
    #[test]
    fn compiler_process_outcomes() {
        let bin = TempDir::new().unwrap();
        let failing = script(bin.path(), "failing-cc", "echo 'module0.c:1: boom' >&2\nexit 1");
        let silent = script(bin.path(), "silent-cc", "exit 0");
        let slow = script(bin.path(), "slow-cc", "exec sleep 30");
        let marker = bin.path().join("marker");
        let forking = script(
            bin.path(),
            "forking-cc",
            &format!("( sleep 3; echo still-running > '{}' ) &\nwait", marker.display()),
        );
        let lib = NamedTempFile::new().unwrap();

        let registry = ModuleRegistry::new();
        let err = Binder::with_toolchain(&registry, toolchain(failing, 60))
            .bind_json(lib.path(), FOO)
            .unwrap_err();
        match err {
            BindError::BuildFailure { reason, .. } => {
                assert!(reason.contains("exited with"), "{reason}");
                assert!(reason.contains("boom"), "diagnostics missing: {reason}");
            }
            other => panic!("expected a build failure, got {other}"),
        }

        let err = Binder::with_toolchain(&registry, toolchain(silent, 60))
            .bind_json(lib.path(), FOO)
            .unwrap_err();
        let BindError::BuildFailure { reason, .. } = &err else {
            panic!("expected a build failure, got {err}");
        };
        assert!(reason.contains("produced no"), "{reason}");

        let started = Instant::now();
        let err = Binder::with_toolchain(&registry, toolchain(slow, 1))
            .bind_json(lib.path(), FOO)
            .unwrap_err();
        let BindError::BuildTimeout { timeout, .. } = &err else {
            panic!("expected a timeout, got {err}");
        };
        assert_eq!(*timeout, Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_secs(20));

        // Work the driver handed off must not outlive the timeout.
        let err = Binder::with_toolchain(&registry, toolchain(forking, 1))
            .bind_json(lib.path(), FOO)
            .unwrap_err();
        assert!(matches!(err, BindError::BuildTimeout { .. }), "{err}");
        std::thread::sleep(Duration::from_secs(4));
        assert!(!marker.exists(), "background compiler work survived the timeout");

        let err = Binder::with_toolchain(&registry, toolchain(bin.path().join("missing-cc"), 60))
            .bind_json(lib.path(), FOO)
            .unwrap_err();
        let BindError::BuildFailure { reason, .. } = &err else {
            panic!("expected a build failure, got {err}");
        };
        assert!(reason.contains("failed to start"), "{reason}");
        assert!(registry.is_empty());
    }
}
