//! Common utilities for tests that need a real C compiler.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The compiler the loader will use, honoring `TETHER_CC`.
pub fn compiler() -> PathBuf {
    std::env::var_os("TETHER_CC")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("cc"))
}

/// True when no C compiler is installed; the caller should return early.
pub fn skip_without_cc() -> bool {
    let available = Command::new(compiler())
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success());
    if !available {
        eprintln!("skipping: no C compiler on PATH");
    }
    !available
}

fn library_file(name: &str) -> String {
    if cfg!(target_os = "macos") {
        format!("lib{name}.dylib")
    } else if cfg!(windows) {
        format!("{name}.dll")
    } else {
        format!("lib{name}.so")
    }
}

/// Compile `source` into a shared library inside `dir`.
pub fn build_library(dir: &Path, name: &str, source: &str) -> PathBuf {
    let src = dir.join(format!("{name}.c"));
    fs::write(&src, source).expect("Failed to write C source");
    let out = dir.join(library_file(name));

    let output = Command::new(compiler())
        .args(["-shared", "-fPIC", "-O1", "-o"])
        .arg(&out)
        .arg(&src)
        .output()
        .expect("Failed to execute the C compiler");
    if !output.status.success() {
        panic!(
            "building {name} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    out
}
