//! Invocation of the external C toolchain.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use target_lexicon::{BinaryFormat, Triple};
use tether_abi::ModuleName;

use crate::config::ToolchainConfig;
use crate::error::{BindError, BindResult};

/// Everything a toolchain needs to turn one generated unit into a module.
#[derive(Debug)]
pub struct BuildJob<'a> {
    pub module: &'a ModuleName,
    pub source: &'a Path,
    /// Canonical path of the native library the glue links against.
    pub library: &'a Path,
    pub output: &'a Path,
    /// Searched for `#include`s, in order.
    pub include_dirs: &'a [PathBuf],
    /// Scratch directory owned by the bind request.
    pub scratch: &'a Path,
}

/// Builds a loadable module from a generated compilation unit.
///
/// Implementations report problems as [`BindError::BuildFailure`] or
/// [`BindError::BuildTimeout`]. The caller separately checks that the
/// output artifact exists.
pub trait Toolchain {
    /// File extension of loadable modules on the target.
    fn module_extension(&self) -> &str;

    fn compile(&self, job: &BuildJob<'_>) -> BindResult<()>;
}

impl<T: Toolchain + ?Sized> Toolchain for &T {
    fn module_extension(&self) -> &str {
        (**self).module_extension()
    }

    fn compile(&self, job: &BuildJob<'_>) -> BindResult<()> {
        (**self).compile(job)
    }
}

/// Drives a `cc`-compatible compiler as a subprocess.
#[derive(Debug, Clone)]
pub struct CcToolchain {
    config: ToolchainConfig,
    host: Triple,
}

impl CcToolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        CcToolchain {
            config,
            host: Triple::host(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ToolchainConfig::from_env())
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    /// The argument vector passed to the compiler, without I/O setup.
    pub fn command(&self, job: &BuildJob<'_>) -> Command {
        let mut cmd = Command::new(&self.config.compiler);
        cmd.arg(self.config.opt_level.flag())
            .arg("-fPIC")
            .arg("-shared");
        for dir in job.include_dirs.iter().chain(&self.config.include_dirs) {
            cmd.arg("-I").arg(dir);
        }
        cmd.arg(job.source).arg(job.library).arg("-o").arg(job.output);
        match self.host.binary_format {
            // Symbols of the host process resolve at load time.
            BinaryFormat::Macho => {
                cmd.arg("-Wl,-undefined,dynamic_lookup");
            }
            BinaryFormat::Elf => {
                if let Some(dir) = job.library.parent() {
                    cmd.arg(format!("-Wl,-rpath,{}", dir.display()));
                }
            }
            _ => {}
        }
        cmd.args(&self.config.extra_args);
        cmd
    }
}

impl Default for CcToolchain {
    fn default() -> Self {
        Self::new(ToolchainConfig::default())
    }
}

impl Toolchain for CcToolchain {
    fn module_extension(&self) -> &str {
        match self.host.binary_format {
            BinaryFormat::Macho => "dylib",
            BinaryFormat::Coff => "dll",
            _ => "so",
        }
    }

    fn compile(&self, job: &BuildJob<'_>) -> BindResult<()> {
        let log_path = job.scratch.join("cc.log");
        let log = File::create(&log_path)?;

        let mut cmd = self.command(job);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log));
        // The driver and everything it starts share one group so a timeout
        // can take all of them down.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        tracing::debug!(module = %job.module, command = ?cmd, "invoking C toolchain");
        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|err| {
            BindError::build_failure(
                job.module,
                format!("failed to start `{}`: {err}", self.config.compiler.display()),
            )
        })?;

        let timeout = self.config.timeout();
        let status = match wait_for_child_timeout(&mut child, timeout)? {
            Some(status) => status,
            None => {
                kill_process_group(&child);
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(module = %job.module, ?timeout, "C toolchain timed out");
                return Err(BindError::BuildTimeout {
                    module: job.module.to_string(),
                    timeout,
                });
            }
        };

        tracing::debug!(
            module = %job.module,
            %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "C toolchain finished"
        );
        if !status.success() {
            let diagnostics = std::fs::read(&log_path)
                .map(|bytes| String::from_utf8_lossy(&bytes).trim_end().to_owned())
                .unwrap_or_default();
            let mut reason = format!("`{}` exited with {status}", self.config.compiler.display());
            if !diagnostics.is_empty() {
                reason.push('\n');
                reason.push_str(&diagnostics);
            }
            return Err(BindError::build_failure(job.module, reason));
        }
        Ok(())
    }
}

fn wait_for_child_timeout(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: plain syscall; the group was created for this child at spawn.
    unsafe {
        let _ = libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}
