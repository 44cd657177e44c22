//! External alignment and signing tools.
//!
//! The pipeline only talks to the [`Toolchain`] trait. [`ProcessToolchain`] runs the real
//! binaries: a per-platform `zipalign` and `apksigner.jar` on a Java runtime. Every call
//! blocks until the child exits (or the optional timeout kills it), and a non-zero exit is
//! reported as [`BuildError::ToolInvocation`].

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{absolutize, BuildConfig};
use crate::error::{BuildError, BuildResult, ToolFailure};

/// Cap on captured stdout/stderr per stream.
const MAX_CAPTURE: usize = 16 * 1024;

/// Captured result of a successful tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// The tools a build needs.
pub trait Toolchain {
    /// Fail with [`BuildError::MissingToolchainRuntime`] if the signer cannot run at all.
    fn check_runtime(&self) -> BuildResult<()>;
    /// Align (or verify alignment of) the package in place.
    fn align(&self, artifact: &Path) -> BuildResult<ToolOutput>;
    /// Sign the package in place.
    fn sign(&self, artifact: &Path) -> BuildResult<ToolOutput>;
}

/// [`Toolchain`] backed by child processes.
#[derive(Debug, Clone)]
pub struct ProcessToolchain {
    workdir: PathBuf,
    aligner: PathBuf,
    align_args: Vec<String>,
    runtime: String,
    runtime_args: Vec<String>,
    signer_jar: PathBuf,
    sign_key: PathBuf,
    sign_cert: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessToolchain {
    pub fn from_config(config: &BuildConfig) -> Self {
        let tc = &config.toolchain;
        let workdir = absolutize(&config.root);
        let deps = absolutize(&config.dependencies_path());
        let platform = config.platform();
        let aligner = if platform == "win" {
            format!("{}.exe", tc.aligner)
        } else {
            tc.aligner.clone()
        };

        Self {
            workdir,
            aligner: deps.join(platform).join(aligner),
            align_args: tc.align_args.clone(),
            runtime: tc.runtime.clone(),
            runtime_args: tc.runtime_args.clone(),
            signer_jar: deps.join(&tc.signer_jar),
            sign_key: deps.join(&tc.sign_key),
            sign_cert: deps.join(&tc.sign_cert),
            timeout: tc.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn aligner(&self) -> &Path {
        &self.aligner
    }

    fn command(&self, program: impl AsRef<std::ffi::OsStr>) -> Command {
        let mut cmd = Command::new(program);
        cmd.current_dir(&self.workdir);
        cmd
    }
}

impl Toolchain for ProcessToolchain {
    fn check_runtime(&self) -> BuildResult<()> {
        let mut cmd = self.command(&self.runtime);
        cmd.arg("-version");
        match run_tool(&self.runtime, cmd, self.timeout) {
            Ok(out) => {
                let version = out.stderr.lines().next().unwrap_or_default().to_string();
                tracing::debug!(runtime = %self.runtime, %version, "runtime available");
                Ok(())
            }
            Err(BuildError::ToolInvocation { reason, .. }) => {
                Err(BuildError::MissingToolchainRuntime {
                    runtime: self.runtime.clone(),
                    detail: reason.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn align(&self, artifact: &Path) -> BuildResult<ToolOutput> {
        let mut cmd = self.command(&self.aligner);
        cmd.args(&self.align_args).arg(artifact);
        run_tool("zipalign", cmd, self.timeout)
    }

    fn sign(&self, artifact: &Path) -> BuildResult<ToolOutput> {
        let mut cmd = self.command(&self.runtime);
        cmd.args(&self.runtime_args)
            .arg("-jar")
            .arg(&self.signer_jar)
            .arg("sign")
            .arg("--key")
            .arg(&self.sign_key)
            .arg("--cert")
            .arg(&self.sign_cert)
            .arg("--out")
            .arg(artifact)
            .arg(artifact);
        run_tool("apksigner", cmd, self.timeout)
    }
}

/// Run `cmd` to completion, capturing its output.
///
/// Output pipes are drained on helper threads so a chatty child cannot block on a full pipe
/// while we wait for it.
pub fn run_tool(name: &str, mut cmd: Command, timeout: Option<Duration>) -> BuildResult<ToolOutput> {
    tracing::debug!(tool = name, command = ?cmd, "running");
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BuildError::ToolInvocation {
            tool: name.to_string(),
            reason: ToolFailure::Spawn(e.to_string()),
            stderr: String::new(),
        })?;

    let stdout = child.stdout.take().map(|s| thread::spawn(move || drain(s)));
    let stderr = child.stderr.take().map(|s| thread::spawn(move || drain(s)));

    let waited = match timeout {
        Some(limit) => child.wait_timeout(limit),
        None => child.wait().map(Some),
    };
    let status = match waited {
        Ok(status) => status,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BuildError::io(format!("waiting for {}", name), e));
        }
    };
    if status.is_none() {
        let _ = child.kill();
        let _ = child.wait(); // reap
    }

    let output = ToolOutput {
        stdout: join_capture(stdout),
        stderr: join_capture(stderr),
    };
    if !output.stdout.trim().is_empty() {
        tracing::debug!(tool = name, stdout = %output.stdout.trim_end());
    }
    if !output.stderr.trim().is_empty() {
        tracing::debug!(tool = name, stderr = %output.stderr.trim_end());
    }

    match status {
        None => Err(BuildError::ToolInvocation {
            tool: name.to_string(),
            reason: ToolFailure::TimedOut,
            stderr: output.stderr,
        }),
        Some(status) if !status.success() => Err(BuildError::ToolInvocation {
            tool: name.to_string(),
            reason: ToolFailure::ExitStatus(status.code()),
            stderr: output.stderr,
        }),
        Some(_) => Ok(output),
    }
}

fn drain<R: Read>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = (&mut reader).take(MAX_CAPTURE as u64).read_to_end(&mut buf);
    // Keep reading past the cap so the child never blocks on a full pipe.
    let _ = io::copy(&mut reader, &mut io::sink());
    String::from_utf8_lossy(&buf).into_owned()
}

fn join_capture(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Extension trait to add `wait_timeout` to `Child`.
trait ChildExt {
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>>;
}

impl ChildExt for std::process::Child {
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(50);

        loop {
            match self.try_wait()? {
                Some(status) => return Ok(Some(status)),
                None => {
                    if start.elapsed() >= timeout {
                        return Ok(None);
                    }
                    thread::sleep(poll_interval);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligner_path_follows_platform() {
        let mut cfg = BuildConfig::default().with_root("/work");
        cfg.toolchain.platform = Some("linux".into());
        let tc = ProcessToolchain::from_config(&cfg);
        assert_eq!(tc.aligner(), Path::new("/work/dependencies/linux/zipalign"));

        cfg.toolchain.platform = Some("win".into());
        let tc = ProcessToolchain::from_config(&cfg);
        assert_eq!(
            tc.aligner(),
            Path::new("/work/dependencies/win/zipalign.exe")
        );
    }

    #[test]
    fn spawn_failure_is_tool_invocation_error() {
        let cmd = Command::new("homebuild-no-such-tool-7f3a");
        let err = run_tool("aligner", cmd, None).unwrap_err();
        assert!(matches!(
            err,
            BuildError::ToolInvocation {
                reason: ToolFailure::Spawn(_),
                ..
            }
        ));
    }

    #[test]
    fn missing_runtime_is_fatal_kind() {
        let mut cfg = BuildConfig::default();
        cfg.toolchain.runtime = "homebuild-no-such-runtime-7f3a".into();
        let err = ProcessToolchain::from_config(&cfg)
            .check_runtime()
            .unwrap_err();
        assert!(
            matches!(err, BuildError::MissingToolchainRuntime { .. }),
            "got {err:?}"
        );
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        fn sh(script: &str) -> Command {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", script]);
            cmd
        }

        fn write_script(path: &Path, body: &str) {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        #[test]
        fn captures_output() {
            let out = run_tool("echo", sh("echo out; echo err >&2"), None).unwrap();
            assert_eq!(out.stdout, "out\n");
            assert_eq!(out.stderr, "err\n");
        }

        #[test]
        fn non_zero_exit_is_an_error() {
            let err = run_tool("zipalign", sh("echo 'not aligned' >&2; exit 3"), None).unwrap_err();
            match err {
                BuildError::ToolInvocation { tool, reason, stderr } => {
                    assert_eq!(tool, "zipalign");
                    assert_eq!(reason, ToolFailure::ExitStatus(Some(3)));
                    assert_eq!(stderr, "not aligned\n");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn timeout_kills_the_child() {
            let start = Instant::now();
            let err = run_tool("slow", sh("exec sleep 10"), Some(Duration::from_millis(200)))
                .unwrap_err();
            assert!(matches!(
                err,
                BuildError::ToolInvocation {
                    reason: ToolFailure::TimedOut,
                    ..
                }
            ));
            assert!(start.elapsed() < Duration::from_secs(5));
        }

        #[test]
        fn large_output_does_not_block() {
            let out = run_tool("chatty", sh("head -c 200000 /dev/zero | tr '\\0' 'a'"), None)
                .unwrap();
            assert_eq!(out.stdout.len(), MAX_CAPTURE);
        }

        #[test]
        fn relative_root_resolves_tools_once() {
            let tmp = tempfile::tempdir_in(".").unwrap();
            assert!(tmp.path().is_relative());

            let mut cfg = BuildConfig::default().with_root(tmp.path());
            cfg.toolchain.platform = Some("linux".into());
            write_script(
                &tmp.path().join("dependencies/linux/zipalign"),
                "test -f \"$3\"",
            );
            let artifact = cfg.root.join("a.apk");
            fs::write(&artifact, b"apk").unwrap();

            let tc = ProcessToolchain::from_config(&cfg);
            assert!(tc.aligner().is_absolute());
            tc.align(&artifact).unwrap();
            tc.align(Path::new("a.apk")).unwrap();
        }

        #[test]
        fn align_and_sign_pass_expected_arguments() {
            let tmp = tempfile::tempdir().unwrap();
            let root = tmp.path();
            let log = root.join("calls.log");
            let record = format!("echo \"$0 $*\" >> {}", log.display());

            let mut cfg = BuildConfig::default().with_root(root);
            cfg.toolchain.platform = Some("linux".into());
            cfg.toolchain.runtime = root.join("fake-java").display().to_string();
            write_script(&root.join("dependencies/linux/zipalign"), &record);
            write_script(&root.join("fake-java"), &record);

            let tc = ProcessToolchain::from_config(&cfg);
            tc.check_runtime().unwrap();
            tc.align(Path::new("house_ClassicHome.apk")).unwrap();
            tc.sign(Path::new("house_ClassicHome.apk")).unwrap();

            let calls = fs::read_to_string(&log).unwrap();
            let lines: Vec<_> = calls.lines().collect();
            assert_eq!(lines.len(), 3);
            assert!(lines[0].ends_with("fake-java -version"));
            assert!(lines[1].ends_with("dependencies/linux/zipalign -c 4 house_ClassicHome.apk"));
            let deps = root.join("dependencies");
            assert!(lines[2].ends_with(&format!(
                "fake-java -Duser.language=en -Dfile.encoding=UTF8 -jar {} sign --key {} --cert {} --out house_ClassicHome.apk house_ClassicHome.apk",
                deps.join("apksigner.jar").display(),
                deps.join("signkey.pk8").display(),
                deps.join("signkey.x509.pem").display(),
            )));
        }
    }
}
