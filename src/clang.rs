use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache;
use crate::error::LlvmError;

/// Locate the clang binary once per process. Concurrent first callers all
/// observe the single resolved value.
pub fn clang_path() -> Result<&'static Path, LlvmError> {
    static CLANG: OnceLock<Option<PathBuf>> = OnceLock::new();
    CLANG
        .get_or_init(locate_clang)
        .as_deref()
        .ok_or(LlvmError::ClangNotFound)
}

fn locate_clang() -> Option<PathBuf> {
    if let Ok(path) = env::var("LLVM_INVOKE_CLANG") {
        return Some(PathBuf::from(path));
    }
    let paths = env::var_os("PATH")?;
    for dir in env::split_paths(&paths) {
        for name in ["clang-18", "clang"] {
            let candidate = dir.join(name);
            if candidate.is_file() {
                debug!(path = %candidate.display(), "resolved clang");
                return Some(candidate);
            }
        }
    }
    None
}

/// Translate a C file into textual LLVM IR at `output`.
///
/// Invocation shape: `clang -S -emit-llvm {input} -o {output} {flags...}`.
/// Empty `flags` substitute `-O3` so the transpiler never runs bare. The
/// call blocks until clang exits; with a `timeout` the child is killed at
/// the deadline. The output is written to a temporary name and renamed into
/// place only on success, so a failed run publishes nothing.
pub fn transpile(
    input: &Path,
    output: &Path,
    flags: &[String],
    timeout: Option<Duration>,
) -> Result<(), LlvmError> {
    let clang = clang_path()?;

    let default_flags = [String::from("-O3")];
    let flags = if flags.is_empty() { &default_flags[..] } else { flags };

    let staged = cache::temp_sibling(output);
    let mut cmd = Command::new(clang);
    cmd.arg("-S")
        .arg("-emit-llvm")
        .arg(input)
        .arg("-o")
        .arg(&staged)
        .args(flags)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    debug!(?cmd, "running clang");

    let mut child = cmd.spawn()?;

    // Drain stderr on a separate thread so a chatty clang cannot fill the
    // pipe and deadlock against our wait loop.
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
    let stderr_reader = thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr_pipe.read_to_string(&mut buf);
        buf
    });

    let deadline = timeout.map(|t| Instant::now() + t);
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                warn!(input = %input.display(), "clang deadline reached, killing");
                let _ = child.kill();
                let _ = child.wait();
                let _ = std::fs::remove_file(&staged);
                return Err(LlvmError::ClangTimedOut {
                    secs: timeout.unwrap_or_default().as_secs(),
                    input: input.to_path_buf(),
                });
            }
        }
        thread::sleep(Duration::from_millis(10));
    };

    let stderr = stderr_reader.join().unwrap_or_default();
    if !status.success() {
        let _ = std::fs::remove_file(&staged);
        return Err(LlvmError::ClangFailed {
            status: status.code().unwrap_or(-1),
            stderr,
        });
    }

    std::fs::rename(&staged, output)?;
    Ok(())
}
