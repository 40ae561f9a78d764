//! Shell Errors
//!
//! Every recoverable failure in mesh maps to one diagnostic line on stderr
//! and a nonzero exit status written to `?`. Fatal failures (a broken
//! revert invariant, `:hcf`) go through the restart path instead.

use std::ffi::CString;
use std::io::{self, Read, Write};
use std::ptr;

use thiserror::Error;

const CODE_GEN_ERROR: i32 = 1;
const CODE_USAGE_ERROR: i32 = 2;

/// Unified error type for the evaluation pipeline.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The grammar rejected the input line.
    #[error("syntax error")]
    Syntax,

    /// Wrong arguments for a builtin or meta command.
    #[error("{0}")]
    Usage(String),

    /// General runtime failure.
    #[error("{0}")]
    General(String),

    /// A failure that was already reported to stderr by the time it
    /// propagated up; `report` stays silent for this one.
    #[error("already reported")]
    Reported,
}

impl MeshError {
    pub fn usage(msg: impl Into<String>) -> Self {
        MeshError::Usage(msg.into())
    }

    pub fn general(msg: impl Into<String>) -> Self {
        MeshError::General(msg.into())
    }

    /// Exit status this error maps to.
    pub fn status(&self) -> i32 {
        match self {
            MeshError::Syntax => CODE_GEN_ERROR,
            MeshError::Usage(_) => CODE_USAGE_ERROR,
            MeshError::General(_) => CODE_GEN_ERROR,
            MeshError::Reported => CODE_GEN_ERROR,
        }
    }
}

/// Print a diagnostic for an error, unless it was already reported.
pub fn report(err: &MeshError) {
    if !matches!(err, MeshError::Reported) {
        error(&err.to_string());
    }
}

pub fn error(msg: &str) {
    eprintln!("mesh: error: {}", msg);
}

pub fn warn(msg: &str) {
    eprintln!("mesh: warn: {}", msg);
}

/// Fatal crash path: an invariant is broken and the file descriptor table
/// can no longer be trusted. Reset stdio to the controlling terminal and
/// offer to re-exec the shell from scratch.
pub fn fatal_hcf(argv0: &str, msg: &str) -> ! {
    let reset_ok = reset_stdio();

    eprintln!("mesh: fatal: {}", msg);

    if !reset_ok {
        std::process::exit(1);
    }

    eprint!("mesh: fatal: Restart mesh? [Y/n] ");
    let _ = io::stderr().flush();

    let mut buf = [0u8; 1];
    let answered_no = io::stdin()
        .read(&mut buf)
        .map(|n| n > 0 && buf[0] == b'n')
        .unwrap_or(false);

    if !answered_no {
        if let Ok(prog) = CString::new(argv0) {
            let argv = [prog.as_ptr(), ptr::null()];
            unsafe {
                libc::execvp(prog.as_ptr(), argv.as_ptr());
            }
        }
        eprintln!("mesh: fatal: failed to restart mesh");
    }

    std::process::exit(1);
}

/// Close stdio and point all three descriptors back at the terminal.
fn reset_stdio() -> bool {
    unsafe {
        libc::close(libc::STDIN_FILENO);
        libc::close(libc::STDOUT_FILENO);
        libc::close(libc::STDERR_FILENO);
    }

    let tty = match CString::new("/dev/tty") {
        Ok(t) => t,
        Err(_) => return false,
    };

    for _ in 0..3 {
        if unsafe { libc::open(tty.as_ptr(), libc::O_RDWR) } < 0 {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(MeshError::Syntax.status(), 1);
        assert_eq!(MeshError::usage("cd: too many arguments").status(), 2);
        assert_eq!(MeshError::general("no such context").status(), 1);
        assert_eq!(MeshError::Reported.status(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(MeshError::Syntax.to_string(), "syntax error");
        assert_eq!(
            MeshError::general("context 'x' not found").to_string(),
            "context 'x' not found"
        );
    }
}
