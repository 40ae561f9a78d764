//! Flag Engine
//!
//! Redirections and scoped assignments collected for one command, with
//! two apply disciplines. The irreversible form runs in a forked child
//! right before `exec`. The reversible form runs in-process for
//! builtins and meta-commands: every touched descriptor is backed up
//! first (close-on-exec so backups never leak into children), and
//! `revert` restores the parent state exactly — including after a
//! partial apply that failed midway.

use std::ffi::CString;
use std::io;

use crate::ast::RedirKind;
use crate::errors::{self, MeshError};
use crate::scope::ScopeStack;
use crate::vars::VarStore;

#[derive(Debug, Clone, PartialEq)]
pub enum RedirTarget {
    /// `dup2` another descriptor onto `from`.
    Fd(i32),
    /// Open a file (mode 0644 on create) and `dup2` it onto `from`.
    File { path: String, oflags: i32 },
    /// Close `from`.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backup {
    /// Clone of the descriptor as it was before apply.
    Saved(i32),
    /// `from` was not open before apply; close it again on revert.
    WasClosed,
}

#[derive(Debug, Clone)]
pub struct RedirOp {
    pub from: i32,
    pub target: RedirTarget,
    backup: Option<Backup>,
}

impl RedirOp {
    pub fn new(from: i32, target: RedirTarget) -> Self {
        RedirOp {
            from,
            target,
            backup: None,
        }
    }

    /// Shorthand for the pipeline's stdout/stdin splices.
    pub fn dup(from: i32, to: i32) -> Self {
        RedirOp::new(from, RedirTarget::Fd(to))
    }
}

/// Everything a command inherits besides its argv: redirections in
/// order, then scoped assignments.
#[derive(Debug, Clone, Default)]
pub struct RunFlags {
    pub redirs: Vec<RedirOp>,
    pub assigns: Vec<(String, String)>,
}

/// Translate one parsed redirection into an operation. The target word
/// must already be expanded.
pub fn redir_to_op(kind: RedirKind, fd: Option<i32>, target: &str) -> Result<RedirOp, MeshError> {
    let from = fd.unwrap_or_else(|| kind.default_fd());

    if kind.is_dup() {
        if target == "-" {
            return Ok(RedirOp::new(from, RedirTarget::Close));
        }

        if target.is_empty() || !target.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MeshError::general(format!(
                "{}: bad file descriptor",
                target
            )));
        }
        let to = target
            .parse()
            .map_err(|_| MeshError::general(format!("{}: bad file descriptor", target)))?;
        return Ok(RedirOp::new(from, RedirTarget::Fd(to)));
    }

    let oflags = match kind {
        // >| carries no noclobber semantics; it opens exactly like >
        RedirKind::OutNormal | RedirKind::OutClobber => {
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC
        }
        RedirKind::OutAppend => libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
        RedirKind::InNormal => libc::O_RDONLY,
        RedirKind::InReadWrite => libc::O_RDWR | libc::O_CREAT,
        RedirKind::OutDup | RedirKind::InDup => unreachable!(),
    };

    Ok(RedirOp::new(
        from,
        RedirTarget::File {
            path: target.to_string(),
            oflags,
        },
    ))
}

/// Irreversible apply, for a forked child about to `exec`: perform all
/// redirections, then write assignments to the environment as exported.
pub fn apply(flags: &RunFlags, vars: &mut VarStore) -> Result<(), MeshError> {
    for op in &flags.redirs {
        do_redirect(op)?;
    }

    for (key, value) in &flags.assigns {
        vars.set(key, value);
        vars.set_export(key);
    }

    Ok(())
}

/// Reversible apply, for in-process commands. Pushes a scope frame,
/// backs up and applies each redirection in order, then writes
/// assignments into the new frame. On failure everything applied so far
/// is reverted before returning.
pub fn apply_reversible(
    flags: &mut RunFlags,
    scopes: &mut ScopeStack,
    argv0: &str,
) -> Result<(), MeshError> {
    // Revert always pops a frame, so push before the first redirection
    scopes.push_frame();

    for i in 0..flags.redirs.len() {
        let from = flags.redirs[i].from;

        let backup_fd = unsafe { libc::dup(from) };
        if backup_fd < 0 {
            if io::Error::last_os_error().raw_os_error() != Some(libc::EBADF) {
                revert(flags, scopes, argv0);
                return Err(MeshError::general("failed to back up file descriptor"));
            }
        } else {
            set_cloexec(backup_fd);
        }

        // Files opened for a reversible apply must not leak across exec
        if let RedirTarget::File { oflags, .. } = &mut flags.redirs[i].target {
            *oflags |= libc::O_CLOEXEC;
        }

        if let Err(err) = do_redirect(&flags.redirs[i]) {
            if backup_fd >= 0 {
                unsafe { libc::close(backup_fd) };
            }
            revert(flags, scopes, argv0);
            return Err(err);
        }

        flags.redirs[i].backup = Some(if backup_fd >= 0 {
            Backup::Saved(backup_fd)
        } else {
            Backup::WasClosed
        });
    }

    for (key, value) in &flags.assigns {
        scopes.set(key, value);
    }

    Ok(())
}

/// Undo a reversible apply: pop the scope frame and restore every
/// backed-up descriptor. Failure to restore is fatal — the descriptor
/// table can no longer be trusted.
pub fn revert(flags: &mut RunFlags, scopes: &mut ScopeStack, argv0: &str) {
    let _ = scopes.pop_frame();

    for op in flags.redirs.iter_mut() {
        match op.backup.take() {
            None => {}
            Some(Backup::Saved(fd)) => {
                if unsafe { libc::dup2(fd, op.from) } < 0 {
                    errors::fatal_hcf(argv0, "failed to revert redirections");
                }
                unsafe { libc::close(fd) };
            }
            Some(Backup::WasClosed) => {
                unsafe { libc::close(op.from) };
            }
        }
    }
}

/// Perform one redirection on the live descriptor table.
fn do_redirect(op: &RedirOp) -> Result<(), MeshError> {
    match &op.target {
        RedirTarget::Fd(to) => {
            if unsafe { libc::dup2(*to, op.from) } < 0 {
                return Err(MeshError::general("dup failed"));
            }
        }
        RedirTarget::File { path, oflags } => {
            let c_path = CString::new(path.as_str())
                .map_err(|_| MeshError::general(format!("invalid path '{}'", path)))?;

            let file_fd =
                unsafe { libc::open(c_path.as_ptr(), *oflags, 0o644 as libc::c_int) };
            if file_fd < 0 {
                return Err(MeshError::general(format!(
                    "open failed on {}: {}",
                    path,
                    io::Error::last_os_error()
                )));
            }

            let res = unsafe { libc::dup2(file_fd, op.from) };
            unsafe { libc::close(file_fd) };
            if res < 0 {
                return Err(MeshError::general("dup failed"));
            }
        }
        RedirTarget::Close => {
            unsafe { libc::close(op.from) };
        }
    }

    Ok(())
}

fn set_cloexec(fd: i32) {
    unsafe {
        let fd_flags = libc::fcntl(fd, libc::F_GETFD);
        libc::fcntl(fd, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC);
    }
}
