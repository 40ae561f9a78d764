//! Executors
//!
//! Fork/exec plumbing: running external programs with the child-side
//! flag apply, the silent probe used to detect `doas`/`sudo`, and the
//! subshell that re-enters the evaluator for command substitution.
//! All waits are blocking and target the immediate child only.

use std::ffi::CString;
use std::io::{self, Write};
use std::ptr;

use crate::errors;
use crate::eval;
use crate::flags::{self, RunFlags};
use crate::shell::Shell;

/// Run an external program: fork, apply flags irreversibly in the
/// child, load the exported environment, reset signals and `execvp`.
/// Returns the child's exit status.
pub fn exec_normal(shell: &mut Shell, argv: &[String], run_flags: &RunFlags) -> i32 {
    flush_stdio();

    match unsafe { libc::fork() } {
        -1 => {
            errors::error("failed to create new process");
            1
        }
        0 => {
            if flags::apply(run_flags, &mut shell.vars).is_err() {
                errors::error("failed to perform redirections");
                unsafe { libc::_exit(1) }
            }
            child_exec(shell, argv)
        }
        pid => wait_for(pid),
    }
}

/// Like `exec_normal` but with stdout pointed at `/dev/null` and no
/// flag application. Used to probe for programs.
pub fn exec_silent(shell: &mut Shell, argv: &[String]) -> i32 {
    flush_stdio();

    match unsafe { libc::fork() } {
        -1 => {
            errors::error("failed to create new process");
            1
        }
        0 => {
            unsafe {
                let devnull = CString::new("/dev/null").unwrap();
                let null_fd = libc::open(devnull.as_ptr(), libc::O_WRONLY);
                if null_fd >= 0 {
                    libc::dup2(null_fd, libc::STDOUT_FILENO);
                    libc::close(null_fd);
                }
            }
            child_exec(shell, argv)
        }
        pid => wait_for(pid),
    }
}

/// Fork a subshell whose stdout is `out_fd` and evaluate `cmd` in it.
/// The child inherits the shell state copy-on-write, always exits 0,
/// and `out_fd` is closed in the parent so readers see EOF. Returns the
/// child status, or -1 when the fork failed.
pub fn exec_subshell(shell: &mut Shell, cmd: &str, out_fd: i32) -> i32 {
    flush_stdio();

    match unsafe { libc::fork() } {
        -1 => {
            errors::error("failed to create new process");
            unsafe { libc::close(out_fd) };
            -1
        }
        0 => {
            unsafe {
                libc::dup2(out_fd, libc::STDOUT_FILENO);
                libc::close(out_fd);
            }
            let _ = eval::eval_line(shell, cmd);
            let _ = io::stdout().flush();
            unsafe { libc::_exit(0) }
        }
        pid => {
            unsafe { libc::close(out_fd) };
            wait_for(pid)
        }
    }
}

/// Shared tail of every exec child: load the exported environment,
/// restore default signal dispositions, `execvp`. Only returns by
/// dying.
fn child_exec(shell: &Shell, argv: &[String]) -> ! {
    let env = shell.vars.export_strings();

    let (Some(argv_c), Some(env_c)) = (cstring_vec(argv), cstring_vec(&env)) else {
        errors::error("invalid argument string");
        unsafe { libc::_exit(1) }
    };
    let argv_p = ptr_vec(&argv_c);
    let env_p = ptr_vec(&env_c);

    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        libc::signal(libc::SIGQUIT, libc::SIG_DFL);
        libc::execvpe(argv_p[0], argv_p.as_ptr(), env_p.as_ptr());
    }

    errors::error(&format!("{}: command not found", argv[0]));
    unsafe { libc::_exit(1) }
}

fn cstring_vec(items: &[String]) -> Option<Vec<CString>> {
    items
        .iter()
        .map(|s| CString::new(s.as_str()).ok())
        .collect()
}

fn ptr_vec(items: &[CString]) -> Vec<*const libc::c_char> {
    let mut ptrs: Vec<*const libc::c_char> = items.iter().map(|c| c.as_ptr()).collect();
    ptrs.push(ptr::null());
    ptrs
}

/// Blocking wait on one child; EINTR retried.
fn wait_for(pid: libc::pid_t) -> i32 {
    let mut status = 0;
    loop {
        if unsafe { libc::waitpid(pid, &mut status, 0) } >= 0 {
            break;
        }
        if io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
            return 1;
        }
    }

    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else {
        1
    }
}

/// Parent-side buffers must be empty before any fork, or the child
/// inherits and replays them.
fn flush_stdio() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}
