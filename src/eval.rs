//! Evaluator
//!
//! Walks the AST with an inherited flag set that starts empty at the
//! top of each line. Leaf commands are expanded into an argv and
//! dispatched: meta-commands and builtins run in-process under the
//! reversible flag discipline, everything else forks and execs. Meta
//! handlers may hand back a rewritten command string, which re-enters
//! the evaluator as a fresh program with a clean flag set.

use std::io::{self, Write};

use crate::ast::{CondKind, Node, Prefix, Word};
use crate::builtins;
use crate::errors;
use crate::exec;
use crate::expand;
use crate::flags::{self, RedirOp, RunFlags};
use crate::meta::{self, MetaAction};
use crate::parser;
use crate::shell::Shell;

/// Parse and evaluate one line. A rejected line discards everything and
/// reports a syntax error.
pub fn eval_line(shell: &mut Shell, input: &str) -> i32 {
    match parser::parse(input) {
        Err(err) => {
            errors::report(&err);
            1
        }
        Ok(None) => 0,
        Ok(Some(node)) => eval_node(shell, &node, &RunFlags::default()),
    }
}

fn eval_node(shell: &mut Shell, node: &Node, inherited: &RunFlags) -> i32 {
    match node {
        // The async separator is honored syntactically only; both sides
        // run in order
        Node::Sequence { left, right, .. } => {
            let status = eval_node(shell, left, &RunFlags::default());
            match right {
                Some(right) => eval_node(shell, right, &RunFlags::default()),
                None => status,
            }
        }
        Node::Cond { kind, left, right } => {
            let status = eval_node(shell, left, inherited);
            match kind {
                CondKind::And if status == 0 => eval_node(shell, right, inherited),
                CondKind::Or if status != 0 => eval_node(shell, right, inherited),
                _ => status,
            }
        }
        Node::Pipe { left, right } => eval_pipe(shell, left, right, inherited),
        Node::Command { prefixes, words } => eval_command(shell, prefixes, words, inherited),
    }
}

/// `A | B`: splice A's stdout and B's stdin through a pipe pair. The
/// write end closes before B runs so B sees EOF; the pipeline status is
/// B's status.
fn eval_pipe(shell: &mut Shell, left: &Node, right: &Node, inherited: &RunFlags) -> i32 {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        errors::error("failed to create pipe");
        return 1;
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let mut left_flags = inherited.clone();
    left_flags.redirs.push(RedirOp::dup(1, write_fd));
    let _ = eval_node(shell, left, &left_flags);
    unsafe { libc::close(write_fd) };

    let mut right_flags = inherited.clone();
    right_flags.redirs.push(RedirOp::dup(0, read_fd));
    let status = eval_node(shell, right, &right_flags);
    unsafe { libc::close(read_fd) };

    status
}

fn eval_command(
    shell: &mut Shell,
    prefixes: &[Prefix],
    words: &[Word],
    inherited: &RunFlags,
) -> i32 {
    let mut local = inherited.clone();

    for prefix in prefixes {
        match prefix {
            Prefix::Assign { name, value } => {
                let expanded = expand::expand_to_string(shell, value);
                local.assigns.push((name.clone(), expanded));
            }
            Prefix::Redirect(redirect) => {
                let target = expand::expand_to_string(shell, &redirect.target);
                match flags::redir_to_op(redirect.kind, redirect.fd, &target) {
                    Ok(op) => local.redirs.push(op),
                    Err(err) => {
                        errors::report(&err);
                        return err.status();
                    }
                }
            }
        }
    }

    let argv = expand::expand_words_to_argv(shell, words);
    if argv.is_empty() {
        return eval_shell_env(shell, local);
    }

    dispatch(shell, &argv, &mut local)
}

/// A command with no body: redirections are performed and undone,
/// assignments go to the environment table un-exported.
fn eval_shell_env(shell: &mut Shell, mut local: RunFlags) -> i32 {
    if !local.redirs.is_empty() {
        let mut redir_only = RunFlags {
            redirs: std::mem::take(&mut local.redirs),
            assigns: Vec::new(),
        };
        let argv0 = shell.argv0.clone();
        if let Err(err) = flags::apply_reversible(&mut redir_only, &mut shell.scopes, &argv0) {
            errors::report(&err);
            return 1;
        }
        flags::revert(&mut redir_only, &mut shell.scopes, &argv0);
    }

    for (key, value) in &local.assigns {
        shell.vars.set(key, value);
    }

    0
}

/// Decide how to run one expanded argv: meta, builtin, or external.
fn dispatch(shell: &mut Shell, argv: &[String], local: &mut RunFlags) -> i32 {
    let name = argv[0].as_str();

    if name.starts_with(':') {
        return dispatch_meta(shell, argv, local);
    }

    if let Some(builtin) = builtins::find(name) {
        let argv0 = shell.argv0.clone();
        if let Err(err) = flags::apply_reversible(local, &mut shell.scopes, &argv0) {
            errors::report(&err);
            return 1;
        }

        let status = (builtin.func)(shell, argv);
        flush_stdio();
        flags::revert(local, &mut shell.scopes, &argv0);
        return status;
    }

    exec::exec_normal(shell, argv, local)
}

/// Run a meta command under reversible flags. A rewrite re-enters the
/// evaluator as a fresh program (empty flag set) and lands in the
/// `history` context.
fn dispatch_meta(shell: &mut Shell, argv: &[String], local: &mut RunFlags) -> i32 {
    let argv0 = shell.argv0.clone();
    if let Err(err) = flags::apply_reversible(local, &mut shell.scopes, &argv0) {
        errors::report(&err);
        return 1;
    }

    let result = meta::run_meta(shell, argv);
    flush_stdio();

    let status = match result {
        Err(err) => {
            errors::report(&err);
            err.status()
        }
        Ok(MetaAction::Done) => 0,
        Ok(MetaAction::Rewrite(command)) => {
            let status = eval_line(shell, &command);
            shell.contexts.hist_add(&command);
            status
        }
    };

    flags::revert(local, &mut shell.scopes, &argv0);
    status
}

fn flush_stdio() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}
