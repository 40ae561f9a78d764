//! Built-in Commands
//!
//! `exit cd set export exec` run in the shell process under the
//! reversible flag discipline. Exit codes: 0 ok, 1 general failure,
//! 2 usage error, 128 for `exit` with a non-numeric argument.

use std::io::{self, Write};
use std::ptr;

use crate::errors;
use crate::shell::Shell;

pub const CODE_OK: i32 = 0;
pub const CODE_GEN_ERROR: i32 = 1;
pub const CODE_USAGE_ERROR: i32 = 2;
pub const CODE_EXIT_ERROR: i32 = 128;

pub struct Builtin {
    pub name: &'static str,
    pub func: fn(&mut Shell, &[String]) -> i32,
}

static REGISTRY: &[Builtin] = &[
    Builtin {
        name: "exit",
        func: shell_exit,
    },
    Builtin {
        name: "cd",
        func: shell_cd,
    },
    Builtin {
        name: "set",
        func: shell_set,
    },
    Builtin {
        name: "export",
        func: shell_export,
    },
    Builtin {
        name: "exec",
        func: shell_exec,
    },
];

pub fn find(name: &str) -> Option<&'static Builtin> {
    REGISTRY.iter().find(|b| b.name == name)
}

fn shell_exit(_shell: &mut Shell, argv: &[String]) -> i32 {
    if argv.len() > 2 {
        errors::error("exit: too many arguments");
        return CODE_USAGE_ERROR;
    }

    let code = match argv.get(1) {
        None => 0,
        Some(arg) => match arg.parse::<i32>() {
            Ok(code) => code,
            Err(_) => {
                errors::error(&format!("exit: invalid exit code '{}'", arg));
                return CODE_EXIT_ERROR;
            }
        },
    };

    let _ = io::stdout().flush();
    std::process::exit(code);
}

fn shell_cd(shell: &mut Shell, argv: &[String]) -> i32 {
    if argv.len() > 2 {
        errors::error("cd: too many arguments");
        return CODE_USAGE_ERROR;
    }

    let mut target = match argv.get(1) {
        Some(arg) => arg.clone(),
        None => match shell.vars.get("HOME") {
            Some(home) => home.to_string(),
            None => {
                errors::error("cd: HOME not set");
                return CODE_GEN_ERROR;
            }
        },
    };

    if target == "-" {
        match shell.vars.get("OLDPWD") {
            Some(oldpwd) => {
                target = oldpwd.to_string();
                println!("{}", target);
            }
            None => {
                errors::error("cd: nowhere to go");
                return CODE_GEN_ERROR;
            }
        }
    }

    if let Err(err) = std::env::set_current_dir(&target) {
        errors::error(&format!("cd: {}: {}", target, err));
        return CODE_GEN_ERROR;
    }

    let old_pwd = shell.vars.get("PWD").unwrap_or_default().to_string();
    shell.vars.set("OLDPWD", &old_pwd);
    if let Ok(pwd) = std::env::current_dir() {
        shell.vars.set("PWD", &pwd.to_string_lossy());
    }

    CODE_OK
}

fn shell_set(shell: &mut Shell, argv: &[String]) -> i32 {
    if argv.len() > 1 {
        // Option handling is documented but not implemented
        errors::error("set: this function is not implemented");
        return CODE_USAGE_ERROR;
    }

    let _ = shell.vars.print_all(&mut io::stdout(), false);
    CODE_OK
}

fn shell_export(shell: &mut Shell, argv: &[String]) -> i32 {
    if argv.len() == 1 {
        let _ = shell.vars.print_all(&mut io::stdout(), true);
        return CODE_OK;
    }

    for arg in &argv[1..] {
        match arg.find('=') {
            Some(eq) => {
                let (name, value) = (&arg[..eq], &arg[eq + 1..]);
                shell.vars.set(name, value);
                shell.vars.set_export(name);
            }
            None => {
                if !shell.vars.set_export(arg) {
                    shell.vars.set(arg, "");
                    shell.vars.set_export(arg);
                }
            }
        }
    }

    CODE_OK
}

/// Replace the shell process with the target program; no fork.
fn shell_exec(shell: &mut Shell, argv: &[String]) -> i32 {
    if argv.len() == 1 {
        return CODE_OK;
    }

    let target = &argv[1..];
    let env = shell.vars.export_strings();

    let collect = |items: &[String]| -> Option<Vec<std::ffi::CString>> {
        items
            .iter()
            .map(|s| std::ffi::CString::new(s.as_str()).ok())
            .collect()
    };
    let (Some(argv_c), Some(env_c)) = (collect(target), collect(&env)) else {
        errors::error("exec: invalid argument string");
        return CODE_GEN_ERROR;
    };

    let mut argv_p: Vec<*const libc::c_char> = argv_c.iter().map(|c| c.as_ptr()).collect();
    argv_p.push(ptr::null());
    let mut env_p: Vec<*const libc::c_char> = env_c.iter().map(|c| c.as_ptr()).collect();
    env_p.push(ptr::null());

    let _ = io::stdout().flush();
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        libc::signal(libc::SIGQUIT, libc::SIG_DFL);
        libc::execvpe(argv_p[0], argv_p.as_ptr(), env_p.as_ptr());
    }

    errors::error(&format!("exec: {}: command not found", target[0]));
    CODE_GEN_ERROR
}
