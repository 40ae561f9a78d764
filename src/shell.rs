//! Shell State
//!
//! All process-wide registries live on one `Shell` value threaded
//! through the evaluator: the environment table, the scope stack, the
//! context registry, the on-disk store view, and the cached root
//! program used by `:asroot`.

use crate::context::ContextRegistry;
use crate::errors;
use crate::eval;
use crate::exec;
use crate::scope::ScopeStack;
use crate::store::Store;
use crate::vars::VarStore;

pub struct Shell {
    pub vars: VarStore,
    pub scopes: ScopeStack,
    pub contexts: ContextRegistry,
    pub store: Store,
    /// Invocation name, used by the fatal restart path.
    pub argv0: String,
    root_prog: Option<String>,
}

impl Shell {
    /// Build the shell state: import the external environment, seed the
    /// shell-set variables, and install the `history` context.
    pub fn new(argv0: &str) -> Self {
        let mut shell = Shell {
            vars: VarStore::new(),
            scopes: ScopeStack::new(),
            contexts: ContextRegistry::new(),
            store: Store::new(),
            argv0: argv0.to_string(),
            root_prog: None,
        };

        shell.vars.import(
            std::env::vars_os()
                .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned())),
        );

        if shell.vars.get("PS1").is_none() {
            let ps1 = if unsafe { libc::getuid() } == 0 {
                "# "
            } else {
                "$ "
            };
            shell.vars.set("PS1", ps1);
        }

        let pid = unsafe { libc::getpid() };
        shell.vars.set("$", &pid.to_string());
        shell.vars.set("?", "0");

        if let Ok(pwd) = std::env::current_dir() {
            shell.vars.set("PWD", &pwd.to_string_lossy());
        }

        shell
    }

    /// Variable lookup for the expander: scope shadows environment.
    pub fn lookup_var(&self, name: &str) -> Option<&str> {
        self.scopes.get(name).or_else(|| self.vars.get(name))
    }

    pub fn set_status(&mut self, status: i32) {
        self.vars.set("?", &status.to_string());
    }

    pub fn last_status(&self) -> i32 {
        self.vars
            .get("?")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Evaluate one input line, record it into the current context, and
    /// write the status to `?`.
    pub fn process_line(&mut self, line: &str) -> i32 {
        let line = line.trim_end_matches('\n');
        if line.trim().is_empty() {
            return 0;
        }

        let status = eval::eval_line(self, line);

        if !line.starts_with(':') {
            self.contexts.record(line);
        }

        self.set_status(status);
        status
    }

    /// Resolve the program used to become root: `$ASROOTCMD`, else the
    /// first of `doas`/`sudo` found on the system. Cached once found.
    pub fn root_program(&mut self) -> Option<String> {
        if let Some(prog) = &self.root_prog {
            return Some(prog.clone());
        }

        if let Some(cmd) = self.vars.get("ASROOTCMD") {
            let cmd = cmd.to_string();
            self.root_prog = Some(cmd.clone());
            return Some(cmd);
        }

        for candidate in ["doas", "sudo"] {
            let argv = ["which".to_string(), candidate.to_string()];
            if exec::exec_silent(self, &argv) == 0 {
                self.root_prog = Some(candidate.to_string());
                return Some(candidate.to_string());
            }
        }

        None
    }

    /// Fatal invariant failure: hand off to the restart path.
    pub fn fatal(&self, msg: &str) -> ! {
        errors::fatal_hcf(&self.argv0, msg)
    }
}
