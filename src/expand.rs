//! Word Expansion
//!
//! Turns parsed words into final argv strings. Expansion resolves
//! variables, special parameters, positionals, tilde and command
//! substitution while tracking which regions were quoted; a second
//! splitting pass then breaks unquoted regions on spaces and tabs.
//! Quoted empty words survive as empty arguments, unquoted empty
//! expansions vanish.

use std::io;

use crate::ast::{Word, WordPart};
use crate::exec;
use crate::shell::Shell;

/// One expanded region of a word.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    /// Quoted regions are never split and anchor empty arguments.
    pub quoted: bool,
}

fn push_segment(segments: &mut Vec<Segment>, text: String, quoted: bool) {
    if let Some(last) = segments.last_mut() {
        if last.quoted == quoted {
            last.text.push_str(&text);
            return;
        }
    }
    segments.push(Segment { text, quoted });
}

fn push(segments: &mut Vec<Segment>, text: &str, quoted: bool) {
    push_segment(segments, text.to_string(), quoted);
}

/// Expand a word into quote-tagged segments.
pub fn expand_word(shell: &mut Shell, word: &Word) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();

    for part in &word.parts {
        match part {
            WordPart::Literal(text) => push(&mut segments, text, false),
            WordPart::SingleQuoted(text) => push_segment(&mut segments, text.clone(), true),
            WordPart::DoubleQuoted(parts) => {
                let mut text = String::new();
                for inner in parts {
                    text.push_str(&expand_plain(shell, inner));
                }
                push_segment(&mut segments, text, true);
            }
            WordPart::Escaped(c) => push_segment(&mut segments, c.to_string(), true),
            _ => push(&mut segments, &expand_plain(shell, part), false),
        }
    }

    segments
}

/// Expand a word to a single string with no splitting: redirection
/// targets and assignment values.
pub fn expand_to_string(shell: &mut Shell, word: &Word) -> String {
    expand_word(shell, word)
        .into_iter()
        .map(|seg| seg.text)
        .collect()
}

/// Expand and split a list of words into the final argv.
pub fn expand_words_to_argv(shell: &mut Shell, words: &[Word]) -> Vec<String> {
    let mut argv = Vec::new();
    for word in words {
        let segments = expand_word(shell, word);
        argv.extend(word_split(&segments));
    }
    argv
}

/// Second pass: split unquoted segments on spaces and tabs. An empty
/// unquoted field is dropped; a field touched by a quoted segment is
/// kept even when empty.
pub fn word_split(segments: &[Segment]) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut anchored = false;

    for seg in segments {
        if seg.quoted {
            current.push_str(&seg.text);
            anchored = true;
        } else {
            for ch in seg.text.chars() {
                if ch == ' ' || ch == '\t' {
                    if !current.is_empty() || anchored {
                        args.push(std::mem::take(&mut current));
                        anchored = false;
                    }
                } else {
                    current.push(ch);
                }
            }
        }
    }

    if !current.is_empty() || anchored {
        args.push(current);
    }

    args
}

/// Resolve one expandable part to its text. Unresolved names expand to
/// the empty string; a failed command substitution does too.
fn expand_plain(shell: &mut Shell, part: &WordPart) -> String {
    match part {
        WordPart::Literal(text) => text.clone(),
        WordPart::SingleQuoted(text) => text.clone(),
        WordPart::Escaped(c) => c.to_string(),
        WordPart::Variable(name) => shell
            .lookup_var(name)
            .map(|v| v.to_string())
            .unwrap_or_default(),
        WordPart::Special(c) => expand_special(shell, *c),
        WordPart::Positional(n) => shell
            .scopes
            .get_pos(*n as usize)
            .map(|v| v.to_string())
            .unwrap_or_default(),
        WordPart::CommandSubst(cmd) => command_substitution(shell, cmd).unwrap_or_default(),
        WordPart::Tilde => shell
            .vars
            .get("HOME")
            .map(|v| v.to_string())
            .unwrap_or_default(),
        WordPart::DoubleQuoted(parts) => {
            let mut text = String::new();
            for inner in parts {
                text.push_str(&expand_plain(shell, inner));
            }
            text
        }
    }
}

fn expand_special(shell: &Shell, c: char) -> String {
    match c {
        // `?` and `$` live in the environment table; `#` and `@` come
        // from the scope frame
        '?' | '$' => shell
            .vars
            .get(&c.to_string())
            .map(|v| v.to_string())
            .unwrap_or_default(),
        '#' | '@' => shell
            .scopes
            .get(&c.to_string())
            .map(|v| v.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Run `$(cmd)` in a subshell and capture its standard output. One
/// trailing newline is dropped and interior newlines become spaces.
fn command_substitution(shell: &mut Shell, cmd: &str) -> Option<String> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return None;
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);

    if exec::exec_subshell(shell, cmd, write_fd) < 0 {
        unsafe { libc::close(read_fd) };
        return None;
    }

    let mut output: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = unsafe {
            libc::read(read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
        };
        if n < 0 {
            if io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            break;
        }
        if n == 0 {
            break;
        }
        output.extend_from_slice(&buf[..n as usize]);
    }
    unsafe { libc::close(read_fd) };

    let mut text = String::from_utf8_lossy(&output).into_owned();
    if text.ends_with('\n') {
        text.pop();
    }
    Some(text.replace('\n', " "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenize;
    use crate::parser::Token;

    fn shell() -> Shell {
        let mut shell = Shell::new("mesh");
        shell.vars.set("GREETING", "hello");
        shell.vars.set("SPACED", "a b");
        shell
    }

    /// Lex a single word out of the input.
    fn word(input: &str) -> Word {
        match tokenize(input).unwrap().remove(0) {
            Token::Word(w) => w,
            other => panic!("expected word, got {:?}", other),
        }
    }

    fn expand_args(shell: &mut Shell, input: &str) -> Vec<String> {
        let w = word(input);
        expand_words_to_argv(shell, &[w])
    }

    #[test]
    fn test_variable_expansion() {
        let mut shell = shell();
        assert_eq!(expand_args(&mut shell, "$GREETING"), vec!["hello"]);
        assert_eq!(expand_args(&mut shell, "pre-$GREETING"), vec!["pre-hello"]);
    }

    #[test]
    fn test_unresolved_expands_to_empty() {
        let mut shell = shell();
        assert!(expand_args(&mut shell, "$NO_SUCH_VAR").is_empty());
        assert_eq!(expand_args(&mut shell, "a$NO_SUCH_VAR"), vec!["a"]);
    }

    #[test]
    fn test_expansion_is_stable() {
        let mut shell = shell();
        let w = word("$GREETING-$SPACED");
        let first = expand_to_string(&mut shell, &w);
        let second = expand_to_string(&mut shell, &w);
        assert_eq!(first, second);
        assert_eq!(first, "hello-a b");
    }

    #[test]
    fn test_single_quotes_are_literal() {
        let mut shell = shell();
        assert_eq!(expand_args(&mut shell, "'$GREETING'"), vec!["$GREETING"]);
    }

    #[test]
    fn test_double_quotes_expand_without_splitting() {
        let mut shell = shell();
        assert_eq!(expand_args(&mut shell, "\"$SPACED\""), vec!["a b"]);
        assert_eq!(expand_args(&mut shell, "$SPACED"), vec!["a", "b"]);
    }

    #[test]
    fn test_quoted_empty_survives() {
        let mut shell = shell();
        assert_eq!(expand_args(&mut shell, "\"\""), vec![""]);
        assert_eq!(expand_args(&mut shell, "''"), vec![""]);
        assert_eq!(expand_args(&mut shell, "\"$NO_SUCH_VAR\""), vec![""]);
    }

    #[test]
    fn test_escape_prevents_splitting() {
        let mut shell = shell();
        assert_eq!(expand_args(&mut shell, "a\\ b"), vec!["a b"]);
        assert_eq!(expand_args(&mut shell, "\\$GREETING"), vec!["$GREETING"]);
    }

    #[test]
    fn test_tilde() {
        let mut shell = shell();
        shell.vars.set("HOME", "/home/u");
        assert_eq!(expand_args(&mut shell, "~/src"), vec!["/home/u/src"]);
        assert_eq!(expand_args(&mut shell, "a~b"), vec!["a~b"]);
    }

    #[test]
    fn test_positionals_and_count() {
        let mut shell = shell();
        shell.scopes.append_pos("one");
        shell.scopes.append_pos("two");
        assert_eq!(expand_args(&mut shell, "$1"), vec!["one"]);
        assert_eq!(expand_args(&mut shell, "$2"), vec!["two"]);
        assert!(expand_args(&mut shell, "$3").is_empty());
        assert_eq!(expand_args(&mut shell, "$#"), vec!["2"]);
        assert_eq!(expand_args(&mut shell, "$@"), vec!["one", "two"]);
        assert_eq!(expand_args(&mut shell, "\"$@\""), vec!["one two"]);
    }

    #[test]
    fn test_last_status_and_pid() {
        let mut shell = shell();
        shell.set_status(7);
        assert_eq!(expand_args(&mut shell, "$?"), vec!["7"]);
        let pid: i32 = expand_args(&mut shell, "$$")[0].parse().unwrap();
        assert!(pid > 0);
    }

    #[test]
    fn test_word_split_merges_adjacent_segments() {
        let segments = vec![
            Segment {
                text: "a".into(),
                quoted: false,
            },
            Segment {
                text: "1 2".into(),
                quoted: false,
            },
        ];
        assert_eq!(word_split(&segments), vec!["a1", "2"]);

        let segments = vec![
            Segment {
                text: "1 2".into(),
                quoted: false,
            },
            Segment {
                text: "3 4".into(),
                quoted: true,
            },
        ];
        assert_eq!(word_split(&segments), vec!["1", "23 4"]);
    }

    #[test]
    fn test_command_substitution() {
        let mut shell = shell();
        assert_eq!(expand_args(&mut shell, "$(echo inner)"), vec!["inner"]);
        assert_eq!(
            expand_args(&mut shell, "\"[$(echo inner)]\""),
            vec!["[inner]"]
        );
    }

    #[test]
    fn test_command_substitution_flattens_newlines() {
        let mut shell = shell();
        let w = word("\"$(printf 'a\\nb\\n')\"");
        assert_eq!(expand_to_string(&mut shell, &w), "a b");
    }

    #[test]
    fn test_failed_substitution_is_empty() {
        let mut shell = shell();
        assert_eq!(
            expand_args(&mut shell, "\"$(no-such-program-xyz)\""),
            vec![""]
        );
    }
}
