//! Lexer
//!
//! Tokenizes a byte string into operators and words. Quoting structure
//! is preserved inside word tokens so the expander can apply the right
//! rules per region. A `#` at line start or after whitespace begins a
//! comment; newlines act as command separators.

use crate::ast::{Word, WordPart};
use crate::errors::MeshError;

/// Shell tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(Word),
    /// Digit run immediately preceding a redirection operator.
    Number(i32),

    Semi, // ;
    Amp,  // &
    AndAnd,
    OrOr,
    Pipe,

    Great,     // >
    Clobber,   // >|
    DGreat,    // >>
    GreatAnd,  // >&
    Less,      // <
    LessAnd,   // <&
    LessGreat, // <>
}

impl Token {
    fn ends_command(&self) -> bool {
        matches!(self, Token::Word(_) | Token::Number(_))
    }
}

/// Tokenize a full input line (or `-c` string, which may span lines).
pub fn tokenize(input: &str) -> Result<Vec<Token>, MeshError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let ch = chars[pos];

        match ch {
            ' ' | '\t' => {
                pos += 1;
            }
            '\n' => {
                // A newline separates commands, but only after something
                // that can end one; otherwise it is blank filler.
                if tokens.last().is_some_and(Token::ends_command) {
                    tokens.push(Token::Semi);
                }
                pos += 1;
            }
            '#' if comment_starts_here(&chars, pos) => {
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
            }
            ';' => {
                tokens.push(Token::Semi);
                pos += 1;
            }
            '&' => {
                if chars.get(pos + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    pos += 2;
                } else {
                    tokens.push(Token::Amp);
                    pos += 1;
                }
            }
            '|' => {
                if chars.get(pos + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    pos += 2;
                } else {
                    tokens.push(Token::Pipe);
                    pos += 1;
                }
            }
            '>' => match chars.get(pos + 1) {
                Some('>') => {
                    tokens.push(Token::DGreat);
                    pos += 2;
                }
                Some('&') => {
                    tokens.push(Token::GreatAnd);
                    pos += 2;
                }
                Some('|') => {
                    tokens.push(Token::Clobber);
                    pos += 2;
                }
                _ => {
                    tokens.push(Token::Great);
                    pos += 1;
                }
            },
            '<' => match chars.get(pos + 1) {
                Some('&') => {
                    tokens.push(Token::LessAnd);
                    pos += 2;
                }
                Some('>') => {
                    tokens.push(Token::LessGreat);
                    pos += 2;
                }
                _ => {
                    tokens.push(Token::Less);
                    pos += 1;
                }
            },
            _ => {
                let word = lex_word(&chars, &mut pos)?;
                let next_is_redir = matches!(chars.get(pos), Some('>') | Some('<'));
                match word.as_fd_number() {
                    Some(n) if next_is_redir => tokens.push(Token::Number(n)),
                    _ => tokens.push(Token::Word(word)),
                }
            }
        }
    }

    Ok(tokens)
}

fn comment_starts_here(chars: &[char], pos: usize) -> bool {
    match pos.checked_sub(1).and_then(|i| chars.get(i)) {
        None => true,
        Some(&prev) => prev == ' ' || prev == '\t' || prev == '\n',
    }
}

fn is_word_terminator(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | ';' | '&' | '|' | '>' | '<')
}

fn lex_word(chars: &[char], pos: &mut usize) -> Result<Word, MeshError> {
    let mut parts: Vec<WordPart> = Vec::new();
    let mut lit = String::new();

    fn flush(lit: &mut String, parts: &mut Vec<WordPart>) {
        if !lit.is_empty() {
            parts.push(WordPart::Literal(std::mem::take(lit)));
        }
    }

    while *pos < chars.len() {
        let ch = chars[*pos];

        if is_word_terminator(ch) {
            break;
        }

        match ch {
            '\'' => {
                flush(&mut lit, &mut parts);
                *pos += 1;
                let mut content = String::new();
                loop {
                    match chars.get(*pos) {
                        None => return Err(MeshError::Syntax),
                        Some('\'') => {
                            *pos += 1;
                            break;
                        }
                        Some(&c) => {
                            content.push(c);
                            *pos += 1;
                        }
                    }
                }
                parts.push(WordPart::SingleQuoted(content));
            }
            '"' => {
                flush(&mut lit, &mut parts);
                *pos += 1;
                parts.push(WordPart::DoubleQuoted(lex_double_quoted(chars, pos)?));
            }
            '\\' => {
                *pos += 1;
                match chars.get(*pos) {
                    None => {
                        // Dangling backslash at end of input stays literal
                        lit.push('\\');
                    }
                    Some(&c) => {
                        flush(&mut lit, &mut parts);
                        parts.push(WordPart::Escaped(c));
                        *pos += 1;
                    }
                }
            }
            '$' => {
                flush(&mut lit, &mut parts);
                *pos += 1;
                parts.push(lex_dollar(chars, pos)?);
            }
            '~' if parts.is_empty() && lit.is_empty() => {
                parts.push(WordPart::Tilde);
                *pos += 1;
            }
            _ => {
                lit.push(ch);
                *pos += 1;
            }
        }
    }

    flush(&mut lit, &mut parts);
    Ok(Word { parts })
}

/// Lex the interior of a double-quoted region, consuming the closing quote.
fn lex_double_quoted(chars: &[char], pos: &mut usize) -> Result<Vec<WordPart>, MeshError> {
    let mut parts: Vec<WordPart> = Vec::new();
    let mut lit = String::new();

    fn flush(lit: &mut String, parts: &mut Vec<WordPart>) {
        if !lit.is_empty() {
            parts.push(WordPart::Literal(std::mem::take(lit)));
        }
    }

    loop {
        match chars.get(*pos) {
            None => return Err(MeshError::Syntax),
            Some('"') => {
                *pos += 1;
                break;
            }
            Some('\\') => {
                // Only \" and \\ are escapes inside double quotes
                match chars.get(*pos + 1) {
                    Some(&c) if c == '"' || c == '\\' => {
                        flush(&mut lit, &mut parts);
                        parts.push(WordPart::Escaped(c));
                        *pos += 2;
                    }
                    _ => {
                        lit.push('\\');
                        *pos += 1;
                    }
                }
            }
            Some('$') => {
                flush(&mut lit, &mut parts);
                *pos += 1;
                parts.push(lex_dollar(chars, pos)?);
            }
            Some(&c) => {
                lit.push(c);
                *pos += 1;
            }
        }
    }

    flush(&mut lit, &mut parts);
    Ok(parts)
}

/// Lex the part after an unescaped `$`.
fn lex_dollar(chars: &[char], pos: &mut usize) -> Result<WordPart, MeshError> {
    match chars.get(*pos) {
        None => Ok(WordPart::Literal("$".to_string())),
        Some('(') => {
            *pos += 1;
            let mut body = String::new();
            let mut depth = 1;
            loop {
                match chars.get(*pos) {
                    None => return Err(MeshError::Syntax),
                    Some('(') => {
                        depth += 1;
                        body.push('(');
                        *pos += 1;
                    }
                    Some(')') => {
                        depth -= 1;
                        *pos += 1;
                        if depth == 0 {
                            break;
                        }
                        body.push(')');
                    }
                    Some(&c) => {
                        body.push(c);
                        *pos += 1;
                    }
                }
            }
            Ok(WordPart::CommandSubst(body))
        }
        Some(&c) if c == '?' || c == '$' || c == '#' || c == '@' => {
            *pos += 1;
            Ok(WordPart::Special(c))
        }
        Some(c) if c.is_ascii_digit() => {
            let mut digits = String::new();
            while let Some(&d) = chars.get(*pos) {
                if !d.is_ascii_digit() {
                    break;
                }
                digits.push(d);
                *pos += 1;
            }
            Ok(WordPart::Positional(digits.parse().unwrap_or(u32::MAX)))
        }
        Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
            let mut name = String::new();
            while let Some(&n) = chars.get(*pos) {
                if !(n.is_ascii_alphanumeric() || n == '_') {
                    break;
                }
                name.push(n);
                *pos += 1;
            }
            Ok(WordPart::Variable(name))
        }
        // `$` before anything else resolves to nothing, like an unset name
        Some(_) => Ok(WordPart::Variable(String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str) -> Token {
        Token::Word(Word::literal(text))
    }

    #[test]
    fn test_simple_words() {
        let tokens = tokenize("echo hello world").unwrap();
        assert_eq!(tokens, vec![word("echo"), word("hello"), word("world")]);
    }

    #[test]
    fn test_operators() {
        let tokens = tokenize("a && b || c ; d & e | f").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("a"),
                Token::AndAnd,
                word("b"),
                Token::OrOr,
                word("c"),
                Token::Semi,
                word("d"),
                Token::Amp,
                word("e"),
                Token::Pipe,
                word("f"),
            ]
        );
    }

    #[test]
    fn test_redirection_operators() {
        let tokens = tokenize("a > f >> g >| h <> i < j").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("a"),
                Token::Great,
                word("f"),
                Token::DGreat,
                word("g"),
                Token::Clobber,
                word("h"),
                Token::LessGreat,
                word("i"),
                Token::Less,
                word("j"),
            ]
        );
    }

    #[test]
    fn test_fd_number_before_redirection() {
        let tokens = tokenize("cmd 2>&1").unwrap();
        assert_eq!(
            tokens,
            vec![word("cmd"), Token::Number(2), Token::GreatAnd, word("1")]
        );

        // With a space, "2" is an ordinary argument
        let tokens = tokenize("cmd 2 >&1").unwrap();
        assert_eq!(
            tokens,
            vec![word("cmd"), word("2"), Token::GreatAnd, word("1")]
        );
    }

    #[test]
    fn test_quoting() {
        let tokens = tokenize("echo 'a b' \"c d\"").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                Token::Word(Word::new(vec![WordPart::SingleQuoted("a b".into())])),
                Token::Word(Word::new(vec![WordPart::DoubleQuoted(vec![
                    WordPart::Literal("c d".into())
                ])])),
            ]
        );
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(tokenize("echo 'oops").is_err());
        assert!(tokenize("echo \"oops").is_err());
    }

    #[test]
    fn test_variable_parts() {
        let tokens = tokenize("echo $HOME$1$?x").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                Token::Word(Word::new(vec![
                    WordPart::Variable("HOME".into()),
                    WordPart::Positional(1),
                    WordPart::Special('?'),
                    WordPart::Literal("x".into()),
                ])),
            ]
        );
    }

    #[test]
    fn test_command_substitution() {
        let tokens = tokenize("echo $(date +%s)").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                Token::Word(Word::new(vec![WordPart::CommandSubst("date +%s".into())])),
            ]
        );

        // Nested parentheses stay balanced
        let tokens = tokenize("echo $(a $(b) c)").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                Token::Word(Word::new(vec![WordPart::CommandSubst("a $(b) c".into())])),
            ]
        );

        assert!(tokenize("echo $(oops").is_err());
    }

    #[test]
    fn test_expansion_inside_double_quotes() {
        let tokens = tokenize("echo \"[$(echo inner)] $X\"").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                Token::Word(Word::new(vec![WordPart::DoubleQuoted(vec![
                    WordPart::Literal("[".into()),
                    WordPart::CommandSubst("echo inner".into()),
                    WordPart::Literal("] ".into()),
                    WordPart::Variable("X".into()),
                ])])),
            ]
        );
    }

    #[test]
    fn test_no_expansion_in_single_quotes() {
        let tokens = tokenize("echo '$HOME'").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                Token::Word(Word::new(vec![WordPart::SingleQuoted("$HOME".into())])),
            ]
        );
    }

    #[test]
    fn test_escape() {
        let tokens = tokenize(r"echo a\ b \$HOME").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                Token::Word(Word::new(vec![
                    WordPart::Literal("a".into()),
                    WordPart::Escaped(' '),
                    WordPart::Literal("b".into()),
                ])),
                Token::Word(Word::new(vec![
                    WordPart::Escaped('$'),
                    WordPart::Literal("HOME".into()),
                ])),
            ]
        );
    }

    #[test]
    fn test_tilde_only_at_word_start() {
        let tokens = tokenize("cd ~/src a~b").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("cd"),
                Token::Word(Word::new(vec![
                    WordPart::Tilde,
                    WordPart::Literal("/src".into()),
                ])),
                word("a~b"),
            ]
        );
    }

    #[test]
    fn test_comments() {
        let tokens = tokenize("echo hi # trailing comment").unwrap();
        assert_eq!(tokens, vec![word("echo"), word("hi")]);

        let tokens = tokenize("# whole line").unwrap();
        assert!(tokens.is_empty());

        // Not preceded by whitespace: literal
        let tokens = tokenize("echo a#b").unwrap();
        assert_eq!(tokens, vec![word("echo"), word("a#b")]);

        // Inside quotes: literal
        let tokens = tokenize("echo '#x'").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                Token::Word(Word::new(vec![WordPart::SingleQuoted("#x".into())])),
            ]
        );
    }

    #[test]
    fn test_newlines_separate_commands() {
        let tokens = tokenize("a\nb\n").unwrap();
        assert_eq!(
            tokens,
            vec![word("a"), Token::Semi, word("b"), Token::Semi]
        );

        // Blank lines and continuation after && produce no separator
        let tokens = tokenize("\n\na &&\nb").unwrap();
        assert_eq!(tokens, vec![word("a"), Token::AndAnd, word("b")]);
    }

    #[test]
    fn test_assignment_word_shape() {
        let tokens = tokenize("X=hello").unwrap();
        assert_eq!(tokens, vec![word("X=hello")]);
    }
}
