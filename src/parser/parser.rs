//! Parser
//!
//! Recursive descent over the token stream:
//!
//! ```text
//! program   := seq_list EOF
//! seq_list  := cond_list ( (';' | '&') cond_list )*      (trailing separator ok)
//! cond_list := pipeline ( ('&&' | '||') pipeline )*
//! pipeline  := command ( '|' command )*
//! command   := ( assignment | redirection | word )+
//! ```
//!
//! Assignments are recognized only before the first argv word;
//! redirections may appear anywhere in the command.

use crate::ast::{CondKind, Node, Prefix, Redirect, RedirKind, SeqKind, Word};
use crate::errors::MeshError;
use crate::parser::lexer::{tokenize, Token};

/// Parse one line of input. `Ok(None)` means the line held no commands
/// (blank or comment-only).
pub fn parse(input: &str) -> Result<Option<Node>, MeshError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };

    if parser.at_end() {
        return Ok(None);
    }

    let node = parser.parse_seq()?;
    if !parser.at_end() {
        return Err(MeshError::Syntax);
    }

    Ok(Some(node))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_seq(&mut self) -> Result<Node, MeshError> {
        let mut node = self.parse_cond()?;

        while let Some(kind) = match self.peek() {
            Some(Token::Semi) => Some(SeqKind::Normal),
            Some(Token::Amp) => Some(SeqKind::Async),
            _ => None,
        } {
            self.advance();

            if self.at_end() {
                // Trailing separator: right side absent
                node = Node::Sequence {
                    kind,
                    left: Box::new(node),
                    right: None,
                };
                break;
            }

            let right = self.parse_cond()?;
            node = Node::Sequence {
                kind,
                left: Box::new(node),
                right: Some(Box::new(right)),
            };
        }

        Ok(node)
    }

    fn parse_cond(&mut self) -> Result<Node, MeshError> {
        let mut node = self.parse_pipeline()?;

        while let Some(kind) = match self.peek() {
            Some(Token::AndAnd) => Some(CondKind::And),
            Some(Token::OrOr) => Some(CondKind::Or),
            _ => None,
        } {
            self.advance();
            let right = self.parse_pipeline()?;
            node = Node::Cond {
                kind,
                left: Box::new(node),
                right: Box::new(right),
            };
        }

        Ok(node)
    }

    fn parse_pipeline(&mut self) -> Result<Node, MeshError> {
        let mut node = self.parse_command()?;

        while matches!(self.peek(), Some(Token::Pipe)) {
            self.advance();
            let right = self.parse_command()?;
            node = Node::Pipe {
                left: Box::new(node),
                right: Box::new(right),
            };
        }

        Ok(node)
    }

    fn parse_command(&mut self) -> Result<Node, MeshError> {
        let mut prefixes: Vec<Prefix> = Vec::new();
        let mut words: Vec<Word> = Vec::new();

        loop {
            match self.peek() {
                Some(Token::Word(_)) => {
                    let word = match self.advance() {
                        Some(Token::Word(w)) => w,
                        _ => unreachable!(),
                    };

                    match word.split_assign() {
                        Some((name, value)) if words.is_empty() => {
                            prefixes.push(Prefix::Assign { name, value });
                        }
                        _ => words.push(word),
                    }
                }
                Some(Token::Number(_)) => {
                    let fd = match self.advance() {
                        Some(Token::Number(n)) => n,
                        _ => unreachable!(),
                    };
                    let redirect = self.parse_redirect(Some(fd))?;
                    prefixes.push(Prefix::Redirect(redirect));
                }
                Some(token) if redir_kind(token).is_some() => {
                    let redirect = self.parse_redirect(None)?;
                    prefixes.push(Prefix::Redirect(redirect));
                }
                _ => break,
            }
        }

        if prefixes.is_empty() && words.is_empty() {
            return Err(MeshError::Syntax);
        }

        Ok(Node::Command { prefixes, words })
    }

    fn parse_redirect(&mut self, fd: Option<i32>) -> Result<Redirect, MeshError> {
        let kind = self
            .peek()
            .and_then(redir_kind)
            .ok_or(MeshError::Syntax)?;
        self.advance();

        let target = match self.advance() {
            Some(Token::Word(word)) => word,
            Some(Token::Number(n)) => Word::literal(n.to_string()),
            _ => return Err(MeshError::Syntax),
        };

        Ok(Redirect { kind, fd, target })
    }
}

fn redir_kind(token: &Token) -> Option<RedirKind> {
    match token {
        Token::Great => Some(RedirKind::OutNormal),
        Token::Clobber => Some(RedirKind::OutClobber),
        Token::DGreat => Some(RedirKind::OutAppend),
        Token::GreatAnd => Some(RedirKind::OutDup),
        Token::Less => Some(RedirKind::InNormal),
        Token::LessAnd => Some(RedirKind::InDup),
        Token::LessGreat => Some(RedirKind::InReadWrite),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::WordPart;

    fn parse_one(input: &str) -> Node {
        parse(input).unwrap().unwrap()
    }

    fn simple(words: &[&str]) -> Node {
        Node::Command {
            prefixes: vec![],
            words: words.iter().map(|w| Word::literal(*w)).collect(),
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("# just a comment").unwrap(), None);
    }

    #[test]
    fn test_simple_command() {
        assert_eq!(parse_one("echo hello"), simple(&["echo", "hello"]));
    }

    #[test]
    fn test_assignment_prefix() {
        let node = parse_one("X=1 Y=2 env");
        assert_eq!(
            node,
            Node::Command {
                prefixes: vec![
                    Prefix::Assign {
                        name: "X".into(),
                        value: Word::literal("1"),
                    },
                    Prefix::Assign {
                        name: "Y".into(),
                        value: Word::literal("2"),
                    },
                ],
                words: vec![Word::literal("env")],
            }
        );
    }

    #[test]
    fn test_assignment_after_body_is_a_word() {
        let node = parse_one("echo X=1");
        assert_eq!(node, simple(&["echo", "X=1"]));
    }

    #[test]
    fn test_pure_assignment() {
        let node = parse_one("X=hello");
        assert_eq!(
            node,
            Node::Command {
                prefixes: vec![Prefix::Assign {
                    name: "X".into(),
                    value: Word::literal("hello"),
                }],
                words: vec![],
            }
        );
    }

    #[test]
    fn test_redirection_after_body() {
        let node = parse_one("echo a > /tmp/f");
        assert_eq!(
            node,
            Node::Command {
                prefixes: vec![Prefix::Redirect(Redirect {
                    kind: RedirKind::OutNormal,
                    fd: None,
                    target: Word::literal("/tmp/f"),
                })],
                words: vec![Word::literal("echo"), Word::literal("a")],
            }
        );
    }

    #[test]
    fn test_redirection_with_fd() {
        let node = parse_one("cmd 2>&1");
        assert_eq!(
            node,
            Node::Command {
                prefixes: vec![Prefix::Redirect(Redirect {
                    kind: RedirKind::OutDup,
                    fd: Some(2),
                    target: Word::literal("1"),
                })],
                words: vec![Word::literal("cmd")],
            }
        );
    }

    #[test]
    fn test_dup_close_target() {
        let node = parse_one("cmd >&-");
        assert_eq!(
            node,
            Node::Command {
                prefixes: vec![Prefix::Redirect(Redirect {
                    kind: RedirKind::OutDup,
                    fd: None,
                    target: Word::literal("-"),
                })],
                words: vec![Word::literal("cmd")],
            }
        );
    }

    #[test]
    fn test_pipeline_left_assoc() {
        let node = parse_one("a | b | c");
        assert_eq!(
            node,
            Node::Pipe {
                left: Box::new(Node::Pipe {
                    left: Box::new(simple(&["a"])),
                    right: Box::new(simple(&["b"])),
                }),
                right: Box::new(simple(&["c"])),
            }
        );
    }

    #[test]
    fn test_cond_list() {
        let node = parse_one("true && echo y || echo n");
        assert_eq!(
            node,
            Node::Cond {
                kind: CondKind::Or,
                left: Box::new(Node::Cond {
                    kind: CondKind::And,
                    left: Box::new(simple(&["true"])),
                    right: Box::new(simple(&["echo", "y"])),
                }),
                right: Box::new(simple(&["echo", "n"])),
            }
        );
    }

    #[test]
    fn test_sequence_and_trailing_separator() {
        let node = parse_one("a; b");
        assert_eq!(
            node,
            Node::Sequence {
                kind: SeqKind::Normal,
                left: Box::new(simple(&["a"])),
                right: Some(Box::new(simple(&["b"]))),
            }
        );

        let node = parse_one("a &");
        assert_eq!(
            node,
            Node::Sequence {
                kind: SeqKind::Async,
                left: Box::new(simple(&["a"])),
                right: None,
            }
        );
    }

    #[test]
    fn test_pipeline_binds_tighter_than_cond() {
        let node = parse_one("a | b && c");
        assert_eq!(
            node,
            Node::Cond {
                kind: CondKind::And,
                left: Box::new(Node::Pipe {
                    left: Box::new(simple(&["a"])),
                    right: Box::new(simple(&["b"])),
                }),
                right: Box::new(simple(&["c"])),
            }
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("| foo").is_err());
        assert!(parse("a &&").is_err());
        assert!(parse("a | | b").is_err());
        assert!(parse("echo >").is_err());
        assert!(parse("; a").is_err());
    }

    #[test]
    fn test_quoted_word_preserved() {
        let node = parse_one("echo \"$X\"");
        assert_eq!(
            node,
            Node::Command {
                prefixes: vec![],
                words: vec![
                    Word::literal("echo"),
                    Word::new(vec![WordPart::DoubleQuoted(vec![WordPart::Variable(
                        "X".into()
                    )])]),
                ],
            }
        );
    }
}
