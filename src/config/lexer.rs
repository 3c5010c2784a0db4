//! Tokenizer for the nginx-style configuration syntax.
//!
//! The lexer only splits the source into words and the three punctuation
//! marks (`;`, `{`, `}`). Comments start with `#` and run to the end of the
//! line. Words may be wrapped in double quotes to keep spaces or punctuation.

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Word(String),
    Semicolon,
    BlockOpen,
    BlockClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '#' => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            ';' => tokens.push(Token { kind: TokenKind::Semicolon, line }),
            '{' => tokens.push(Token { kind: TokenKind::BlockOpen, line }),
            '}' => tokens.push(Token { kind: TokenKind::BlockClose, line }),
            '"' => {
                let start = line;
                let mut word = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\n') => {
                            line += 1;
                            word.push('\n');
                        }
                        Some(other) => word.push(other),
                        None => {
                            return Err(ConfigError::Syntax {
                                line: start,
                                message: "unterminated quoted string".into(),
                            });
                        }
                    }
                }
                tokens.push(Token { kind: TokenKind::Word(word), line: start });
            }
            first => {
                let mut word = String::from(first);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, ';' | '{' | '}' | '#' | '"') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(Token { kind: TokenKind::Word(word), line });
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn splits_words_and_punctuation() {
        assert_eq!(
            kinds("server { listen 8080; }"),
            vec![
                TokenKind::Word("server".into()),
                TokenKind::BlockOpen,
                TokenKind::Word("listen".into()),
                TokenKind::Word("8080".into()),
                TokenKind::Semicolon,
                TokenKind::BlockClose,
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_lines() {
        let tokens = tokenize("# header\nroot www; # trailing\n\nindex a.html;").unwrap();
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[3].kind, TokenKind::Word("index".into()));
        assert_eq!(tokens[3].line, 4);
    }

    #[test]
    fn quoted_words_keep_spaces() {
        assert_eq!(
            kinds("root \"my site\";"),
            vec![
                TokenKind::Word("root".into()),
                TokenKind::Word("my site".into()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn unterminated_quote_is_a_syntax_error() {
        assert!(matches!(
            tokenize("root \"oops;"),
            Err(ConfigError::Syntax { line: 1, .. })
        ));
    }
}
