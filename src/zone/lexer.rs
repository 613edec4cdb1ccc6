//! Line tokenizer for master-file text
//!
//! Splits one physical line into tokens while tracking parenthesis depth across
//! lines, so the reader can join continuation lines into a single record.

use crate::error::ParseErrorKind;

/// A single whitespace-delimited field
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Token {
    /// Field text exactly as written, quotes and escapes included
    pub(crate) text: String,
    /// Whether the field was a quoted string
    pub(crate) quoted: bool,
}

impl Token {
    #[cfg(test)]
    fn word(text: &str) -> Self {
        Self {
            text: text.to_string(),
            quoted: false,
        }
    }
}

/// Tokenizer state that survives from one line to the next
#[derive(Debug, Default)]
pub(crate) struct Lexer {
    depth: usize,
}

impl Lexer {
    /// Whether a `(` is still open
    pub(crate) fn in_group(&self) -> bool {
        self.depth > 0
    }

    /// Forget any open group after an error so the next line starts fresh
    pub(crate) fn reset(&mut self) {
        self.depth = 0;
    }

    /// Append the tokens of `line` to `out`
    ///
    /// Comments (`;` outside quotes) end the line. Quoted strings may not span
    /// lines.
    pub(crate) fn tokenize(
        &mut self,
        line: &str,
        out: &mut Vec<Token>,
    ) -> Result<(), ParseErrorKind> {
        let mut current = String::new();
        let mut quoted = false;
        let mut in_quote = false;
        let mut chars = line.chars();

        while let Some(c) = chars.next() {
            if in_quote {
                current.push(c);
                match c {
                    '\\' => {
                        if let Some(next) = chars.next() {
                            current.push(next);
                        }
                    }
                    '"' => in_quote = false,
                    _ => {}
                }
                continue;
            }

            match c {
                ';' => break,
                ' ' | '\t' => flush(&mut current, &mut quoted, out),
                '(' => {
                    flush(&mut current, &mut quoted, out);
                    self.depth += 1;
                }
                ')' => {
                    flush(&mut current, &mut quoted, out);
                    if self.depth == 0 {
                        return Err(ParseErrorKind::Syntax("unbalanced ')'".into()));
                    }
                    self.depth -= 1;
                }
                '"' => {
                    flush(&mut current, &mut quoted, out);
                    current.push(c);
                    quoted = true;
                    in_quote = true;
                }
                '\\' => {
                    current.push(c);
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                _ => current.push(c),
            }
        }

        if in_quote {
            return Err(ParseErrorKind::Unterminated("quoted string"));
        }
        flush(&mut current, &mut quoted, out);
        Ok(())
    }
}

fn flush(current: &mut String, quoted: &mut bool, out: &mut Vec<Token>) {
    if !current.is_empty() {
        out.push(Token {
            text: std::mem::take(current),
            quoted: *quoted,
        });
    }
    *quoted = false;
}
