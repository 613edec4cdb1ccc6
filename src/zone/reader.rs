//! Streaming master-file reader
//!
//! [`ZoneReader`] pulls lines from a [`BufRead`] on demand and yields one
//! [`ResourceRecord`] per logical record. State carried between records:
//! - the current origin (`$ORIGIN`, or the one supplied by the caller)
//! - the default TTL (`$TTL`)
//! - the previous owner, TTL and class, for inheritance

use super::lexer::{Lexer, Token};
use super::record::{ResourceRecord, name_fields};
use crate::error::{ParseError, ParseErrorKind};
use std::io::BufRead;

const DEFAULT_CLASS: &str = "IN";

/// Iterator over the records of one master file
pub struct ZoneReader<R> {
    input: R,
    file: String,
    lexer: Lexer,
    line_no: usize,
    buf: Vec<u8>,
    origin: Option<String>,
    default_ttl: Option<u32>,
    last_owner: Option<String>,
    last_ttl: Option<u32>,
    last_class: Option<String>,
    finished: bool,
}

/// Tokens of one logical record plus where it started
struct RawRecord {
    line: usize,
    owner_inherited: bool,
    tokens: Vec<Token>,
}

impl<R: BufRead> ZoneReader<R> {
    /// Start reading `input`
    ///
    /// An empty `origin` means none is in effect until the file sets one with
    /// `$ORIGIN`. `file` only labels log output.
    pub fn new(input: R, origin: &str, file: &str) -> Self {
        let origin = match origin.trim() {
            "" => None,
            o if o.ends_with('.') => Some(o.to_string()),
            o => Some(format!("{}.", o)),
        };
        Self {
            input,
            file: file.to_string(),
            lexer: Lexer::default(),
            line_no: 0,
            buf: Vec::with_capacity(256),
            origin,
            default_ttl: None,
            last_owner: None,
            last_ttl: None,
            last_class: None,
            finished: false,
        }
    }

    /// Read the next physical line, without its terminator
    fn read_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        if self.input.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Collect the tokens of the next non-empty logical record
    fn next_raw(&mut self) -> Result<Option<RawRecord>, ParseError> {
        loop {
            let Some(line) = self.read_line().map_err(|e| self.error(e.into()))? else {
                return Ok(None);
            };

            let start = self.line_no;
            let owner_inherited = line.starts_with([' ', '\t']);
            let mut tokens = Vec::new();
            self.tokenize(&line, &mut tokens, start)?;

            while self.lexer.in_group() {
                let Some(next) = self.read_line().map_err(|e| self.error(e.into()))? else {
                    self.lexer.reset();
                    return Err(ParseError::new(
                        start,
                        ParseErrorKind::Unterminated("parenthesis"),
                    ));
                };
                self.tokenize(&next, &mut tokens, start)?;
            }

            if !tokens.is_empty() {
                return Ok(Some(RawRecord {
                    line: start,
                    owner_inherited,
                    tokens,
                }));
            }
        }
    }

    fn tokenize(
        &mut self,
        line: &str,
        tokens: &mut Vec<Token>,
        start: usize,
    ) -> Result<(), ParseError> {
        self.lexer.tokenize(line, tokens).map_err(|kind| {
            if self.lexer.in_group() {
                // Drop the rest of the group so the next record starts clean
                self.skip_group();
            }
            ParseError::new(start, kind)
        })
    }

    /// Discard lines until the open group closes or input ends
    fn skip_group(&mut self) {
        let mut scratch = Vec::new();
        while self.lexer.in_group() {
            match self.read_line() {
                Ok(Some(line)) => {
                    scratch.clear();
                    if self.lexer.tokenize(&line, &mut scratch).is_err() {
                        self.lexer.reset();
                    }
                }
                _ => self.lexer.reset(),
            }
        }
    }

    /// Error for the line that was being read
    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.line_no + 1, kind)
    }

    /// Apply a `$` directive; directives produce no record
    fn apply_directive(&mut self, raw: &RawRecord) -> Result<(), ParseErrorKind> {
        let name = raw.tokens[0].text.to_ascii_uppercase();
        let arg = raw.tokens.get(1).map(|t| t.text.as_str());
        match (name.as_str(), arg) {
            ("$ORIGIN", Some(origin)) => {
                let origin = qualify(origin, self.origin.as_deref())?;
                tracing::trace!(file = %self.file, origin = %origin, "Origin changed");
                self.origin = Some(origin);
                Ok(())
            }
            ("$TTL", Some(ttl)) => {
                self.default_ttl = Some(parse_ttl(ttl)?);
                Ok(())
            }
            ("$ORIGIN" | "$TTL", None) => {
                Err(ParseErrorKind::Syntax(format!("{} needs an argument", name)))
            }
            _ => Err(ParseErrorKind::UnsupportedDirective(name)),
        }
    }

    fn build_record(&mut self, raw: RawRecord) -> Result<ResourceRecord, ParseErrorKind> {
        let mut tokens = raw.tokens.into_iter().peekable();

        let owner = if raw.owner_inherited {
            self.last_owner
                .clone()
                .ok_or_else(|| ParseErrorKind::Syntax("no previous owner to inherit".into()))?
        } else {
            let token = tokens.next().ok_or(ParseErrorKind::MissingType)?;
            qualify(&token.text, self.origin.as_deref())?
        };

        let mut ttl = None;
        let mut class = None;
        while let Some(token) = tokens.peek() {
            if token.quoted {
                break;
            }
            if class.is_none() && is_class(&token.text) {
                class = Some(token.text.to_ascii_uppercase());
            } else if ttl.is_none() && token.text.starts_with(|c: char| c.is_ascii_digit()) {
                ttl = Some(parse_ttl(&token.text)?);
            } else {
                break;
            }
            tokens.next();
        }

        let rtype = match tokens.next() {
            Some(t) if !t.quoted && t.text.chars().all(|c| c.is_ascii_alphanumeric()) => {
                t.text.to_ascii_uppercase()
            }
            Some(t) => return Err(ParseErrorKind::Syntax(format!("invalid type {:?}", t.text))),
            None => return Err(ParseErrorKind::MissingType),
        };

        let mut rdata: Vec<String> = tokens.map(|t| t.text).collect();
        for &idx in name_fields(&rtype) {
            if let Some(field) = rdata.get_mut(idx) {
                *field = qualify(field, self.origin.as_deref())?;
            }
        }

        let ttl = ttl.or(self.default_ttl).or(self.last_ttl);
        let class = class
            .or_else(|| self.last_class.clone())
            .unwrap_or_else(|| DEFAULT_CLASS.to_string());

        self.last_owner = Some(owner.clone());
        self.last_ttl = ttl;
        self.last_class = Some(class.clone());

        Ok(ResourceRecord {
            owner,
            ttl,
            class,
            rtype,
            rdata,
        })
    }
}

impl<R: BufRead> Iterator for ZoneReader<R> {
    type Item = Result<ResourceRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let raw = match self.next_raw() {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    if !e.is_recoverable() {
                        self.finished = true;
                    }
                    return Some(Err(e));
                }
            };

            let line = raw.line;
            let is_directive = !raw.owner_inherited && raw.tokens[0].text.starts_with('$');
            if is_directive {
                if let Err(kind) = self.apply_directive(&raw) {
                    return Some(Err(ParseError::new(line, kind)));
                }
                continue;
            }

            return Some(self.build_record(raw).map_err(|kind| ParseError::new(line, kind)));
        }
        None
    }
}

/// Make `name` fully qualified against `origin`
fn qualify(name: &str, origin: Option<&str>) -> Result<String, ParseErrorKind> {
    if name == "@" {
        return origin
            .map(str::to_string)
            .ok_or_else(|| ParseErrorKind::NoOrigin(name.to_string()));
    }
    if is_absolute(name) {
        return Ok(name.to_string());
    }
    match origin {
        Some(".") => Ok(format!("{}.", name)),
        Some(origin) => Ok(format!("{}.{}", name, origin)),
        None => Err(ParseErrorKind::NoOrigin(name.to_string())),
    }
}

/// A name ending in an unescaped dot
fn is_absolute(name: &str) -> bool {
    if !name.ends_with('.') {
        return false;
    }
    let backslashes = name[..name.len() - 1]
        .chars()
        .rev()
        .take_while(|&c| c == '\\')
        .count();
    backslashes % 2 == 0
}

fn is_class(token: &str) -> bool {
    let upper = token.to_ascii_uppercase();
    matches!(upper.as_str(), "IN" | "CH" | "CS" | "HS" | "NONE" | "ANY")
        || upper
            .strip_prefix("CLASS")
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Parse a TTL such as `3600`, `1h30m` or `2W`
pub(crate) fn parse_ttl(text: &str) -> Result<u32, ParseErrorKind> {
    let invalid = || ParseErrorKind::InvalidTtl(text.to_string());
    let mut total: u32 = 0;
    let mut digits = String::new();

    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit: u32 = match c.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            'w' => 604_800,
            _ => return Err(invalid()),
        };
        if digits.is_empty() {
            return Err(invalid());
        }
        let value: u32 = digits.parse().map_err(|_| invalid())?;
        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(invalid)?;
        digits.clear();
    }

    if !digits.is_empty() {
        let value: u32 = digits.parse().map_err(|_| invalid())?;
        total = total.checked_add(value).ok_or_else(invalid)?;
    } else if text.is_empty() {
        return Err(invalid());
    }
    Ok(total)
}
