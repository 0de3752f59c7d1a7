/// Minimal Lua tokenizer used by the action extractor
///
/// Only what the extractor needs: names, string literals (decoded), numbers and
/// punctuation, each with its byte span and line. Comments and whitespace are
/// skipped. Long brackets (`[==[ ... ]==]`) are supported for both strings and
/// comments.

/// Kind of a lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword
    Name,
    /// String literal, with its decoded contents
    Str(String),
    /// Numeric literal
    Number,
    /// Punctuation or operator
    Symbol,
}

/// A token and where it sits in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// 1-based line of the first character
    pub line: usize,
}

impl Token {
    /// Raw source text of this token
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn is_name(&self, source: &str, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text(source) == name
    }

    pub fn is_symbol(&self, source: &str, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text(source) == symbol
    }
}

/// Tokenizer failure with the line it was detected on
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub line: usize,
    pub message: String,
}

const THREE_CHAR_SYMBOLS: &[&str] = &["..."];
const TWO_CHAR_SYMBOLS: &[&str] = &["..", "==", "~=", "<=", ">=", "::", "//", "<<", ">>"];

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

/// Split Lua source into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        src: source,
        bytes: source.as_bytes(),
        pos: 0,
        line: 1,
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

impl<'a> Lexer<'a> {
    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek(0)?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
        }
        Some(byte)
    }

    fn error(&self, line: usize, message: impl Into<String>) -> LexError {
        LexError {
            line,
            message: message.into(),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_trivia()?;
        let Some(byte) = self.peek(0) else {
            return Ok(None);
        };
        let start = self.pos;
        let line = self.line;

        let kind = if byte == b'_' || byte.is_ascii_alphabetic() {
            while matches!(self.peek(0), Some(b) if b == b'_' || b.is_ascii_alphanumeric()) {
                self.bump();
            }
            TokenKind::Name
        } else if byte.is_ascii_digit() || (byte == b'.' && matches!(self.peek(1), Some(b) if b.is_ascii_digit())) {
            self.read_number();
            TokenKind::Number
        } else if byte == b'"' || byte == b'\'' {
            TokenKind::Str(self.read_short_string(byte)?)
        } else if byte == b'[' && self.long_bracket_level().is_some() {
            TokenKind::Str(self.read_long_bracket()?)
        } else {
            self.read_symbol();
            TokenKind::Symbol
        };

        Ok(Some(Token {
            kind,
            start,
            end: self.pos,
            line,
        }))
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek(0) {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'-') if self.peek(1) == Some(b'-') => {
                    self.pos += 2;
                    if self.peek(0) == Some(b'[') && self.long_bracket_level().is_some() {
                        self.read_long_bracket()?;
                    } else {
                        while !matches!(self.peek(0), None | Some(b'\n')) {
                            self.bump();
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_number(&mut self) {
        let hex = self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x' | b'X'));
        if hex {
            self.pos += 2;
        }
        while let Some(b) = self.peek(0) {
            let exponent = if hex { matches!(b, b'p' | b'P') } else { matches!(b, b'e' | b'E') };
            if exponent {
                self.bump();
                if matches!(self.peek(0), Some(b'+' | b'-')) {
                    self.bump();
                }
            } else if b.is_ascii_alphanumeric() || b == b'.' {
                // `1..x` is a number followed by the concat operator
                if b == b'.' && self.peek(1) == Some(b'.') {
                    break;
                }
                self.bump();
            } else {
                break;
            }
        }
    }

    fn read_short_string(&mut self, quote: u8) -> Result<String, LexError> {
        let line = self.line;
        self.bump();
        let mut value = String::new();
        let mut segment_start = self.pos;
        loop {
            match self.peek(0) {
                None | Some(b'\n') => return Err(self.error(line, "unterminated string literal")),
                Some(b) if b == quote => {
                    value.push_str(&self.src[segment_start..self.pos]);
                    self.bump();
                    return Ok(value);
                }
                Some(b'\\') => {
                    value.push_str(&self.src[segment_start..self.pos]);
                    self.bump();
                    let escaped = self
                        .bump()
                        .ok_or_else(|| self.error(line, "unterminated string literal"))?;
                    match escaped {
                        b'n' => value.push('\n'),
                        b't' => value.push('\t'),
                        b'r' => value.push('\r'),
                        b'a' => value.push('\u{7}'),
                        b'b' => value.push('\u{8}'),
                        b'f' => value.push('\u{c}'),
                        b'v' => value.push('\u{b}'),
                        b'\n' => value.push('\n'),
                        b'z' => {
                            while matches!(self.peek(0), Some(b) if b.is_ascii_whitespace()) {
                                self.bump();
                            }
                        }
                        other => value.push(other as char),
                    }
                    segment_start = self.pos;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// Level of the long bracket opening at the cursor, if any (`[[` is 0, `[=[` is 1)
    fn long_bracket_level(&self) -> Option<usize> {
        let mut offset = 1;
        while self.peek(offset) == Some(b'=') {
            offset += 1;
        }
        (self.peek(offset) == Some(b'[')).then_some(offset - 1)
    }

    fn read_long_bracket(&mut self) -> Result<String, LexError> {
        let line = self.line;
        let level = self
            .long_bracket_level()
            .ok_or_else(|| self.error(line, "malformed long bracket"))?;
        let close = format!("]{}]", "=".repeat(level));
        self.pos += level + 2;
        // a newline right after the opening bracket is not part of the value
        if self.peek(0) == Some(b'\r') {
            self.bump();
        }
        if self.peek(0) == Some(b'\n') {
            self.bump();
        }
        let body_start = self.pos;
        match self.src[body_start..].find(&close) {
            Some(found) => {
                let body_end = body_start + found;
                while self.pos < body_end + close.len() {
                    self.bump();
                }
                Ok(self.src[body_start..body_end].to_string())
            }
            None => Err(self.error(line, "unterminated long bracket")),
        }
    }

    fn read_symbol(&mut self) {
        let rest = &self.src[self.pos..];
        let width = THREE_CHAR_SYMBOLS
            .iter()
            .chain(TWO_CHAR_SYMBOLS)
            .find(|symbol| rest.starts_with(*symbol))
            .map(|symbol| symbol.len())
            .unwrap_or_else(|| rest.chars().next().map(char::len_utf8).unwrap_or(1));
        for _ in 0..width {
            self.bump();
        }
    }
}
