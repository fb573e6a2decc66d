//! The scanner proper.
//!
//! Scans the whole file eagerly into a `Vec<Token>`. Template literals are
//! handled with a mode stack: entering `${` pushes a brace-depth counter and
//! the closing `}` of a hole resumes template-text scanning, so nested
//! templates fall out naturally.

use memchr::memchr;
use tsb_common::numeric::{parse_bigint_literal, parse_number_literal};
use tsb_common::{Diagnostic, Span};

use crate::token::{Literal, Token, TokenKind};

pub struct Scanner<'a> {
    src: &'a str,
    /// Byte offset of the next unread character.
    pos: usize,
    /// Byte offset of the first character of the token being scanned.
    start: usize,
    line: u32,
    column: u32,
    start_line: u32,
    start_column: u32,
    tokens: Vec<Token>,
    /// Brace depth per open template hole; non-empty while inside `${ ... }`.
    template_holes: Vec<u32>,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Scanner {
            src,
            pos: 0,
            start: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            tokens: Vec::new(),
            template_holes: Vec::new(),
        }
    }

    /// Scan the entire source, appending a final `Eof` token.
    pub fn scan_tokens(mut self) -> Result<Vec<Token>, Diagnostic> {
        while !self.is_at_end() {
            self.begin_token();
            self.scan_token()?;
        }
        self.begin_token();
        self.push(TokenKind::Eof, None);
        Ok(self.tokens)
    }

    // ---- character primitives ----

    fn is_at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn begin_token(&mut self) {
        self.start = self.pos;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn lexeme(&self) -> &str {
        &self.src[self.start..self.pos]
    }

    fn span(&self) -> Span {
        Span::new(self.start as u32, self.pos as u32)
    }

    fn push(&mut self, kind: TokenKind, literal: Option<Literal>) {
        self.tokens.push(Token {
            kind,
            lexeme: self.lexeme().to_string(),
            literal,
            line: self.start_line,
            column: self.start_column,
            span: self.span(),
        });
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::lex(message, Span::new(self.start as u32, self.pos as u32))
    }

    // ---- dispatch ----

    fn scan_token(&mut self) -> Result<(), Diagnostic> {
        let c = match self.advance() {
            Some(c) => c,
            None => return Ok(()),
        };
        match c {
            ' ' | '\t' | '\r' | '\n' => Ok(()),
            '(' => {
                self.push(TokenKind::LeftParen, None);
                Ok(())
            }
            ')' => {
                self.push(TokenKind::RightParen, None);
                Ok(())
            }
            '{' => {
                if let Some(depth) = self.template_holes.last_mut() {
                    *depth += 1;
                }
                self.push(TokenKind::LeftBrace, None);
                Ok(())
            }
            '}' => {
                match self.template_holes.last_mut() {
                    Some(0) => {
                        // Closes a template hole: resume template text.
                        self.template_holes.pop();
                        self.scan_template_piece(false)
                    }
                    Some(depth) => {
                        *depth -= 1;
                        self.push(TokenKind::RightBrace, None);
                        Ok(())
                    }
                    None => {
                        self.push(TokenKind::RightBrace, None);
                        Ok(())
                    }
                }
            }
            '[' => {
                self.push(TokenKind::LeftBracket, None);
                Ok(())
            }
            ']' => {
                self.push(TokenKind::RightBracket, None);
                Ok(())
            }
            ',' => {
                self.push(TokenKind::Comma, None);
                Ok(())
            }
            ';' => {
                self.push(TokenKind::Semicolon, None);
                Ok(())
            }
            ':' => {
                self.push(TokenKind::Colon, None);
                Ok(())
            }
            '@' => {
                self.push(TokenKind::At, None);
                Ok(())
            }
            '~' => {
                self.push(TokenKind::Tilde, None);
                Ok(())
            }
            '.' => {
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    return self.scan_number('.');
                }
                if self.peek() == Some('.') && self.peek_next() == Some('.') {
                    self.advance();
                    self.advance();
                    self.push(TokenKind::DotDotDot, None);
                } else {
                    self.push(TokenKind::Dot, None);
                }
                Ok(())
            }
            '+' => {
                let kind = if self.matches('+') {
                    TokenKind::PlusPlus
                } else if self.matches('=') {
                    TokenKind::PlusEqual
                } else {
                    TokenKind::Plus
                };
                self.push(kind, None);
                Ok(())
            }
            '-' => {
                let kind = if self.matches('-') {
                    TokenKind::MinusMinus
                } else if self.matches('=') {
                    TokenKind::MinusEqual
                } else {
                    TokenKind::Minus
                };
                self.push(kind, None);
                Ok(())
            }
            '*' => {
                let kind = if self.matches('*') {
                    if self.matches('=') {
                        TokenKind::StarStarEqual
                    } else {
                        TokenKind::StarStar
                    }
                } else if self.matches('=') {
                    TokenKind::StarEqual
                } else {
                    TokenKind::Star
                };
                self.push(kind, None);
                Ok(())
            }
            '%' => {
                let kind = if self.matches('=') {
                    TokenKind::PercentEqual
                } else {
                    TokenKind::Percent
                };
                self.push(kind, None);
                Ok(())
            }
            '^' => {
                let kind = if self.matches('=') {
                    TokenKind::CaretEqual
                } else {
                    TokenKind::Caret
                };
                self.push(kind, None);
                Ok(())
            }
            '&' => {
                let kind = if self.matches('&') {
                    if self.matches('=') {
                        TokenKind::AmpAmpEqual
                    } else {
                        TokenKind::AmpAmp
                    }
                } else if self.matches('=') {
                    TokenKind::AmpEqual
                } else {
                    TokenKind::Amp
                };
                self.push(kind, None);
                Ok(())
            }
            '|' => {
                let kind = if self.matches('|') {
                    if self.matches('=') {
                        TokenKind::PipePipeEqual
                    } else {
                        TokenKind::PipePipe
                    }
                } else if self.matches('=') {
                    TokenKind::PipeEqual
                } else {
                    TokenKind::Pipe
                };
                self.push(kind, None);
                Ok(())
            }
            '!' => {
                let kind = if self.matches('=') {
                    if self.matches('=') {
                        TokenKind::NotEqualEqual
                    } else {
                        TokenKind::NotEqual
                    }
                } else {
                    TokenKind::Bang
                };
                self.push(kind, None);
                Ok(())
            }
            '=' => {
                let kind = if self.matches('=') {
                    if self.matches('=') {
                        TokenKind::EqualEqualEqual
                    } else {
                        TokenKind::EqualEqual
                    }
                } else if self.matches('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Equal
                };
                self.push(kind, None);
                Ok(())
            }
            '<' => {
                let kind = if self.matches('<') {
                    if self.matches('=') {
                        TokenKind::LessLessEqual
                    } else {
                        TokenKind::LessLess
                    }
                } else if self.matches('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.push(kind, None);
                Ok(())
            }
            '>' => {
                let kind = if self.matches('>') {
                    if self.matches('>') {
                        if self.matches('=') {
                            TokenKind::GreaterGreaterGreaterEqual
                        } else {
                            TokenKind::GreaterGreaterGreater
                        }
                    } else if self.matches('=') {
                        TokenKind::GreaterGreaterEqual
                    } else {
                        TokenKind::GreaterGreater
                    }
                } else if self.matches('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.push(kind, None);
                Ok(())
            }
            '?' => {
                let kind = if self.matches('?') {
                    if self.matches('=') {
                        TokenKind::QuestionQuestionEqual
                    } else {
                        TokenKind::QuestionQuestion
                    }
                } else if self.peek() == Some('.')
                    && !self.peek_next().is_some_and(|c| c.is_ascii_digit())
                {
                    self.advance();
                    TokenKind::QuestionDot
                } else {
                    TokenKind::Question
                };
                self.push(kind, None);
                Ok(())
            }
            '/' => {
                if self.matches('/') {
                    self.skip_line_comment();
                    Ok(())
                } else if self.matches('*') {
                    self.skip_block_comment()
                } else if self.regex_allowed() {
                    self.scan_regex()
                } else if self.matches('=') {
                    self.push(TokenKind::SlashEqual, None);
                    Ok(())
                } else {
                    self.push(TokenKind::Slash, None);
                    Ok(())
                }
            }
            '"' | '\'' => self.scan_string(c),
            '`' => self.scan_template_piece(true),
            '#' => {
                if !self.peek().is_some_and(is_ident_start) {
                    return Err(self.error("expected identifier after '#'"));
                }
                while self.peek().is_some_and(is_ident_continue) {
                    self.advance();
                }
                self.push(TokenKind::PrivateIdentifier, None);
                Ok(())
            }
            c if c.is_ascii_digit() => self.scan_number(c),
            c if is_ident_start(c) => {
                while self.peek().is_some_and(is_ident_continue) {
                    self.advance();
                }
                let kind = TokenKind::keyword(self.lexeme()).unwrap_or(TokenKind::Identifier);
                self.push(kind, None);
                Ok(())
            }
            c => Err(self.error(format!("unexpected character '{c}'"))),
        }
    }

    // ---- comments ----

    fn skip_line_comment(&mut self) {
        // memchr finds the newline; advance() still walks it for line tracking.
        if let Some(rel) = memchr(b'\n', self.src[self.pos..].as_bytes()) {
            let target = self.pos + rel;
            while self.pos < target {
                self.advance();
            }
        } else {
            while !self.is_at_end() {
                self.advance();
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), Diagnostic> {
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated block comment")),
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    return Ok(());
                }
                Some(_) => {}
            }
        }
    }

    // ---- literals ----

    fn scan_number(&mut self, first: char) -> Result<(), Diagnostic> {
        let radix_prefixed = first == '0'
            && self
                .peek()
                .is_some_and(|c| matches!(c, 'x' | 'X' | 'o' | 'O' | 'b' | 'B'));
        if radix_prefixed {
            self.advance();
            // Hex digits cover every radix; 'n' stays unread for the bigint check.
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit() || c == '_') {
                self.advance();
            }
        } else {
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                self.advance();
            }
            if first != '.'
                && self.peek() == Some('.')
                && self.peek_next().is_some_and(|c| c.is_ascii_digit())
            {
                self.advance();
                while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                    self.advance();
                }
            } else if first == '.' {
                // Already consumed the dot; the integer part is empty.
                while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                    self.advance();
                }
            }
            if self.peek().is_some_and(|c| c == 'e' || c == 'E') {
                let mut look = self.src[self.pos..].chars();
                look.next();
                let mut after = look.next();
                if after == Some('+') || after == Some('-') {
                    after = look.next();
                }
                if after.is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                    if self.peek() == Some('+') || self.peek() == Some('-') {
                        self.advance();
                    }
                    while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                        self.advance();
                    }
                }
            }
        }

        if self.peek() == Some('n') {
            self.advance();
            let text = &self.lexeme()[..self.lexeme().len() - 1];
            let value = parse_bigint_literal(text)
                .ok_or_else(|| self.error(format!("malformed bigint literal '{text}n'")))?;
            self.push(TokenKind::BigInt, Some(Literal::BigInt(value)));
            return Ok(());
        }

        let text = self.lexeme().to_string();
        let value = parse_number_literal(&text)
            .ok_or_else(|| self.error(format!("malformed numeric literal '{text}'")))?;
        self.push(TokenKind::Number, Some(Literal::Number(value)));
        Ok(())
    }

    fn scan_string(&mut self, quote: char) -> Result<(), Diagnostic> {
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated string literal")),
                Some('\n') => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => break,
                Some('\\') => {
                    let e = self.scan_escape()?;
                    if let Some(c) = e {
                        value.push(c);
                    }
                }
                Some(c) => value.push(c),
            }
        }
        self.push(TokenKind::String, Some(Literal::Str(value)));
        Ok(())
    }

    /// One escape sequence after the backslash. `None` means a line
    /// continuation (escaped newline) that contributes nothing.
    fn scan_escape(&mut self) -> Result<Option<char>, Diagnostic> {
        let c = self
            .advance()
            .ok_or_else(|| self.error("unterminated escape sequence"))?;
        Ok(Some(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{0008}',
            'f' => '\u{000C}',
            'v' => '\u{000B}',
            '0' => '\0',
            '\n' => return Ok(None),
            'x' => {
                let hi = self.hex_digit()?;
                let lo = self.hex_digit()?;
                char::from_u32(hi * 16 + lo)
                    .ok_or_else(|| self.error("invalid \\x escape"))?
            }
            'u' => {
                if self.matches('{') {
                    let mut code = 0u32;
                    let mut any = false;
                    while self.peek() != Some('}') {
                        code = code * 16 + self.hex_digit()?;
                        any = true;
                        if code > 0x10FFFF {
                            return Err(self.error("unicode escape out of range"));
                        }
                    }
                    self.advance();
                    if !any {
                        return Err(self.error("empty \\u{} escape"));
                    }
                    char::from_u32(code).ok_or_else(|| self.error("invalid \\u{} escape"))?
                } else {
                    let mut code = 0u32;
                    for _ in 0..4 {
                        code = code * 16 + self.hex_digit()?;
                    }
                    char::from_u32(code).ok_or_else(|| self.error("invalid \\u escape"))?
                }
            }
            other => other, // \' \" \\ \` and anything else: the char itself
        }))
    }

    fn hex_digit(&mut self) -> Result<u32, Diagnostic> {
        let c = self
            .advance()
            .ok_or_else(|| self.error("unterminated escape sequence"))?;
        c.to_digit(16)
            .ok_or_else(|| self.error(format!("invalid hex digit '{c}'")))
    }

    /// Scan template text up to a hole, the closing backtick, or EOF.
    /// `opening` is true when called from the backtick, false when resuming
    /// after a hole's `}`.
    fn scan_template_piece(&mut self, opening: bool) -> Result<(), Diagnostic> {
        let mut cooked = String::new();
        let raw_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated template literal")),
                Some('`') => {
                    let raw = self.src[raw_start..self.pos].to_string();
                    self.advance();
                    let kind = if opening {
                        TokenKind::TemplateFull
                    } else {
                        TokenKind::TemplateTail
                    };
                    self.push(kind, Some(Literal::Template { cooked, raw }));
                    return Ok(());
                }
                Some('$') if self.peek_next() == Some('{') => {
                    let raw = self.src[raw_start..self.pos].to_string();
                    self.advance();
                    self.advance();
                    self.template_holes.push(0);
                    let kind = if opening {
                        TokenKind::TemplateHead
                    } else {
                        TokenKind::TemplateMiddle
                    };
                    self.push(kind, Some(Literal::Template { cooked, raw }));
                    return Ok(());
                }
                Some('\\') => {
                    self.advance();
                    if let Some(c) = self.scan_escape()? {
                        cooked.push(c);
                    }
                }
                Some(c) => {
                    self.advance();
                    cooked.push(c);
                }
            }
        }
    }

    fn scan_regex(&mut self) -> Result<(), Diagnostic> {
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.advance() {
                None | Some('\n') => return Err(self.error("unterminated regex literal")),
                Some('[') => {
                    in_class = true;
                    pattern.push('[');
                }
                Some(']') => {
                    in_class = false;
                    pattern.push(']');
                }
                Some('\\') => {
                    pattern.push('\\');
                    let c = self
                        .advance()
                        .ok_or_else(|| self.error("unterminated regex literal"))?;
                    pattern.push(c);
                }
                Some('/') if !in_class => break,
                Some(c) => pattern.push(c),
            }
        }
        let mut flags = String::new();
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            flags.push(self.advance().unwrap());
        }
        self.push(TokenKind::Regex, Some(Literal::Regex { pattern, flags }));
        Ok(())
    }

    /// Whether a `/` at the current position starts a regex literal rather
    /// than a division, judged by the previously emitted token kind.
    fn regex_allowed(&self) -> bool {
        match self.tokens.last().map(|t| t.kind) {
            None => true,
            Some(kind) => !matches!(
                kind,
                TokenKind::Identifier
                    | TokenKind::PrivateIdentifier
                    | TokenKind::Number
                    | TokenKind::BigInt
                    | TokenKind::String
                    | TokenKind::TemplateFull
                    | TokenKind::TemplateTail
                    | TokenKind::Regex
                    | TokenKind::RightParen
                    | TokenKind::RightBracket
                    | TokenKind::This
                    | TokenKind::Super
                    | TokenKind::True
                    | TokenKind::False
                    | TokenKind::Null
                    | TokenKind::Undefined
                    | TokenKind::PlusPlus
                    | TokenKind::MinusMinus
            ),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
#[path = "tests/scanner_tests.rs"]
mod tests;
