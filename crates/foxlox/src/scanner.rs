//! The scanner: UTF-8 source text to a token stream plus a per-line source
//! snapshot used for error reporting.

use std::sync::LazyLock;

use ahash::AHashMap;

use crate::value::CompiletimeValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenType {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Semicolon,
    Colon,

    // One or two character tokens.
    Plus,
    PlusPlus,
    PlusEqual,
    Minus,
    MinusMinus,
    MinusEqual,
    Star,
    StarEqual,
    Slash,
    SlashSlash,
    SlashEqual,
    SlashSlashEqual,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals.
    Identifier,
    Str,
    Int,
    Double,

    // Keywords.
    And,
    Class,
    Else,
    False,
    Fun,
    For,
    If,
    Nil,
    Or,
    Return,
    Super,
    This,
    True,
    Var,
    While,
    Break,
    Continue,
    From,
    Import,
    As,
    Export,

    Error,
    Eof,
}

static KEYWORDS: LazyLock<AHashMap<&'static str, TokenType>> = LazyLock::new(|| {
    AHashMap::from_iter([
        ("and", TokenType::And),
        ("class", TokenType::Class),
        ("else", TokenType::Else),
        ("false", TokenType::False),
        ("for", TokenType::For),
        ("fun", TokenType::Fun),
        ("if", TokenType::If),
        ("nil", TokenType::Nil),
        ("or", TokenType::Or),
        ("return", TokenType::Return),
        ("super", TokenType::Super),
        ("this", TokenType::This),
        ("true", TokenType::True),
        ("var", TokenType::Var),
        ("while", TokenType::While),
        ("break", TokenType::Break),
        ("continue", TokenType::Continue),
        ("from", TokenType::From),
        ("import", TokenType::Import),
        ("as", TokenType::As),
        ("export", TokenType::Export),
    ])
});

/// A scanned token. `lexeme` is the source text (or, for `Error` tokens,
/// the error message); `literal` carries the decoded payload of literal
/// tokens.
#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub(crate) ttype: TokenType,
    pub(crate) lexeme: String,
    pub(crate) literal: Option<CompiletimeValue>,
    pub(crate) line: i32,
}

impl Token {
    pub(crate) fn new(ttype: TokenType, lexeme: impl Into<String>, line: i32) -> Self {
        Self { ttype, lexeme: lexeme.into(), literal: None, line }
    }
}

fn is_letter(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_letter_or_digit(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Scans `source`, producing the token stream (terminated by one `Eof`
/// token) and one source record per complete line. Malformed input becomes
/// inline `Error` tokens; the parser reports them.
pub(crate) fn scan_tokens(source: &str) -> (Vec<Token>, Vec<String>) {
    let mut lines: Vec<String> = source.split('\n').map(str::to_owned).collect();
    if source.ends_with('\n') {
        // one record per complete line; the split artifact after the final
        // newline is not a line
        lines.pop();
    }
    let mut scanner = Scanner {
        source: source.chars().collect(),
        start: 0,
        current: 0,
        line: 1,
        tokens: Vec::new(),
    };
    scanner.run();
    (scanner.tokens, lines)
}

struct Scanner {
    source: Vec<char>,
    start: usize,
    current: usize,
    line: i32,
    tokens: Vec<Token>,
}

impl Scanner {
    fn run(&mut self) {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }
        self.tokens.push(Token::new(TokenType::Eof, "", self.line));
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> char {
        if self.is_at_end() { '\0' } else { self.source[self.current] }
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == expected {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    fn add_token(&mut self, ttype: TokenType) {
        self.tokens.push(Token::new(ttype, self.lexeme(), self.line));
    }

    fn add_literal(&mut self, ttype: TokenType, literal: CompiletimeValue) {
        let mut token = Token::new(ttype, self.lexeme(), self.line);
        token.literal = Some(literal);
        self.tokens.push(token);
    }

    fn add_error(&mut self, message: impl Into<String>) {
        self.tokens.push(Token::new(TokenType::Error, message, self.line));
    }

    fn scan_token(&mut self) {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '.' => self.add_token(TokenType::Dot),
            ';' => self.add_token(TokenType::Semicolon),
            ':' => self.add_token(TokenType::Colon),
            '-' => {
                if self.matches('-') {
                    self.add_token(TokenType::MinusMinus);
                } else if self.matches('=') {
                    self.add_token(TokenType::MinusEqual);
                } else {
                    self.add_token(TokenType::Minus);
                }
            }
            '+' => {
                if self.matches('+') {
                    self.add_token(TokenType::PlusPlus);
                } else if self.matches('=') {
                    self.add_token(TokenType::PlusEqual);
                } else {
                    self.add_token(TokenType::Plus);
                }
            }
            '*' => {
                if self.matches('=') {
                    self.add_token(TokenType::StarEqual);
                } else {
                    self.add_token(TokenType::Star);
                }
            }
            '/' => {
                if self.matches('/') {
                    if self.matches('=') {
                        self.add_token(TokenType::SlashSlashEqual);
                    } else {
                        self.add_token(TokenType::SlashSlash);
                    }
                } else if self.matches('=') {
                    self.add_token(TokenType::SlashEqual);
                } else {
                    self.add_token(TokenType::Slash);
                }
            }
            '!' => {
                if self.matches('=') {
                    self.add_token(TokenType::BangEqual);
                } else {
                    self.add_token(TokenType::Bang);
                }
            }
            '=' => {
                if self.matches('=') {
                    self.add_token(TokenType::EqualEqual);
                } else {
                    self.add_token(TokenType::Equal);
                }
            }
            '<' => {
                if self.matches('=') {
                    self.add_token(TokenType::LessEqual);
                } else {
                    self.add_token(TokenType::Less);
                }
            }
            '>' => {
                if self.matches('=') {
                    self.add_token(TokenType::GreaterEqual);
                } else {
                    self.add_token(TokenType::Greater);
                }
            }
            '#' => self.skip_line(),
            '\n' => self.line += 1,
            '"' => self.scan_string(),
            _ => {
                if c.is_ascii_digit() {
                    self.scan_number();
                } else if c.is_whitespace() {
                    // ignore
                } else if is_letter(c) {
                    self.scan_identifier();
                } else {
                    self.add_error(format!("Unexpected character `{c}'."));
                }
            }
        }
    }

    fn skip_line(&mut self) {
        while self.peek() != '\n' && !self.is_at_end() {
            self.advance();
        }
    }

    fn scan_identifier(&mut self) {
        while is_letter_or_digit(self.peek()) {
            self.advance();
        }
        let text = self.lexeme();
        let ttype = KEYWORDS.get(text.as_str()).copied().unwrap_or(TokenType::Identifier);
        self.add_token(ttype);
    }

    fn scan_number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == '.' {
            if self.peek_next().is_ascii_digit() {
                is_float = true;
                self.advance();
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
            } else {
                // a dot not followed by a digit is part of no number
                self.advance();
                self.add_error("Wrong number format.");
                return;
            }
        }
        let text = self.lexeme();
        if is_float {
            match text.parse::<f64>() {
                Ok(f) => self.add_literal(TokenType::Double, CompiletimeValue::Float(f)),
                Err(_) => self.add_error("Wrong number format."),
            }
        } else {
            match text.parse::<i64>() {
                Ok(i) => self.add_literal(TokenType::Int, CompiletimeValue::Int(i)),
                Err(_) => self.add_error("Wrong number format."),
            }
        }
    }

    fn scan_string(&mut self) {
        let mut decoded: Vec<u8> = Vec::new();
        let mut bad_escape: Option<String> = None;
        loop {
            if self.is_at_end() {
                self.add_error("Unterminated string.");
                return;
            }
            let c = self.advance();
            match c {
                '"' => break,
                '\n' => {
                    self.line += 1;
                    decoded.push(b'\n');
                }
                '\\' => {
                    if let Err(msg) = self.scan_escape(&mut decoded) {
                        if bad_escape.is_none() {
                            bad_escape = Some(msg);
                        }
                    }
                }
                _ => {
                    let mut buf = [0u8; 4];
                    decoded.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        match bad_escape {
            Some(msg) => self.add_error(msg),
            None => self.add_literal(TokenType::Str, CompiletimeValue::Str(decoded.into_boxed_slice())),
        }
    }

    /// Decodes one escape sequence (the backslash is already consumed)
    /// into `out`. Octal and `\x` escapes emit raw bytes; `\u`/`\U` emit the
    /// UTF-8 encoding of the code point.
    fn scan_escape(&mut self, out: &mut Vec<u8>) -> Result<(), String> {
        if self.is_at_end() {
            return Err("Unterminated string.".to_owned());
        }
        let c = self.advance();
        match c {
            '\'' => out.push(b'\''),
            '"' => out.push(b'"'),
            '?' => out.push(b'?'),
            '\\' => out.push(b'\\'),
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'v' => out.push(0x0b),
            '0'..='7' => {
                // octal, up to 3 digits including the one just read
                let mut value = c as u32 - '0' as u32;
                for _ in 0..2 {
                    let d = self.peek();
                    if ('0'..='7').contains(&d) {
                        self.advance();
                        value = value * 8 + (d as u32 - '0' as u32);
                    } else {
                        break;
                    }
                }
                out.push(value as u8);
            }
            'x' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 2 {
                    let d = self.peek();
                    if let Some(h) = d.to_digit(16) {
                        self.advance();
                        value = value * 16 + h;
                        digits += 1;
                    } else {
                        break;
                    }
                }
                if digits == 0 {
                    return Err("Invalid escape sequence `\\x'.".to_owned());
                }
                out.push(value as u8);
            }
            'u' => self.scan_unicode_escape(out, 4)?,
            'U' => self.scan_unicode_escape(out, 8)?,
            other => return Err(format!("Invalid escape sequence `\\{other}'.")),
        }
        Ok(())
    }

    fn scan_unicode_escape(&mut self, out: &mut Vec<u8>, digits: usize) -> Result<(), String> {
        let mut value: u32 = 0;
        for _ in 0..digits {
            let d = self.peek();
            let Some(h) = d.to_digit(16) else {
                return Err("Invalid universal character name.".to_owned());
            };
            self.advance();
            value = value * 16 + h;
        }
        let Some(c) = char::from_u32(value) else {
            return Err("Invalid universal character name.".to_owned());
        };
        let mut buf = [0u8; 4];
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        scan_tokens(source).0.into_iter().map(|t| t.ttype).collect()
    }

    #[test]
    fn punctuation_and_compound_operators() {
        assert_eq!(
            types("+ ++ += - -- -= * *= / /= // //= ! != = == < <= > >="),
            vec![
                TokenType::Plus,
                TokenType::PlusPlus,
                TokenType::PlusEqual,
                TokenType::Minus,
                TokenType::MinusMinus,
                TokenType::MinusEqual,
                TokenType::Star,
                TokenType::StarEqual,
                TokenType::Slash,
                TokenType::SlashEqual,
                TokenType::SlashSlash,
                TokenType::SlashSlashEqual,
                TokenType::Bang,
                TokenType::BangEqual,
                TokenType::Equal,
                TokenType::EqualEqual,
                TokenType::Less,
                TokenType::LessEqual,
                TokenType::Greater,
                TokenType::GreaterEqual,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        let toks = scan_tokens("var x = true; from fox import io as y;").0;
        assert_eq!(toks[0].ttype, TokenType::Var);
        assert_eq!(toks[1].ttype, TokenType::Identifier);
        assert_eq!(toks[3].ttype, TokenType::True);
        assert_eq!(toks[5].ttype, TokenType::From);
        assert_eq!(toks[7].ttype, TokenType::Import);
        assert_eq!(toks[9].ttype, TokenType::As);
    }

    #[test]
    fn unicode_identifiers() {
        let toks = scan_tokens("var 変数 = 1;").0;
        assert_eq!(toks[1].ttype, TokenType::Identifier);
        assert_eq!(toks[1].lexeme, "変数");
    }

    #[test]
    fn numbers() {
        let toks = scan_tokens("12 3.5").0;
        assert!(matches!(toks[0].literal, Some(CompiletimeValue::Int(12))));
        assert!(matches!(toks[1].literal, Some(CompiletimeValue::Float(f)) if f == 3.5));
    }

    #[test]
    fn trailing_dot_is_a_lex_error() {
        assert!(scan_tokens("1.").0.iter().any(|t| t.ttype == TokenType::Error));
        assert!(scan_tokens("1.;").0.iter().any(|t| t.ttype == TokenType::Error));
    }

    #[test]
    fn integer_overflow_is_a_lex_error() {
        assert!(scan_tokens("99999999999999999999").0[0].ttype == TokenType::Error);
    }

    #[test]
    fn string_escapes() {
        let toks = scan_tokens(r#""\'\"\?\\\a\b\f\r\n\t\v\0""#).0;
        let Some(CompiletimeValue::Str(bytes)) = &toks[0].literal else {
            panic!("expected string literal, got {:?}", toks[0]);
        };
        assert_eq!(
            bytes.as_ref(),
            b"\'\"?\\\x07\x08\x0c\r\n\t\x0b\0"
        );
    }

    #[test]
    fn octal_hex_and_unicode_escapes() {
        let toks = scan_tokens(r#""\12\123\xa\xab九\U00024b62""#).0;
        let Some(CompiletimeValue::Str(bytes)) = &toks[0].literal else {
            panic!("expected string literal, got {:?}", toks[0]);
        };
        let mut expected = vec![0o12u8, 0o123, 0xa, 0xab];
        expected.extend_from_slice("九".as_bytes());
        expected.extend_from_slice("𤭢".as_bytes());
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn multiline_string_tracks_lines() {
        let toks = scan_tokens("\"a\nb\"\nx").0;
        // the identifier after the string sits on line 3
        let ident = toks.iter().find(|t| t.ttype == TokenType::Identifier).unwrap();
        assert_eq!(ident.line, 3);
    }

    #[test]
    fn unterminated_string() {
        assert!(scan_tokens("\"abc").0.iter().any(|t| t.ttype == TokenType::Error));
    }

    #[test]
    fn comments_and_line_records() {
        let (toks, lines) = scan_tokens("# only a comment\nvar x;\n");
        assert_eq!(toks[0].ttype, TokenType::Var);
        assert_eq!(lines, vec!["# only a comment".to_owned(), "var x;".to_owned()]);
        // trailing comment without a newline is legal
        let (toks, lines) = scan_tokens("var y; # tail");
        assert!(toks.iter().any(|t| t.ttype == TokenType::Identifier));
        assert_eq!(lines.len(), 1);
    }
}
