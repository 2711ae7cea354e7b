//! On-demand scanner: source bytes to tokens.
//!
//! The scanner hands out one token per call, tracking 1-based lines. It
//! owns one quirk worth knowing about: compound assignment operators are
//! split into two tokens in source order (`+=` becomes `=` then `+`), so
//! the parser can desugar `x += e` into `x = x + e` without special token
//! kinds. The split operator is parked in a one-token lookahead buffer.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,
    Colon,
    QuestionMark,

    // One or two character tokens.
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    PlusPlus,
    MinusMinus,
    /// The `-` half of a split `-=`. Distinct from `Minus` so the parser
    /// can tell `x -= 1` apart from `x = -1`.
    SplitMinus,
    And,
    Or,

    // Literals.
    Identifier,
    String,
    Number,

    // Keywords.
    Class,
    Else,
    False,
    For,
    Function,
    If,
    Null,
    Return,
    Base,
    This,
    True,
    Var,
    While,
    Break,
    Continue,
    Switch,
    Case,
    Default,

    Error,
    Eof,
}

#[derive(Debug, Clone, Copy)]
pub struct Token<'src> {
    pub kind: TokenKind,
    /// The token's text. For `Error` tokens this is a static message.
    pub text: &'src str,
    pub line: u16,
}

pub struct Scanner<'src> {
    source: &'src [u8],
    text: &'src str,
    start: usize,
    current: usize,
    line: u16,
    /// Second half of a split compound-assignment operator.
    pending: Option<TokenKind>,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Scanner<'src> {
        Scanner {
            source: source.as_bytes(),
            text: source,
            start: 0,
            current: 0,
            line: 1,
            pending: None,
        }
    }

    pub fn scan_token(&mut self) -> Token<'src> {
        if let Some(kind) = self.pending.take() {
            return self.make_token(kind);
        }

        self.skip_whitespace();
        self.start = self.current;

        if self.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let c = self.advance();
        if c.is_ascii_digit() {
            return self.number();
        }
        if is_identifier_start(c) {
            return self.identifier();
        }

        match c {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b'[' => self.make_token(TokenKind::LeftBracket),
            b']' => self.make_token(TokenKind::RightBracket),
            b';' => self.make_token(TokenKind::Semicolon),
            b':' => self.make_token(TokenKind::Colon),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'?' => self.make_token(TokenKind::QuestionMark),

            b'+' => {
                if self.match_byte(b'=') {
                    self.pending = Some(TokenKind::Plus);
                    self.make_token(TokenKind::Equal)
                } else if self.match_byte(b'+') {
                    self.make_token(TokenKind::PlusPlus)
                } else {
                    self.make_token(TokenKind::Plus)
                }
            }
            b'-' => {
                if self.match_byte(b'=') {
                    self.pending = Some(TokenKind::SplitMinus);
                    self.make_token(TokenKind::Equal)
                } else if self.match_byte(b'-') {
                    self.make_token(TokenKind::MinusMinus)
                } else {
                    self.make_token(TokenKind::Minus)
                }
            }
            b'*' => {
                if self.match_byte(b'=') {
                    self.pending = Some(TokenKind::Star);
                    self.make_token(TokenKind::Equal)
                } else {
                    self.make_token(TokenKind::Star)
                }
            }
            b'/' => {
                if self.match_byte(b'=') {
                    self.pending = Some(TokenKind::Slash);
                    self.make_token(TokenKind::Equal)
                } else {
                    self.make_token(TokenKind::Slash)
                }
            }

            b'&' => {
                if self.match_byte(b'&') {
                    self.make_token(TokenKind::And)
                } else {
                    self.error_token("Expected '&' after '&'.")
                }
            }
            b'|' => {
                if self.match_byte(b'|') {
                    self.make_token(TokenKind::Or)
                } else {
                    self.error_token("Expected '|' after '|'.")
                }
            }

            b'!' => {
                if self.match_byte(b'=') {
                    self.make_token(TokenKind::BangEqual)
                } else {
                    self.make_token(TokenKind::Bang)
                }
            }
            b'=' => {
                if self.match_byte(b'=') {
                    self.make_token(TokenKind::EqualEqual)
                } else {
                    self.make_token(TokenKind::Equal)
                }
            }
            b'<' => {
                if self.match_byte(b'=') {
                    self.make_token(TokenKind::LessEqual)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }
            b'>' => {
                if self.match_byte(b'=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }

            b'"' => self.string(),

            _ => self.error_token("Unexpected character."),
        }
    }

    // -----------------------------------------------------------------------
    // Low-level cursor helpers
    // -----------------------------------------------------------------------

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> u8 {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.source.len() {
            0
        } else {
            self.source[self.current + 1]
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        Token {
            kind,
            text: &self.text[self.start..self.current],
            line: self.line,
        }
    }

    fn error_token(&self, message: &'static str) -> Token<'src> {
        Token {
            kind: TokenKind::Error,
            text: message,
            line: self.line,
        }
    }

    // -----------------------------------------------------------------------
    // Trivia
    // -----------------------------------------------------------------------

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.advance();
                }
                b'\n' => {
                    self.line += 1;
                    self.advance();
                }
                b'/' => {
                    if self.peek_next() == b'/' {
                        while self.peek() != b'\n' && !self.is_at_end() {
                            self.advance();
                        }
                    } else if self.peek_next() == b'*' {
                        self.advance();
                        self.advance();
                        // Block comments nest: an inner `/*` must be
                        // closed before the comment ends.
                        let mut depth = 1;
                        while depth > 0 && !self.is_at_end() {
                            let c = self.advance();
                            if c == b'\n' {
                                self.line += 1;
                            } else if c == b'/' && self.match_byte(b'*') {
                                depth += 1;
                            } else if c == b'*' && self.match_byte(b'/') {
                                depth -= 1;
                            }
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Literals and identifiers
    // -----------------------------------------------------------------------

    fn number(&mut self) -> Token<'src> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // A fractional part needs a digit after the point; `1.` is the
        // number `1` followed by a dot token.
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        self.make_token(TokenKind::Number)
    }

    fn string(&mut self) -> Token<'src> {
        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            // A backslash keeps an escaped quote from ending the string;
            // full escape translation happens in the parser.
            if self.peek() == b'\\' && self.peek_next() == b'"' {
                self.advance();
            }
            self.advance();
        }

        if self.is_at_end() {
            return self.error_token("Unterminated string.");
        }

        self.advance(); // closing quote
        self.make_token(TokenKind::String)
    }

    fn identifier(&mut self) -> Token<'src> {
        while is_identifier_part(self.peek()) {
            self.advance();
        }
        self.make_token(self.identifier_kind())
    }

    /// Keyword recognition: branch on the first one or two bytes, then
    /// compare the remainder in one shot.
    fn identifier_kind(&self) -> TokenKind {
        let word = &self.source[self.start..self.current];
        match word[0] {
            b'a' => self.check_keyword(word, "and", TokenKind::And),
            b'd' => self.check_keyword(word, "default", TokenKind::Default),
            b'e' => self.check_keyword(word, "else", TokenKind::Else),
            b'i' => self.check_keyword(word, "if", TokenKind::If),
            b'n' => self.check_keyword(word, "null", TokenKind::Null),
            b'o' => self.check_keyword(word, "or", TokenKind::Or),
            b'r' => self.check_keyword(word, "return", TokenKind::Return),
            b's' => self.check_keyword(word, "switch", TokenKind::Switch),
            b'v' => self.check_keyword(word, "var", TokenKind::Var),
            b'w' => self.check_keyword(word, "while", TokenKind::While),
            b'b' if word.len() > 1 => match word[1] {
                b'r' => self.check_keyword(word, "break", TokenKind::Break),
                b'a' => self.check_keyword(word, "base", TokenKind::Base),
                _ => TokenKind::Identifier,
            },
            b'c' if word.len() > 1 => match word[1] {
                b'o' => self.check_keyword(word, "continue", TokenKind::Continue),
                b'l' => self.check_keyword(word, "class", TokenKind::Class),
                b'a' => self.check_keyword(word, "case", TokenKind::Case),
                _ => TokenKind::Identifier,
            },
            b'f' if word.len() > 1 => match word[1] {
                b'a' => self.check_keyword(word, "false", TokenKind::False),
                b'o' => self.check_keyword(word, "for", TokenKind::For),
                b'u' => self.check_keyword(word, "function", TokenKind::Function),
                _ => TokenKind::Identifier,
            },
            b't' if word.len() > 1 => match word[1] {
                b'h' => self.check_keyword(word, "this", TokenKind::This),
                b'r' => self.check_keyword(word, "true", TokenKind::True),
                _ => TokenKind::Identifier,
            },
            _ => TokenKind::Identifier,
        }
    }

    fn check_keyword(&self, word: &[u8], keyword: &str, kind: TokenKind) -> TokenKind {
        if word == keyword.as_bytes() {
            kind
        } else {
            TokenKind::Identifier
        }
    }
}

fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_identifier_part(c: u8) -> bool {
    is_identifier_start(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut out = Vec::new();
        loop {
            let token = scanner.scan_token();
            let kind = token.kind;
            out.push(kind);
            if kind == TokenKind::Eof {
                return out;
            }
        }
    }

    #[test]
    fn scans_punctuation_and_operators() {
        assert_eq!(
            kinds("( ) { } [ ] ; , . ? : == != <= >= < > ! ="),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::Semicolon,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::QuestionMark,
                TokenKind::Colon,
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::Bang,
                TokenKind::Equal,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn compound_assignment_splits_in_source_order() {
        assert_eq!(
            kinds("x += 1;"),
            vec![
                TokenKind::Identifier,
                TokenKind::Equal,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("x /= 2;")[1..3],
            [TokenKind::Equal, TokenKind::Slash]
        );
        assert_eq!(
            kinds("x -= 2;")[1..3],
            [TokenKind::Equal, TokenKind::SplitMinus]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("class classy base bases and android"),
            vec![
                TokenKind::Class,
                TokenKind::Identifier,
                TokenKind::Base,
                TokenKind::Identifier,
                TokenKind::And,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn logical_operator_spellings() {
        assert_eq!(
            kinds("a && b || c and d or e")
                .into_iter()
                .filter(|k| matches!(k, TokenKind::And | TokenKind::Or))
                .count(),
            4
        );
        let mut scanner = Scanner::new("a & b");
        scanner.scan_token();
        let err = scanner.scan_token();
        assert_eq!(err.kind, TokenKind::Error);
        assert_eq!(err.text, "Expected '&' after '&'.");
    }

    #[test]
    fn numbers_do_not_eat_bare_dots() {
        assert_eq!(
            kinds("1.5 2. .5"),
            vec![
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Dot,
                TokenKind::Dot,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_lines() {
        let mut scanner = Scanner::new("// line\n/* block\nstill */ x");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::Identifier);
        assert_eq!(token.line, 3);
    }

    #[test]
    fn block_comments_nest() {
        let mut scanner = Scanner::new("/* outer /* inner */ still comment */ x");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::Identifier);
        assert_eq!(token.text, "x");

        // Newlines inside nested comments still advance the line count.
        let mut scanner = Scanner::new("/* a\n/* b\n*/\n*/ y");
        let token = scanner.scan_token();
        assert_eq!(token.text, "y");
        assert_eq!(token.line, 4);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut scanner = Scanner::new("\"oops");
        assert_eq!(scanner.scan_token().kind, TokenKind::Error);
    }

    #[test]
    fn token_spans_tile_the_source() {
        let source = "var x = 1 + foo(2); // tail";
        let mut scanner = Scanner::new(source);
        let mut last_end = 0;
        loop {
            let token = scanner.scan_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            let start = token.text.as_ptr() as usize - source.as_ptr() as usize;
            assert!(start >= last_end, "tokens overlap");
            assert!(
                source[last_end..start].chars().all(|c| c.is_whitespace()),
                "non-trivia gap between tokens"
            );
            last_end = start + token.text.len();
        }
    }
}
