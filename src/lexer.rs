use std::fmt;

use crate::value::str_repr;

/// Words that can never name a variable. Only a few of them mean anything
/// inside an expression (see `Keyword`); the rest are rejected by the parser.
pub const RESERVED_WORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await",
    "break", "class", "continue", "def", "del", "elif", "else", "except",
    "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Keywords understood by the parser.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Keyword {
    False,
    None,
    True,
    And,
    Or,
    Not,
    In,
    Is,
    Lambda,
    If,
    Else,
}

/// Operators and punctuation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Op {
    Pow,
    FloorDiv,
    LShift,
    RShift,
    LessEq,
    GreaterEq,
    Eq,
    NotEq,
    Define,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    At,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Less,
    Greater,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Colon,
    Dot,
    Assign,
}

/// Tokens understood by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Invalid(char),
    UnterminatedString,
    Name(&'a str),
    Keyword(Keyword),
    // reserved, but meaningless inside an expression ("del", "for", ...)
    Reserved(&'a str),
    Int(&'a str),
    Float(&'a str),
    // the digits before the trailing 'j'
    Imaginary(&'a str),
    Str(String),
    Op(Op),
}

// The order matters: if one token is prefix of another, the largest one
// must come first.
const OP_CLASSIFIER: &[(&str, Op)] = &[
    ("**", Op::Pow),
    ("//", Op::FloorDiv),
    ("<<", Op::LShift),
    (">>", Op::RShift),
    ("<=", Op::LessEq),
    (">=", Op::GreaterEq),
    ("==", Op::Eq),
    ("!=", Op::NotEq),
    (":=", Op::Define),
    ("+", Op::Plus),
    ("-", Op::Minus),
    ("*", Op::Star),
    ("/", Op::Slash),
    ("%", Op::Percent),
    ("@", Op::At),
    ("&", Op::Amp),
    ("|", Op::Pipe),
    ("^", Op::Caret),
    ("~", Op::Tilde),
    ("<", Op::Less),
    (">", Op::Greater),
    ("(", Op::OpenParen),
    (")", Op::CloseParen),
    ("[", Op::OpenBracket),
    ("]", Op::CloseBracket),
    ("{", Op::OpenBrace),
    ("}", Op::CloseBrace),
    (",", Op::Comma),
    (":", Op::Colon),
    (".", Op::Dot),
    ("=", Op::Assign),
];

const KEYWORD_CLASSIFIER: &[(&str, Keyword)] = &[
    ("False", Keyword::False),
    ("None", Keyword::None),
    ("True", Keyword::True),
    ("and", Keyword::And),
    ("or", Keyword::Or),
    ("not", Keyword::Not),
    ("in", Keyword::In),
    ("is", Keyword::Is),
    ("lambda", Keyword::Lambda),
    ("if", Keyword::If),
    ("else", Keyword::Else),
];

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Invalid(c) => write!(f, "{}", c),
            Token::UnterminatedString => write!(f, "unterminated string"),
            Token::Name(s) | Token::Reserved(s) | Token::Int(s) | Token::Float(s) => {
                write!(f, "{}", s)
            },
            Token::Imaginary(s) => write!(f, "{}j", s),
            Token::Str(s) => write!(f, "{}", str_repr(s)),
            Token::Keyword(keyword) => {
                let word = KEYWORD_CLASSIFIER.iter()
                    .find(|(_, k)| k == keyword)
                    .map_or("?", |(word, _)| *word);
                write!(f, "{}", word)
            },
            Token::Op(op) => {
                let symbol = OP_CLASSIFIER.iter()
                    .find(|(_, o)| o == op)
                    .map_or("?", |(symbol, _)| *symbol);
                write!(f, "{}", symbol)
            },
        }
    }
}

pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Whether `name` could be lexed as a single variable name.
///
/// ```
/// # use lambded::lexer::is_identifier;
/// assert!(is_identifier("_tmp1"));
/// assert!(is_identifier("λ"));
/// assert!(!is_identifier("1x"));
/// assert!(!is_identifier("a-b"));
/// assert!(!is_identifier(""));
/// ```
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => chars.all(is_name_continue),
        _ => false,
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Removes whitespace and line continuation token (if any) from the end
/// of a line, returning whether there was a line continuation token.
///
pub fn strip_whitespace_and_line_cont(line: &mut String) -> bool {
    while let Some(c) = line.chars().next_back() {
        if !c.is_whitespace() {
            break;
        }
        line.pop();
    }
    match line.chars().next_back() {
        Some('\\') => {
            line.pop();
            true
        },
        _ => false,
    }
}

/// An iterator over the tokens of a string. Used by the parser.
///
/// Operators are matched greedily:
///
/// ```
/// # use lambded::lexer::{Op, Token, TokenIter};
/// let mut iter = TokenIter::new("a**-b");
/// assert_eq!(iter.next(), Some(Token::Name("a")));
/// assert_eq!(iter.next(), Some(Token::Op(Op::Pow)));
/// assert_eq!(iter.next(), Some(Token::Op(Op::Minus)));
/// assert_eq!(iter.next(), Some(Token::Name("b")));
/// assert_eq!(iter.next(), None);
/// ```
///
/// Comments start with '#' and extend until the end of line:
/// ```
/// # use lambded::lexer::TokenIter;
/// let mut iter = TokenIter::new("# This is a comment");
/// assert_eq!(iter.next(), None);
/// ```
///
#[derive(Clone)]
pub struct TokenIter<'a> {
    s: &'a str,
    pos: usize,
    token_start: usize,
}

impl<'a> Iterator for TokenIter<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            self.consume_whitespace();
            let rest_of_string = self.rest_of_string();
            if !rest_of_string.starts_with('#') {
                break;
            }
            // comment; skip to the end of line.
            match rest_of_string.find('\n') {
                Some(i) => self.pos += i,
                None => self.pos = self.s.len(),
            }
        }
        self.token_start = self.pos;

        let rest_of_string = self.rest_of_string();
        let first_char = rest_of_string.chars().next()?;
        let second_char = rest_of_string.chars().nth(1);

        if first_char.is_ascii_digit()
            || (first_char == '.' && second_char.map_or(false, |c| c.is_ascii_digit()))
        {
            return Some(self.handle_number());
        }
        if first_char == '\'' || first_char == '"' {
            return Some(self.handle_string(first_char));
        }
        for (name, op) in OP_CLASSIFIER {
            if rest_of_string.starts_with(name) {
                self.pos += name.len();
                return Some(Token::Op(*op));
            }
        }

        // if we're here, it could be a name or an invalid token.
        Some(self.handle_name_or_invalid())
    }
}

impl<'a> TokenIter<'a> {
    pub fn new(s: &'a str) -> TokenIter<'a> {
        TokenIter {
            s,
            pos: 0,
            token_start: 0,
        }
    }

    /// Byte offset at which the most recently yielded token starts.
    pub fn token_start(&self) -> usize {
        self.token_start
    }

    /// Byte offset just past the last token consumed so far.
    pub fn pos(&self) -> usize {
        self.pos
    }

    fn rest_of_string(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn consume_whitespace(&mut self) {
        let rest_of_string = self.rest_of_string();
        for c in rest_of_string.chars() {
            if !c.is_whitespace() {
                break
            }
            self.pos += c.len_utf8();
        }
    }

    fn handle_name_or_invalid(&mut self) -> Token<'a> {
        let rest_of_string = self.rest_of_string();
        let mut name_len = 0;
        for c in rest_of_string.chars() {
            let accepted = if name_len == 0 { is_name_start(c) } else { is_name_continue(c) };
            if !accepted {
                break;
            }
            name_len += c.len_utf8();
        }

        if name_len == 0 {
            // we must increment position here too, otherwise we'll yield
            // the same invalid token forever.
            let c = rest_of_string.chars().next().unwrap_or('\0');
            self.pos += c.len_utf8();
            return Token::Invalid(c);
        }

        self.pos += name_len;
        let name = &rest_of_string[..name_len];
        for (word, keyword) in KEYWORD_CLASSIFIER {
            if name == *word {
                return Token::Keyword(*keyword);
            }
        }
        if is_reserved_word(name) {
            Token::Reserved(name)
        } else {
            Token::Name(name)
        }
    }

    fn handle_number(&mut self) -> Token<'a> {
        let rest_of_string = self.rest_of_string();
        let bytes = rest_of_string.as_bytes();
        let digits_from = |mut i: usize| {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'_') {
                i += 1;
            }
            i
        };

        // 0x.., 0o.., 0b..; validated when the parser converts them.
        if bytes.len() > 1 && bytes[0] == b'0' && matches!(bytes[1] | 0x20, b'x' | b'o' | b'b') {
            let mut len = 2;
            while len < bytes.len() && (bytes[len].is_ascii_alphanumeric() || bytes[len] == b'_') {
                len += 1;
            }
            self.pos += len;
            return Token::Int(&rest_of_string[..len]);
        }

        let mut len = digits_from(0);
        let mut is_float = false;
        if len < bytes.len() && bytes[len] == b'.' {
            is_float = true;
            len = digits_from(len + 1);
        }
        if len < bytes.len() && (bytes[len] | 0x20) == b'e' {
            let mut exp = len + 1;
            if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
                exp += 1;
            }
            if exp < bytes.len() && bytes[exp].is_ascii_digit() {
                is_float = true;
                len = digits_from(exp);
            }
        }
        if len < bytes.len() && (bytes[len] | 0x20) == b'j' {
            self.pos += len + 1;
            return Token::Imaginary(&rest_of_string[..len]);
        }

        self.pos += len;
        if is_float {
            Token::Float(&rest_of_string[..len])
        } else {
            Token::Int(&rest_of_string[..len])
        }
    }

    fn handle_string(&mut self, quote: char) -> Token<'a> {
        let rest_of_string = self.rest_of_string();
        let mut chars = rest_of_string.char_indices().skip(1);
        let mut value = String::new();

        while let Some((i, c)) = chars.next() {
            if c == quote {
                self.pos += i + c.len_utf8();
                return Token::Str(value);
            }
            if c != '\\' {
                value.push(c);
                continue;
            }
            match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, '0')) => value.push('\0'),
                Some((_, escaped @ '\\')) | Some((_, escaped @ '\''))
                    | Some((_, escaped @ '"')) => value.push(escaped),
                // unknown escapes are kept verbatim
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                },
                None => break,
            }
        }
        self.pos = self.s.len();
        Token::UnterminatedString
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(s: &str) -> Vec<Token> {
        TokenIter::new(s).collect()
    }

    #[test]
    fn single_token_single_char() {
        assert_eq!(lex("="), vec![Token::Op(Op::Assign)]);
    }

    #[test]
    fn single_token_utf8() {
        assert_eq!(lex("λ"), vec![Token::Name("λ")]);
    }

    #[test]
    fn keywords_and_reserved() {
        assert_eq!(
            lex("lambda del not"),
            vec![
                Token::Keyword(Keyword::Lambda),
                Token::Reserved("del"),
                Token::Keyword(Keyword::Not),
            ]
        );
    }

    #[test]
    fn name_with_keyword_prefix() {
        assert_eq!(lex("lambdas inx"), vec![Token::Name("lambdas"), Token::Name("inx")]);
    }

    #[test]
    fn token_prefix_of_another() {
        assert_eq!(
            lex("**=:=<<<"),
            vec![
                Token::Op(Op::Pow),
                Token::Op(Op::Assign),
                Token::Op(Op::Define),
                Token::Op(Op::LShift),
                Token::Op(Op::Less),
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            lex("12 1_000 3.5 .5 1e3 2.5e-2 0xff 0o17 0b101 2j 1.5J"),
            vec![
                Token::Int("12"),
                Token::Int("1_000"),
                Token::Float("3.5"),
                Token::Float(".5"),
                Token::Float("1e3"),
                Token::Float("2.5e-2"),
                Token::Int("0xff"),
                Token::Int("0o17"),
                Token::Int("0b101"),
                Token::Imaginary("2"),
                Token::Imaginary("1.5"),
            ]
        );
    }

    #[test]
    fn attribute_after_paren_is_not_a_number() {
        assert_eq!(
            lex("(x).real"),
            vec![
                Token::Op(Op::OpenParen),
                Token::Name("x"),
                Token::Op(Op::CloseParen),
                Token::Op(Op::Dot),
                Token::Name("real"),
            ]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            lex(r#"'a\'b' "c\nd""#),
            vec![Token::Str("a'b".to_string()), Token::Str("c\nd".to_string())]
        );
    }

    #[test]
    fn unterminated_string() {
        assert_eq!(lex("'abc"), vec![Token::UnterminatedString]);
    }

    #[test]
    fn invalid_char_advances() {
        assert_eq!(lex("$ ?"), vec![Token::Invalid('$'), Token::Invalid('?')]);
    }

    #[test]
    fn comment_after_valid_tokens() {
        assert_eq!(
            lex("x + 1 # comment\n- y"),
            vec![
                Token::Name("x"),
                Token::Op(Op::Plus),
                Token::Int("1"),
                Token::Op(Op::Minus),
                Token::Name("y"),
            ]
        );
    }

    #[test]
    fn token_offsets() {
        let mut iter = TokenIter::new("  ab + c");
        iter.next();
        assert_eq!(iter.token_start(), 2);
        iter.next();
        assert_eq!(iter.token_start(), 5);
        assert_eq!(iter.pos(), 6);
    }

    #[test]
    fn line_continuation() {
        let mut line = "lambda x: \\  ".to_string();
        assert!(strip_whitespace_and_line_cont(&mut line));
        assert_eq!(line, "lambda x: ");
        let mut line = "x + 1  ".to_string();
        assert!(!strip_whitespace_and_line_cont(&mut line));
        assert_eq!(line, "x + 1");
    }
}
