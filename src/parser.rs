use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{Arg, BinaryOp, BoolOp, CmpOp, Expr, Index, Literal, Param, Params, UnaryOp};
use crate::error::SyntaxError;
use crate::lexer::{Keyword, Op, Token, TokenIter};
use crate::stack;

type ParseResult<T> = Result<T, SyntaxError>;

/// How deeply subexpressions may nest: parenthesized groups, lambda bodies,
/// unary operators and the right side of `**` each count one level.
pub const MAX_NESTING: usize = 1500;

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// `name = expr` or `name := expr`
    Definition(String, Expr),
    Expr(Expr),
}

/// Parse a whole expression; every token must be consumed.
///
/// Operators bind the usual way, and redundant parentheses are ignored:
///
/// ```
/// # use lambded::parser::parse;
/// assert_eq!(parse("a + b * c").unwrap(), parse("a + (b * c)").unwrap());
/// assert_eq!(parse("((((a))))").unwrap(), parse("a").unwrap());
/// ```
///
/// `**` is right associative and binds tighter than a unary minus on its left:
///
/// ```
/// # use lambded::parser::parse;
/// assert_eq!(parse("-a ** b ** c").unwrap().to_string(), "-(a ** (b ** c))");
/// ```
///
pub fn parse(source: &str) -> ParseResult<Expr> {
    let mut parser = ExprParser::new(source)?;
    if parser.at_end() {
        return Err(parser.error("empty expression"));
    }
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a line that is either a definition or an expression.
/// Returns `None` for a blank line or a line with only a comment.
///
/// ```
/// # use lambded::parser::{parse_line, Line};
/// match parse_line("sub := lambda a, b: a - b").unwrap() {
///     Some(Line::Definition(name, _)) => assert_eq!(name, "sub"),
///     _ => panic!("expected a definition"),
/// }
/// assert_eq!(parse_line("  # nothing here").unwrap(), None);
/// ```
pub fn parse_line(line: &str) -> ParseResult<Option<Line>> {
    let mut parser = ExprParser::new(line)?;
    if parser.at_end() {
        return Ok(None);
    }
    if let Some(name) = parser.check_is_def() {
        parser.idx += 2;
        if parser.at_end() {
            return Err(parser.error("a definition can't bind to an empty expression"));
        }
        let expr = parser.parse_expr()?;
        parser.expect_end()?;
        return Ok(Some(Line::Definition(name, expr)));
    }
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(Some(Line::Expr(expr)))
}

// Binary operator precedence levels, loosest first.
const BINARY_LEVELS: &[&[(Op, BinaryOp)]] = &[
    &[(Op::Pipe, BinaryOp::BitOr)],
    &[(Op::Caret, BinaryOp::BitXor)],
    &[(Op::Amp, BinaryOp::BitAnd)],
    &[(Op::LShift, BinaryOp::LShift), (Op::RShift, BinaryOp::RShift)],
    &[(Op::Plus, BinaryOp::Add), (Op::Minus, BinaryOp::Sub)],
    &[
        (Op::Star, BinaryOp::Mul),
        (Op::Slash, BinaryOp::TrueDiv),
        (Op::FloorDiv, BinaryOp::FloorDiv),
        (Op::Percent, BinaryOp::Mod),
        (Op::At, BinaryOp::MatMul),
    ],
];

// Our hand-written recursive descent parser. Tokens are collected up front
// together with their byte offsets, so errors can point into the source.
struct ExprParser<'a> {
    tokens: Vec<(usize, Token<'a>)>,
    idx: usize,
    source_len: usize,
    depth: usize,
}

impl<'a> ExprParser<'a> {
    fn new(source: &'a str) -> ParseResult<ExprParser<'a>> {
        let mut token_iter = TokenIter::new(source);
        let mut tokens = Vec::new();
        while let Some(token) = token_iter.next() {
            tokens.push((token_iter.token_start(), token));
        }
        let parser = ExprParser {
            tokens,
            idx: 0,
            source_len: source.len(),
            depth: 0,
        };
        parser.sanity_checks()?;
        Ok(parser)
    }

    fn sanity_checks(&self) -> ParseResult<()> {
        let mut paren_count: i32 = 0;
        for (pos, token) in &self.tokens {
            match token {
                Token::Invalid(c) => {
                    return Err(SyntaxError::new(*pos, format!("invalid character '{}'", c)));
                },
                Token::UnterminatedString => {
                    return Err(SyntaxError::new(*pos, "unterminated string literal"));
                },
                Token::Op(Op::OpenParen) | Token::Op(Op::OpenBracket)
                    | Token::Op(Op::OpenBrace) => paren_count += 1,
                Token::Op(Op::CloseParen) | Token::Op(Op::CloseBracket)
                    | Token::Op(Op::CloseBrace) => paren_count -= 1,
                _ => {},
            }
            if paren_count < 0 {
                return Err(SyntaxError::new(*pos, format!("unmatched '{}'", token)));
            }
        }
        if paren_count > 0 {
            return Err(SyntaxError::new(
                self.source_len,
                format!("{} unclosed parentheses", paren_count),
            ));
        }
        Ok(())
    }

    fn check_is_def(&self) -> Option<String> {
        match (self.tokens.get(0), self.tokens.get(1)) {
            (Some((_, Token::Name(name))), Some((_, Token::Op(Op::Assign))))
                | (Some((_, Token::Name(name))), Some((_, Token::Op(Op::Define)))) => {
                Some(name.to_string())
            },
            _ => None,
        }
    }

    fn at_end(&self) -> bool {
        self.idx >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.idx + n).map(|(_, token)| token)
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.idx).map(|(_, token)| token.clone());
        if token.is_some() {
            self.idx += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.idx).map_or(self.source_len, |(pos, _)| *pos)
    }

    fn error<S: Into<String>>(&self, message: S) -> SyntaxError {
        SyntaxError::new(self.offset(), message)
    }

    fn unexpected(&self) -> SyntaxError {
        match self.peek() {
            Some(token) => self.error(format!("unexpected '{}'", token)),
            None => self.error("unexpected end of input"),
        }
    }

    fn peek_is_op(&self, op: Op) -> bool {
        self.peek() == Some(&Token::Op(op))
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.peek_is_op(op) {
            self.idx += 1;
            return true;
        }
        false
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek() == Some(&Token::Keyword(keyword)) {
            self.idx += 1;
            return true;
        }
        false
    }

    fn expect_op(&mut self, op: Op) -> ParseResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(Token::Name(name)) => {
                let name = name.to_string();
                self.idx += 1;
                Ok(name)
            },
            _ => Err(self.unexpected()),
        }
    }

    fn expect_end(&self) -> ParseResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    // runs one level deeper, failing past MAX_NESTING.
    fn nested<T, F>(&mut self, parse: F) -> ParseResult<T>
    where
        F: FnOnce(&mut Self) -> ParseResult<T>,
    {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression is nested too deeply"));
        }
        self.depth += 1;
        let result = stack::grow(|| parse(self));
        self.depth -= 1;
        result
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.nested(|parser| {
            if parser.eat_keyword(Keyword::Lambda) {
                return parser.parse_lambda();
            }
            parser.parse_ternary()
        })
    }

    // expects the lambda keyword to have been consumed already.
    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let params = self.parse_params()?;
        let body = self.parse_expr()?;
        Ok(Expr::Lambda(Rc::new(params), Rc::new(body)))
    }

    fn parse_params(&mut self) -> ParseResult<Params> {
        let mut params = Params::default();
        let mut seen = HashSet::new();
        let mut star_seen = false;

        while !self.eat_op(Op::Colon) {
            if params.kwargs.is_some() {
                return Err(self.error("arguments cannot follow var-keyword argument"));
            }
            let pos = self.offset();
            let name = if self.eat_op(Op::Pow) {
                let name = self.expect_name()?;
                params.kwargs = Some(name.clone());
                name
            } else if self.eat_op(Op::Star) {
                if star_seen {
                    return Err(self.error("* argument may appear only once"));
                }
                star_seen = true;
                if self.peek_is_op(Op::Comma) {
                    // bare '*': keyword-only parameters follow.
                    self.idx += 1;
                    continue;
                }
                let name = self.expect_name()?;
                params.varargs = Some(name.clone());
                name
            } else {
                let name = self.expect_name()?;
                let default = if self.eat_op(Op::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                if star_seen {
                    params.kwonly.push(Param { name: name.clone(), default });
                } else {
                    let after_default = params.positional.last()
                        .map_or(false, |p| p.default.is_some());
                    if after_default && default.is_none() {
                        return Err(SyntaxError::new(
                            pos,
                            "non-default argument follows default argument",
                        ));
                    }
                    params.positional.push(Param { name: name.clone(), default });
                }
                name
            };
            if !seen.insert(name.clone()) {
                return Err(SyntaxError::new(
                    pos,
                    format!("duplicate argument '{}' in function definition", name),
                ));
            }
            if !self.eat_op(Op::Comma) {
                self.expect_op(Op::Colon)?;
                break;
            }
        }
        if star_seen && params.varargs.is_none() && params.kwonly.is_empty() {
            return Err(self.error("named arguments must follow bare *"));
        }
        Ok(params)
    }

    fn parse_ternary(&mut self) -> ParseResult<Expr> {
        let then = self.parse_or()?;
        if !self.eat_keyword(Keyword::If) {
            return Ok(then);
        }
        let cond = self.parse_or()?;
        if !self.eat_keyword(Keyword::Else) {
            return Err(self.error("expected 'else' after 'if' expression"));
        }
        let otherwise = self.parse_expr()?;
        Ok(Expr::IfElse {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = Expr::BoolOp(BoolOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = Expr::BoolOp(BoolOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.eat_keyword(Keyword::Not) {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let first = self.parse_binary(0)?;
        let mut rest = Vec::new();
        loop {
            let (op, width) = match (self.peek(), self.peek_nth(1)) {
                (Some(Token::Op(Op::Eq)), _) => (CmpOp::Eq, 1),
                (Some(Token::Op(Op::NotEq)), _) => (CmpOp::NotEq, 1),
                (Some(Token::Op(Op::Less)), _) => (CmpOp::Less, 1),
                (Some(Token::Op(Op::LessEq)), _) => (CmpOp::LessEq, 1),
                (Some(Token::Op(Op::Greater)), _) => (CmpOp::Greater, 1),
                (Some(Token::Op(Op::GreaterEq)), _) => (CmpOp::GreaterEq, 1),
                (Some(Token::Keyword(Keyword::In)), _) => (CmpOp::In, 1),
                (Some(Token::Keyword(Keyword::Not)), Some(Token::Keyword(Keyword::In))) => {
                    (CmpOp::NotIn, 2)
                },
                (Some(Token::Keyword(Keyword::Is)), Some(Token::Keyword(Keyword::Not))) => {
                    (CmpOp::IsNot, 2)
                },
                (Some(Token::Keyword(Keyword::Is)), _) => (CmpOp::Is, 1),
                _ => break,
            };
            self.idx += width;
            rest.push((op, self.parse_binary(0)?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn parse_binary(&mut self, level: usize) -> ParseResult<Expr> {
        if level == BINARY_LEVELS.len() {
            return self.parse_factor();
        }
        let mut left = self.parse_binary(level + 1)?;
        'outer: loop {
            for (op, binary_op) in BINARY_LEVELS[level] {
                if self.eat_op(*op) {
                    let right = self.parse_binary(level + 1)?;
                    left = Expr::Binary(*binary_op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let op = match self.peek() {
            Some(Token::Op(Op::Plus)) => UnaryOp::Pos,
            Some(Token::Op(Op::Minus)) => UnaryOp::Neg,
            Some(Token::Op(Op::Tilde)) => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        self.idx += 1;
        let operand = self.nested(Self::parse_factor)?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_primary()?;
        if self.eat_op(Op::Pow) {
            let exponent = self.nested(Self::parse_factor)?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat_op(Op::Dot) {
                let name = self.expect_name()?;
                expr = Expr::Attribute(Box::new(expr), name);
            } else if self.eat_op(Op::OpenParen) {
                let args = self.parse_args()?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat_op(Op::OpenBracket) {
                let index = self.parse_index()?;
                expr = Expr::Subscript(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    // expects the open paren to have been consumed already.
    fn parse_args(&mut self) -> ParseResult<Vec<Arg>> {
        let mut args = Vec::new();
        let mut keyword_seen = false;
        let mut double_star_seen = false;

        while !self.eat_op(Op::CloseParen) {
            let arg = if self.eat_op(Op::Pow) {
                double_star_seen = true;
                Arg::DoubleStar(self.parse_expr()?)
            } else if self.eat_op(Op::Star) {
                if double_star_seen {
                    return Err(self.error(
                        "iterable argument unpacking follows keyword argument unpacking",
                    ));
                }
                Arg::Star(self.parse_expr()?)
            } else if let (Some(Token::Name(name)), Some(Token::Op(Op::Assign)))
                = (self.peek(), self.peek_nth(1))
            {
                let name = name.to_string();
                self.idx += 2;
                keyword_seen = true;
                Arg::Keyword(name, self.parse_expr()?)
            } else {
                if keyword_seen || double_star_seen {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                Arg::Positional(self.parse_expr()?)
            };
            args.push(arg);
            if !self.eat_op(Op::Comma) {
                self.expect_op(Op::CloseParen)?;
                break;
            }
        }
        Ok(args)
    }

    // expects the open bracket to have been consumed already.
    fn parse_index(&mut self) -> ParseResult<Index> {
        let lower = if self.peek_is_op(Op::Colon) {
            None
        } else {
            let first = self.parse_expr()?;
            if self.eat_op(Op::CloseBracket) {
                return Ok(Index::Single(first));
            }
            if self.peek_is_op(Op::Comma) {
                let items = self.parse_sequence(first, Op::CloseBracket)?;
                return Ok(Index::Single(Expr::Tuple(items)));
            }
            Some(first)
        };
        self.expect_op(Op::Colon)?;
        let upper = self.parse_optional_slice_part()?;
        let step = if self.eat_op(Op::Colon) {
            self.parse_optional_slice_part()?
        } else {
            None
        };
        self.expect_op(Op::CloseBracket)?;
        Ok(Index::Slice(lower, upper, step))
    }

    fn parse_optional_slice_part(&mut self) -> ParseResult<Option<Expr>> {
        if self.peek_is_op(Op::Colon) || self.peek_is_op(Op::CloseBracket) {
            Ok(None)
        } else {
            self.parse_expr().map(Some)
        }
    }

    // parses `, item, item ... <close>` after a first item, allowing a
    // trailing comma.
    fn parse_sequence(&mut self, first: Expr, close: Op) -> ParseResult<Vec<Expr>> {
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.peek_is_op(close) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        self.expect_op(close)?;
        Ok(items)
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let pos = self.offset();
        let token = match self.next_token() {
            Some(token) => token,
            None => return Err(self.error("unexpected end of input")),
        };
        let expr = match token {
            Token::Name(name) => Expr::Name(name.to_string()),
            Token::Keyword(Keyword::True) => Expr::Literal(Literal::Bool(true)),
            Token::Keyword(Keyword::False) => Expr::Literal(Literal::Bool(false)),
            Token::Keyword(Keyword::None) => Expr::Literal(Literal::None),
            Token::Keyword(Keyword::Lambda) => self.parse_lambda()?,
            Token::Int(text) => Expr::Literal(Literal::Int(parse_int(text, pos)?)),
            Token::Float(text) => Expr::Literal(Literal::Float(parse_float(text, pos)?)),
            Token::Imaginary(text) => Expr::Literal(Literal::Imaginary(parse_float(text, pos)?)),
            Token::Str(s) => {
                let mut value = s;
                // adjacent string literals are concatenated.
                while let Some(Token::Str(more)) = self.peek() {
                    value.push_str(more);
                    self.idx += 1;
                }
                Expr::Literal(Literal::Str(Rc::from(value.as_str())))
            },
            Token::Op(Op::OpenParen) => {
                if self.eat_op(Op::CloseParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.eat_op(Op::CloseParen) {
                    return Ok(first);
                }
                Expr::Tuple(self.parse_sequence(first, Op::CloseParen)?)
            },
            Token::Op(Op::OpenBracket) => {
                if self.eat_op(Op::CloseBracket) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_expr()?;
                Expr::List(self.parse_sequence(first, Op::CloseBracket)?)
            },
            Token::Op(Op::OpenBrace) => self.parse_dict()?,
            Token::Reserved(word) => {
                return Err(SyntaxError::new(
                    pos,
                    format!("reserved word '{}' cannot appear in an expression", word),
                ));
            },
            other => {
                return Err(SyntaxError::new(pos, format!("unexpected '{}'", other)));
            },
        };
        Ok(expr)
    }

    // expects the open brace to have been consumed already.
    fn parse_dict(&mut self) -> ParseResult<Expr> {
        let mut entries = Vec::new();
        while !self.eat_op(Op::CloseBrace) {
            let key = self.parse_expr()?;
            if !self.eat_op(Op::Colon) {
                return Err(self.error("expected ':' in dict display"));
            }
            let value = self.parse_expr()?;
            entries.push((key, value));
            if !self.eat_op(Op::Comma) {
                self.expect_op(Op::CloseBrace)?;
                break;
            }
        }
        Ok(Expr::Dict(entries))
    }
}

fn parse_int(text: &str, pos: usize) -> ParseResult<i64> {
    let digits: String = text.chars().filter(|c| *c != '_').collect();
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if lower.starts_with("0x") {
        (16, &digits[2..])
    } else if lower.starts_with("0o") {
        (8, &digits[2..])
    } else if lower.starts_with("0b") {
        (2, &digits[2..])
    } else {
        (10, &digits[..])
    };
    if radix == 10 && body.starts_with('0') && body.bytes().any(|b| b != b'0') {
        return Err(SyntaxError::new(
            pos,
            "leading zeros in decimal integer literals are not permitted; use an 0o prefix for octal integers",
        ));
    }
    i64::from_str_radix(body, radix).map_err(|e| {
        SyntaxError::new(pos, format!("invalid integer literal '{}': {}", text, e))
    })
}

fn parse_float(text: &str, pos: usize) -> ParseResult<f64> {
    let digits: String = text.chars().filter(|c| *c != '_').collect();
    digits.parse::<f64>().map_err(|e| {
        SyntaxError::new(pos, format!("invalid number literal '{}': {}", text, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // parse and print back in canonical form.
    fn canonical(source: &str) -> String {
        parse(source).unwrap().to_string()
    }

    fn error_message(source: &str) -> String {
        parse(source).unwrap_err().message
    }

    #[test]
    fn single_name() {
        assert_eq!(parse("x").unwrap(), Expr::Name("x".to_string()));
    }

    #[test]
    fn left_associative_arithmetic() {
        assert_eq!(canonical("a - b - c"), "(a - b) - c");
        assert_eq!(canonical("a / b * c // d"), "((a / b) * c) // d");
    }

    #[test]
    fn builder_output_shapes() {
        assert_eq!(canonical("(x)+1"), "x + 1");
        assert_eq!(canonical("(a)-b"), "a - b");
        assert_eq!(canonical("((x)+1)*y"), "(x + 1) * y");
        assert_eq!(canonical("(x).real"), "x.real");
        assert_eq!(canonical("(f)(4,a,k=23)"), "f(4, a, k=23)");
        assert_eq!(canonical("round(x,None)"), "round(x, None)");
        assert_eq!(canonical("1 in (xs)"), "1 in xs");
    }

    #[test]
    fn lambda_with_params() {
        assert_eq!(canonical("lambda a,b:(a)-b"), "lambda a, b: a - b");
        assert_eq!(canonical("lambda:1"), "lambda: 1");
        assert_eq!(canonical("lambda *args, **kwargs: f(*args, **kwargs)"),
                   "lambda *args, **kwargs: f(*args, **kwargs)");
        assert_eq!(canonical("lambda a, b=2, *, c: a"), "lambda a, b=2, *, c: a");
    }

    #[test]
    fn lambda_body_stretches_as_far_as_possible() {
        assert_eq!(canonical("lambda x: x if x else lambda: 0"),
                   "lambda x: x if x else (lambda: 0)");
    }

    #[test]
    fn precedence_ladder() {
        assert_eq!(canonical("a or b and not c"), "a or (b and (not c))");
        assert_eq!(canonical("a | b ^ c & d << e + f * -g ** h"),
                   "a | (b ^ (c & (d << (e + (f * (-(g ** h)))))))");
    }

    #[test]
    fn comparisons() {
        assert_eq!(canonical("a < b <= c"), "a < b <= c");
        assert_eq!(canonical("a not in b"), "a not in b");
        assert_eq!(canonical("a is not None"), "a is not None");
    }

    #[test]
    fn trailers() {
        assert_eq!(canonical("x.y[1](2).z"), "x.y[1](2).z");
        assert_eq!(canonical("x[1:]"), "x[1:]");
        assert_eq!(canonical("x[::-1]"), "x[::-1]");
        assert_eq!(canonical("x[a:b:2]"), "x[a:b:2]");
        assert_eq!(canonical("x[1, 2]"), "x[(1, 2)]");
    }

    #[test]
    fn displays() {
        assert_eq!(canonical("()"), "()");
        assert_eq!(canonical("(1,)"), "(1,)");
        assert_eq!(canonical("[1, 2,]"), "[1, 2]");
        assert_eq!(canonical("{'a': 1, 'b': [2]}"), "{'a': 1, 'b': [2]}");
        assert_eq!(canonical("'ab' \"cd\""), "'abcd'");
    }

    #[test]
    fn number_literals() {
        assert_eq!(parse("0xff").unwrap(), Expr::Literal(Literal::Int(255)));
        assert_eq!(parse("1_000").unwrap(), Expr::Literal(Literal::Int(1000)));
        assert_eq!(parse("2.5").unwrap(), Expr::Literal(Literal::Float(2.5)));
        assert_eq!(parse("2j").unwrap(), Expr::Literal(Literal::Imaginary(2.0)));
    }

    #[test]
    fn leading_zeros() {
        assert!(error_message("07").starts_with("leading zeros in decimal integer literals"));
        assert!(error_message("1 + 0_1").starts_with("leading zeros"));
        assert_eq!(parse("00").unwrap(), Expr::Literal(Literal::Int(0)));
        assert_eq!(parse("0_0").unwrap(), Expr::Literal(Literal::Int(0)));
        assert_eq!(parse("0o7").unwrap(), Expr::Literal(Literal::Int(7)));
        assert_eq!(parse("07.5").unwrap(), Expr::Literal(Literal::Float(7.5)));
    }

    #[test]
    fn deep_nesting() {
        let depth = 1200;
        let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(parse(&source).unwrap(), Expr::Literal(Literal::Int(1)));

        let depth = MAX_NESTING + 10;
        let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        let err = parse(&source).unwrap_err();
        assert_eq!(err.message, "expression is nested too deeply");

        let source = format!("{}x", "-".repeat(depth));
        assert_eq!(error_message(&source), "expression is nested too deeply");
        let source = format!("{}x", "not ".repeat(depth));
        assert_eq!(error_message(&source), "expression is nested too deeply");
    }

    #[test]
    fn integer_literal_too_large() {
        assert!(error_message("99999999999999999999").starts_with("invalid integer literal"));
    }

    #[test]
    fn empty_expression() {
        assert_eq!(error_message(""), "empty expression");
        assert_eq!(error_message("   # only a comment"), "empty expression");
    }

    #[test]
    fn unbalanced_parentheses() {
        assert_eq!(error_message("((x)"), "1 unclosed parentheses");
        let err = parse("(x))").unwrap_err();
        assert_eq!(err.message, "unmatched ')'");
        assert_eq!(err.pos, 3);
    }

    #[test]
    fn statements_are_rejected() {
        assert_eq!(error_message("del (x)[1]"),
                   "reserved word 'del' cannot appear in an expression");
        assert_eq!(error_message("(x)[1]=2"), "unexpected '='");
    }

    #[test]
    fn positional_after_keyword() {
        assert_eq!(error_message("f(a=1, 2)"), "positional argument follows keyword argument");
    }

    #[test]
    fn duplicate_parameter() {
        assert_eq!(error_message("lambda a, a: a"),
                   "duplicate argument 'a' in function definition");
    }

    #[test]
    fn default_ordering() {
        assert_eq!(error_message("lambda a=1, b: a"),
                   "non-default argument follows default argument");
    }

    #[test]
    fn trailing_tokens() {
        assert_eq!(error_message("a b"), "unexpected 'b'");
    }

    #[test]
    fn definition_line() {
        let line = parse_line("f = lambda x: x").unwrap();
        match line {
            Some(Line::Definition(name, Expr::Lambda(..))) => assert_eq!(name, "f"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn comparison_line_is_not_a_definition() {
        match parse_line("f == 1").unwrap() {
            Some(Line::Expr(Expr::Compare(..))) => {},
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_definition() {
        let err = parse_line("f =").unwrap_err();
        assert_eq!(err.message, "a definition can't bind to an empty expression");
    }
}
