use std::fmt;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use crate::stack;
use crate::value::{float_repr, imag_repr, str_repr};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Imaginary(f64),
    Str(Rc<str>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOp {
    Pos,
    Neg,
    Invert,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    MatMul,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Positional(Expr),
    Star(Expr),
    Keyword(String, Expr),
    DoubleStar(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    Single(Expr),
    Slice(Option<Expr>, Option<Expr>, Option<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// Formal parameters of a lambda, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    pub positional: Vec<Param>,
    pub varargs: Option<String>,
    // parameters after `*name` can only be passed by keyword
    pub kwonly: Vec<Param>,
    pub kwargs: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    BoolOp(BoolOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Attribute(Box<Expr>, String),
    Subscript(Box<Expr>, Box<Index>),
    Call(Box<Expr>, Vec<Arg>),
    Lambda(Rc<Params>, Rc<Expr>),
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Pos => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Invert => "~",
        }
    }
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::TrueDiv => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::MatMul => "@",
            BinaryOp::LShift => "<<",
            BinaryOp::RShift => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        }
    }
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Less => "<",
            CmpOp::LessEq => "<=",
            CmpOp::Greater => ">",
            CmpOp::GreaterEq => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

impl Expr {
    // whether this expression needs parentheses when used as an operand.
    fn is_compound(&self) -> bool {
        match self {
            Expr::Unary(..)
            | Expr::Binary(..)
            | Expr::BoolOp(..)
            | Expr::Not(_)
            | Expr::Compare(..)
            | Expr::IfElse { .. }
            | Expr::Lambda(..) => true,
            Expr::Literal(Literal::Int(i)) => *i < 0,
            Expr::Literal(Literal::Float(_)) | Expr::Literal(Literal::Imaginary(_)) => true,
            _ => false,
        }
    }

    fn fmt_operand(&self, f: &mut Formatter) -> fmt::Result {
        if self.is_compound() {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

fn fmt_comma_separated<T: Display>(f: &mut Formatter, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Literal::None => write!(f, "None"),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", float_repr(*x)),
            Literal::Imaginary(x) => write!(f, "{}j", imag_repr(*x)),
            Literal::Str(s) => write!(f, "{}", str_repr(s)),
        }
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Arg::Positional(e) => write!(f, "{}", e),
            Arg::Star(e) => write!(f, "*{}", e),
            Arg::Keyword(name, e) => write!(f, "{}={}", name, e),
            Arg::DoubleStar(e) => write!(f, "**{}", e),
        }
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.default {
            None => write!(f, "{}", self.name),
            Some(default) => write!(f, "{}={}", self.name, default),
        }
    }
}

impl Params {
    /// Names of all parameters, in the order they were declared.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.positional.iter().map(|p| p.name.clone()).collect();
        if let Some(name) = &self.varargs {
            names.push(format!("*{}", name));
        }
        names.extend(self.kwonly.iter().map(|p| p.name.clone()));
        if let Some(name) = &self.kwargs {
            names.push(format!("**{}", name));
        }
        names
    }
}

impl Display for Params {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut parts: Vec<String> = self.positional.iter().map(|p| p.to_string()).collect();
        match &self.varargs {
            Some(name) => parts.push(format!("*{}", name)),
            None if !self.kwonly.is_empty() => parts.push("*".to_string()),
            None => {},
        }
        parts.extend(self.kwonly.iter().map(|p| p.to_string()));
        if let Some(name) = &self.kwargs {
            parts.push(format!("**{}", name));
        }
        fmt_comma_separated(f, &parts)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        stack::grow(|| self.write_to(f))
    }
}

impl Expr {
    fn write_to(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Name(name) => write!(f, "{}", name),
            Expr::Tuple(items) => {
                write!(f, "(")?;
                fmt_comma_separated(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            },
            Expr::List(items) => {
                write!(f, "[")?;
                fmt_comma_separated(f, items)?;
                write!(f, "]")
            },
            Expr::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            },
            Expr::Unary(op, operand) => {
                write!(f, "{}", op.symbol())?;
                operand.fmt_operand(f)
            },
            Expr::Binary(op, left, right) => {
                left.fmt_operand(f)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_operand(f)
            },
            Expr::BoolOp(op, left, right) => {
                left.fmt_operand(f)?;
                match op {
                    BoolOp::And => write!(f, " and ")?,
                    BoolOp::Or => write!(f, " or ")?,
                }
                right.fmt_operand(f)
            },
            Expr::Not(operand) => {
                write!(f, "not ")?;
                operand.fmt_operand(f)
            },
            Expr::Compare(first, rest) => {
                first.fmt_operand(f)?;
                for (op, operand) in rest {
                    write!(f, " {} ", op.symbol())?;
                    operand.fmt_operand(f)?;
                }
                Ok(())
            },
            Expr::IfElse { cond, then, otherwise } => {
                then.fmt_operand(f)?;
                write!(f, " if ")?;
                cond.fmt_operand(f)?;
                write!(f, " else ")?;
                otherwise.fmt_operand(f)
            },
            Expr::Attribute(target, name) => {
                target.fmt_operand(f)?;
                write!(f, ".{}", name)
            },
            Expr::Subscript(target, index) => {
                target.fmt_operand(f)?;
                write!(f, "[")?;
                match index.as_ref() {
                    Index::Single(e) => write!(f, "{}", e)?,
                    Index::Slice(lower, upper, step) => {
                        if let Some(e) = lower {
                            write!(f, "{}", e)?;
                        }
                        write!(f, ":")?;
                        if let Some(e) = upper {
                            write!(f, "{}", e)?;
                        }
                        if let Some(e) = step {
                            write!(f, ":{}", e)?;
                        }
                    },
                }
                write!(f, "]")
            },
            Expr::Call(func, args) => {
                func.fmt_operand(f)?;
                write!(f, "(")?;
                fmt_comma_separated(f, args)?;
                write!(f, ")")
            },
            Expr::Lambda(params, body) => {
                if params.names().is_empty() {
                    write!(f, "lambda: {}", body)
                } else {
                    write!(f, "lambda {}: {}", params, body)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // wrappers to reduce boilerplate.
    fn name(s: &str) -> Box<Expr> {
        Box::new(Expr::Name(s.to_string()))
    }
    fn int(i: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Int(i)))
    }

    #[test]
    fn nested_binary_is_parenthesized() {
        let expr = Expr::Binary(
            BinaryOp::Mul,
            Box::new(Expr::Binary(BinaryOp::Add, name("a"), int(1))),
            name("b"),
        );
        assert_eq!(expr.to_string(), "(a + 1) * b");
    }

    #[test]
    fn unary_and_attribute() {
        let expr = Expr::Attribute(
            Box::new(Expr::Unary(UnaryOp::Neg, name("x"))),
            "real".to_string(),
        );
        assert_eq!(expr.to_string(), "(-x).real");
    }

    #[test]
    fn single_element_tuple() {
        let expr = Expr::Tuple(vec![*name("a")]);
        assert_eq!(expr.to_string(), "(a,)");
    }

    #[test]
    fn chained_comparison() {
        let expr = Expr::Compare(
            int(1),
            vec![(CmpOp::Less, *name("x")), (CmpOp::NotIn, *name("ys"))],
        );
        assert_eq!(expr.to_string(), "1 < x not in ys");
    }

    #[test]
    fn lambda_params() {
        let params = Params {
            positional: vec![
                Param { name: "a".to_string(), default: None },
                Param { name: "b".to_string(), default: Some(*int(2)) },
            ],
            varargs: Some("args".to_string()),
            kwonly: vec![Param { name: "k".to_string(), default: None }],
            kwargs: Some("kwargs".to_string()),
        };
        assert_eq!(params.names(), vec!["a", "b", "*args", "k", "**kwargs"]);
        let expr = Expr::Lambda(Rc::new(params), Rc::new(*name("a")));
        assert_eq!(expr.to_string(), "lambda a, b=2, *args, k, **kwargs: a");
    }

    #[test]
    fn nullary_lambda() {
        let expr = Expr::Lambda(Rc::new(Params::default()), Rc::new(*int(1)));
        assert_eq!(expr.to_string(), "lambda: 1");
    }

    #[test]
    fn string_literal_repr() {
        let expr = Expr::Literal(Literal::Str(Rc::from("it's")));
        assert_eq!(expr.to_string(), "\"it's\"");
    }
}
