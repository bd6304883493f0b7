//! Building expressions out of placeholders and compiling them into
//! functions.
//!
//! A `LambdaExpr` is an immutable sequence of source fragments. Every
//! combinator wraps the fragments it was called on and returns a new
//! expression; nothing is evaluated until the expression is called.
//!
//! ```
//! use lambded::{LambdaVar, Value};
//!
//! let a = LambdaVar::new("a").unwrap();
//! let b = LambdaVar::new("b").unwrap();
//! let diff = &a - &b;
//! assert_eq!(diff.to_string(), "(a)-b");
//!
//! let results: Vec<Value> = [(10, 10), (20, 20), (30, 20)]
//!     .iter()
//!     .map(|&(x, y)| diff.call(vec![x, y]).unwrap())
//!     .collect();
//! assert_eq!(results, vec![Value::Int(0), Value::Int(0), Value::Int(10)]);
//! ```

use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::backend::{Backend, Callable};
use crate::error::{Error, Result};
use crate::interp::Interpreter;
use crate::registry;
use crate::value::{float_repr, Value};
use crate::var::LambdaVar;

/// The right-hand side of a combinator: either another expression, whose
/// fragments are spliced in as they are, or a literal spliced in as text.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Expression text, spliced verbatim.
    Text(String),
    Int(i128),
    Float(f64),
    Bool(bool),
    Expr(LambdaExpr),
}

impl Operand {
    fn kind(&self) -> &'static str {
        match self {
            Operand::Text(_) => "str",
            Operand::Int(_) => "int",
            Operand::Float(_) => "float",
            Operand::Bool(_) => "bool",
            Operand::Expr(_) => "LambdaExpr",
        }
    }

    fn into_tokens(self) -> Vec<String> {
        match self {
            Operand::Expr(expr) => expr.inner.tokens.clone(),
            Operand::Text(text) => vec![text],
            literal => vec![literal.to_string()],
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Operand::Text(text) => write!(f, "{}", text),
            Operand::Int(i) => write!(f, "{}", i),
            Operand::Float(x) => write!(f, "{}", float_repr(*x)),
            Operand::Bool(true) => write!(f, "True"),
            Operand::Bool(false) => write!(f, "False"),
            Operand::Expr(expr) => write!(f, "{}", expr),
        }
    }
}

macro_rules! operand_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl From<$ty> for Operand {
            fn from(v: $ty) -> Operand {
                Operand::$variant(v.into())
            }
        }
    )*};
}

operand_from! {
    i32 => Int,
    i64 => Int,
    u32 => Int,
    u64 => Int,
    f32 => Float,
    f64 => Float,
    bool => Bool,
    String => Text,
    &str => Text,
    LambdaExpr => Expr,
}

impl From<usize> for Operand {
    fn from(v: usize) -> Operand {
        Operand::Int(v as i128)
    }
}

impl From<&LambdaExpr> for Operand {
    fn from(expr: &LambdaExpr) -> Operand {
        Operand::Expr(expr.clone())
    }
}

impl From<LambdaVar> for Operand {
    fn from(var: LambdaVar) -> Operand {
        Operand::Expr((*var).clone())
    }
}

impl From<&LambdaVar> for Operand {
    fn from(var: &LambdaVar) -> Operand {
        Operand::Expr((**var).clone())
    }
}

struct Inner {
    tokens: Vec<String>,
    compiled: OnceCell<Rc<dyn Callable>>,
}

/// An expression under construction. Cloning is cheap and clones share the
/// compiled function.
#[derive(Clone)]
pub struct LambdaExpr {
    inner: Rc<Inner>,
}

impl Debug for LambdaExpr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("LambdaExpr").field(&self.to_string()).finish()
    }
}

impl Display for LambdaExpr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for token in &self.inner.tokens {
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

// `*args` sorts after plain names and `**kwargs` after everything, so the
// parameter list is always valid.
fn param_rank(name: &str) -> u8 {
    if name.starts_with("**") {
        2
    } else if name.starts_with('*') {
        1
    } else {
        0
    }
}

impl LambdaExpr {
    pub fn new<I, S>(tokens: I) -> LambdaExpr
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LambdaExpr {
            inner: Rc::new(Inner {
                tokens: tokens.into_iter().map(Into::into).collect(),
                compiled: OnceCell::new(),
            }),
        }
    }

    /// The fragments this expression is made of.
    pub fn tokens(&self) -> &[String] {
        &self.inner.tokens
    }

    // `<prefix><tokens><suffix>`
    fn wrap(&self, prefix: &str, suffix: &str) -> LambdaExpr {
        let mut tokens = Vec::with_capacity(self.inner.tokens.len() + 2);
        tokens.push(prefix.to_string());
        tokens.extend(self.inner.tokens.iter().cloned());
        tokens.push(suffix.to_string());
        LambdaExpr::new(tokens)
    }

    fn call_builtin(&self, name: &str) -> LambdaExpr {
        self.wrap(&format!("{}(", name), ")")
    }

    /// `(<self>).name`
    ///
    /// ```
    /// # use lambded::{LambdaVar, Value};
    /// let x = LambdaVar::new("x").unwrap();
    /// let real = x.attr("real");
    /// assert_eq!(real.to_string(), "(x).real");
    /// assert_eq!(real.call(vec![Value::complex(5.0, 2.0)]).unwrap(), Value::Float(5.0));
    /// ```
    pub fn attr(&self, name: &str) -> LambdaExpr {
        self.wrap("(", &format!(").{}", name))
    }

    /// `(<self>)(a1,a2,k1=v1,...)`. Arguments are expression text; anything
    /// else is rejected.
    ///
    /// ```
    /// # use lambded::{LambdaExpr, Operand};
    /// let x = LambdaExpr::new(vec!["x"]);
    /// let call = x.apply(vec!["4".into(), "a".into()], vec![("k", "23".into()), ("www", "32".into())]);
    /// assert_eq!(call.unwrap().to_string(), "(x)(4,a,k=23,www=32)");
    /// assert!(x.apply(vec![Operand::from(4)], vec![]).is_err());
    /// ```
    pub fn apply(&self, args: Vec<Operand>, kwargs: Vec<(&str, Operand)>) -> Result<LambdaExpr> {
        let mut tokens = vec!["(".to_string()];
        tokens.extend(self.inner.tokens.iter().cloned());
        tokens.push(")(".to_string());
        let mut first = true;
        for arg in args {
            let text = expect_text(arg, None)?;
            if !first {
                tokens.push(",".to_string());
            }
            tokens.push(text);
            first = false;
        }
        for (key, value) in kwargs {
            let text = expect_text(value, Some(key))?;
            let sep = if first { "" } else { "," };
            tokens.push(format!("{}{}=", sep, key));
            tokens.push(text);
            first = false;
        }
        tokens.push(")".to_string());
        Ok(LambdaExpr::new(tokens))
    }

    /// `(<self>)<op><right>`
    pub fn collapse<R: Into<Operand>>(&self, right: R, op: &str) -> LambdaExpr {
        let right = right.into().into_tokens();
        let mut tokens = Vec::with_capacity(self.inner.tokens.len() + right.len() + 3);
        tokens.push("(".to_string());
        tokens.extend(self.inner.tokens.iter().cloned());
        tokens.push(")".to_string());
        tokens.push(op.to_string());
        tokens.extend(right);
        LambdaExpr::new(tokens)
    }

    pub fn positive(&self) -> LambdaExpr {
        self.wrap("+(", ")")
    }

    pub fn negate(&self) -> LambdaExpr {
        self.wrap("-(", ")")
    }

    pub fn invert(&self) -> LambdaExpr {
        self.wrap("~(", ")")
    }

    pub fn abs(&self) -> LambdaExpr {
        self.call_builtin("abs")
    }

    /// `round(<self>,<n>)`, with `None` asking for the nearest integer.
    ///
    /// ```
    /// # use lambded::{LambdaExpr, Value};
    /// let x = LambdaExpr::new(vec!["x"]);
    /// assert_eq!(x.round(None).to_string(), "round(x,None)");
    /// let one_digit = x.round(Some(1.into()));
    /// assert_eq!(one_digit.to_string(), "round(x,1)");
    /// ```
    pub fn round(&self, n: Option<Operand>) -> LambdaExpr {
        let mut tokens = vec!["round(".to_string()];
        tokens.extend(self.inner.tokens.iter().cloned());
        tokens.push(",".to_string());
        match n {
            Some(n) => tokens.extend(n.into_tokens()),
            None => tokens.push("None".to_string()),
        }
        tokens.push(")".to_string());
        LambdaExpr::new(tokens)
    }

    pub fn equals<R: Into<Operand>>(&self, right: R) -> LambdaExpr {
        self.collapse(right, "==")
    }

    pub fn not_equals<R: Into<Operand>>(&self, right: R) -> LambdaExpr {
        self.collapse(right, "!=")
    }

    pub fn less<R: Into<Operand>>(&self, right: R) -> LambdaExpr {
        self.collapse(right, "<")
    }

    pub fn greater<R: Into<Operand>>(&self, right: R) -> LambdaExpr {
        self.collapse(right, ">")
    }

    pub fn less_equal<R: Into<Operand>>(&self, right: R) -> LambdaExpr {
        self.collapse(right, "<=")
    }

    pub fn greater_equal<R: Into<Operand>>(&self, right: R) -> LambdaExpr {
        self.collapse(right, ">=")
    }

    pub fn floor_div<R: Into<Operand>>(&self, right: R) -> LambdaExpr {
        self.collapse(right, "//")
    }

    pub fn pow<R: Into<Operand>>(&self, right: R) -> LambdaExpr {
        self.collapse(right, "**")
    }

    pub fn matmul<R: Into<Operand>>(&self, right: R) -> LambdaExpr {
        self.collapse(right, "@")
    }

    /// `divmod(<self>,<right>)`
    pub fn divmod<R: Into<Operand>>(&self, right: R) -> LambdaExpr {
        let mut tokens = vec!["divmod(".to_string()];
        tokens.extend(self.inner.tokens.iter().cloned());
        tokens.push(",".to_string());
        tokens.extend(right.into().into_tokens());
        tokens.push(")".to_string());
        LambdaExpr::new(tokens)
    }

    pub fn to_int(&self) -> LambdaExpr {
        self.call_builtin("int")
    }

    pub fn to_float(&self) -> LambdaExpr {
        self.call_builtin("float")
    }

    pub fn to_complex(&self) -> LambdaExpr {
        self.call_builtin("complex")
    }

    pub fn to_oct(&self) -> LambdaExpr {
        self.call_builtin("oct")
    }

    pub fn to_hex(&self) -> LambdaExpr {
        self.call_builtin("hex")
    }

    pub fn hash(&self) -> LambdaExpr {
        self.call_builtin("hash")
    }

    /// `bool(<self>)`
    pub fn truth(&self) -> LambdaExpr {
        self.call_builtin("bool")
    }

    pub fn len(&self) -> LambdaExpr {
        self.call_builtin("len")
    }

    pub fn iter(&self) -> LambdaExpr {
        self.call_builtin("iter")
    }

    pub fn reversed(&self) -> LambdaExpr {
        self.call_builtin("reversed")
    }

    /// `(<self>)[<key>]`
    pub fn get_item<K: Into<Operand>>(&self, key: K) -> LambdaExpr {
        self.subscript("(", key.into(), None)
    }

    /// `(<self>)[<key>]=<value>`. Assignment is a statement, so the result
    /// only ever fails to compile.
    pub fn set_item<K: Into<Operand>, V: Into<Operand>>(&self, key: K, value: V) -> LambdaExpr {
        self.subscript("(", key.into(), Some(value.into()))
    }

    /// `del (<self>)[<key>]`. Like `set_item`, this never compiles.
    pub fn del_item<K: Into<Operand>>(&self, key: K) -> LambdaExpr {
        self.subscript("del (", key.into(), None)
    }

    fn subscript(&self, prefix: &str, key: Operand, value: Option<Operand>) -> LambdaExpr {
        let mut tokens = vec![prefix.to_string()];
        tokens.extend(self.inner.tokens.iter().cloned());
        tokens.push(")[".to_string());
        tokens.extend(key.into_tokens());
        tokens.push("]".to_string());
        if let Some(value) = value {
            tokens.push("=".to_string());
            tokens.extend(value.into_tokens());
        }
        LambdaExpr::new(tokens)
    }

    /// `<item> in (<self>)`
    pub fn contains<I: Into<Operand>>(&self, item: I) -> LambdaExpr {
        let mut tokens = item.into().into_tokens();
        tokens.push(" in (".to_string());
        tokens.extend(self.inner.tokens.iter().cloned());
        tokens.push(")".to_string());
        LambdaExpr::new(tokens)
    }

    /// Registered names that occur as a whole fragment of this expression:
    /// plain names sorted, then `*args`, then `**kwargs`.
    ///
    /// A name that only occurs inside a longer fragment (say, the text
    /// passed to `apply`) is not found.
    pub fn free_vars(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.tokens.iter()
            .filter(|token| registry::is_registered(token))
            .cloned()
            .collect();
        names.sort_by(|a, b| (param_rank(a), a).cmp(&(param_rank(b), b)));
        names.dedup();
        names
    }

    /// The function source handed to the backend.
    ///
    /// ```
    /// # use lambded::LambdaVar;
    /// let y = LambdaVar::new("y").unwrap();
    /// let x = LambdaVar::new("x").unwrap();
    /// assert_eq!((&y + &x).source(), "lambda x,y:(y)+x");
    /// ```
    pub fn source(&self) -> String {
        format!("lambda {}:{}", self.free_vars().join(","), self)
    }

    /// Compiles with the default interpreter, once.
    pub fn compile(&self) -> Result<Rc<dyn Callable>> {
        if let Some(compiled) = self.inner.compiled.get() {
            return Ok(Rc::clone(compiled));
        }
        self.compile_with(&Interpreter::new())
    }

    /// Compiles with `backend` unless this expression (or a clone of it)
    /// was compiled already, in which case the earlier function is reused.
    pub fn compile_with(&self, backend: &dyn Backend) -> Result<Rc<dyn Callable>> {
        let compiled = self.inner.compiled.get_or_try_init(|| backend.compile(&self.source()))?;
        Ok(Rc::clone(compiled))
    }

    pub fn is_compiled(&self) -> bool {
        self.inner.compiled.get().is_some()
    }

    /// Whether both handles refer to the same expression.
    pub fn ptr_eq(&self, other: &LambdaExpr) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn call<I, V>(&self, args: I) -> Result<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.call_with_kwargs(args, Vec::<(String, Value)>::new())
    }

    pub fn call_with_kwargs<I, V, K, S, W>(&self, args: I, kwargs: K) -> Result<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
        K: IntoIterator<Item = (S, W)>,
        S: Into<String>,
        W: Into<Value>,
    {
        let function = self.compile()?;
        let args = args.into_iter().map(Into::into).collect();
        let kwargs = kwargs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        function.call(args, kwargs).map_err(Error::Runtime)
    }
}

fn expect_text(arg: Operand, key: Option<&str>) -> Result<String> {
    match arg {
        Operand::Text(text) => Ok(text),
        other => {
            let arg = match key {
                Some(key) => format!("{}={}", key, other),
                None => other.to_string(),
            };
            Err(Error::ArgumentType {
                arg,
                kind: other.kind(),
            })
        },
    }
}

macro_rules! binary_operators {
    ($($op_trait:ident $method:ident $symbol:expr;)*) => {$(
        impl<R: Into<Operand>> std::ops::$op_trait<R> for LambdaExpr {
            type Output = LambdaExpr;

            fn $method(self, right: R) -> LambdaExpr {
                self.collapse(right, $symbol)
            }
        }

        impl<R: Into<Operand>> std::ops::$op_trait<R> for &LambdaExpr {
            type Output = LambdaExpr;

            fn $method(self, right: R) -> LambdaExpr {
                self.collapse(right, $symbol)
            }
        }

        impl<R: Into<Operand>> std::ops::$op_trait<R> for LambdaVar {
            type Output = LambdaExpr;

            fn $method(self, right: R) -> LambdaExpr {
                self.collapse(right, $symbol)
            }
        }

        impl<R: Into<Operand>> std::ops::$op_trait<R> for &LambdaVar {
            type Output = LambdaExpr;

            fn $method(self, right: R) -> LambdaExpr {
                self.collapse(right, $symbol)
            }
        }
    )*};
}

binary_operators! {
    Add add "+";
    Sub sub "-";
    Mul mul "*";
    Div div "/";
    Rem rem "%";
    BitAnd bitand "&";
    BitOr bitor "|";
    BitXor bitxor "^";
    Shl shl "<<";
    Shr shr ">>";
}

macro_rules! unary_operators {
    ($($ty:ty),*) => {$(
        impl std::ops::Neg for $ty {
            type Output = LambdaExpr;

            fn neg(self) -> LambdaExpr {
                self.negate()
            }
        }

        impl std::ops::Not for $ty {
            type Output = LambdaExpr;

            fn not(self) -> LambdaExpr {
                self.invert()
            }
        }
    )*};
}

unary_operators!(LambdaExpr, &LambdaExpr, LambdaVar, &LambdaVar);

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::builtins::Builtin;
    use crate::error::{ErrorKind, SyntaxError};

    fn var(name: &str) -> LambdaVar {
        LambdaVar::new(name).unwrap()
    }

    #[test]
    fn add_one() {
        let x = var("x");
        let expr = &x + 1;
        assert_eq!(expr.to_string(), "(x)+1");
        assert_eq!(expr.call(vec![5]).unwrap(), Value::Int(6));
        assert_eq!(expr.call_with_kwargs(Vec::<Value>::new(), vec![("x", 5)]).unwrap(), Value::Int(6));
    }

    #[test]
    fn long_operator_chains() {
        let x = var("x");
        let mut chain = LambdaExpr::from(x.clone());
        for _ in 0..1000 {
            chain = &chain + 1;
        }
        assert_eq!(chain.call(vec![0]).unwrap(), Value::Int(1000));

        let mut chain = LambdaExpr::from(x);
        for _ in 0..1600 {
            chain = chain * 2;
        }
        match chain.call(vec![1]) {
            Err(Error::Compile(e)) => assert_eq!(e.message, "expression is nested too deeply"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subtract_pairs() {
        let a = var("a");
        let b = var("b");
        let diff = a - &b;
        let results: Vec<Value> = [(10, 10), (20, 20), (30, 20)]
            .iter()
            .map(|&(x, y)| diff.call(vec![x, y]).unwrap())
            .collect();
        assert_eq!(results, vec![Value::Int(0), Value::Int(0), Value::Int(10)]);
    }

    #[test]
    fn attribute_access() {
        let x = var("x");
        let real = x.attr("real");
        assert_eq!(real.call(vec![Value::complex(5.0, 2.0)]).unwrap(), Value::Float(5.0));
        let results: Vec<String> = vec![Value::Int(3), Value::Int(4), Value::complex(5.0, 2.0)]
            .into_iter()
            .map(|v| real.call(vec![v]).unwrap().to_string())
            .collect();
        assert_eq!(results, vec!["3", "4", "5.0"]);
    }

    #[test]
    fn apply_rejects_non_text() {
        let x = var("x");
        let err = x.apply(vec![Operand::from(4)], vec![]).unwrap_err();
        assert_eq!(err, Error::ArgumentType { arg: "4".to_string(), kind: "int" });
        let err = x.apply(vec!["4".into()], vec![("k", Operand::from(2.5))]).unwrap_err();
        assert_eq!(err, Error::ArgumentType { arg: "k=2.5".to_string(), kind: "float" });
    }

    #[test]
    fn apply_formatting() {
        let x = LambdaExpr::new(vec!["x"]);
        let show = |args: Vec<Operand>, kwargs: Vec<(&str, Operand)>| x.apply(args, kwargs).unwrap().to_string();
        assert_eq!(show(vec!["4".into(), "'a'".into()], vec![("k", "23".into()), ("www", "32".into())]),
                   "(x)(4,'a',k=23,www=32)");
        assert_eq!(show(vec![], vec![("k", "23".into()), ("www", "32".into())]), "(x)(k=23,www=32)");
        assert_eq!(show(vec!["4".into(), "a".into()], vec![]), "(x)(4,a)");
        assert_eq!(show(vec!["4".into()], vec![]), "(x)(4)");
        assert_eq!(show(vec![], vec![("kwarg", "kw".into())]), "(x)(kwarg=kw)");
        assert_eq!(show(vec![], vec![]), "(x)()");
    }

    #[test]
    fn rendering_is_compositional() {
        let a = var("a");
        let b = var("b");
        let c = var("c");
        let left = &a - &b;
        assert_eq!((&left * &c).to_string(), format!("({})*{}", left, c));
        assert_eq!((&left * 2.5).to_string(), format!("({})*2.5", left));
        assert_eq!(left.equals(true).to_string(), "((a)-b)==True");
        assert_eq!(left.collapse("c + 1", "<").to_string(), "((a)-b)<c + 1");
        assert_eq!((&a << 2).to_string(), "(a)<<2");
        assert_eq!((-&a).to_string(), "-(a)");
        assert_eq!((!&a).to_string(), "~(a)");
    }

    #[test]
    fn combinator_text() {
        let x = LambdaExpr::new(vec!["x"]);
        assert_eq!(x.positive().to_string(), "+(x)");
        assert_eq!(x.abs().to_string(), "abs(x)");
        assert_eq!(x.divmod(3).to_string(), "divmod(x,3)");
        assert_eq!(x.pow(2).to_string(), "(x)**2");
        assert_eq!(x.floor_div(2).to_string(), "(x)//2");
        assert_eq!(x.matmul("y").to_string(), "(x)@y");
        assert_eq!(x.to_hex().to_string(), "hex(x)");
        assert_eq!(x.truth().to_string(), "bool(x)");
        assert_eq!(x.get_item(0).to_string(), "(x)[0]");
        assert_eq!(x.set_item(0, 1).to_string(), "(x)[0]=1");
        assert_eq!(x.del_item("'k'").to_string(), "del (x)['k']");
        assert_eq!(x.contains(3).to_string(), "3 in (x)");
        assert_eq!(x.reversed().to_string(), "reversed(x)");
    }

    #[test]
    fn combinators_evaluate() {
        let x = var("x");
        assert_eq!(x.divmod(3).call(vec![-7]).unwrap().to_string(), "(-3, 2)");
        assert_eq!(x.round(None).call(vec![3.4]).unwrap(), Value::Int(3));
        assert_eq!(x.round(Some(1.into())).call(vec![44.334]).unwrap(), Value::Float(44.3));
        assert_eq!((&x / 2).call(vec![7]).unwrap(), Value::Float(3.5));
        assert_eq!(x.len().call(vec!["abcd"]).unwrap(), Value::Int(4));
        assert_eq!(x.contains(2).call(vec![Value::list(vec![Value::Int(2)])]).unwrap(), Value::Bool(true));
        assert_eq!(x.to_oct().call(vec![8]).unwrap(), Value::from("0o10"));
        assert_eq!(x.less_equal(3).call(vec![3]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn free_vars_are_sorted() {
        let y = var("y");
        let x = var("x");
        let expr = (&y + &x) * &y;
        assert_eq!(expr.free_vars(), vec!["x", "y"]);
        assert_eq!(expr.compile().unwrap().params(), vec!["x", "y"]);
    }

    #[test]
    fn free_vars_need_whole_fragments() {
        let x = var("x");
        let f = var("f");
        let call = f.apply(vec!["x + 1".into()], vec![]).unwrap();
        assert_eq!(call.free_vars(), vec!["f"]);
        let call = f.apply(vec![x.to_string().into()], vec![]).unwrap();
        assert_eq!(call.free_vars(), vec!["f", "x"]);
    }

    #[test]
    fn variadic_markers_come_last() {
        let f = var("f");
        let args = LambdaVar::args();
        let kwargs = LambdaVar::kwargs();
        let call = f.apply(vec![args.to_string().into(), kwargs.to_string().into()], vec![]).unwrap();
        assert_eq!(call.source(), "lambda f,*args,**kwargs:(f)(*args,**kwargs)");
        let result = call
            .call_with_kwargs(vec![Value::Builtin(Builtin::Int), Value::from("ff")], vec![("base", 16)])
            .unwrap();
        assert_eq!(result, Value::Int(255));
    }

    #[test]
    fn positional_variadics() {
        let _ = LambdaVar::args();
        let expr = LambdaExpr::new(vec!["max(", "*args", ")"]);
        assert_eq!(expr.source(), "lambda *args:max(*args)");
        assert_eq!(expr.call(vec![3, 9, 2]).unwrap(), Value::Int(9));
    }

    #[test]
    fn no_free_vars() {
        let expr = LambdaExpr::new(vec!["1"]) + 1;
        assert_eq!(expr.source(), "lambda :(1)+1");
        assert_eq!(expr.call(Vec::<Value>::new()).unwrap(), Value::Int(2));
    }

    struct CountingBackend {
        compiles: Cell<usize>,
    }

    impl Backend for CountingBackend {
        fn compile(&self, source: &str) -> Result<Rc<dyn Callable>> {
            self.compiles.set(self.compiles.get() + 1);
            Interpreter::new().compile(source)
        }
    }

    #[test]
    fn compiles_once() {
        let backend = CountingBackend { compiles: Cell::new(0) };
        let x = var("x");
        let expr = &x * 2;
        assert!(!expr.is_compiled());
        expr.compile_with(&backend).unwrap();
        expr.compile_with(&backend).unwrap();
        let copy = expr.clone();
        copy.compile_with(&backend).unwrap();
        assert_eq!(backend.compiles.get(), 1);
        assert!(copy.is_compiled());
        assert_eq!(expr.call(vec![21]).unwrap(), expr.call(vec![21]).unwrap());
        assert_eq!(backend.compiles.get(), 1);
    }

    #[test]
    fn compile_errors_surface_at_first_call() {
        let x = var("x");
        let broken = LambdaExpr::new(vec!["(", "x"]);
        assert!(matches!(broken.call(vec![1]), Err(Error::Compile(_))));
        assert!(!broken.is_compiled());
        let statement = x.set_item(0, 1);
        assert!(matches!(statement.compile(), Err(Error::Compile(_))));
        let empty = LambdaExpr::new(Vec::<String>::new());
        assert_eq!(empty.compile().err(), Some(Error::Compile(SyntaxError::new(8, "unexpected end of input"))));
    }

    #[test]
    fn runtime_errors_propagate() {
        let x = var("x");
        let err = (&x / 0).call(vec![1]).unwrap_err();
        match err {
            Error::Runtime(e) => assert_eq!(e.kind, ErrorKind::ZeroDivisionError),
            other => panic!("unexpected error {}", other),
        }
    }
}
