use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ast::{Arg, BoolOp, CmpOp, Expr, Index, Literal, Params};
use crate::builtins::{call_builtin, call_method, get_attr, Builtin};
use crate::error::{ErrorKind, RuntimeError};
use crate::stack;
use crate::value::{binary_op, unary_op, Value};

type EvalResult<T> = Result<T, RuntimeError>;

/// Bounds on a single evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Limits {
    /// How many calls may be nested before `RecursionError` is raised.
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Limits {
        Limits { max_depth: 1000 }
    }
}

/// State shared by an interpreter and every function it created.
pub struct Context {
    limits: Limits,
    interrupt: Option<Arc<AtomicBool>>,
    globals: RefCell<HashMap<String, Value>>,
    depth: Cell<usize>,
}

// Local variables of one call, chained to the scope the function was
// created in.
#[derive(Debug)]
struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    fn lookup(&self, name: &str) -> Option<&Value> {
        match self.vars.get(name) {
            Some(value) => Some(value),
            None => self.parent.as_ref().and_then(|p| p.lookup(name)),
        }
    }
}

struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

/// A function created by evaluating a `lambda` expression.
pub struct Closure {
    params: Rc<Params>,
    body: Rc<Expr>,
    // one per positional parameter that has a default
    defaults: Vec<Value>,
    kwonly_defaults: Vec<Option<Value>>,
    scope: Option<Rc<Scope>>,
    ctx: Rc<Context>,
}

impl Display for Closure {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.params.names().is_empty() {
            write!(f, "lambda: {}", self.body)
        } else {
            write!(f, "lambda {}: {}", self.params, self.body)
        }
    }
}

impl Debug for Closure {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Closure")
            .field("source", &self.to_string())
            .finish()
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

// 'a', 'a' and 'b', 'a', 'b', and 'c'
fn quoted_list(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    match quoted.len() {
        0 => String::new(),
        1 => quoted[0].clone(),
        2 => format!("{} and {}", quoted[0], quoted[1]),
        n => format!("{}, and {}", quoted[..n - 1].join(", "), quoted[n - 1]),
    }
}

impl Closure {
    /// Parameter names as declared, with `*` and `**` marking the
    /// variadic ones.
    pub fn param_names(&self) -> Vec<String> {
        self.params.names()
    }

    pub fn invoke(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        let _guard = self.ctx.enter()?;
        let vars = self.bind(args, kwargs)?;
        let scope = Rc::new(Scope {
            vars,
            parent: self.scope.clone(),
        });
        self.ctx.eval(&self.body, Some(&scope))
    }

    fn bind(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<HashMap<String, Value>> {
        let params = &self.params;
        let n_positional = params.positional.len();
        let mut vars = HashMap::new();
        let mut slots: Vec<Option<Value>> = vec![None; n_positional];

        let given = args.len();
        let mut args = args.into_iter();
        for slot in slots.iter_mut() {
            match args.next() {
                Some(value) => *slot = Some(value),
                None => break,
            }
        }
        let extra: Vec<Value> = args.collect();
        match &params.varargs {
            Some(name) => {
                vars.insert(name.clone(), Value::tuple(extra));
            },
            None if !extra.is_empty() => return Err(self.too_many_positional(given)),
            None => {},
        }

        let mut extra_kwargs = Vec::new();
        let mut kwonly: Vec<Option<Value>> = vec![None; params.kwonly.len()];
        for (key, value) in kwargs {
            if let Some(i) = params.positional.iter().position(|p| p.name == key) {
                if slots[i].is_some() {
                    return Err(RuntimeError::type_error(format!(
                        "<lambda>() got multiple values for argument '{}'",
                        key
                    )));
                }
                slots[i] = Some(value);
            } else if let Some(i) = params.kwonly.iter().position(|p| p.name == key) {
                kwonly[i] = Some(value);
            } else if params.kwargs.is_some() {
                extra_kwargs.push((Value::from(key), value));
            } else {
                return Err(RuntimeError::type_error(format!(
                    "<lambda>() got an unexpected keyword argument '{}'",
                    key
                )));
            }
        }
        if let Some(name) = &params.kwargs {
            vars.insert(name.clone(), Value::dict(extra_kwargs));
        }

        let first_default = n_positional - self.defaults.len();
        let mut missing = Vec::new();
        for (i, slot) in slots.into_iter().enumerate() {
            let value = match slot {
                Some(value) => value,
                None if i >= first_default => self.defaults[i - first_default].clone(),
                None => {
                    missing.push(params.positional[i].name.as_str());
                    continue;
                },
            };
            vars.insert(params.positional[i].name.clone(), value);
        }
        if !missing.is_empty() {
            return Err(RuntimeError::type_error(format!(
                "<lambda>() missing {}: {}",
                plural(missing.len(), "required positional argument"),
                quoted_list(&missing)
            )));
        }

        let mut missing = Vec::new();
        for (i, value) in kwonly.into_iter().enumerate() {
            let param = &params.kwonly[i];
            match value.or_else(|| self.kwonly_defaults[i].clone()) {
                Some(value) => {
                    vars.insert(param.name.clone(), value);
                },
                None => missing.push(param.name.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(RuntimeError::type_error(format!(
                "<lambda>() missing {}: {}",
                plural(missing.len(), "required keyword-only argument"),
                quoted_list(&missing)
            )));
        }
        Ok(vars)
    }

    fn too_many_positional(&self, given: usize) -> RuntimeError {
        let most = self.params.positional.len();
        let least = most - self.defaults.len();
        let takes = if least == most {
            plural(most, "positional argument")
        } else {
            format!("from {} to {} positional arguments", least, most)
        };
        let were = if given == 1 { "was" } else { "were" };
        RuntimeError::type_error(format!("<lambda>() takes {} but {} {} given", takes, given, were))
    }
}

impl Context {
    fn new(limits: Limits, interrupt: Option<Arc<AtomicBool>>) -> Context {
        Context {
            limits,
            interrupt,
            globals: RefCell::new(HashMap::new()),
            depth: Cell::new(0),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Fails with `KeyboardInterrupt` once the interrupt flag was raised,
    /// lowering it again.
    pub(crate) fn check_interrupt(&self) -> EvalResult<()> {
        match &self.interrupt {
            Some(flag) if flag.swap(false, Ordering::SeqCst) => {
                Err(RuntimeError::new(ErrorKind::KeyboardInterrupt, "evaluation interrupted"))
            },
            _ => Ok(()),
        }
    }

    fn enter(&self) -> EvalResult<DepthGuard> {
        self.check_interrupt()?;
        let depth = self.depth.get() + 1;
        if depth > self.limits.max_depth {
            return Err(RuntimeError::new(ErrorKind::RecursionError, "maximum recursion depth exceeded"));
        }
        self.depth.set(depth);
        Ok(DepthGuard { depth: &self.depth })
    }

    pub(crate) fn call_value(&self, func: &Value, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        match func {
            Value::Function(closure) => closure.invoke(args, kwargs),
            Value::Builtin(builtin) => {
                let _guard = self.enter()?;
                call_builtin(self, *builtin, args, kwargs)
            },
            Value::Method(bound) => {
                let _guard = self.enter()?;
                call_method(self, bound, args, kwargs)
            },
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn lookup(&self, name: &str, scope: Option<&Rc<Scope>>) -> EvalResult<Value> {
        if let Some(value) = scope.and_then(|s| s.lookup(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.borrow().get(name) {
            return Ok(value.clone());
        }
        Builtin::lookup(name).map(Value::Builtin).ok_or_else(|| {
            RuntimeError::new(ErrorKind::NameError, format!("name '{}' is not defined", name))
        })
    }

    fn eval(self: &Rc<Self>, expr: &Expr, scope: Option<&Rc<Scope>>) -> EvalResult<Value> {
        stack::grow(|| self.eval_node(expr, scope))
    }

    fn eval_node(self: &Rc<Self>, expr: &Expr, scope: Option<&Rc<Scope>>) -> EvalResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(x) => Value::Float(*x),
                Literal::Imaginary(x) => Value::Complex(0.0, *x),
                Literal::Str(s) => Value::Str(Rc::clone(s)),
            }),
            Expr::Name(name) => self.lookup(name, scope),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items, scope)?)),
            Expr::List(items) => Ok(Value::list(self.eval_all(items, scope)?)),
            Expr::Dict(entries) => {
                let mut dict: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = self.eval(k, scope)?;
                    key.hash_value()?;
                    let value = self.eval(v, scope)?;
                    match dict.iter_mut().find(|(existing, _)| existing.py_eq(&key)) {
                        Some(entry) => entry.1 = value,
                        None => dict.push((key, value)),
                    }
                }
                Ok(Value::dict(dict))
            },
            Expr::Unary(op, operand) => unary_op(*op, &self.eval(operand, scope)?),
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                binary_op(*op, &left, &right)
            },
            Expr::BoolOp(op, left, right) => {
                let left = self.eval(left, scope)?;
                match (op, left.is_truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                    _ => self.eval(right, scope),
                }
            },
            Expr::Not(operand) => Ok(Value::Bool(!self.eval(operand, scope)?.is_truthy())),
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first, scope)?;
                for (op, operand) in rest {
                    let right = self.eval(operand, scope)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            },
            Expr::IfElse { cond, then, otherwise } => {
                if self.eval(cond, scope)?.is_truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            },
            Expr::Attribute(target, name) => get_attr(&self.eval(target, scope)?, name),
            Expr::Subscript(target, index) => {
                let target = self.eval(target, scope)?;
                match index.as_ref() {
                    Index::Single(e) => target.get_item(&self.eval(e, scope)?),
                    Index::Slice(lower, upper, step) => {
                        let lower = self.eval_optional(lower.as_ref(), scope)?;
                        let upper = self.eval_optional(upper.as_ref(), scope)?;
                        let step = self.eval_optional(step.as_ref(), scope)?;
                        target.get_slice(&lower, &upper, &step)
                    },
                }
            },
            Expr::Call(func, args) => {
                let func = self.eval(func, scope)?;
                let (args, kwargs) = self.eval_args(args, scope)?;
                self.call_value(&func, args, kwargs)
            },
            Expr::Lambda(params, body) => {
                let mut defaults = Vec::new();
                for param in &params.positional {
                    if let Some(default) = &param.default {
                        defaults.push(self.eval(default, scope)?);
                    }
                }
                let mut kwonly_defaults = Vec::new();
                for param in &params.kwonly {
                    kwonly_defaults.push(self.eval_optional_value(param.default.as_ref(), scope)?);
                }
                Ok(Value::Function(Rc::new(Closure {
                    params: Rc::clone(params),
                    body: Rc::clone(body),
                    defaults,
                    kwonly_defaults,
                    scope: scope.cloned(),
                    ctx: Rc::clone(self),
                })))
            },
        }
    }

    fn eval_all(self: &Rc<Self>, exprs: &[Expr], scope: Option<&Rc<Scope>>) -> EvalResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, scope)).collect()
    }

    fn eval_optional(self: &Rc<Self>, expr: Option<&Expr>, scope: Option<&Rc<Scope>>) -> EvalResult<Value> {
        Ok(self.eval_optional_value(expr, scope)?.unwrap_or(Value::None))
    }

    fn eval_optional_value(
        self: &Rc<Self>,
        expr: Option<&Expr>,
        scope: Option<&Rc<Scope>>,
    ) -> EvalResult<Option<Value>> {
        expr.map(|e| self.eval(e, scope)).transpose()
    }

    fn eval_args(
        self: &Rc<Self>,
        args: &[Arg],
        scope: Option<&Rc<Scope>>,
    ) -> EvalResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::new();
        let mut keywords: Vec<(String, Value)> = Vec::new();
        let add_keyword = |keywords: &mut Vec<(String, Value)>, key: String, value: Value| {
            if keywords.iter().any(|(k, _)| *k == key) {
                return Err(RuntimeError::type_error(format!(
                    "got multiple values for keyword argument '{}'",
                    key
                )));
            }
            keywords.push((key, value));
            Ok(())
        };
        for arg in args {
            match arg {
                Arg::Positional(e) => positional.push(self.eval(e, scope)?),
                Arg::Star(e) => {
                    let value = self.eval(e, scope)?;
                    let items = value.iterate().map_err(|_| {
                        RuntimeError::type_error(format!(
                            "argument after * must be an iterable, not {}",
                            value.type_name()
                        ))
                    })?;
                    positional.extend(items);
                },
                Arg::Keyword(name, e) => {
                    let value = self.eval(e, scope)?;
                    add_keyword(&mut keywords, name.clone(), value)?;
                },
                Arg::DoubleStar(e) => {
                    let entries = match self.eval(e, scope)? {
                        Value::Dict(entries) => entries,
                        other => {
                            return Err(RuntimeError::type_error(format!(
                                "argument after ** must be a mapping, not {}",
                                other.type_name()
                            )));
                        },
                    };
                    for (k, v) in entries.iter() {
                        match k {
                            Value::Str(key) => add_keyword(&mut keywords, key.to_string(), v.clone())?,
                            _ => return Err(RuntimeError::type_error("keywords must be strings")),
                        }
                    }
                },
            }
        }
        Ok((positional, keywords))
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> EvalResult<bool> {
    use std::cmp::Ordering::{Equal, Greater, Less};

    let result = match op {
        CmpOp::Eq => left.py_eq(right),
        CmpOp::NotEq => !left.py_eq(right),
        CmpOp::Less => left.compare(right, op.symbol())? == Some(Less),
        CmpOp::LessEq => matches!(left.compare(right, op.symbol())?, Some(Less) | Some(Equal)),
        CmpOp::Greater => left.compare(right, op.symbol())? == Some(Greater),
        CmpOp::GreaterEq => matches!(left.compare(right, op.symbol())?, Some(Greater) | Some(Equal)),
        CmpOp::In => right.contains(left)?,
        CmpOp::NotIn => !right.contains(left)?,
        CmpOp::Is => left.is_same(right),
        CmpOp::IsNot => !left.is_same(right),
    };
    Ok(result)
}

/// A tree-walking evaluator for the expression language, holding the
/// global definitions made through it.
pub struct Interpreter {
    ctx: Rc<Context>,
}

impl Default for Interpreter {
    fn default() -> Interpreter {
        Interpreter::new()
    }
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Interpreter::with_limits(Limits::default(), None)
    }

    /// An interpreter that gives up with `KeyboardInterrupt` once
    /// `interrupt` is raised.
    pub fn with_limits(limits: Limits, interrupt: Option<Arc<AtomicBool>>) -> Interpreter {
        Interpreter {
            ctx: Rc::new(Context::new(limits, interrupt)),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Evaluates `expr` at the top level, where only globals and builtins
    /// are visible.
    pub fn eval(&self, expr: &Expr) -> Result<Value, RuntimeError> {
        self.ctx.depth.set(0);
        self.ctx.eval(expr, None)
    }

    pub fn define(&self, name: &str, value: Value) {
        self.ctx.globals.borrow_mut().insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.ctx.globals.borrow().get(name).cloned()
    }

    /// Names of all global definitions, sorted.
    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ctx.globals.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear_globals(&self) {
        // take the map out first: dropping a value may drop closures that
        // point back at this context.
        let globals = self.ctx.globals.replace(HashMap::new());
        drop(globals);
    }
}

impl Drop for Interpreter {
    // Globals may hold closures pointing back at the context; clearing
    // them breaks the cycle.
    fn drop(&mut self) {
        self.clear_globals();
    }
}
