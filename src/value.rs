use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::ast::{BinaryOp, UnaryOp};
use crate::builtins::{BoundMethod, Builtin};
use crate::error::{ErrorKind, RuntimeError};
use crate::interp::Closure;

type EvalResult<T> = Result<T, RuntimeError>;

// Sequences produced by repetition may not grow past this many items.
const MAX_REPEAT_LEN: usize = 1 << 24;

/// A runtime value of the expression language.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(f64, f64),
    Str(Rc<str>),
    Tuple(Rc<Vec<Value>>),
    List(Rc<Vec<Value>>),
    // insertion ordered, keys compared with `py_eq`
    Dict(Rc<Vec<(Value, Value)>>),
    Iter(Rc<RefCell<std::vec::IntoIter<Value>>>),
    Function(Rc<Closure>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
}

// The numeric tower: bool and int widen to float, float widens to complex.
#[derive(Debug, Copy, Clone)]
enum Num {
    Int(i64),
    Float(f64),
    Complex(f64, f64),
}

impl Num {
    fn rank(self) -> u8 {
        match self {
            Num::Int(_) => 0,
            Num::Float(_) => 1,
            Num::Complex(..) => 2,
        }
    }

    fn to_float(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(x) => x,
            Num::Complex(re, _) => re,
        }
    }

    fn to_complex(self) -> (f64, f64) {
        match self {
            Num::Complex(re, im) => (re, im),
            other => (other.to_float(), 0.0),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Value {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(Rc::from(s.as_str()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Value {
        Value::None
    }
}

// `==` as the expression language sees it.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.py_eq(other)
    }
}

impl Value {
    pub fn complex(re: f64, im: f64) -> Value {
        Value::Complex(re, im)
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn dict(entries: Vec<(Value, Value)>) -> Value {
        Value::Dict(Rc::new(entries))
    }

    pub fn iter_over(items: Vec<Value>) -> Value {
        Value::Iter(Rc::new(RefCell::new(items.into_iter())))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Complex(..) => "complex",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Iter(_) => "iterator",
            Value::Function(_) => "function",
            Value::Builtin(_) | Value::Method(_) => "builtin_function_or_method",
        }
    }

    fn as_num(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(x) => Some(Num::Float(*x)),
            Value::Complex(re, im) => Some(Num::Complex(*re, *im)),
            _ => None,
        }
    }

    /// The value as an integer, if it is an int or a bool.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as a float, if it is a real number.
    pub fn as_float(&self) -> Option<f64> {
        match self.as_num()? {
            Num::Complex(..) => None,
            num => Some(num.to_float()),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::Complex(re, im) => *re != 0.0 || *im != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(items) | Value::List(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.is_empty(),
            _ => true,
        }
    }

    /// Equality as `==` sees it: numbers compare across types, containers
    /// compare item by item.
    pub fn py_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_num(), other.as_num()) {
            return match (a, b) {
                (Num::Int(x), Num::Int(y)) => x == y,
                (Num::Complex(..), _) | (_, Num::Complex(..)) => a.to_complex() == b.to_complex(),
                _ => a.to_float() == b.to_float(),
            };
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            },
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| {
                    dict_lookup(b, k).map_or(false, |other_v| v.py_eq(other_v))
                })
            },
            _ => self.is_same(other),
        }
    }

    /// Identity as `is` sees it. Immutable scalars are identical when equal.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Iter(a), Value::Iter(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`. `Ok(None)` means unordered (NaN).
    pub fn compare(&self, other: &Value, symbol: &str) -> EvalResult<Option<Ordering>> {
        if let (Some(a), Some(b)) = (self.as_num(), other.as_num()) {
            return match (a, b) {
                (Num::Complex(..), _) | (_, Num::Complex(..)) => Err(self.not_supported(other, symbol)),
                (Num::Int(x), Num::Int(y)) => Ok(Some(x.cmp(&y))),
                _ => Ok(a.to_float().partial_cmp(&b.to_float())),
            };
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
            (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.py_eq(y) {
                        return x.compare(y, symbol);
                    }
                }
                Ok(Some(a.len().cmp(&b.len())))
            },
            _ => Err(self.not_supported(other, symbol)),
        }
    }

    fn not_supported(&self, other: &Value, symbol: &str) -> RuntimeError {
        RuntimeError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            self.type_name(),
            other.type_name()
        ))
    }

    pub fn hash_value(&self) -> EvalResult<i64> {
        let hash = match self {
            Value::None => 0x5f37_59df,
            Value::Bool(b) => *b as i64,
            Value::Int(i) => *i,
            Value::Float(x) => hash_float(*x),
            Value::Complex(re, im) => hash_float(*re).wrapping_add(hash_float(*im).wrapping_mul(1_000_003)),
            Value::Str(s) => {
                let mut hasher = DefaultHasher::new();
                s.hash(&mut hasher);
                hasher.finish() as i64
            },
            Value::Tuple(items) => {
                let mut acc: i64 = 0x345678;
                for item in items.iter() {
                    acc = (acc ^ item.hash_value()?).wrapping_mul(1_000_003);
                }
                acc ^ items.len() as i64
            },
            Value::List(_) | Value::Dict(_) => {
                return Err(RuntimeError::type_error(format!("unhashable type: '{}'", self.type_name())));
            },
            Value::Iter(rc) => Rc::as_ptr(rc) as usize as i64,
            Value::Function(rc) => Rc::as_ptr(rc) as usize as i64,
            Value::Method(rc) => Rc::as_ptr(rc) as usize as i64,
            Value::Builtin(b) => {
                let mut hasher = DefaultHasher::new();
                b.name().hash(&mut hasher);
                hasher.finish() as i64
            },
        };
        Ok(hash)
    }

    /// The items this value yields when iterated over. Consumes what is
    /// left of an iterator.
    pub fn iterate(&self) -> EvalResult<Vec<Value>> {
        match self {
            Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            Value::Tuple(items) | Value::List(items) => Ok(items.as_ref().clone()),
            Value::Dict(entries) => Ok(entries.iter().map(|(k, _)| k.clone()).collect()),
            Value::Iter(iter) => Ok(iter.borrow_mut().by_ref().collect()),
            _ => Err(RuntimeError::type_error(format!("'{}' object is not iterable", self.type_name()))),
        }
    }

    /// Membership test for `in`.
    pub fn contains(&self, item: &Value) -> EvalResult<bool> {
        match self {
            Value::Str(s) => match item {
                Value::Str(needle) => Ok(s.contains(needle.as_ref())),
                _ => Err(RuntimeError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    item.type_name()
                ))),
            },
            Value::Dict(entries) => {
                item.hash_value()?;
                Ok(dict_lookup(entries, item).is_some())
            },
            Value::Tuple(_) | Value::List(_) | Value::Iter(_) => {
                Ok(self.iterate()?.iter().any(|v| v.py_eq(item)))
            },
            _ => Err(RuntimeError::type_error(format!(
                "argument of type '{}' is not iterable",
                self.type_name()
            ))),
        }
    }

    pub fn len(&self) -> EvalResult<usize> {
        match self {
            Value::Str(s) => Ok(s.chars().count()),
            Value::Tuple(items) | Value::List(items) => Ok(items.len()),
            Value::Dict(entries) => Ok(entries.len()),
            _ => Err(RuntimeError::type_error(format!(
                "object of type '{}' has no len()",
                self.type_name()
            ))),
        }
    }

    /// `self[index]`
    pub fn get_item(&self, index: &Value) -> EvalResult<Value> {
        match self {
            Value::Dict(entries) => {
                index.hash_value()?;
                dict_lookup(entries, index)
                    .cloned()
                    .ok_or_else(|| RuntimeError::new(ErrorKind::KeyError, index.to_string()))
            },
            Value::Str(_) | Value::Tuple(_) | Value::List(_) => {
                let i = index.as_int().ok_or_else(|| {
                    RuntimeError::type_error(format!(
                        "{} indices must be integers, not {}",
                        self.type_name(),
                        index.type_name()
                    ))
                })?;
                let len = self.len()?;
                let position = normalize_index(i, len).ok_or_else(|| {
                    RuntimeError::new(ErrorKind::IndexError, format!("{} index out of range", self.type_name()))
                })?;
                match self {
                    Value::Str(s) => Ok(s.chars().nth(position).map(|c| Value::from(c.to_string())).unwrap_or(Value::None)),
                    Value::Tuple(items) | Value::List(items) => Ok(items[position].clone()),
                    _ => unreachable!(),
                }
            },
            _ => Err(RuntimeError::type_error(format!(
                "'{}' object is not subscriptable",
                self.type_name()
            ))),
        }
    }

    /// `self[lower:upper:step]`
    pub fn get_slice(&self, lower: &Value, upper: &Value, step: &Value) -> EvalResult<Value> {
        let bound = |v: &Value| -> EvalResult<Option<i64>> {
            match v {
                Value::None => Ok(None),
                other => other.as_int().map(Some).ok_or_else(|| {
                    RuntimeError::type_error("slice indices must be integers or None")
                }),
            }
        };
        let step = bound(step)?.unwrap_or(1);
        if step == 0 {
            return Err(RuntimeError::value_error("slice step cannot be zero"));
        }
        let len = self.len()?;
        let positions = slice_positions(len as i64, bound(lower)?, bound(upper)?, step);
        match self {
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                Ok(Value::from(positions.iter().map(|&i| chars[i]).collect::<String>()))
            },
            Value::Tuple(items) => Ok(Value::tuple(positions.iter().map(|&i| items[i].clone()).collect())),
            Value::List(items) => Ok(Value::list(positions.iter().map(|&i| items[i].clone()).collect())),
            _ => Err(RuntimeError::type_error(format!(
                "'{}' object is not subscriptable",
                self.type_name()
            ))),
        }
    }

    /// What `str()` returns: strings unquoted, everything else as repr.
    pub fn to_py_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.to_string(),
        }
    }
}

pub(crate) fn dict_lookup<'v>(entries: &'v [(Value, Value)], key: &Value) -> Option<&'v Value> {
    entries.iter().find(|(k, _)| k.py_eq(key)).map(|(_, v)| v)
}

fn hash_float(x: f64) -> i64 {
    if x.fract() == 0.0 && x.abs() < 9.2e18 {
        return x as i64;
    }
    let mut hasher = DefaultHasher::new();
    x.to_bits().hash(&mut hasher);
    hasher.finish() as i64
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if i < 0 { i + len } else { i };
    if i < 0 || i >= len {
        None
    } else {
        Some(i as usize)
    }
}

fn slice_positions(len: i64, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let mut positions = Vec::new();
    if step > 0 {
        let clamp = |i: i64| if i < 0 { (i + len).max(0) } else { i.min(len) };
        let mut i = lower.map_or(0, clamp);
        let stop = upper.map_or(len, clamp);
        while i < stop {
            positions.push(i as usize);
            i += step;
        }
    } else {
        let clamp = |i: i64| if i < 0 { (i + len).max(-1) } else { i.min(len - 1) };
        let mut i = lower.map_or(len - 1, clamp);
        let stop = upper.map_or(-1, clamp);
        while i > stop {
            positions.push(i as usize);
            i += step;
        }
    }
    positions
}

fn unsupported(symbol: &str, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        left.type_name(),
        right.type_name()
    ))
}

pub fn unary_op(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    let result = match (op, operand.as_num()) {
        (UnaryOp::Pos, Some(Num::Int(i))) => Value::Int(i),
        (UnaryOp::Pos, Some(_)) => operand.clone(),
        (UnaryOp::Neg, Some(Num::Int(i))) => Value::Int(i.checked_neg().ok_or_else(RuntimeError::overflow)?),
        (UnaryOp::Neg, Some(Num::Float(x))) => Value::Float(-x),
        (UnaryOp::Neg, Some(Num::Complex(re, im))) => Value::Complex(-re, -im),
        (UnaryOp::Invert, Some(Num::Int(i))) => Value::Int(!i),
        _ => {
            return Err(RuntimeError::type_error(format!(
                "bad operand type for unary {}: '{}'",
                op.symbol(),
                operand.type_name()
            )));
        },
    };
    Ok(result)
}

pub fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    if let (Some(a), Some(b)) = (left.as_num(), right.as_num()) {
        if let (Value::Bool(x), Value::Bool(y)) = (left, right) {
            match op {
                BinaryOp::BitAnd => return Ok(Value::Bool(*x & *y)),
                BinaryOp::BitOr => return Ok(Value::Bool(*x | *y)),
                BinaryOp::BitXor => return Ok(Value::Bool(*x ^ *y)),
                _ => {},
            }
        }
        return numeric_op(op, a, b).unwrap_or_else(|| Err(unsupported(op.symbol(), left, right)));
    }

    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => {
            let mut s = a.to_string();
            s.push_str(b);
            Ok(Value::from(s))
        },
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::list(a.iter().chain(b.iter()).cloned().collect()))
        },
        (BinaryOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
        },
        (BinaryOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
            let mut merged = a.as_ref().clone();
            for (k, v) in b.iter() {
                match merged.iter_mut().find(|(existing, _)| existing.py_eq(k)) {
                    Some(entry) => entry.1 = v.clone(),
                    None => merged.push((k.clone(), v.clone())),
                }
            }
            Ok(Value::dict(merged))
        },
        (BinaryOp::Mul, seq, count) | (BinaryOp::Mul, count, seq)
            if count.as_int().is_some() && matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_)) =>
        {
            repeat(seq, count.as_int().unwrap_or(0))
        },
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

fn repeat(seq: &Value, count: i64) -> EvalResult<Value> {
    let count = count.max(0) as usize;
    let len = seq.len()?;
    if len.saturating_mul(count) > MAX_REPEAT_LEN {
        return Err(RuntimeError::new(ErrorKind::OverflowError, "repeated sequence is too long"));
    }
    match seq {
        Value::Str(s) => Ok(Value::from(s.repeat(count))),
        Value::List(items) => Ok(Value::list(repeat_items(items, count))),
        Value::Tuple(items) => Ok(Value::tuple(repeat_items(items, count))),
        _ => Err(RuntimeError::type_error(format!("can't multiply sequence of type '{}'", seq.type_name()))),
    }
}

fn repeat_items(items: &[Value], count: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    out
}

// None means the operator does not apply to these numbers.
fn numeric_op(op: BinaryOp, a: Num, b: Num) -> Option<EvalResult<Value>> {
    let result = match a.rank().max(b.rank()) {
        0 => {
            let (x, y) = match (a, b) {
                (Num::Int(x), Num::Int(y)) => (x, y),
                _ => return None,
            };
            int_op(op, x, y)?
        },
        1 => float_op(op, a.to_float(), b.to_float())?,
        _ => complex_op(op, a.to_complex(), b.to_complex())?,
    };
    Some(result)
}

fn int_op(op: BinaryOp, x: i64, y: i64) -> Option<EvalResult<Value>> {
    let zero_div = || RuntimeError::zero_division("integer division or modulo by zero");
    let checked = |r: Option<i64>| r.map(Value::Int).ok_or_else(RuntimeError::overflow);
    let result = match op {
        BinaryOp::Add => checked(x.checked_add(y)),
        BinaryOp::Sub => checked(x.checked_sub(y)),
        BinaryOp::Mul => checked(x.checked_mul(y)),
        BinaryOp::TrueDiv => {
            if y == 0 {
                Err(RuntimeError::zero_division("division by zero"))
            } else {
                Ok(Value::Float(x as f64 / y as f64))
            }
        },
        BinaryOp::FloorDiv => {
            if y == 0 {
                Err(zero_div())
            } else {
                checked(floor_div(x, y))
            }
        },
        BinaryOp::Mod => {
            if y == 0 {
                Err(zero_div())
            } else {
                Ok(Value::Int(floor_mod(x, y)))
            }
        },
        BinaryOp::Pow => int_pow(x, y),
        BinaryOp::LShift => {
            if y < 0 {
                Err(RuntimeError::value_error("negative shift count"))
            } else if x == 0 {
                Ok(Value::Int(0))
            } else if y >= 63 {
                Err(RuntimeError::overflow())
            } else {
                let shifted = x << y;
                if shifted >> y == x {
                    Ok(Value::Int(shifted))
                } else {
                    Err(RuntimeError::overflow())
                }
            }
        },
        BinaryOp::RShift => {
            if y < 0 {
                Err(RuntimeError::value_error("negative shift count"))
            } else if y >= 64 {
                Ok(Value::Int(if x < 0 { -1 } else { 0 }))
            } else {
                Ok(Value::Int(x >> y))
            }
        },
        BinaryOp::BitAnd => Ok(Value::Int(x & y)),
        BinaryOp::BitOr => Ok(Value::Int(x | y)),
        BinaryOp::BitXor => Ok(Value::Int(x ^ y)),
        BinaryOp::MatMul => return None,
    };
    Some(result)
}

pub(crate) fn floor_div(x: i64, y: i64) -> Option<i64> {
    let q = x.checked_div(y)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

pub(crate) fn floor_mod(x: i64, y: i64) -> i64 {
    // i64::MIN % -1 overflows in Rust, the answer is 0 anyway.
    if y == -1 {
        return 0;
    }
    let r = x % y;
    if r != 0 && ((r < 0) != (y < 0)) {
        r + y
    } else {
        r
    }
}

fn int_pow(base: i64, exp: i64) -> EvalResult<Value> {
    if exp < 0 {
        if base == 0 {
            return Err(RuntimeError::zero_division("0.0 cannot be raised to a negative power"));
        }
        return Ok(Value::Float((base as f64).powf(exp as f64)));
    }
    match base {
        0 => Ok(Value::Int(if exp == 0 { 1 } else { 0 })),
        1 => Ok(Value::Int(1)),
        -1 => Ok(Value::Int(if exp % 2 == 0 { 1 } else { -1 })),
        _ => {
            if exp > i64::from(u32::MAX) {
                return Err(RuntimeError::overflow());
            }
            base.checked_pow(exp as u32).map(Value::Int).ok_or_else(RuntimeError::overflow)
        },
    }
}

fn float_op(op: BinaryOp, x: f64, y: f64) -> Option<EvalResult<Value>> {
    let result = match op {
        BinaryOp::Add => Ok(Value::Float(x + y)),
        BinaryOp::Sub => Ok(Value::Float(x - y)),
        BinaryOp::Mul => Ok(Value::Float(x * y)),
        BinaryOp::TrueDiv => {
            if y == 0.0 {
                Err(RuntimeError::zero_division("float division by zero"))
            } else {
                Ok(Value::Float(x / y))
            }
        },
        BinaryOp::FloorDiv => {
            if y == 0.0 {
                Err(RuntimeError::zero_division("float floor division by zero"))
            } else {
                Ok(Value::Float((x / y).floor()))
            }
        },
        BinaryOp::Mod => {
            if y == 0.0 {
                Err(RuntimeError::zero_division("float modulo"))
            } else {
                let r = x % y;
                if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                    Ok(Value::Float(r + y))
                } else {
                    Ok(Value::Float(r))
                }
            }
        },
        BinaryOp::Pow => float_pow(x, y),
        _ => return None,
    };
    Some(result)
}

fn float_pow(x: f64, y: f64) -> EvalResult<Value> {
    if x == 0.0 && y < 0.0 {
        return Err(RuntimeError::zero_division("0.0 cannot be raised to a negative power"));
    }
    if x < 0.0 && y.fract() != 0.0 && y.is_finite() {
        // a negative base with a fractional exponent has a complex result.
        let (re, im) = complex_pow((x, 0.0), (y, 0.0))?;
        return Ok(Value::Complex(re, im));
    }
    let result = x.powf(y);
    if result.is_infinite() && x.is_finite() && y.is_finite() {
        return Err(RuntimeError::new(ErrorKind::OverflowError, "numerical result out of range"));
    }
    Ok(Value::Float(result))
}

fn complex_op(op: BinaryOp, (a, b): (f64, f64), (c, d): (f64, f64)) -> Option<EvalResult<Value>> {
    let result = match op {
        BinaryOp::Add => Ok(Value::Complex(a + c, b + d)),
        BinaryOp::Sub => Ok(Value::Complex(a - c, b - d)),
        BinaryOp::Mul => Ok(Value::Complex(a * c - b * d, a * d + b * c)),
        BinaryOp::TrueDiv => complex_div((a, b), (c, d)).map(|(re, im)| Value::Complex(re, im)),
        BinaryOp::Pow => complex_pow((a, b), (c, d)).map(|(re, im)| Value::Complex(re, im)),
        _ => return None,
    };
    Some(result)
}

fn complex_div((a, b): (f64, f64), (c, d): (f64, f64)) -> EvalResult<(f64, f64)> {
    let denom = c * c + d * d;
    if denom == 0.0 {
        return Err(RuntimeError::zero_division("complex division by zero"));
    }
    Ok(((a * c + b * d) / denom, (b * c - a * d) / denom))
}

fn complex_mul((a, b): (f64, f64), (c, d): (f64, f64)) -> (f64, f64) {
    (a * c - b * d, a * d + b * c)
}

fn complex_pow(base: (f64, f64), exp: (f64, f64)) -> EvalResult<(f64, f64)> {
    if exp == (0.0, 0.0) {
        return Ok((1.0, 0.0));
    }
    if base == (0.0, 0.0) {
        if exp.1 != 0.0 || exp.0 < 0.0 {
            return Err(RuntimeError::zero_division("0.0 to a negative or complex power"));
        }
        return Ok((0.0, 0.0));
    }
    // small integral exponents by repeated squaring, which keeps
    // results like (1+2j)**2 exact.
    if exp.1 == 0.0 && exp.0.fract() == 0.0 && exp.0.abs() <= 100.0 {
        let mut n = exp.0.abs() as u32;
        let mut result = (1.0, 0.0);
        let mut square = base;
        while n > 0 {
            if n & 1 == 1 {
                result = complex_mul(result, square);
            }
            square = complex_mul(square, square);
            n >>= 1;
        }
        if exp.0 < 0.0 {
            return complex_div((1.0, 0.0), result);
        }
        return Ok(result);
    }
    let modulus = base.0.hypot(base.1);
    let arg = base.1.atan2(base.0);
    let (ln_re, ln_im) = (modulus.ln(), arg);
    let (w_re, w_im) = complex_mul(exp, (ln_re, ln_im));
    let scale = w_re.exp();
    Ok((scale * w_im.cos(), scale * w_im.sin()))
}

/// Formats a float the way the expression language prints it:
/// always with a decimal point or an exponent.
///
/// ```
/// # use lambded::value::float_repr;
/// assert_eq!(float_repr(5.0), "5.0");
/// assert_eq!(float_repr(0.1), "0.1");
/// assert_eq!(float_repr(1e16), "1e+16");
/// assert_eq!(float_repr(1.5e-5), "1.5e-05");
/// ```
pub fn float_repr(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0".to_string() } else { "0.0".to_string() };
    }
    let magnitude = x.abs();
    if magnitude >= 1e16 || magnitude < 1e-4 {
        let s = format!("{:e}", x);
        let (mantissa, exponent) = match s.find('e') {
            Some(i) => (&s[..i], &s[i + 1..]),
            None => return s,
        };
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }
    let s = format!("{}", x);
    if s.contains('.') {
        s
    } else {
        s + ".0"
    }
}

/// Formats one part of a complex number: integral parts drop the `.0`.
pub fn imag_repr(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{}", x as i64)
    } else {
        float_repr(x)
    }
}

/// Quotes a string, preferring single quotes.
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            },
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn fmt_items(f: &mut Formatter, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", float_repr(*x)),
            Value::Complex(re, im) => {
                if *re == 0.0 && re.is_sign_positive() {
                    write!(f, "{}j", imag_repr(*im))
                } else {
                    let sign = if *im < 0.0 || (*im == 0.0 && im.is_sign_negative()) { "-" } else { "+" };
                    write!(f, "({}{}{}j)", imag_repr(*re), sign, imag_repr(im.abs()))
                }
            },
            Value::Str(s) => write!(f, "{}", str_repr(s)),
            Value::Tuple(items) => {
                write!(f, "(")?;
                fmt_items(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            },
            Value::List(items) => {
                write!(f, "[")?;
                fmt_items(f, items)?;
                write!(f, "]")
            },
            Value::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            },
            Value::Iter(_) => write!(f, "<iterator object>"),
            Value::Function(closure) => write!(f, "<function {}>", closure),
            Value::Builtin(builtin) => write!(f, "<built-in function {}>", builtin.name()),
            Value::Method(method) => write!(f, "{}", method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(op: BinaryOp, a: impl Into<Value>, b: impl Into<Value>) -> EvalResult<Value> {
        binary_op(op, &a.into(), &b.into())
    }

    fn show(result: EvalResult<Value>) -> String {
        match result {
            Ok(v) => v.to_string(),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn int_arithmetic() {
        assert_eq!(show(op(BinaryOp::Add, 5, 1)), "6");
        assert_eq!(show(op(BinaryOp::Sub, 30, 20)), "10");
        assert_eq!(show(op(BinaryOp::TrueDiv, 7, 2)), "3.5");
        assert_eq!(show(op(BinaryOp::Pow, 2, 10)), "1024");
        assert_eq!(show(op(BinaryOp::Pow, 2, -1)), "0.5");
    }

    #[test]
    fn floor_division_and_modulo_follow_the_divisor() {
        assert_eq!(show(op(BinaryOp::FloorDiv, -7, 2)), "-4");
        assert_eq!(show(op(BinaryOp::Mod, -7, 2)), "1");
        assert_eq!(show(op(BinaryOp::Mod, 7, -2)), "-1");
        assert_eq!(show(op(BinaryOp::Mod, -7.5, 2)), "0.5");
        assert_eq!(show(op(BinaryOp::FloorDiv, 7.0, 2)), "3.0");
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(show(op(BinaryOp::TrueDiv, 1, 0)), "ZeroDivisionError: division by zero");
        assert_eq!(show(op(BinaryOp::Mod, 1, 0)),
                   "ZeroDivisionError: integer division or modulo by zero");
        assert_eq!(show(op(BinaryOp::TrueDiv, 1.0, 0.0)),
                   "ZeroDivisionError: float division by zero");
    }

    #[test]
    fn int_overflow() {
        let err = op(BinaryOp::Mul, i64::MAX, 2).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OverflowError);
        let err = op(BinaryOp::LShift, 1, 64).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OverflowError);
    }

    #[test]
    fn shifts_and_bits() {
        assert_eq!(show(op(BinaryOp::LShift, 3, 2)), "12");
        assert_eq!(show(op(BinaryOp::RShift, -9, 1)), "-5");
        assert_eq!(show(op(BinaryOp::BitXor, 6, 3)), "5");
        assert_eq!(show(op(BinaryOp::BitAnd, true, false)), "False");
        assert_eq!(show(op(BinaryOp::Add, true, true)), "2");
    }

    #[test]
    fn complex_arithmetic() {
        let z = Value::complex(1.0, 2.0);
        assert_eq!(show(binary_op(BinaryOp::Mul, &z, &z)), "(-3+4j)");
        assert_eq!(show(binary_op(BinaryOp::Pow, &z, &Value::Int(2))), "(-3+4j)");
        assert_eq!(show(binary_op(BinaryOp::Add, &z, &Value::Int(1))), "(2+2j)");
        assert_eq!(show(binary_op(BinaryOp::FloorDiv, &z, &Value::Int(1))),
                   "TypeError: unsupported operand type(s) for //: 'complex' and 'int'");
    }

    #[test]
    fn negative_base_fractional_exponent_is_complex() {
        match op(BinaryOp::Pow, -4.0, 0.5).unwrap() {
            Value::Complex(re, im) => {
                assert!(re.abs() < 1e-12);
                assert!((im - 2.0).abs() < 1e-12);
            },
            other => panic!("expected a complex result, got {}", other),
        }
    }

    #[test]
    fn sequences() {
        assert_eq!(show(op(BinaryOp::Add, "ab", "cd")), "'abcd'");
        assert_eq!(show(op(BinaryOp::Mul, "ab", 3)), "'ababab'");
        assert_eq!(show(op(BinaryOp::Mul, 2, Value::list(vec![Value::Int(1)]))), "[1, 1]");
        assert_eq!(show(op(BinaryOp::Add, "a", 1)),
                   "TypeError: unsupported operand type(s) for +: 'str' and 'int'");
    }

    #[test]
    fn matmul_is_unsupported() {
        assert_eq!(show(op(BinaryOp::MatMul, 1, 2)),
                   "TypeError: unsupported operand type(s) for @: 'int' and 'int'");
    }

    #[test]
    fn unary() {
        assert_eq!(show(unary_op(UnaryOp::Neg, &Value::Int(3))), "-3");
        assert_eq!(show(unary_op(UnaryOp::Invert, &Value::Bool(true))), "-2");
        assert_eq!(show(unary_op(UnaryOp::Pos, &Value::Bool(true))), "1");
        assert_eq!(show(unary_op(UnaryOp::Neg, &Value::from("a"))),
                   "TypeError: bad operand type for unary -: 'str'");
    }

    #[test]
    fn equality_across_numeric_types() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(Value::complex(2.0, 0.0).py_eq(&Value::Int(2)));
        assert!(!Value::Int(1).py_eq(&Value::from("1")));
        let a = Value::dict(vec![(Value::from("k"), Value::Int(1)), (Value::Int(2), Value::None)]);
        let b = Value::dict(vec![(Value::Int(2), Value::None), (Value::from("k"), Value::Float(1.0))]);
        assert!(a.py_eq(&b));
    }

    #[test]
    fn ordering() {
        let a = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::tuple(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(a.compare(&b, "<").unwrap(), Some(Ordering::Less));
        assert_eq!(Value::Float(f64::NAN).compare(&Value::Int(1), "<").unwrap(), None);
        let err = Value::Int(1).compare(&Value::from("a"), "<").unwrap_err();
        assert_eq!(err.message, "'<' not supported between instances of 'int' and 'str'");
    }

    #[test]
    fn indexing_and_slicing() {
        let xs = Value::list((0..5).map(Value::Int).collect());
        assert_eq!(show(xs.get_item(&Value::Int(-1))), "4");
        assert_eq!(show(xs.get_item(&Value::Int(5))), "IndexError: list index out of range");
        assert_eq!(show(xs.get_slice(&Value::Int(1), &Value::Int(3), &Value::None)), "[1, 2]");
        assert_eq!(show(xs.get_slice(&Value::None, &Value::None, &Value::Int(-2))), "[4, 2, 0]");
        let s = Value::from("hello");
        assert_eq!(show(s.get_slice(&Value::None, &Value::None, &Value::Int(-1))), "'olleh'");
        assert_eq!(show(s.get_slice(&Value::Int(-3), &Value::Int(100), &Value::None)), "'llo'");
    }

    #[test]
    fn dict_lookup_by_value() {
        let d = Value::dict(vec![(Value::Int(1), Value::from("one"))]);
        assert_eq!(show(d.get_item(&Value::Float(1.0))), "'one'");
        assert_eq!(show(d.get_item(&Value::Int(2))), "KeyError: 2");
        assert_eq!(show(d.get_item(&Value::list(vec![]))), "TypeError: unhashable type: 'list'");
    }

    #[test]
    fn membership() {
        assert!(Value::from("hello").contains(&Value::from("ell")).unwrap());
        assert!(Value::tuple(vec![Value::Int(1), Value::Int(2)]).contains(&Value::Float(2.0)).unwrap());
        assert!(Value::Int(3).contains(&Value::Int(3)).is_err());
    }

    #[test]
    fn reprs() {
        assert_eq!(Value::complex(5.0, 2.0).to_string(), "(5+2j)");
        assert_eq!(Value::complex(0.0, 2.5).to_string(), "2.5j");
        assert_eq!(Value::complex(1.0, -1.0).to_string(), "(1-1j)");
        assert_eq!(Value::tuple(vec![Value::Int(0)]).to_string(), "(0,)");
        assert_eq!(Value::from("it's").to_string(), "\"it's\"");
        assert_eq!(Value::from("a\nb").to_string(), "'a\\nb'");
        assert_eq!(Value::Float(-0.5).to_string(), "-0.5");
        assert_eq!(Value::Float(1e-7).to_string(), "1e-07");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::list(vec![Value::None]).is_truthy());
        assert!(Value::complex(0.0, 1.0).is_truthy());
    }

    #[test]
    fn hashing() {
        assert_eq!(Value::Int(42).hash_value().unwrap(), 42);
        assert_eq!(Value::Float(42.0).hash_value().unwrap(), 42);
        assert_eq!(Value::from("abc").hash_value().unwrap(), Value::from("abc").hash_value().unwrap());
        assert!(Value::dict(vec![]).hash_value().is_err());
    }
}
