use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use crate::ast::BinaryOp;
use crate::error::{ErrorKind, RuntimeError};
use crate::interp::Context;
use crate::value::{binary_op, dict_lookup, floor_mod, Value};

type EvalResult<T> = Result<T, RuntimeError>;

/// A builtin function, resolved by name when no definition shadows it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Bool,
    Complex,
    Divmod,
    Float,
    Hash,
    Hex,
    Int,
    Iter,
    Len,
    List,
    Max,
    Min,
    Next,
    Oct,
    Pow,
    Reversed,
    Round,
    Sorted,
    Str,
    Sum,
    Tuple,
}

const BUILTIN_CLASSIFIER: &[(&str, Builtin)] = &[
    ("abs", Builtin::Abs),
    ("bool", Builtin::Bool),
    ("complex", Builtin::Complex),
    ("divmod", Builtin::Divmod),
    ("float", Builtin::Float),
    ("hash", Builtin::Hash),
    ("hex", Builtin::Hex),
    ("int", Builtin::Int),
    ("iter", Builtin::Iter),
    ("len", Builtin::Len),
    ("list", Builtin::List),
    ("max", Builtin::Max),
    ("min", Builtin::Min),
    ("next", Builtin::Next),
    ("oct", Builtin::Oct),
    ("pow", Builtin::Pow),
    ("reversed", Builtin::Reversed),
    ("round", Builtin::Round),
    ("sorted", Builtin::Sorted),
    ("str", Builtin::Str),
    ("sum", Builtin::Sum),
    ("tuple", Builtin::Tuple),
];

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        BUILTIN_CLASSIFIER.iter().find(|(n, _)| *n == name).map(|(_, b)| *b)
    }

    pub fn name(self) -> &'static str {
        BUILTIN_CLASSIFIER.iter()
            .find(|(_, b)| *b == self)
            .map_or("?", |(name, _)| *name)
    }

    /// Names of every builtin, for completion.
    pub fn names() -> impl Iterator<Item = &'static str> {
        BUILTIN_CLASSIFIER.iter().map(|(name, _)| *name)
    }
}

/// Methods reachable through attribute access on a value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Method {
    Conjugate,
    BitLength,
    IsInteger,
    Upper,
    Lower,
    Strip,
    Lstrip,
    Rstrip,
    Split,
    Startswith,
    Endswith,
    Replace,
    Join,
    Find,
    Count,
    Index,
    Get,
    Keys,
    Values,
    Items,
}

// (receiver type, attribute name, method)
const METHOD_CLASSIFIER: &[(&str, &str, Method)] = &[
    ("int", "conjugate", Method::Conjugate),
    ("float", "conjugate", Method::Conjugate),
    ("complex", "conjugate", Method::Conjugate),
    ("bool", "conjugate", Method::Conjugate),
    ("int", "bit_length", Method::BitLength),
    ("bool", "bit_length", Method::BitLength),
    ("float", "is_integer", Method::IsInteger),
    ("str", "upper", Method::Upper),
    ("str", "lower", Method::Lower),
    ("str", "strip", Method::Strip),
    ("str", "lstrip", Method::Lstrip),
    ("str", "rstrip", Method::Rstrip),
    ("str", "split", Method::Split),
    ("str", "startswith", Method::Startswith),
    ("str", "endswith", Method::Endswith),
    ("str", "replace", Method::Replace),
    ("str", "join", Method::Join),
    ("str", "find", Method::Find),
    ("str", "count", Method::Count),
    ("list", "count", Method::Count),
    ("tuple", "count", Method::Count),
    ("list", "index", Method::Index),
    ("tuple", "index", Method::Index),
    ("dict", "get", Method::Get),
    ("dict", "keys", Method::Keys),
    ("dict", "values", Method::Values),
    ("dict", "items", Method::Items),
];

/// A method together with the value it was looked up on.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Method,
    name: &'static str,
}

impl Display for BoundMethod {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "<built-in method {} of {} object>", self.name, self.receiver.type_name())
    }
}

/// `value.name`
pub fn get_attr(value: &Value, name: &str) -> EvalResult<Value> {
    match (value, name) {
        (Value::Bool(_), "real") | (Value::Int(_), "real") => {
            return Ok(Value::Int(value.as_int().unwrap_or(0)));
        },
        (Value::Bool(_), "imag") | (Value::Int(_), "imag") => return Ok(Value::Int(0)),
        (Value::Float(x), "real") => return Ok(Value::Float(*x)),
        (Value::Float(_), "imag") => return Ok(Value::Float(0.0)),
        (Value::Complex(re, _), "real") => return Ok(Value::Float(*re)),
        (Value::Complex(_, im), "imag") => return Ok(Value::Float(*im)),
        _ => {},
    }
    let type_name = value.type_name();
    METHOD_CLASSIFIER.iter()
        .find(|(ty, attr, _)| *ty == type_name && *attr == name)
        .map(|(_, attr, method)| {
            Value::Method(Rc::new(BoundMethod {
                receiver: value.clone(),
                method: *method,
                name: *attr,
            }))
        })
        .ok_or_else(|| {
            RuntimeError::new(
                ErrorKind::AttributeError,
                format!("'{}' object has no attribute '{}'", type_name, name),
            )
        })
}

// Matches call arguments against named parameters, the way builtins take
// them: positionally first, then by keyword.
fn bind(
    func: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    params: &[&str],
    required: usize,
) -> EvalResult<Vec<Option<Value>>> {
    if args.len() > params.len() {
        return Err(RuntimeError::type_error(format!(
            "{}() takes at most {} arguments ({} given)",
            func,
            params.len(),
            args.len()
        )));
    }
    let mut bound: Vec<Option<Value>> = args.into_iter().map(Some).collect();
    bound.resize(params.len(), None);
    for (key, value) in kwargs {
        let i = params.iter().position(|p| *p == key).ok_or_else(|| {
            RuntimeError::type_error(format!("{}() got an unexpected keyword argument '{}'", func, key))
        })?;
        if bound[i].is_some() {
            return Err(RuntimeError::type_error(format!(
                "{}() got multiple values for argument '{}'",
                func, key
            )));
        }
        bound[i] = Some(value);
    }
    for (i, param) in params.iter().enumerate().take(required) {
        if bound[i].is_none() {
            return Err(RuntimeError::type_error(format!(
                "{}() missing required argument '{}' (pos {})",
                func,
                param,
                i + 1
            )));
        }
    }
    Ok(bound)
}

// The i-th bound argument, None when it was not given.
fn take(bound: &mut [Option<Value>], i: usize) -> Value {
    bound[i].take().unwrap_or(Value::None)
}

fn as_index(value: &Value) -> EvalResult<i64> {
    value.as_int().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

pub fn call_builtin(
    ctx: &Context,
    builtin: Builtin,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> EvalResult<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Abs => {
            let mut a = bind(name, args, kwargs, &["x"], 1)?;
            abs(&take(&mut a, 0))
        },
        Builtin::Bool => {
            let mut a = bind(name, args, kwargs, &["x"], 0)?;
            Ok(Value::Bool(take(&mut a, 0).is_truthy()))
        },
        Builtin::Complex => {
            let mut a = bind(name, args, kwargs, &["real", "imag"], 0)?;
            let real = a[0].take();
            let imag = a[1].take();
            complex(real, imag)
        },
        Builtin::Divmod => {
            let mut a = bind(name, args, kwargs, &["x", "y"], 2)?;
            let (x, y) = (take(&mut a, 0), take(&mut a, 1));
            let q = binary_op(BinaryOp::FloorDiv, &x, &y).map_err(|e| rename_unsupported(e, "//", "divmod()"))?;
            let r = binary_op(BinaryOp::Mod, &x, &y)?;
            Ok(Value::tuple(vec![q, r]))
        },
        Builtin::Float => {
            let mut a = bind(name, args, kwargs, &["x"], 0)?;
            match a[0].take() {
                None => Ok(Value::Float(0.0)),
                Some(x) => float(&x),
            }
        },
        Builtin::Hash => {
            let mut a = bind(name, args, kwargs, &["obj"], 1)?;
            Ok(Value::Int(take(&mut a, 0).hash_value()?))
        },
        Builtin::Hex => {
            let mut a = bind(name, args, kwargs, &["number"], 1)?;
            let i = as_index(&take(&mut a, 0))?;
            Ok(Value::from(radix_repr(i, 16, "0x")))
        },
        Builtin::Oct => {
            let mut a = bind(name, args, kwargs, &["number"], 1)?;
            let i = as_index(&take(&mut a, 0))?;
            Ok(Value::from(radix_repr(i, 8, "0o")))
        },
        Builtin::Int => {
            let mut a = bind(name, args, kwargs, &["x", "base"], 0)?;
            let base = a[1].take();
            match a[0].take() {
                None if base.is_none() => Ok(Value::Int(0)),
                None => Err(RuntimeError::type_error("int() missing string argument")),
                Some(x) => int(&x, base),
            }
        },
        Builtin::Iter => {
            let mut a = bind(name, args, kwargs, &["object"], 1)?;
            match take(&mut a, 0) {
                it @ Value::Iter(_) => Ok(it),
                other => Ok(Value::iter_over(other.iterate()?)),
            }
        },
        Builtin::Len => {
            let mut a = bind(name, args, kwargs, &["obj"], 1)?;
            Ok(Value::Int(take(&mut a, 0).len()? as i64))
        },
        Builtin::List => {
            let mut a = bind(name, args, kwargs, &["iterable"], 0)?;
            match a[0].take() {
                None => Ok(Value::list(Vec::new())),
                Some(it) => Ok(Value::list(it.iterate()?)),
            }
        },
        Builtin::Tuple => {
            let mut a = bind(name, args, kwargs, &["iterable"], 0)?;
            match a[0].take() {
                None => Ok(Value::tuple(Vec::new())),
                Some(it) => Ok(Value::tuple(it.iterate()?)),
            }
        },
        Builtin::Max => min_max(ctx, name, Ordering::Greater, args, kwargs),
        Builtin::Min => min_max(ctx, name, Ordering::Less, args, kwargs),
        Builtin::Next => {
            let mut a = bind(name, args, kwargs, &["iterator", "default"], 1)?;
            let default = a[1].take();
            match take(&mut a, 0) {
                Value::Iter(iter) => match iter.borrow_mut().next() {
                    Some(v) => Ok(v),
                    None => default.ok_or_else(|| RuntimeError::new(ErrorKind::StopIteration, "")),
                },
                other => Err(RuntimeError::type_error(format!(
                    "'{}' object is not an iterator",
                    other.type_name()
                ))),
            }
        },
        Builtin::Pow => {
            let mut a = bind(name, args, kwargs, &["base", "exp", "mod"], 2)?;
            let (base, exp) = (take(&mut a, 0), take(&mut a, 1));
            match a[2].take() {
                None | Some(Value::None) => binary_op(BinaryOp::Pow, &base, &exp),
                Some(modulus) => mod_pow(&base, &exp, &modulus),
            }
        },
        Builtin::Reversed => {
            let mut a = bind(name, args, kwargs, &["sequence"], 1)?;
            match take(&mut a, 0) {
                seq @ Value::Str(_) | seq @ Value::Tuple(_) | seq @ Value::List(_) | seq @ Value::Dict(_) => {
                    let mut items = seq.iterate()?;
                    items.reverse();
                    Ok(Value::iter_over(items))
                },
                other => Err(RuntimeError::type_error(format!(
                    "'{}' object is not reversible",
                    other.type_name()
                ))),
            }
        },
        Builtin::Round => {
            let mut a = bind(name, args, kwargs, &["number", "ndigits"], 1)?;
            let number = take(&mut a, 0);
            round(&number, a[1].take())
        },
        Builtin::Sorted => {
            if args.len() != 1 {
                return Err(RuntimeError::type_error(format!(
                    "sorted expected 1 argument, got {}",
                    args.len()
                )));
            }
            let mut a = bind(name, args, kwargs, &["iterable", "key", "reverse"], 1)?;
            let items = take(&mut a, 0).iterate()?;
            let key = a[1].take().filter(|k| !matches!(k, Value::None));
            let reverse = a[2].take().map_or(false, |r| r.is_truthy());
            Ok(Value::list(sorted(ctx, items, key.as_ref(), reverse)?))
        },
        Builtin::Str => {
            let mut a = bind(name, args, kwargs, &["object"], 0)?;
            match a[0].take() {
                None => Ok(Value::from("")),
                Some(v) => Ok(Value::from(v.to_py_str())),
            }
        },
        Builtin::Sum => {
            let mut a = bind(name, args, kwargs, &["iterable", "start"], 1)?;
            let items = take(&mut a, 0).iterate()?;
            let mut total = a[1].take().unwrap_or(Value::Int(0));
            if let Value::Str(_) = total {
                return Err(RuntimeError::type_error("sum() can't sum strings [use ''.join(seq) instead]"));
            }
            for item in items {
                ctx.check_interrupt()?;
                total = binary_op(BinaryOp::Add, &total, &item)?;
            }
            Ok(total)
        },
    }
}

fn rename_unsupported(err: RuntimeError, symbol: &str, func: &str) -> RuntimeError {
    let prefix = format!("for {}:", symbol);
    if err.kind == ErrorKind::TypeError && err.message.contains(&prefix) {
        let message = err.message.replace(&prefix, &format!("for {}:", func));
        return RuntimeError::type_error(message);
    }
    err
}

fn abs(x: &Value) -> EvalResult<Value> {
    match x {
        Value::Bool(_) | Value::Int(_) => {
            let i = x.as_int().unwrap_or(0);
            i.checked_abs().map(Value::Int).ok_or_else(RuntimeError::overflow)
        },
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Complex(re, im) => Ok(Value::Float(re.hypot(*im))),
        other => Err(RuntimeError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn complex_parts(value: &Value, func_arg: &str) -> EvalResult<(f64, f64)> {
    match value {
        Value::Complex(re, im) => Ok((*re, *im)),
        Value::Str(s) => parse_complex(s),
        other => other.as_float().map(|x| (x, 0.0)).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "complex() {} must be a string or a number, not '{}'",
                func_arg,
                other.type_name()
            ))
        }),
    }
}

fn complex(real: Option<Value>, imag: Option<Value>) -> EvalResult<Value> {
    let (a, b) = match &real {
        None => (0.0, 0.0),
        Some(v) => complex_parts(v, "first argument")?,
    };
    let (c, d) = match &imag {
        None => (0.0, 0.0),
        Some(Value::Str(_)) => {
            return Err(RuntimeError::type_error("complex() second arg can't be a string"));
        },
        Some(v) => complex_parts(v, "second argument")?,
    };
    if let (Some(Value::Str(_)), Some(_)) = (&real, &imag) {
        return Err(RuntimeError::type_error("complex() can't take second arg if first is a string"));
    }
    // real + imag * 1j
    Ok(Value::Complex(a - d, b + c))
}

// Accepts "x", "yj" and "x+yj" forms, optionally parenthesized.
fn parse_complex(s: &str) -> EvalResult<(f64, f64)> {
    let malformed = || RuntimeError::value_error("complex() arg is a malformed string");
    let trimmed = s.trim();
    let body = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(trimmed);
    let imag_part = match body.strip_suffix('j').or_else(|| body.strip_suffix('J')) {
        None => return parse_float(body).map(|x| (x, 0.0)).ok_or_else(malformed),
        Some(rest) => rest,
    };
    // the split point is the last sign that does not belong to an exponent.
    let split = imag_part
        .char_indices()
        .skip(1)
        .filter(|(i, c)| {
            (*c == '+' || *c == '-') && !imag_part[..*i].ends_with(|p| p == 'e' || p == 'E')
        })
        .map(|(i, _)| i)
        .last();
    let (re, im) = match split {
        Some(i) => (&imag_part[..i], &imag_part[i..]),
        None => ("", imag_part),
    };
    let re = if re.is_empty() { 0.0 } else { parse_float(re).ok_or_else(malformed)? };
    let im = match im {
        "" | "+" => 1.0,
        "-" => -1.0,
        other => parse_float(other).ok_or_else(malformed)?,
    };
    Ok((re, im))
}

fn parse_float(s: &str) -> Option<f64> {
    let s = s.trim();
    let lower = s.to_ascii_lowercase();
    let unsigned = lower.trim_start_matches(|c| c == '+' || c == '-');
    let negative = lower.starts_with('-');
    let special = match unsigned {
        "inf" | "infinity" => Some(f64::INFINITY),
        "nan" => Some(f64::NAN),
        _ => None,
    };
    if let Some(x) = special {
        if lower.len() - unsigned.len() > 1 {
            return None;
        }
        return Some(if negative { -x } else { x });
    }
    if s.is_empty() || s.contains("__") || s.starts_with('_') || s.ends_with('_') {
        return None;
    }
    s.replace('_', "").parse::<f64>().ok()
}

fn float(x: &Value) -> EvalResult<Value> {
    match x {
        Value::Str(s) => parse_float(s).map(Value::Float).ok_or_else(|| {
            RuntimeError::value_error(format!("could not convert string to float: {}", x))
        }),
        Value::Complex(..) => Err(RuntimeError::type_error(
            "float() argument must be a string or a real number, not 'complex'",
        )),
        other => other.as_float().map(Value::Float).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn int(x: &Value, base: Option<Value>) -> EvalResult<Value> {
    if let Some(base) = base {
        let base = as_index(&base)?;
        return match x {
            Value::Str(s) => parse_int(s, base).map(Value::Int),
            _ => Err(RuntimeError::type_error("int() can't convert non-string with explicit base")),
        };
    }
    match x {
        Value::Bool(_) | Value::Int(_) => Ok(Value::Int(x.as_int().unwrap_or(0))),
        Value::Float(f) => float_to_int(*f).map(Value::Int),
        Value::Str(s) => parse_int(s, 10).map(Value::Int),
        other => Err(RuntimeError::type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float_to_int(f: f64) -> EvalResult<i64> {
    if f.is_nan() {
        return Err(RuntimeError::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(RuntimeError::new(ErrorKind::OverflowError, "cannot convert float infinity to integer"));
    }
    let t = f.trunc();
    if t < -9.223_372_036_854_775_808e18 || t >= 9.223_372_036_854_775_808e18 {
        return Err(RuntimeError::overflow());
    }
    Ok(t as i64)
}

fn parse_int(s: &str, base: i64) -> EvalResult<i64> {
    let invalid = || {
        RuntimeError::value_error(format!(
            "invalid literal for int() with base {}: {}",
            base,
            Value::from(s)
        ))
    };
    if base != 0 && !(2..=36).contains(&base) {
        return Err(RuntimeError::value_error("int() base must be >= 2 and <= 36, or 0"));
    }
    let trimmed = s.trim();
    let (negative, unsigned) = match trimmed.chars().next() {
        Some('-') => (true, &trimmed[1..]),
        Some('+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = unsigned.to_ascii_lowercase();
    let prefixed = |p: &str, b: i64| (base == 0 || base == b) && lower.starts_with(p);
    let (radix, digits) = if prefixed("0x", 16) {
        (16, &lower[2..])
    } else if prefixed("0o", 8) {
        (8, &lower[2..])
    } else if prefixed("0b", 2) {
        (2, &lower[2..])
    } else if base == 0 {
        if lower.len() > 1 && lower.starts_with('0') && lower.chars().any(|c| c != '0' && c != '_') {
            return Err(invalid());
        }
        (10, lower.as_str())
    } else {
        (base, lower.as_str())
    };
    let digits = digits.strip_prefix('_').unwrap_or(digits);
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return Err(invalid());
    }
    let cleaned = digits.replace('_', "");
    let magnitude = u64::from_str_radix(&cleaned, radix as u32).map_err(|e| {
        match e.kind() {
            std::num::IntErrorKind::PosOverflow => RuntimeError::overflow(),
            _ => invalid(),
        }
    })?;
    if negative {
        if magnitude == 1u64 << 63 {
            return Ok(i64::MIN);
        }
        i64::try_from(magnitude).map(|m| -m).map_err(|_| RuntimeError::overflow())
    } else {
        i64::try_from(magnitude).map_err(|_| RuntimeError::overflow())
    }
}

fn radix_repr(i: i64, radix: u32, prefix: &str) -> String {
    let sign = if i < 0 { "-" } else { "" };
    let magnitude = i.unsigned_abs();
    let digits = match radix {
        16 => format!("{:x}", magnitude),
        8 => format!("{:o}", magnitude),
        _ => format!("{:b}", magnitude),
    };
    format!("{}{}{}", sign, prefix, digits)
}

fn mod_pow(base: &Value, exp: &Value, modulus: &Value) -> EvalResult<Value> {
    let (b, e, m) = match (base.as_int(), exp.as_int(), modulus.as_int()) {
        (Some(b), Some(e), Some(m)) => (b, e, m),
        _ => {
            return Err(RuntimeError::type_error(
                "pow() 3rd argument not allowed unless all arguments are integers",
            ));
        },
    };
    if m == 0 {
        return Err(RuntimeError::value_error("pow() 3rd argument cannot be 0"));
    }
    let mut b = i128::from(floor_mod(b, m));
    let mut e = e;
    if e < 0 {
        b = mod_inverse(b, i128::from(m))
            .ok_or_else(|| RuntimeError::value_error("base is not invertible for the given modulus"))?;
        e = -e;
    }
    let m128 = i128::from(m);
    let mut result: i128 = 1;
    while e > 0 {
        if e & 1 == 1 {
            result = (result * b).rem_euclid(m128);
        }
        b = (b * b).rem_euclid(m128);
        e >>= 1;
    }
    // the result takes the sign of the modulus.
    Ok(Value::Int(floor_mod((result % m128) as i64, m)))
}

fn mod_inverse(a: i128, m: i128) -> Option<i128> {
    let (mut old_r, mut r) = (a.rem_euclid(m.abs()), m.abs());
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let q = old_r / r;
        let next_r = old_r - q * r;
        old_r = r;
        r = next_r;
        let next_s = old_s - q * s;
        old_s = s;
        s = next_s;
    }
    if old_r != 1 {
        return None;
    }
    Some(old_s.rem_euclid(m.abs()))
}

fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        rounded
    }
}

// Rounds half to even at `ndigits` decimal places, deciding on the exact
// decimal expansion of `x` rather than on a scaled product.
fn round_to_digits(x: f64, ndigits: i64) -> EvalResult<f64> {
    // an f64 has at most 1074 significant fractional digits.
    let exact = format!("{:.1100}", x.abs());
    let point = match exact.find('.') {
        Some(point) => point,
        None => return Ok(x),
    };
    let mut digits: Vec<u8> = exact.bytes().filter(u8::is_ascii_digit).map(|b| b - b'0').collect();
    let mut int_len = point;
    let keep = point as i64 + ndigits;
    if keep < 0 {
        return Ok(0f64.copysign(x));
    }
    let keep = keep as usize;
    let round_up = match digits.get(keep) {
        Some(&d) if d > 5 => true,
        Some(&5) => {
            let beyond_half = digits[keep + 1..].iter().any(|&d| d != 0);
            let odd = keep > 0 && digits[keep - 1] % 2 == 1;
            beyond_half || odd
        },
        _ => false,
    };
    digits.truncate(keep);
    if round_up {
        let mut carry = true;
        for d in digits.iter_mut().rev() {
            if *d == 9 {
                *d = 0;
            } else {
                *d += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, 1);
            int_len += 1;
        }
    }
    if digits.len() < int_len {
        digits.resize(int_len, 0);
    }
    let mut text: String = digits.iter().map(|&d| char::from(b'0' + d)).collect();
    text.insert(int_len, '.');
    match text.parse::<f64>() {
        Ok(rounded) if rounded.is_finite() => Ok(rounded.copysign(x)),
        _ => Err(RuntimeError::overflow()),
    }
}

fn round(number: &Value, ndigits: Option<Value>) -> EvalResult<Value> {
    let ndigits = match ndigits {
        None | Some(Value::None) => None,
        Some(n) => Some(as_index(&n)?),
    };
    match (number, ndigits) {
        (Value::Bool(_), None) | (Value::Int(_), None) => Ok(Value::Int(number.as_int().unwrap_or(0))),
        (Value::Bool(_), Some(n)) | (Value::Int(_), Some(n)) => {
            let i = number.as_int().unwrap_or(0);
            if n >= 0 {
                return Ok(Value::Int(i));
            }
            if n < -18 {
                return Ok(Value::Int(0));
            }
            let scale = 10i64.pow((-n) as u32);
            let q = round_half_even(i as f64 / scale as f64) as i64;
            q.checked_mul(scale).map(Value::Int).ok_or_else(RuntimeError::overflow)
        },
        (Value::Float(x), None) => float_to_int(round_half_even(*x)).map(Value::Int),
        (Value::Float(x), Some(n)) => {
            if !x.is_finite() || n > 308 {
                return Ok(Value::Float(*x));
            }
            if n < -308 {
                return Ok(Value::Float(0.0 * x.signum()));
            }
            round_to_digits(*x, n).map(Value::Float)
        },
        (other, _) => Err(RuntimeError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn min_max(
    ctx: &Context,
    name: &str,
    wanted: Ordering,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> EvalResult<Value> {
    let mut key = None;
    let mut default = None;
    for (k, v) in kwargs {
        match k.as_str() {
            "key" => key = Some(v).filter(|v| !matches!(v, Value::None)),
            "default" => default = Some(v),
            _ => {
                return Err(RuntimeError::type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    name, k
                )));
            },
        }
    }
    let items = match args.len() {
        0 => {
            return Err(RuntimeError::type_error(format!(
                "{} expected at least 1 argument, got 0",
                name
            )));
        },
        1 => args.into_iter().next().map_or(Ok(Vec::new()), |it| it.iterate())?,
        _ => {
            if default.is_some() {
                return Err(RuntimeError::type_error(format!(
                    "Cannot specify a default for {}() with multiple positional arguments",
                    name
                )));
            }
            args
        },
    };
    let symbol = if wanted == Ordering::Greater { ">" } else { "<" };
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        ctx.check_interrupt()?;
        let k = match &key {
            Some(f) => ctx.call_value(f, vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => k.compare(best_key, symbol)? == Some(wanted),
        };
        if replace {
            best = Some((k, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(RuntimeError::value_error(format!("{}() arg is an empty sequence", name))),
    }
}

fn sorted(ctx: &Context, items: Vec<Value>, key: Option<&Value>, reverse: bool) -> EvalResult<Vec<Value>> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        ctx.check_interrupt()?;
        let k = match key {
            Some(f) => ctx.call_value(f, vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        keyed.push((k, item));
    }
    // sort_by can't fail; remember the first error and report it after.
    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        let (first, second) = if reverse { (b, a) } else { (a, b) };
        match first.compare(second, "<") {
            Ok(ordering) => ordering.unwrap_or(Ordering::Equal),
            Err(e) => {
                failure = Some(e);
                Ordering::Equal
            },
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(keyed.into_iter().map(|(_, item)| item).collect()),
    }
}

pub fn call_method(
    ctx: &Context,
    bound: &BoundMethod,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> EvalResult<Value> {
    let name = bound.name;
    let receiver = &bound.receiver;
    match (bound.method, receiver) {
        (Method::Conjugate, _) => {
            bind(name, args, kwargs, &[], 0)?;
            match receiver {
                Value::Complex(re, im) => Ok(Value::Complex(*re, -*im)),
                Value::Bool(b) => Ok(Value::Int(*b as i64)),
                other => Ok(other.clone()),
            }
        },
        (Method::BitLength, _) => {
            bind(name, args, kwargs, &[], 0)?;
            let i = receiver.as_int().unwrap_or(0);
            Ok(Value::Int(i64::from(64 - i.unsigned_abs().leading_zeros())))
        },
        (Method::IsInteger, Value::Float(x)) => {
            bind(name, args, kwargs, &[], 0)?;
            Ok(Value::Bool(x.is_finite() && x.fract() == 0.0))
        },
        (Method::Get, Value::Dict(entries)) => {
            let mut a = bind(name, args, kwargs, &["key", "default"], 1)?;
            let key = take(&mut a, 0);
            key.hash_value()?;
            Ok(dict_lookup(entries, &key).cloned().unwrap_or_else(|| take(&mut a, 1)))
        },
        (Method::Keys, Value::Dict(entries)) => {
            bind(name, args, kwargs, &[], 0)?;
            Ok(Value::list(entries.iter().map(|(k, _)| k.clone()).collect()))
        },
        (Method::Values, Value::Dict(entries)) => {
            bind(name, args, kwargs, &[], 0)?;
            Ok(Value::list(entries.iter().map(|(_, v)| v.clone()).collect()))
        },
        (Method::Items, Value::Dict(entries)) => {
            bind(name, args, kwargs, &[], 0)?;
            Ok(Value::list(
                entries.iter().map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()])).collect(),
            ))
        },
        (Method::Count, Value::List(items)) | (Method::Count, Value::Tuple(items)) => {
            let mut a = bind(name, args, kwargs, &["value"], 1)?;
            let needle = take(&mut a, 0);
            Ok(Value::Int(items.iter().filter(|v| v.py_eq(&needle)).count() as i64))
        },
        (Method::Index, Value::List(items)) | (Method::Index, Value::Tuple(items)) => {
            let mut a = bind(name, args, kwargs, &["value"], 1)?;
            let needle = take(&mut a, 0);
            match items.iter().position(|v| v.py_eq(&needle)) {
                Some(i) => Ok(Value::Int(i as i64)),
                None if receiver.type_name() == "list" => {
                    Err(RuntimeError::value_error(format!("{} is not in list", needle)))
                },
                None => Err(RuntimeError::value_error("tuple.index(x): x not in tuple")),
            }
        },
        (method, Value::Str(s)) => str_method(ctx, name, method, s, args, kwargs),
        _ => Err(RuntimeError::type_error(format!(
            "descriptor '{}' does not apply to a '{}' object",
            name,
            receiver.type_name()
        ))),
    }
}

fn expect_str(func: &str, value: &Value) -> EvalResult<Rc<str>> {
    match value {
        Value::Str(s) => Ok(Rc::clone(s)),
        other => Err(RuntimeError::type_error(format!(
            "{}() argument must be str, not {}",
            func,
            other.type_name()
        ))),
    }
}

fn strip_chars(chars: Option<Value>, func: &str) -> EvalResult<Option<Vec<char>>> {
    match chars {
        None | Some(Value::None) => Ok(None),
        Some(v) => Ok(Some(expect_str(func, &v)?.chars().collect())),
    }
}

fn char_index(s: &str, byte_index: usize) -> i64 {
    s[..byte_index].chars().count() as i64
}

fn str_method(
    ctx: &Context,
    name: &str,
    method: Method,
    s: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> EvalResult<Value> {
    match method {
        Method::Upper => {
            bind(name, args, kwargs, &[], 0)?;
            Ok(Value::from(s.to_uppercase()))
        },
        Method::Lower => {
            bind(name, args, kwargs, &[], 0)?;
            Ok(Value::from(s.to_lowercase()))
        },
        Method::Strip | Method::Lstrip | Method::Rstrip => {
            let mut a = bind(name, args, kwargs, &["chars"], 0)?;
            let chars = strip_chars(a[0].take(), name)?;
            let matches = |c: char| match &chars {
                None => c.is_whitespace(),
                Some(set) => set.contains(&c),
            };
            let stripped = match method {
                Method::Strip => s.trim_matches(matches),
                Method::Lstrip => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            };
            Ok(Value::from(stripped))
        },
        Method::Split => {
            let mut a = bind(name, args, kwargs, &["sep", "maxsplit"], 0)?;
            let sep = match a[0].take() {
                None | Some(Value::None) => None,
                Some(v) => Some(expect_str(name, &v)?),
            };
            let maxsplit = match a[1].take() {
                None => -1,
                Some(v) => as_index(&v)?,
            };
            let parts: Vec<Value> = match sep {
                Some(sep) if sep.is_empty() => return Err(RuntimeError::value_error("empty separator")),
                Some(sep) if maxsplit < 0 => s.split(sep.as_ref()).map(Value::from).collect(),
                Some(sep) => s.splitn(maxsplit as usize + 1, sep.as_ref()).map(Value::from).collect(),
                None => split_whitespace(s, maxsplit).into_iter().map(Value::from).collect(),
            };
            Ok(Value::list(parts))
        },
        Method::Startswith | Method::Endswith => {
            let mut a = bind(name, args, kwargs, &["prefix"], 1)?;
            let candidates = match take(&mut a, 0) {
                Value::Tuple(items) => items.as_ref().clone(),
                other => vec![other],
            };
            for candidate in candidates {
                let affix = match candidate {
                    Value::Str(affix) => affix,
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "{} first arg must be str or a tuple of str, not {}",
                            name,
                            other.type_name()
                        )));
                    },
                };
                let hit = if method == Method::Startswith {
                    s.starts_with(affix.as_ref())
                } else {
                    s.ends_with(affix.as_ref())
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        },
        Method::Replace => {
            let mut a = bind(name, args, kwargs, &["old", "new", "count"], 2)?;
            let old = expect_str(name, &take(&mut a, 0))?;
            let new = expect_str(name, &take(&mut a, 1))?;
            let count = match a[2].take() {
                None => -1,
                Some(v) => as_index(&v)?,
            };
            if count < 0 {
                Ok(Value::from(s.replace(old.as_ref(), &new)))
            } else {
                Ok(Value::from(s.replacen(old.as_ref(), &new, count as usize)))
            }
        },
        Method::Join => {
            let mut a = bind(name, args, kwargs, &["iterable"], 1)?;
            let mut pieces = Vec::new();
            for (i, item) in take(&mut a, 0).iterate()?.into_iter().enumerate() {
                ctx.check_interrupt()?;
                match item {
                    Value::Str(piece) => pieces.push(piece.to_string()),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            i,
                            other.type_name()
                        )));
                    },
                }
            }
            Ok(Value::from(pieces.join(s)))
        },
        Method::Find => {
            let mut a = bind(name, args, kwargs, &["sub"], 1)?;
            let sub = expect_str(name, &take(&mut a, 0))?;
            Ok(Value::Int(s.find(sub.as_ref()).map_or(-1, |i| char_index(s, i))))
        },
        Method::Count => {
            let mut a = bind(name, args, kwargs, &["sub"], 1)?;
            let sub = expect_str(name, &take(&mut a, 0))?;
            if sub.is_empty() {
                return Ok(Value::Int(s.chars().count() as i64 + 1));
            }
            Ok(Value::Int(s.matches(sub.as_ref()).count() as i64))
        },
        _ => Err(RuntimeError::type_error(format!(
            "descriptor '{}' does not apply to a 'str' object",
            name
        ))),
    }
}

fn split_whitespace(s: &str, maxsplit: i64) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 == maxsplit {
            parts.push(rest.to_string());
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(rest[..end].to_string());
        rest = rest[end..].trim_start();
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Interpreter;

    fn call(builtin: &str, args: Vec<Value>) -> String {
        let interp = Interpreter::new();
        let builtin = Builtin::lookup(builtin).unwrap();
        match call_builtin(interp.context(), builtin, args, Vec::new()) {
            Ok(v) => v.to_string(),
            Err(e) => e.to_string(),
        }
    }

    fn method(receiver: Value, name: &str, args: Vec<Value>) -> String {
        let interp = Interpreter::new();
        let result = get_attr(&receiver, name).and_then(|m| match m {
            Value::Method(bound) => call_method(interp.context(), &bound, args, Vec::new()),
            other => Ok(other),
        });
        match result {
            Ok(v) => v.to_string(),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Builtin::lookup("sorted"), Some(Builtin::Sorted));
        assert_eq!(Builtin::lookup("print"), None);
        assert_eq!(Builtin::Divmod.name(), "divmod");
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(call("int", vec![Value::Float(-3.9)]), "-3");
        assert_eq!(call("int", vec![Value::from("0x1F"), Value::Int(0)]), "31");
        assert_eq!(call("int", vec![Value::from("1_000")]), "1000");
        assert_eq!(call("int", vec![Value::from("12a")]),
                   "ValueError: invalid literal for int() with base 10: '12a'");
        assert_eq!(call("float", vec![Value::from("-inf")]), "-inf");
        assert_eq!(call("float", vec![Value::Int(3)]), "3.0");
        assert_eq!(call("complex", vec![Value::Int(1), Value::Int(2)]), "(1+2j)");
        assert_eq!(call("complex", vec![Value::from("1-2.5j")]), "(1-2.5j)");
        assert_eq!(call("hex", vec![Value::Int(-255)]), "'-0xff'");
        assert_eq!(call("oct", vec![Value::Int(8)]), "'0o10'");
        assert_eq!(call("hex", vec![Value::Float(1.0)]),
                   "TypeError: 'float' object cannot be interpreted as an integer");
    }

    #[test]
    fn round_half_to_even() {
        assert_eq!(call("round", vec![Value::Float(2.5)]), "2");
        assert_eq!(call("round", vec![Value::Float(3.5)]), "4");
        assert_eq!(call("round", vec![Value::Float(-0.5)]), "0");
        assert_eq!(call("round", vec![Value::Float(1.2345), Value::Int(2)]), "1.23");
        assert_eq!(call("round", vec![Value::Float(2.675), Value::Int(2)]), "2.67");
        assert_eq!(call("round", vec![Value::Float(0.125), Value::Int(2)]), "0.12");
        assert_eq!(call("round", vec![Value::Float(0.375), Value::Int(2)]), "0.38");
        assert_eq!(call("round", vec![Value::Float(-2.5), Value::Int(0)]), "-2.0");
        assert_eq!(call("round", vec![Value::Float(9.96), Value::Int(1)]), "10.0");
        assert_eq!(call("round", vec![Value::Float(15.0), Value::Int(-1)]), "20.0");
        assert_eq!(call("round", vec![Value::Float(1234.5678), Value::Int(-2)]), "1200.0");
        assert_eq!(call("round", vec![Value::Float(0.5), Value::Int(-1)]), "0.0");
        assert_eq!(call("round", vec![Value::Int(1250), Value::Int(-2)]), "1200");
        assert_eq!(call("round", vec![Value::Int(7), Value::None]), "7");
    }

    #[test]
    fn divmod_and_pow() {
        assert_eq!(call("divmod", vec![Value::Int(-7), Value::Int(2)]), "(-4, 1)");
        assert_eq!(call("divmod", vec![Value::Float(7.5), Value::Int(2)]), "(3.0, 1.5)");
        assert_eq!(call("divmod", vec![Value::from("a"), Value::Int(2)]),
                   "TypeError: unsupported operand type(s) for divmod(): 'str' and 'int'");
        assert_eq!(call("pow", vec![Value::Int(3), Value::Int(4), Value::Int(5)]), "1");
        assert_eq!(call("pow", vec![Value::Int(3), Value::Int(-1), Value::Int(7)]), "5");
        assert_eq!(call("pow", vec![Value::Int(2), Value::Int(3), Value::Int(0)]),
                   "ValueError: pow() 3rd argument cannot be 0");
    }

    #[test]
    fn containers() {
        let xs = Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(call("sorted", vec![xs.clone()]), "[1, 2, 3]");
        assert_eq!(call("max", vec![xs.clone()]), "3");
        assert_eq!(call("min", vec![Value::Int(4), Value::Int(-1)]), "-1");
        assert_eq!(call("sum", vec![xs.clone()]), "6");
        assert_eq!(call("len", vec![xs.clone()]), "3");
        assert_eq!(call("tuple", vec![Value::from("ab")]), "('a', 'b')");
        assert_eq!(call("list", vec![call_value_iter(&xs)]), "[2, 1, 3]");
        assert_eq!(call("max", vec![Value::list(vec![])]), "ValueError: max() arg is an empty sequence");
        let mixed = Value::list(vec![Value::Int(1), Value::from("a")]);
        assert!(call("sorted", vec![mixed]).starts_with("TypeError: '<' not supported"));
    }

    fn call_value_iter(xs: &Value) -> Value {
        let mut items = xs.iterate().unwrap();
        items.reverse();
        Value::iter_over(items)
    }

    #[test]
    fn iterators_are_consumed() {
        let interp = Interpreter::new();
        let ctx = interp.context();
        let it = call_builtin(ctx, Builtin::Iter, vec![Value::from("ab")], Vec::new()).unwrap();
        let first = call_builtin(ctx, Builtin::Next, vec![it.clone()], Vec::new()).unwrap();
        assert_eq!(first.to_string(), "'a'");
        assert_eq!(call_builtin(ctx, Builtin::List, vec![it.clone()], Vec::new()).unwrap().to_string(), "['b']");
        let err = call_builtin(ctx, Builtin::Next, vec![it.clone()], Vec::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StopIteration);
        let fallback = call_builtin(ctx, Builtin::Next, vec![it, Value::Int(0)], Vec::new()).unwrap();
        assert_eq!(fallback.to_string(), "0");
    }

    #[test]
    fn keyword_arguments() {
        let interp = Interpreter::new();
        let xs = Value::list(vec![Value::Int(1), Value::Int(3), Value::Int(2)]);
        let sorted = call_builtin(
            interp.context(),
            Builtin::Sorted,
            vec![xs],
            vec![("reverse".to_string(), Value::Bool(true))],
        ).unwrap();
        assert_eq!(sorted.to_string(), "[3, 2, 1]");
        let err = call_builtin(
            interp.context(),
            Builtin::Abs,
            vec![Value::Int(1)],
            vec![("y".to_string(), Value::Int(2))],
        ).unwrap_err();
        assert_eq!(err.message, "abs() got an unexpected keyword argument 'y'");
    }

    #[test]
    fn number_attributes() {
        assert_eq!(method(Value::complex(5.0, 2.0), "real", vec![]), "5.0");
        assert_eq!(method(Value::complex(5.0, 2.0), "imag", vec![]), "2.0");
        assert_eq!(method(Value::Int(7), "imag", vec![]), "0");
        assert_eq!(method(Value::complex(1.0, 1.0), "conjugate", vec![]), "(1-1j)");
        assert_eq!(method(Value::Int(255), "bit_length", vec![]), "8");
        assert_eq!(method(Value::Float(2.0), "is_integer", vec![]), "True");
        assert_eq!(method(Value::Int(1), "upper", vec![]),
                   "AttributeError: 'int' object has no attribute 'upper'");
    }

    #[test]
    fn string_methods() {
        let s = Value::from("  Hello World  ");
        assert_eq!(method(s.clone(), "strip", vec![]), "'Hello World'");
        assert_eq!(method(s.clone(), "split", vec![]), "['Hello', 'World']");
        assert_eq!(method(Value::from("a,b,,c"), "split", vec![Value::from(",")]), "['a', 'b', '', 'c']");
        assert_eq!(method(Value::from("a b c"), "split", vec![Value::None, Value::Int(1)]), "['a', 'b c']");
        assert_eq!(method(Value::from("xxhixx"), "strip", vec![Value::from("x")]), "'hi'");
        assert_eq!(method(Value::from("abc"), "upper", vec![]), "'ABC'");
        assert_eq!(method(Value::from("abc"), "find", vec![Value::from("c")]), "2");
        assert_eq!(method(Value::from("abc"), "find", vec![Value::from("z")]), "-1");
        assert_eq!(method(Value::from("banana"), "count", vec![Value::from("an")]), "2");
        assert_eq!(method(Value::from("banana"), "replace", vec![Value::from("a"), Value::from("o"), Value::Int(2)]),
                   "'bonona'");
        assert_eq!(method(Value::from("-"), "join", vec![Value::from("abc")]), "'a-b-c'");
        assert_eq!(method(Value::from("-"), "join", vec![Value::list(vec![Value::Int(1)])]),
                   "TypeError: sequence item 0: expected str instance, int found");
        let prefixes = Value::tuple(vec![Value::from("x"), Value::from("fo")]);
        assert_eq!(method(Value::from("foo"), "startswith", vec![prefixes]), "True");
        assert_eq!(method(Value::from("foo"), "endswith", vec![Value::from("x")]), "False");
    }

    #[test]
    fn sequence_and_dict_methods() {
        let xs = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(1)]);
        assert_eq!(method(xs.clone(), "count", vec![Value::Int(1)]), "2");
        assert_eq!(method(xs.clone(), "index", vec![Value::Int(2)]), "1");
        assert_eq!(method(xs, "index", vec![Value::Int(9)]), "ValueError: 9 is not in list");
        let d = Value::dict(vec![(Value::from("a"), Value::Int(1))]);
        assert_eq!(method(d.clone(), "get", vec![Value::from("a")]), "1");
        assert_eq!(method(d.clone(), "get", vec![Value::from("b")]), "None");
        assert_eq!(method(d.clone(), "get", vec![Value::from("b"), Value::Int(0)]), "0");
        assert_eq!(method(d.clone(), "items", vec![]), "[('a', 1)]");
        assert_eq!(method(d, "keys", vec![]), "['a']");
    }
}
