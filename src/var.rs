use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::Deref;

use crate::error::{Error, Result};
use crate::lambda::LambdaExpr;
use crate::lexer::{is_identifier, is_reserved_word};
use crate::registry;

/// A named placeholder: the expression made of just its name.
///
/// Every operator and combinator of `LambdaExpr` is available through
/// `Deref`.
///
/// ```
/// # use lambded::{Error, LambdaVar};
/// let x = LambdaVar::new("x").unwrap();
/// assert_eq!(x.to_string(), "x");
/// assert_eq!(LambdaVar::new("x").unwrap_err(), Error::NamingConflict("x".to_string()));
/// assert_eq!(LambdaVar::new("lambda").unwrap_err(), Error::InvalidIdentifier("lambda".to_string()));
/// ```
#[derive(Debug, Clone)]
pub struct LambdaVar {
    expr: LambdaExpr,
}

impl LambdaVar {
    /// Registers `name` and returns its placeholder.
    pub fn new(name: &str) -> Result<LambdaVar> {
        if registry::is_registered(name) {
            return Err(Error::NamingConflict(name.to_string()));
        }
        if !is_identifier(name) || is_reserved_word(name) {
            return Err(Error::InvalidIdentifier(name.to_string()));
        }
        registry::register(name)?;
        Ok(LambdaVar {
            expr: LambdaExpr::new(vec![name]),
        })
    }

    /// The marker standing for all remaining positional arguments. Every
    /// call returns the same expression.
    pub fn args() -> LambdaVar {
        registry::variadic(registry::ARGS)
    }

    /// The marker standing for all remaining keyword arguments.
    pub fn kwargs() -> LambdaVar {
        registry::variadic(registry::KWARGS)
    }

    // bypasses validation; the registry calls this for the markers.
    pub(crate) fn marker(name: &str) -> LambdaVar {
        LambdaVar {
            expr: LambdaExpr::new(vec![name]),
        }
    }

    pub fn name(&self) -> &str {
        &self.expr.tokens()[0]
    }
}

impl Deref for LambdaVar {
    type Target = LambdaExpr;

    fn deref(&self) -> &LambdaExpr {
        &self.expr
    }
}

impl From<LambdaVar> for LambdaExpr {
    fn from(var: LambdaVar) -> LambdaExpr {
        var.expr
    }
}

impl Display for LambdaVar {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn duplicate_name_keeps_the_first() {
        let x = LambdaVar::new("x").unwrap();
        assert_eq!(LambdaVar::new("x").unwrap_err(), Error::NamingConflict("x".to_string()));
        assert_eq!((&x + 1).call(vec![5]).unwrap(), Value::Int(6));
    }

    #[test]
    fn invalid_identifiers() {
        for name in &["", "1x", "a-b", "with space", "None", "def", "*args"] {
            assert_eq!(LambdaVar::new(name).unwrap_err(), Error::InvalidIdentifier(name.to_string()));
        }
        assert!(!registry::is_registered("def"));
    }

    #[test]
    fn conflict_is_checked_before_validity() {
        let _ = LambdaVar::args();
        assert_eq!(LambdaVar::new("*args").unwrap_err(), Error::NamingConflict("*args".to_string()));
    }

    #[test]
    fn markers_are_singletons() {
        let a = LambdaVar::args();
        let b = LambdaVar::args();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.to_string(), "*args");
        assert_eq!(LambdaVar::kwargs().to_string(), "**kwargs");
        assert!(!a.ptr_eq(&LambdaVar::kwargs()));
    }

    #[test]
    fn each_name_registers_once() {
        for name in &["p", "q", "_r", "λ"] {
            assert!(LambdaVar::new(name).is_ok());
            assert!(LambdaVar::new(name).is_err());
        }
        assert_eq!(registry::registered_names(), vec!["_r", "p", "q", "λ"]);
    }

    #[test]
    fn names_are_free_again_after_clear() {
        LambdaVar::new("z").unwrap();
        registry::clear();
        assert!(LambdaVar::new("z").is_ok());
    }
}
