//! The compile stage: turning function source text into something callable.
//!
//! `LambdaExpr` renders its tokens into `lambda <args>:<body>` and hands the
//! text to a `Backend`. The default backend is the tree-walking
//! `Interpreter`; anything else that understands the same source can be
//! plugged in through `LambdaExpr::compile_with`.

use std::rc::Rc;

use tracing::debug;

use crate::ast::Expr;
use crate::error::{Error, Result, RuntimeError, SyntaxError};
use crate::interp::{Closure, Interpreter};
use crate::parser::parse;
use crate::value::Value;

/// A compiled function.
pub trait Callable {
    fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> std::result::Result<Value, RuntimeError>;

    /// Formal parameter names, in declaration order. Variadic parameters
    /// keep their `*`/`**` prefix.
    fn params(&self) -> Vec<String>;
}

pub trait Backend {
    /// Compiles `source`, which must be a single `lambda` expression.
    fn compile(&self, source: &str) -> Result<Rc<dyn Callable>>;
}

impl Callable for Closure {
    fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> std::result::Result<Value, RuntimeError> {
        self.invoke(args, kwargs)
    }

    fn params(&self) -> Vec<String> {
        self.param_names()
    }
}

impl Backend for Interpreter {
    fn compile(&self, source: &str) -> Result<Rc<dyn Callable>> {
        let expr = parse(source)?;
        if !matches!(expr, Expr::Lambda(..)) {
            return Err(SyntaxError::new(0, "expected a lambda expression").into());
        }
        match self.eval(&expr).map_err(Error::Runtime)? {
            Value::Function(closure) => {
                debug!(source, params = ?closure.param_names(), "compiled lambda");
                let callable: Rc<dyn Callable> = closure;
                Ok(callable)
            },
            other => Err(SyntaxError::new(0, format!("expected a function, got {}", other.type_name())).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_lambda() {
        let f = Interpreter::new().compile("lambda a,b:(a)-b").unwrap();
        assert_eq!(f.params(), vec!["a", "b"]);
        let result = f.call(vec![Value::Int(30), Value::Int(20)], Vec::new()).unwrap();
        assert_eq!(result.to_string(), "10");
    }

    #[test]
    fn keyword_arguments_are_forwarded() {
        let f = Interpreter::new().compile("lambda x,**kwargs:(x)+kwargs['y']").unwrap();
        let result = f.call(vec![Value::Int(1)], vec![("y".to_string(), Value::Int(2))]).unwrap();
        assert_eq!(result.to_string(), "3");
    }

    #[test]
    fn outlives_the_interpreter() {
        let f = {
            let interp = Interpreter::new();
            interp.compile("lambda x:(x)*2").unwrap()
        };
        assert_eq!(f.call(vec![Value::Int(21)], Vec::new()).unwrap().to_string(), "42");
    }

    #[test]
    fn rejects_what_is_not_a_lambda() {
        let err = Interpreter::new().compile("1 + 2").err().unwrap();
        assert_eq!(err, Error::Compile(SyntaxError::new(0, "expected a lambda expression")));
        let err = Interpreter::new().compile("lambda x:(x)+").err().unwrap();
        assert!(matches!(err, Error::Compile(_)));
    }
}
