//! Build expressions by combining placeholders with ordinary operators,
//! then compile the accumulated text into a function and call it.
//!
//! ```
//! use lambded::{LambdaVar, Value};
//!
//! let x = LambdaVar::new("x").unwrap();
//! let inc = &x + 1;
//! assert_eq!(inc.to_string(), "(x)+1");
//! assert_eq!(inc.call(vec![5]).unwrap(), Value::Int(6));
//! ```

pub mod ast;
pub mod backend;
pub mod builtins;
pub mod error;
pub mod interp;
pub mod lambda;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod session;
mod stack;
pub mod value;
pub mod var;

pub use backend::{Backend, Callable};
pub use error::{Error, Result};
pub use interp::{Interpreter, Limits};
pub use lambda::{LambdaExpr, Operand};
pub use session::Session;
pub use value::Value;
pub use var::LambdaVar;
