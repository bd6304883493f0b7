//! Line-by-line evaluation with global definitions, as used by the
//! interactive prompt and by loaded files.

use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::debug;

use crate::builtins::Builtin;
use crate::error::{Error, Result};
use crate::interp::{Interpreter, Limits};
use crate::lexer::strip_whitespace_and_line_cont;
use crate::parser::{parse_line, Line};
use crate::value::Value;

/// What evaluating one line produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `name = expr` bound a new global.
    Defined(String),
    Value(Value),
    /// A blank or comment-only line.
    Nothing,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: Error,
    },
}

pub struct Session {
    interp: Interpreter,
}

impl Default for Session {
    fn default() -> Session {
        Session::new(Limits::default(), None)
    }
}

impl Session {
    pub fn new(limits: Limits, interrupt: Option<Arc<AtomicBool>>) -> Session {
        Session {
            interp: Interpreter::with_limits(limits, interrupt),
        }
    }

    /// Evaluates a definition or an expression.
    ///
    /// ```
    /// # use lambded::session::{Outcome, Session};
    /// # use lambded::Value;
    /// let mut session = Session::default();
    /// assert_eq!(session.eval_line("sub := lambda a, b: a - b").unwrap(), Outcome::Defined("sub".to_string()));
    /// assert_eq!(session.eval_line("sub(30, 20)").unwrap(), Outcome::Value(Value::Int(10)));
    /// ```
    pub fn eval_line(&mut self, line: &str) -> Result<Outcome> {
        match parse_line(line)? {
            None => Ok(Outcome::Nothing),
            Some(Line::Definition(name, expr)) => {
                let value = self.interp.eval(&expr)?;
                debug!(name = name.as_str(), "defined global");
                self.interp.define(&name, value);
                Ok(Outcome::Defined(name))
            },
            Some(Line::Expr(expr)) => Ok(Outcome::Value(self.interp.eval(&expr)?)),
        }
    }

    /// Evaluates every line of a file, or of stdin when `filename` is
    /// `None`, printing the value of each expression. Stops at the first
    /// line that fails.
    pub fn load_file(&mut self, filename: Option<&str>) -> std::result::Result<(), LoadError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        match filename {
            Some(name) => self.load(BufReader::new(File::open(name)?), &mut out),
            None => {
                let stdin = io::stdin();
                let reader = stdin.lock();
                self.load(reader, &mut out)
            },
        }
    }

    /// Like `load_file`, reading from `reader` and printing to `out`.
    /// A line ending in `\` continues on the next one.
    pub fn load<R: BufRead, W: Write>(&mut self, reader: R, out: &mut W) -> std::result::Result<(), LoadError> {
        let mut pending = String::new();
        let mut first_line = 0;
        for (i, line) in reader.lines().enumerate() {
            let mut line = line?;
            if pending.is_empty() {
                first_line = i + 1;
            }
            let continues = strip_whitespace_and_line_cont(&mut line);
            pending.push_str(&line);
            if continues {
                continue;
            }
            self.load_line(&pending, first_line, out)?;
            pending.clear();
        }
        if !pending.is_empty() {
            self.load_line(&pending, first_line, out)?;
        }
        Ok(())
    }

    fn load_line<W: Write>(&mut self, line: &str, number: usize, out: &mut W) -> std::result::Result<(), LoadError> {
        match self.eval_line(line) {
            Ok(Outcome::Value(value)) => writeln!(out, "{}", value)?,
            Ok(_) => {},
            Err(source) => return Err(LoadError::Line { line: number, source }),
        }
        Ok(())
    }

    /// Defined names and builtins starting with `prefix`, for completion.
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self.interp.global_names()
            .into_iter()
            .chain(Builtin::names().map(String::from))
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Names of every global definition, sorted.
    pub fn defined_names(&self) -> Vec<String> {
        self.interp.global_names()
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.interp.global(name)
    }

    /// Drops every definition.
    pub fn reset(&mut self) {
        debug!(count = self.interp.global_names().len(), "dropping definitions");
        self.interp.clear_globals();
    }
}
