use std::env;

use crate::cmd;

use lambded::interp::Limits;
use lambded::session::Session;

/// What the command line asked for.
#[derive(Debug, PartialEq)]
pub enum Action {
    Usage,
    Run(Options),
}

#[derive(Debug, PartialEq)]
pub struct Options {
    pub limits: Limits,
    /// Files to evaluate before the prompt starts, in order.
    pub files: Vec<String>,
    /// False with `-n`: evaluate the files (or stdin when there are none)
    /// and exit.
    pub interactive: bool,
}

// returns None if the program should exit right away.
pub fn parse_cmdline_options() -> Option<Options> {
    // skip program name
    match parse_args(env::args().skip(1)) {
        Ok(Action::Usage) => {
            cmd::print_usage();
            None
        },
        Ok(Action::Run(options)) => Some(options),
        Err(e) => {
            eprintln!("{}\ntry 'lambded --help'.", e);
            None
        },
    }
}

pub fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Action, String> {
    let mut options = Options {
        limits: Limits::default(),
        files: Vec::new(),
        interactive: true,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Action::Usage),
            "-n" | "--no-interactive" => options.interactive = false,
            "-d" | "--max-depth" => {
                let value = args.next().ok_or_else(|| format!("option '{}' needs a value", arg))?;
                options.limits.max_depth = value
                    .parse()
                    .map_err(|e| format!("invalid value '{}' for '{}': {}", value, arg, e))?;
            },
            // everything else is a file to be loaded.
            _ => options.files.push(arg),
        }
    }
    Ok(Action::Run(options))
}

/// Loads one file into `session`, or stdin for `None`. Returns false and
/// reports the failure if any line fails.
pub fn load_file(filename: Option<&str>, session: &mut Session) -> bool {
    let name = filename.unwrap_or("stdin");
    if let Err(e) = session.load_file(filename) {
        eprintln!("failed to load file '{}': {}", name, e);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Action, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults() {
        let expected = Options {
            limits: Limits::default(),
            files: Vec::new(),
            interactive: true,
        };
        assert_eq!(args(&[]), Ok(Action::Run(expected)));
    }

    #[test]
    fn help_wins() {
        assert_eq!(args(&["a.txt", "--help", "-d"]), Ok(Action::Usage));
    }

    #[test]
    fn files_depth_and_mode() {
        match args(&["-n", "a.txt", "--max-depth", "20", "b.txt"]) {
            Ok(Action::Run(options)) => {
                assert!(!options.interactive);
                assert_eq!(options.limits.max_depth, 20);
                assert_eq!(options.files, vec!["a.txt", "b.txt"]);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bad_depth() {
        assert_eq!(args(&["-d"]), Err("option '-d' needs a value".to_string()));
        assert!(args(&["-d", "deep"]).unwrap_err().starts_with("invalid value 'deep' for '-d'"));
    }
}
