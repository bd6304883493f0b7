/// Commands understood at the prompt, written as `:name`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Load,
    Vars,
    Reset,
}

pub struct CommandClassifier<'a> {
    pub short_name: &'a str,
    pub long_name: &'a str,
    pub cmd: Command,
    pub arg_expected: bool,
    description: &'a str,
}

pub const COMMAND_CLASSIFIER : &[CommandClassifier] = &[
    CommandClassifier {
        short_name: "h",
        long_name: "help",
        cmd: Command::Help,
        arg_expected: false,
        description: "print this message.",
    },
    CommandClassifier {
        short_name: "l",
        long_name: "load",
        cmd: Command::Load,
        arg_expected: true,
        description: "evaluate all lines from a file.",
    },
    CommandClassifier {
        short_name: "v",
        long_name: "vars",
        cmd: Command::Vars,
        arg_expected: false,
        description: "list every definition and its value.",
    },
    CommandClassifier {
        short_name: "r",
        long_name: "reset",
        cmd: Command::Reset,
        arg_expected: false,
        description: "forget every definition.",
    },
];

/// The entry whose short or long name is `name`.
pub fn get_command(name: &str) -> Option<&'static CommandClassifier<'static>> {
    COMMAND_CLASSIFIER
        .iter()
        .find(|class| name == class.short_name || name == class.long_name)
}

/// The first entry whose long name starts with `prefix`.
pub fn get_command_starts_with(prefix: &str) -> Option<&'static CommandClassifier<'static>> {
    COMMAND_CLASSIFIER
        .iter()
        .find(|class| class.long_name.starts_with(prefix))
}

pub fn print_usage() {
    println!(
"An evaluator for lambda expressions.
Lines of the form `name = expr` or `name := expr` define a global;
any other line is evaluated and its value printed.
End a line with `\\` to continue it on the next one.

Usage: lambded [-d N] [FILE...]
       lambded -n [FILE]

Options:
-h, --help\t\tprint this message and exit.
-n, --no-interactive\tevaluate FILE, or stdin, and exit.
-d, --max-depth N\tnesting limit for function calls (default 1000).

Available commands:"
    );
    for command in COMMAND_CLASSIFIER {
        let arg = if command.arg_expected { " <file>" } else { "" };
        println!(":{}, :{}{}\t{}",
                 command.short_name,
                 command.long_name,
                 arg,
                 command.description);
    }
}
