use std::{
    env,
    borrow::Cow,
    cell::RefCell,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use rustyline::{
    At,
    Cmd,
    Context,
    Editor,
    KeyPress,
    Movement,
    Word,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::{Highlighter, MatchingBracketHighlighter},
    hint::Hinter,
    line_buffer::LineBuffer,
};
use rustyline_derive::Helper;
use tracing::{debug, warn};

use lambded::{
    lexer,
    session::{Outcome, Session},
};
use crate::{
    cmd::{self, Command, get_command, get_command_starts_with},
    opt,
};

#[derive(Helper)]
struct RustylineHelper {
    filename_completer: FilenameCompleter, // for :load
    highlighter: MatchingBracketHighlighter,
    session: Rc<RefCell<Session>>,
}

impl Hinter for RustylineHelper {
    fn hint(&self, _line: &str, _pos:usize, _context: &Context) -> Option<String> {
        None
    }
}

impl Completer for RustylineHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, cursor_pos: usize, context: &Context)
        -> Result<(usize, Vec<Self::Candidate>), ReadlineError>
    {
        let null_completion = (0, Vec::with_capacity(0));
        if cursor_pos == 0 {
            return Ok(null_completion);
        }
        match line.chars().next() {
            None => Ok(null_completion),
            Some(':') => {
                let compl_str = &line[1..cursor_pos];
                match compl_str.find(' ') {
                    // no space: complete the command's name.
                    None => match get_command_starts_with(compl_str) {
                        None => Ok(null_completion),
                        Some(class) => {
                            let compl_pair = Pair {
                                display: class.long_name.to_string(),
                                replacement: class.long_name.to_string(),
                            };
                            Ok((1, vec![compl_pair]))
                        },
                    },
                    // with space: only :load takes an argument, a file name.
                    Some(pos) => match get_command(&compl_str[..pos]) {
                        Some(class) if class.cmd == Command::Load => {
                            self.filename_completer.complete(line, cursor_pos, context)
                        },
                        _ => Ok(null_completion),
                    },
                }
            },
            Some(_) => {
                let word_begin = get_start_word_under_cursor(line, cursor_pos);
                let completion: Vec<Pair> = self.session
                    .borrow()
                    .names_with_prefix(&line[word_begin..cursor_pos])
                    .into_iter()
                    .map(|s| Pair { display: s.clone(), replacement: s })
                    .collect();
                Ok((word_begin, completion))
            },
        }
    }

    fn update(&self, line: &mut LineBuffer, start: usize, elected: &str) {
        self.filename_completer.update(line, start, elected)
    }
}

// bracket matching only.
impl Highlighter for RustylineHelper {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        self.highlighter.highlight(line, pos)
    }

    fn highlight_char(&self, line: &str, pos: usize) -> bool {
        self.highlighter.highlight_char(line, pos)
    }
}

fn make_rustyline_editor(histfile: &str, session: Rc<RefCell<Session>>) -> Editor<RustylineHelper> {
    let mut rl = Editor::<RustylineHelper>::new();

    let rustyline_helper = RustylineHelper {
        filename_completer: FilenameCompleter::new(),
        highlighter: MatchingBracketHighlighter::new(),
        session,
    };
    rl.set_helper(Some(rustyline_helper));

    // a missing history file is normal on the first run.
    if let Err(e) = rl.load_history(histfile) {
        debug!(histfile, error = %e, "no history loaded");
    }

    rl.bind_sequence(KeyPress::ControlRight,
                     Cmd::Move(Movement::ForwardWord(1, At::Start, Word::Vi)));
    rl.bind_sequence(KeyPress::ControlLeft,
                     Cmd::Move(Movement::BackwardWord(1, Word::Vi)));
    rl
}

fn get_histfile_path() -> String {
    let home_key = "HOME";
    let fallback = "/tmp";
    let filename = "lambded_hist";
    match env::var(home_key) {
        Ok(home) => format!("{}/.cache/{}", home, filename),
        Err(e) => {
            warn!("failed to read env variable {} ({}), using fallback {}", home_key, e, fallback);
            format!("{}/{}", fallback, filename)
        },
    }
}

/// Runs the prompt until EOF. `interrupt` is the flag SIGINT sets; it is
/// cleared before every evaluation.
pub fn read_eval_print_loop(session: Session, interrupt: Arc<AtomicBool>) {
    let session = Rc::new(RefCell::new(session));

    let histfile = get_histfile_path();
    let mut rl = make_rustyline_editor(&histfile, Rc::clone(&session));

    loop {
        match rl.readline("> ") {
            Ok(mut line) => {
                while lexer::strip_whitespace_and_line_cont(&mut line) {
                    match rl.readline("& ") {
                        Ok(new_line) => line.push_str(&new_line),
                        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                        Err(err) => {
                            eprintln!("error: {:?}", err);
                            break;
                        },
                    };
                }
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line.as_str());
                interrupt.store(false, Ordering::SeqCst);
                let mut session = session.borrow_mut();
                if line.starts_with(':') {
                    run_command(&line[1..], &mut session);
                } else {
                    eval_print(&line, &mut session);
                }
            },
            // ^C drops the line being edited, ^D quits.
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("error: {:?}", err);
                break;
            },
        };
    }
    if let Err(e) = rl.save_history(&histfile) {
        eprintln!("failed to save history file: {}", e);
    };
}

fn eval_print(line: &str, session: &mut Session) {
    match session.eval_line(line) {
        Ok(Outcome::Value(value)) => println!("{}", value),
        Ok(_) => {},
        Err(e) => eprintln!("{}", e),
    }
}

fn run_command(line: &str, session: &mut Session) {
    let (name, arg) = match line.find(' ') {
        None => (line, ""),
        Some(pos) => (&line[..pos], line[pos..].trim()),
    };
    let class = match get_command(name) {
        None => {
            eprintln!("unknown command ':{}', try ':help'", name);
            return;
        },
        Some(class) => class,
    };
    if class.arg_expected && arg.is_empty() {
        eprintln!("command ':{}' expects an argument", class.long_name);
        return;
    }
    if !class.arg_expected && !arg.is_empty() {
        eprintln!("command ':{}' takes no argument", class.long_name);
        return;
    }
    match class.cmd {
        Command::Help => cmd::print_usage(),
        Command::Load => {
            opt::load_file(Some(arg), session);
        },
        Command::Vars => {
            for name in session.defined_names() {
                if let Some(value) = session.lookup(&name) {
                    println!("{} = {}", name, value);
                }
            }
        },
        Command::Reset => session.reset(),
    }
}

// find the beginning of the word in line which is currently under the cursor,
// whose position is cursor_pos.
//
fn get_start_word_under_cursor(line: &str, cursor_pos: usize) -> usize {
    let mut chars = line[..cursor_pos].chars();
    let mut res = cursor_pos;
    while let Some(c) = chars.next_back() {
        if !(c.is_alphanumeric() || c == '_') {
            break
        }
        res -= c.len_utf8();
    };
    // if iter == None, res == 0.
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_under_cursor() {
        assert_eq!(get_start_word_under_cursor("f(abc", 5), 2);
        assert_eq!(get_start_word_under_cursor("x+rou", 5), 2);
        assert_eq!(get_start_word_under_cursor("lambda", 6), 0);
        assert_eq!(get_start_word_under_cursor("a, ", 3), 3);
    }

    #[test]
    fn commands_change_the_session() {
        let mut session = Session::default();
        session.eval_line("k = 1").unwrap();
        run_command("vars extra", &mut session);
        assert_eq!(session.defined_names(), vec!["k"]);
        run_command("r", &mut session);
        assert!(session.defined_names().is_empty());
    }
}
