/// One line of terminal input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Message(String),
    Empty,
    Clear,
    Retry,
    /// `/quick` lists the suggestions, `/quick N` sends the Nth (1-based).
    Quick(Option<usize>),
    Crisis,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default().to_ascii_lowercase();
        match name.as_str() {
            "clear" | "new" => Self::Clear,
            "retry" => Self::Retry,
            "quick" => Self::Quick(
                parts
                    .next()
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| *n > 0),
            ),
            "crisis" => Self::Crisis,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

pub const HELP: &str = "\
Commands:
  /clear      start a new conversation
  /retry      send the last failed message again
  /quick [n]  list suggested prompts, or send suggestion n
  /crisis     show crisis resources
  /help       show this help
  /quit       leave";
