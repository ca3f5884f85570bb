//! Command parsing for the interactive prompt.

/// A line typed at the `mates>` prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(Option<String>),
    Register(Option<String>),
    Logout,
    Status,
    Rename(String),
    Reset(Option<String>),
    Forget,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    Unknown(String),
    MissingArgument(&'static str),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        match word.to_lowercase().as_str() {
            "" => Err(ParseError::Empty),
            "login" | "signin" => Ok(Command::Login(arg)),
            "register" | "signup" => Ok(Command::Register(arg)),
            "logout" | "signout" => Ok(Command::Logout),
            "status" | "whoami" => Ok(Command::Status),
            "rename" => arg.map(Command::Rename).ok_or(ParseError::MissingArgument("name")),
            "reset" => Ok(Command::Reset(arg)),
            "forget" => Ok(Command::Forget),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

pub const HELP: &str = "\
Commands:
  login [email]      Sign in
  register [email]   Create an account and sign in
  logout             Sign out
  status             Show who is signed in
  rename <name>      Change your display name
  reset [email]      Send a password reset link
  forget             Remove the remembered password
  help               Show this help
  quit               Exit";
