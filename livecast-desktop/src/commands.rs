//! Interactive commands read from stdin.

use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Restart,
    Refresh,
    Open(PathBuf),
    Close,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),

    #[error("`open` needs a file path")]
    MissingPath,
}

pub const HELP: &str = "\
commands:
  start         connect and start broadcasting
  stop          stop broadcasting
  restart       stop, reload settings, start again
  refresh       resend the whole document
  open <path>   broadcast another file
  close         stop sharing the current file
  status        show the connection state
  quit          stop and exit";

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match word.to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "refresh" => Ok(Self::Refresh),
            "open" if rest.is_empty() => Err(CommandError::MissingPath),
            "open" => Ok(Self::Open(PathBuf::from(rest))),
            "close" => Ok(Self::Close),
            "status" => Ok(Self::Status),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            _ => Err(CommandError::Unknown(word.to_string())),
        }
    }
}
