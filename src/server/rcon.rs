//! Remote console command parsing.

use crate::util::Pid;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RconError {
    #[error("Unknown command '{0}', try 'help'")]
    UnknownCommand(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
    #[error("Permission denied, authenticate with 'password'")]
    NotAdmin,
    #[error("Wrong password")]
    WrongPassword,
    #[error("No game is running")]
    NoGame,
    #[error("No player with pid {0}")]
    UnknownPlayer(Pid),
    #[error("Unknown tuning parameter '{0}'")]
    UnknownParam(String),
}

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum RconCommand {
    Password(String),
    Start,
    Stop,
    Score,
    Motd(String),
    Env(String),
    Kick(Pid),
    Entity { x: f32, y: f32 },
    Tune { param: String, value: f32 },
    Tuning,
    Help,
}

pub const HELP: &str = "commands: password <pw>, start, stop, score, motd <text>, env <url>, \
kick <pid>, entity <x> <y>, tune <param> <value>, tuning, help";

fn number<T: std::str::FromStr>(raw: &str) -> Result<T, RconError> {
    raw.parse().map_err(|_| RconError::InvalidNumber(raw.to_string()))
}

impl RconCommand {
    pub fn parse(line: &str) -> Result<Self, RconError> {
        let line = line.trim();
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let args: Vec<&str> = rest.split_whitespace().collect();

        match name {
            "password" if !rest.is_empty() => Ok(RconCommand::Password(rest.to_string())),
            "password" => Err(RconError::Usage("password <pw>")),
            "start" => Ok(RconCommand::Start),
            "stop" => Ok(RconCommand::Stop),
            "score" => Ok(RconCommand::Score),
            "motd" => Ok(RconCommand::Motd(rest.to_string())),
            "env" if !rest.is_empty() => Ok(RconCommand::Env(rest.to_string())),
            "env" => Err(RconError::Usage("env <url>")),
            "kick" => match args.as_slice() {
                [pid] => Ok(RconCommand::Kick(number(pid)?)),
                _ => Err(RconError::Usage("kick <pid>")),
            },
            "entity" => match args.as_slice() {
                [x, y] => Ok(RconCommand::Entity {
                    x: number(x)?,
                    y: number(y)?,
                }),
                _ => Err(RconError::Usage("entity <x> <y>")),
            },
            "tune" => match args.as_slice() {
                [param, value] => Ok(RconCommand::Tune {
                    param: param.to_string(),
                    value: number(value)?,
                }),
                _ => Err(RconError::Usage("tune <param> <value>")),
            },
            "tuning" => Ok(RconCommand::Tuning),
            "help" => Ok(RconCommand::Help),
            _ => Err(RconError::UnknownCommand(name.to_string())),
        }
    }

    /// Commands anyone may run
    pub fn is_public(&self) -> bool {
        matches!(self, RconCommand::Password(_) | RconCommand::Help)
    }
}
