//! Line-oriented control channel on stdin, for a UI process or a terminal.

use std::fmt;
use std::io::BufRead;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the available MIDI input ports.
    List,
    /// Connect, optionally to a specific port (index or name fragment).
    Connect(Option<String>),
    Disconnect,
    Status,
    /// Re-read the configuration file.
    Reload,
    /// Write the current configuration back to its file.
    Save,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

/// Parse one command line. Blank lines and `#` comments yield `Ok(None)`.
///
/// # Errors
/// Returns `ParseError` for unknown commands or stray arguments.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "list" | "ls" => Command::List,
        "connect" => Command::Connect((!rest.is_empty()).then(|| rest.to_string())),
        "disconnect" => Command::Disconnect,
        "status" => Command::Status,
        "reload" => Command::Reload,
        "save" => Command::Save,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError(format!("unknown command '{other}'"))),
    };
    if !rest.is_empty() && !matches!(command, Command::Connect(_)) {
        return Err(ParseError(format!("'{verb}' takes no arguments")));
    }
    Ok(Some(command))
}

/// Read commands from stdin on a dedicated thread. A blocking stdin read
/// cannot be cancelled, so it stays off the runtime; the thread ends at EOF
/// or once the receiver is gone.
pub fn spawn_stdin_reader(tx: mpsc::Sender<Command>) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("easypad-control".to_string())
        .spawn(move || read_commands(std::io::stdin().lock(), &tx))
}

/// Read commands from `reader`, one per line. EOF is not a quit request.
pub fn read_commands(reader: impl BufRead, tx: &mpsc::Sender<Command>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("control input error: {e}");
                return;
            }
        };
        match parse(&line) {
            Ok(Some(command)) => {
                if tx.blocking_send(command).is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("{e}"),
        }
    }
    debug!("control input closed");
}
