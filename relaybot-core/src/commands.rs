// ABOUTME: Command-line parsing for chat message bodies.
// ABOUTME: First whitespace token (lower-cased) selects the plugin, the rest are arguments.

/// A command parsed from a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Normalized (lower-cased) command name
    pub name: String,
    /// Positional arguments, each trimmed
    pub args: Vec<String>,
}

/// Normalize a plugin or command name for registry lookup
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Parse a message body into a command.
///
/// The body is split on runs of whitespace. Returns `None` for empty or
/// whitespace-only bodies.
pub fn parse_command(body: &str) -> Option<Command> {
    let mut tokens = body.split_whitespace();
    let name = normalize_name(tokens.next()?);
    let args = tokens.map(|t| t.trim().to_string()).collect();
    Some(Command { name, args })
}
