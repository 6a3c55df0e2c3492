//! Slash command parsing for the chat application.
//!
//! Input that starts with `/` controls the store instead of being sent to the
//! chatbot.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Load a chatbot by id, optionally with a display name.
    Bot {
        /// Chatbot id.
        id: String,
        /// Display name; defaults to the id.
        name: Option<String>,
    },

    /// Open an existing conversation.
    Open(String),

    /// Start a new conversation.
    New,

    /// List the loaded chatbot's conversations.
    List,

    /// Print the resident transcript.
    Show,

    /// Close the live connection, keeping the transcript.
    Disconnect,

    /// Clear everything, including the loaded chatbot.
    Reset,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be
/// sent as a message.
///
/// # Examples
///
/// ```
/// # use parley::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/open c1").is_some());
/// assert!(parse_command("Hello there").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "bot" | "chatbot" => match argument {
            Some(arg) => {
                let mut words = arg.splitn(2, ' ');
                let id = words.next().unwrap_or_default().to_string();
                let name = words
                    .next()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                ChatCommand::Bot { id, name }
            }
            None => ChatCommand::Invalid("/bot requires a chatbot id".to_string()),
        },
        "open" => match argument {
            Some(id) if !id.contains(char::is_whitespace) => ChatCommand::Open(id.to_string()),
            Some(_) => ChatCommand::Invalid("/open takes a single conversation id".to_string()),
            None => ChatCommand::Invalid("/open requires a conversation id".to_string()),
        },
        "new" => ChatCommand::New,
        "list" | "history" => ChatCommand::List,
        "show" => ChatCommand::Show,
        "disconnect" => ChatCommand::Disconnect,
        "reset" => ChatCommand::Reset,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text for all available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /bot <id> [name]       Load a chatbot (closes the current conversation)
  /open <conversation>   Open an existing conversation
  /new                   Start a new conversation
  /list                  List the chatbot's conversations
  /show                  Print the current transcript
  /disconnect            Close the connection, keep the transcript
  /reset                 Forget the chatbot and conversation
  /help                  Show this help message
  /quit                  Exit the chat"#
}
