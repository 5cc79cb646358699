//! Line-oriented command console for the node binary.
//!
//! Reads commands from stdin (USB serial on the device) for poking at the
//! MQTT feed by hand.
//!
//! # Commands
//!
//! - `pub <text>` - Publish text to the configured feed
//! - `pubto <topic> <text>` - Publish text to any topic
//! - `sub <filter>` - Subscribe to a topic filter
//! - `unsub <filter>` - Drop a subscription
//! - `status` - Show connection state and counters
//! - `help` - Show available commands
//!
//! # Example Session
//!
//! ```text
//! > pub 21.5
//! Published to alice/feeds/temp
//!
//! > sub alice/feeds/#
//! Subscribed to alice/feeds/#
//!
//! [alice/feeds/temp] 21.5
//! ```

use crate::mqtt::IncomingMessage;

/// Parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Publish to the configured feed.
    Publish { text: String },
    /// Publish to an explicit topic.
    PublishTo { topic: String, text: String },
    /// Subscribe to a topic filter.
    Subscribe { filter: String },
    /// Drop a subscription.
    Unsubscribe { filter: String },
    /// Show node status.
    Status,
    /// Show help.
    Help,
    /// Blank input line.
    Empty,
    /// Unknown or malformed command, with a hint for the user.
    Unknown(String),
}

impl ConsoleCommand {
    /// Parse a command from an input line.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return ConsoleCommand::Empty;
        }

        let mut parts = input.splitn(2, char::is_whitespace);
        let cmd = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("").trim();

        match cmd.to_lowercase().as_str() {
            "pub" | "p" => {
                if args.is_empty() {
                    ConsoleCommand::Unknown("Usage: pub <text>".to_string())
                } else {
                    ConsoleCommand::Publish {
                        text: args.to_string(),
                    }
                }
            }
            "pubto" => {
                let mut pub_parts = args.splitn(2, char::is_whitespace);
                let topic = pub_parts.next().unwrap_or("").to_string();
                let text = pub_parts.next().unwrap_or("").trim().to_string();
                if topic.is_empty() || text.is_empty() {
                    ConsoleCommand::Unknown("Usage: pubto <topic> <text>".to_string())
                } else {
                    ConsoleCommand::PublishTo { topic, text }
                }
            }
            "sub" => single_arg(args, "Usage: sub <filter>", |filter| {
                ConsoleCommand::Subscribe { filter }
            }),
            "unsub" => single_arg(args, "Usage: unsub <filter>", |filter| {
                ConsoleCommand::Unsubscribe { filter }
            }),
            "status" | "stat" | "s" => ConsoleCommand::Status,
            "help" | "h" | "?" => ConsoleCommand::Help,
            _ => ConsoleCommand::Unknown(format!(
                "Unknown command: {}. Type 'help' for commands.",
                cmd
            )),
        }
    }
}

fn single_arg(
    args: &str,
    usage: &str,
    build: impl FnOnce(String) -> ConsoleCommand,
) -> ConsoleCommand {
    if args.is_empty() || args.contains(char::is_whitespace) {
        ConsoleCommand::Unknown(usage.to_string())
    } else {
        build(args.to_string())
    }
}

/// Help text for available commands.
pub const HELP_TEXT: &str = r#"
Available commands:
  pub <text>            Publish text to the configured feed
  pubto <topic> <text>  Publish text to any topic
  sub <filter>          Subscribe to a topic filter (+ and # allowed)
  unsub <filter>        Drop a subscription
  status                Show connection state and counters
  help                  Show this help

Shortcuts: p=pub, s=status, h=help
"#;

/// Format an incoming message for display.
pub fn format_incoming_message(message: &IncomingMessage) -> String {
    match message.payload_str() {
        Some(text) => format!("[{}] {}", message.topic, text),
        None => format!(
            "[{}] <binary {} bytes>",
            message.topic,
            message.payload.len()
        ),
    }
}
