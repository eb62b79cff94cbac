//! Terminal event rendering
//!
//! [`TerminalEvents`] prints session events to stdout in either plain
//! text or line-delimited JSON, chosen at startup.

use async_trait::async_trait;
use ellens_session::{
    ConnectionState, Message, PresenceSignal, Sender, SessionError, SessionEvents,
};

pub struct TerminalEvents {
    /// Whether to print in JSON format
    pub json_output: bool,
}

impl TerminalEvents {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    fn print_message(&self, message: &Message) {
        if self.json_output {
            println!(
                "{}",
                serde_json::to_string(message).unwrap_or_default()
            );
        } else {
            let who = match message.sender {
                Sender::User => "you",
                Sender::Agent => "ellens",
            };
            match message.intensity {
                Some(level) => println!("[{who}] ({level}% chaos) {}", message.text),
                None => println!("[{who}] {}", message.text),
            }
        }
    }
}

#[async_trait]
impl SessionEvents for TerminalEvents {
    async fn on_connection_state(&self, state: ConnectionState) {
        if self.json_output {
            println!(r#"{{"event":"connection_state","state":"{state}"}}"#);
        } else {
            println!("-- connection: {state}");
        }
    }

    async fn on_message(&self, message: &Message) {
        self.print_message(message);
    }

    async fn on_typing(&self, presence: &PresenceSignal) {
        if self.json_output {
            println!(
                r#"{{"event":"typing","isTyping":{},"mood":"{}"}}"#,
                presence.is_typing, presence.mood
            );
        } else if presence.is_typing {
            println!("-- ellens is typing... ({})", presence.mood);
        }
    }

    async fn on_interruption(&self, reason: &str, message: &Message) {
        if self.json_output {
            println!(
                r#"{{"event":"interruption","reason":"{reason}","text":{}}}"#,
                serde_json::to_string(&message.text).unwrap_or_default()
            );
        } else {
            println!("!! ellens interrupts ({reason}): {}", message.text);
        }
    }

    async fn on_conversation_ended(&self, reason: &str, message: &Message) {
        if self.json_output {
            println!(
                r#"{{"event":"conversation_ended","reason":"{reason}","text":{}}}"#,
                serde_json::to_string(&message.text).unwrap_or_default()
            );
        } else {
            println!("-- conversation ended ({reason}): {}", message.text);
        }
    }

    async fn on_error(&self, error: &SessionError) {
        let kind = if error.is_connection_error() {
            "connection"
        } else {
            "protocol"
        };
        if self.json_output {
            println!(
                r#"{{"event":"error","kind":"{kind}","message":{}}}"#,
                serde_json::to_string(&error.to_string()).unwrap_or_default()
            );
        } else {
            eprintln!("-- {kind} error: {error}");
        }
    }
}
