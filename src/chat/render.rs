//! Terminal output for the chat application.
//!
//! Agent text streams in as chunks; everything else (notices, warnings, errors, the
//! conversation list) is printed whole.

use std::io::{self, Stdout, Write};

use crate::{ConversationSummary, Message, MessageRole, Severity};

/// ANSI escape code for dim text (used for timestamps and ids).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the agent label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print a chunk of agent text as it arrives.
    fn print_chunk(&mut self, text: &str);

    /// Called once the agent's response is complete.
    fn finish_response(&mut self);

    /// Print one transcript message in full.
    fn print_message(&mut self, message: &Message);

    /// Print the conversation index.
    fn print_history(&mut self, history: &[ConversationSummary]);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print something reported through the error sink.
    fn print_report(&mut self, severity: Severity, message: &str);

    /// Print an error returned by an operation.
    fn print_error(&mut self, error: &str) {
        self.print_report(Severity::Error, error);
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    in_response: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            in_response: false,
        }
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn agent_label(&self) -> String {
        self.styled(ANSI_CYAN, "Agent:")
    }

    fn end_response_line(&mut self) {
        if self.in_response {
            println!();
            self.in_response = false;
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_chunk(&mut self, text: &str) {
        if !self.in_response {
            print!("{} ", self.agent_label());
            self.in_response = true;
        }
        print!("{text}");
        self.flush();
    }

    fn finish_response(&mut self) {
        self.end_response_line();
        println!();
        self.flush();
    }

    fn print_message(&mut self, message: &Message) {
        self.end_response_line();
        let label = match message.role {
            MessageRole::User => "You:".to_string(),
            MessageRole::Agent => self.agent_label(),
        };
        let when = crate::utils::time::format(&message.timestamp).unwrap_or_default();
        println!("{} {} {}", self.styled(ANSI_DIM, &when), label, message.content);
    }

    fn print_history(&mut self, history: &[ConversationSummary]) {
        self.end_response_line();
        if history.is_empty() {
            println!("No conversations.");
            return;
        }
        for summary in history {
            let when = crate::utils::time::format(&summary.created_at).unwrap_or_default();
            println!(
                "  {}  {}  {}",
                summary.id,
                summary.title,
                self.styled(ANSI_DIM, &when)
            );
        }
        self.flush();
    }

    fn print_info(&mut self, info: &str) {
        self.end_response_line();
        println!("{info}");
        self.flush();
    }

    fn print_report(&mut self, severity: Severity, message: &str) {
        self.end_response_line();
        match severity {
            Severity::Info => println!("{message}"),
            Severity::Warning => {
                eprintln!("{}", self.styled(ANSI_YELLOW, &format!("Warning: {message}")))
            }
            Severity::Error => {
                eprintln!("{}", self.styled(ANSI_RED, &format!("Error: {message}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styling_respects_color_setting() {
        let plain = PlainTextRenderer::with_color(false);
        assert_eq!(plain.styled(ANSI_RED, "x"), "x");
        let colored = PlainTextRenderer::with_color(true);
        assert_eq!(colored.styled(ANSI_RED, "x"), "\x1b[31mx\x1b[0m");
    }

    #[test]
    fn chunks_open_and_close_a_response() {
        let mut renderer = PlainTextRenderer::with_color(false);
        renderer.print_chunk("Hel");
        assert!(renderer.in_response);
        renderer.print_chunk("lo");
        renderer.finish_response();
        assert!(!renderer.in_response);
    }
}
