//! UI capability (§6): a sink the driver writes to. Any implementation that
//! honors the operations below is acceptable — the console implementation
//! here is one of them, used by the interactive binary. Headless subagent
//! runs construct a driver without a UI and skip all of this.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;

pub trait UI: Send + Sync {
    fn print_info(&self, text: &str);
    fn print_success(&self, text: &str);
    fn print_warning(&self, text: &str);
    fn print_error(&self, text: &str);
    /// `is_reasoning` marks interim reasoning text (see [`is_reasoning_text`])
    /// so implementations can dim or otherwise distinguish it from a final answer.
    fn print_agent_message(&self, text: &str, agent_name: &str, is_reasoning: bool);
    fn print_thinking(&self, text: &str);
    fn print_code(&self, text: &str, filename: Option<&str>);
    fn print_subagent_spawned(&self, label: &str);
    fn print_subagent_completed(&self, label: &str);
    fn print_subagent_failed(&self, label: &str, error: &str);
    fn start_thinking(&self, label: &str);
    fn stop_thinking(&self);
    fn get_user_input(&self, prompt: &str) -> String;
}

/// Terminal UI backed by `colored` for styling and `indicatif` for the
/// "thinking" spinner. `print_code` and other potentially slow rendering
/// calls are expected to be invoked from the driver's worker pool, not the
/// event-streaming task itself.
pub struct ConsoleUI {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleUI {
    pub fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
        }
    }
}

impl Default for ConsoleUI {
    fn default() -> Self {
        Self::new()
    }
}

impl UI for ConsoleUI {
    fn print_info(&self, text: &str) {
        println!("{} {}", "i".blue(), text);
    }

    fn print_success(&self, text: &str) {
        println!("{} {}", "✓".green(), text);
    }

    fn print_warning(&self, text: &str) {
        println!("{} {}", "!".yellow(), text.yellow());
    }

    fn print_error(&self, text: &str) {
        eprintln!("{} {}", "✗".red(), text.red());
    }

    fn print_agent_message(&self, text: &str, agent_name: &str, is_reasoning: bool) {
        if is_reasoning {
            println!("{}: {}", agent_name.bold().cyan(), text.dimmed());
        } else {
            println!("{}: {}", agent_name.bold().cyan(), text);
        }
    }

    fn print_thinking(&self, text: &str) {
        println!("{}", text.dimmed());
    }

    fn print_code(&self, text: &str, filename: Option<&str>) {
        if let Some(name) = filename {
            println!("{}", format!("--- {name} ---").dimmed());
        }
        println!("{text}");
    }

    fn print_subagent_spawned(&self, label: &str) {
        println!("{} {}", "→".blue(), format!("subagent spawned: {label}").dimmed());
    }

    fn print_subagent_completed(&self, label: &str) {
        println!("{} {}", "✓".green(), format!("subagent completed: {label}").dimmed());
    }

    fn print_subagent_failed(&self, label: &str, error: &str) {
        println!("{} {}", "✗".red(), format!("subagent failed: {label} ({error})").dimmed());
    }

    fn start_thinking(&self, label: &str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        *self.spinner.lock().unwrap() = Some(pb);
    }

    fn stop_thinking(&self) {
        if let Some(pb) = self.spinner.lock().unwrap().take() {
            pb.finish_and_clear();
        }
    }

    fn get_user_input(&self, prompt: &str) -> String {
        print!("{} ", prompt.bold());
        std::io::stdout().flush().ok();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok();
        line.trim_end().to_string()
    }
}

/// No-op UI used by headless subagent drivers and in tests.
pub struct NullUI;

impl UI for NullUI {
    fn print_info(&self, _text: &str) {}
    fn print_success(&self, _text: &str) {}
    fn print_warning(&self, _text: &str) {}
    fn print_error(&self, _text: &str) {}
    fn print_agent_message(&self, _text: &str, _agent_name: &str, _is_reasoning: bool) {}
    fn print_thinking(&self, _text: &str) {}
    fn print_code(&self, _text: &str, _filename: Option<&str>) {}
    fn print_subagent_spawned(&self, _label: &str) {}
    fn print_subagent_completed(&self, _label: &str) {}
    fn print_subagent_failed(&self, _label: &str, _error: &str) {}
    fn start_thinking(&self, _label: &str) {}
    fn stop_thinking(&self) {}
    fn get_user_input(&self, _prompt: &str) -> String {
        String::new()
    }
}

/// Classify a Coder `TextMessage` as reasoning (short, "I'll / Let me / Next
/// ..." style prefixes) versus a final answer. UX polish, not protocol.
pub fn is_reasoning_text(text: &str) -> bool {
    const PREFIXES: &[&str] = &["I'll", "I will", "Let me", "Next,", "Next I", "First,", "Now I"];
    let trimmed = text.trim_start();
    text.len() < 160 && PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_lead_in_is_reasoning() {
        assert!(is_reasoning_text("Let me check the file first."));
    }

    #[test]
    fn long_final_answer_is_not_reasoning() {
        let text = "Here's a detailed explanation of what happened: ".to_string() + &"x".repeat(200);
        assert!(!is_reasoning_text(&text));
    }

    #[test]
    fn null_ui_user_input_is_empty() {
        assert_eq!(NullUI.get_user_input("?"), "");
    }
}
