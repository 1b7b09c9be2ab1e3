//! Per-subagent activity log written to `~/.agentcore/logs/`.
//!
//! Captures a plaintext execution trace: task, registered/blocked tools,
//! each tool call with arguments and result, and the final outcome.
//! Independent of the bus-observability [`SubagentEvent`](crate::events::SubagentEvent)
//! log — this one is for a human reading a single worker's file after the fact.

use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::warn;

pub struct ActivityLog {
    writer: BufWriter<File>,
    task_id: String,
    path: PathBuf,
}

impl ActivityLog {
    /// Create a new activity log under `~/.agentcore/logs/`. Returns `None`
    /// if the log directory or file cannot be created — logging is
    /// best-effort, not load-bearing.
    pub fn new(task_id: &str) -> Option<Self> {
        let home = crate::utils::get_agentcore_home().ok()?;
        Self::new_in(&home, task_id)
    }

    /// Like [`Self::new`] but rooted at an arbitrary directory, for tests.
    pub fn new_in(home: &std::path::Path, task_id: &str) -> Option<Self> {
        let log_dir = home.join("logs");
        if let Err(e) = fs::create_dir_all(&log_dir) {
            warn!("failed to create subagent log directory {:?}: {}", log_dir, e);
            return None;
        }
        let date = Utc::now().format("%Y%m%d-%H%M%S");
        let file_path = log_dir.join(format!("subagent-{}-{}.log", task_id, date));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .map_err(|e| warn!("failed to open subagent log {:?}: {}", file_path, e))
            .ok()?;
        Some(Self {
            writer: BufWriter::new(file),
            task_id: task_id.to_string(),
            path: file_path,
        })
    }

    /// Path to the log file (for reporting to users).
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn write_line(&mut self, msg: &str) {
        let ts = Utc::now().format("%H:%M:%S%.3fZ");
        let _ = writeln!(self.writer, "[{}] {}", ts, msg);
        let _ = self.writer.flush();
    }

    pub fn log_start(&mut self, task: &str) {
        self.write_line(&format!("SUBAGENT START task_id={}", self.task_id));
        self.write_line(&format!("TASK: {}", task));
    }

    pub fn log_tools(&mut self, registered: &[String], blocked: &[String]) {
        self.write_line(&format!("TOOLS REGISTERED: {}", registered.join(", ")));
        if blocked.is_empty() {
            self.write_line("TOOLS BLOCKED: (none)");
        } else {
            self.write_line(&format!("TOOLS BLOCKED: {}", blocked.join(", ")));
        }
    }

    pub fn log_tool_call(&mut self, name: &str, args: &serde_json::Value) {
        let args_str = serde_json::to_string(args).unwrap_or_default();
        let preview: String = args_str.chars().take(500).collect();
        self.write_line(&format!("  TOOL CALL: {} {}", name, preview));
    }

    pub fn log_tool_result(&mut self, name: &str, content: &str, is_error: bool) {
        let prefix = if is_error { "  TOOL ERROR" } else { "  TOOL RESULT" };
        let preview: String = content.chars().take(500).collect();
        let suffix = if content.chars().count() > 500 { "..." } else { "" };
        self.write_line(&format!("{}: {} ({} chars): {}{}", prefix, name, content.len(), preview, suffix));
    }

    pub fn log_end(&mut self, success: bool, summary: &str) {
        let status = if success { "COMPLETED" } else { "FAILED" };
        self.write_line(&format!("SUBAGENT {}: {}", status, summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_writes_readable_lines_to_its_own_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = ActivityLog::new_in(tmp.path(), "abc12345").expect("log should open");
        log.log_start("count to 3");
        log.log_tools(&["echo".to_string()], &["spawn_subagent".to_string()]);
        log.log_tool_call("echo", &serde_json::json!({"text": "hi"}));
        log.log_tool_result("echo", "hi", false);
        log.log_end(true, "done");
        let path = log.path().to_path_buf();
        drop(log);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("SUBAGENT START task_id=abc12345"));
        assert!(contents.contains("TASK: count to 3"));
        assert!(contents.contains("TOOLS BLOCKED: spawn_subagent"));
        assert!(contents.contains("TOOL CALL: echo"));
        assert!(contents.contains("SUBAGENT COMPLETED: done"));
    }
}
