//! Display logic for fetch-dispatch CLI.
//!
//! Plain output is one line per URL in input order followed by a summary.
//! `--pretty` adds colors, a header and a spinner on stderr while the run is
//! in flight. Uses only the `console` crate.

use console::{pad_str, style, Alignment, Term};
use fetch_dispatch_lib::{DispatchStats, Outcome};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Longest payload preview shown in pretty mode.
const PREVIEW_WIDTH: usize = 60;

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner that writes to stderr so stdout stays clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    /// Start a spinner with the given message, or `None` when stderr is not
    /// a terminal.
    pub fn start(message: String) -> Option<Self> {
        let term = Term::stderr();
        if !term.is_term() {
            return None;
        }

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), message));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Some(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a pretty run.
pub fn print_header(url_count: usize, concurrency: usize) {
    println!(
        "{} {} {}",
        style("fetch-dispatch").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!("· Fetching {} URL{}", url_count, plural(url_count))).dim(),
    );
    println!("{}", style(format!("Concurrency: {}", concurrency)).dim());
    println!();
}

// ── Result lines ─────────────────────────────────────────────────────────────

/// Format a single outcome as an uncolored line.
pub fn plain_line(index: usize, resource: &str, outcome: &Outcome<Value>) -> String {
    match outcome {
        Outcome::Success { .. } => format!("[{}] OK {}", index, resource),
        Outcome::Failure { reason } => format!("[{}] FAIL {} {}", index, resource, reason),
    }
}

pub fn print_outcome_plain(index: usize, resource: &str, outcome: &Outcome<Value>) {
    println!("{}", plain_line(index, resource, outcome));
}

/// Print a single outcome with colors and alignment.
pub fn print_outcome(index: usize, resource: &str, outcome: &Outcome<Value>) {
    let padded = pad_str(resource, 48, Alignment::Left, Some(".."));
    let prefix = style(format!("[{}]", index)).dim();

    match outcome {
        Outcome::Success { value } => {
            println!(
                "  {} {}  {}  {}",
                prefix,
                style(&padded).white(),
                style("OK").green().bold(),
                style(preview(value)).dim(),
            );
        }
        Outcome::Failure { reason } => {
            println!(
                "  {} {}  {}  {}",
                prefix,
                style(&padded).white(),
                style("FAIL").red().bold(),
                style(brief_reason(reason)).dim(),
            );
        }
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Format the summary line shown after the results.
pub fn summary_line(stats: &DispatchStats) -> String {
    format!(
        "Successful: {} | Failed: {} | Duration: {}ms",
        stats.successful,
        stats.failed,
        stats.duration.as_millis()
    )
}

/// Print the final summary, colored in pretty mode.
pub fn print_summary(stats: &DispatchStats, pretty: bool) {
    if !pretty {
        println!("{}", summary_line(stats));
        return;
    }

    let total = stats.total();
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} URL{} in {:.1}s  {}  {}  {}  {}",
        style(total).bold(),
        plural(total),
        stats.duration.as_secs_f64(),
        style("|").dim(),
        style(format!("{} successful", stats.successful)).green(),
        style("|").dim(),
        style(format!("{} failed", stats.failed)).red(),
    );
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Compact one-line preview of a JSON payload.
fn preview(value: &Value) -> String {
    let compact = value.to_string();
    if compact.chars().count() <= PREVIEW_WIDTH {
        compact
    } else {
        let cut: String = compact.chars().take(PREVIEW_WIDTH - 3).collect();
        format!("{}...", cut)
    }
}

/// Short category for a failure reason.
fn brief_reason(reason: &str) -> String {
    if let Some(code) = reason.strip_prefix("HTTP error! status: ") {
        return format!("(HTTP {})", code);
    }

    let r = reason.to_lowercase();
    let category = if r.contains("timed out") || r.contains("timeout") {
        "(timeout)"
    } else if r.contains("cancelled") {
        "(cancelled)"
    } else if r.contains("network") || r.contains("connect") || r.contains("dns") {
        "(network error)"
    } else if r.contains("decode") || r.contains("json") {
        "(invalid JSON)"
    } else if r.contains("panicked") {
        "(panicked)"
    } else {
        "(error)"
    };
    category.to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
