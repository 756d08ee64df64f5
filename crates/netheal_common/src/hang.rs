//! Hardware hang detection
//!
//! Looks for the driver's hang signature next to the interface name in two
//! independent sources: the kernel ring buffer and the system journal.
//! Either source matching is enough. An unreadable source counts as "no
//! match" and never fails the run.

use crate::config::HangConfig;
use crate::host::NetHost;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Where hang evidence was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    KernelRing,
    SystemJournal,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::KernelRing => "kernel ring buffer",
            LogSource::SystemJournal => "system journal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HangEvidence {
    pub interface: String,
    pub found: bool,
    pub recent_window_minutes: u32,
    /// Sources that contained the signature
    pub sources: Vec<LogSource>,
}

pub struct HangDetector<'a, H: NetHost + ?Sized> {
    host: &'a H,
    config: &'a HangConfig,
}

impl<'a, H: NetHost + ?Sized> HangDetector<'a, H> {
    pub fn new(host: &'a H, config: &'a HangConfig) -> Self {
        Self { host, config }
    }

    /// Scan with the configured window
    pub fn detect(&self, interface: &str) -> HangEvidence {
        self.detect_within(interface, self.config.window_minutes)
    }

    pub fn detect_within(&self, interface: &str, window_minutes: u32) -> HangEvidence {
        let mut sources = Vec::new();

        match self.host.kernel_log() {
            Ok(text) => {
                let now = Local::now().naive_local();
                if scan_kernel_log(
                    &text,
                    interface,
                    &self.config.signature,
                    now,
                    window_minutes,
                    self.config.kernel_log_tail_lines,
                ) {
                    sources.push(LogSource::KernelRing);
                }
            }
            Err(e) => warn!("Kernel ring buffer unavailable, skipping: {}", e),
        }

        match self.host.system_log(window_minutes) {
            Ok(text) => {
                if scan_journal(&text, interface, &self.config.signature) {
                    sources.push(LogSource::SystemJournal);
                }
            }
            Err(e) => debug!("System journal unavailable, skipping: {}", e),
        }

        let found = !sources.is_empty();
        if found {
            let names: Vec<&str> = sources.iter().map(LogSource::as_str).collect();
            info!(
                "Hardware hang detected on {} (last {} min, {})",
                interface,
                window_minutes,
                names.join(", ")
            );
        } else {
            debug!("No hardware hang evidence for {}", interface);
        }

        HangEvidence {
            interface: interface.to_string(),
            found,
            recent_window_minutes: window_minutes,
            sources,
        }
    }
}

/// Scan `dmesg -T` output.
///
/// Only the last `tail` lines are considered. Lines whose timestamp parses
/// and falls before `now - window_minutes` are ignored; lines without a
/// readable timestamp are kept.
pub fn scan_kernel_log(
    text: &str,
    interface: &str,
    signature: &str,
    now: NaiveDateTime,
    window_minutes: u32,
    tail: usize,
) -> bool {
    let cutoff = now - chrono::Duration::minutes(i64::from(window_minutes));
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(tail);

    lines[start..].iter().any(|line| {
        if let Some(ts) = parse_dmesg_timestamp(line) {
            if ts < cutoff {
                return false;
            }
        }
        line_matches(line, interface, signature)
    })
}

/// Scan journal output already restricted to the window by the query
pub fn scan_journal(text: &str, interface: &str, signature: &str) -> bool {
    text.lines().any(|line| line_matches(line, interface, signature))
}

fn line_matches(line: &str, interface: &str, signature: &str) -> bool {
    line.contains(signature) && mentions_interface(line, interface)
}

/// True when `interface` appears as a whole token: `eno1` must not match `eno10`.
pub fn mentions_interface(line: &str, interface: &str) -> bool {
    if interface.is_empty() {
        return false;
    }

    line.match_indices(interface).any(|(pos, _)| {
        let before = line[..pos].chars().next_back();
        let after = line[pos + interface.len()..].chars().next();
        !before.map(is_name_char).unwrap_or(false) && !after.map(is_name_char).unwrap_or(false)
    })
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Parse the `[Fri Oct 16 10:42:01 2026]` prefix of `dmesg -T`
pub fn parse_dmesg_timestamp(line: &str) -> Option<NaiveDateTime> {
    let rest = line.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    let stamp = rest[..end].split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&stamp, "%a %b %d %H:%M:%S %Y").ok()
}
