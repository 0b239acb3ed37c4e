//! Display model and refresh gating.
//!
//! The e-ink panel pays a full-second flash for every refresh, so the
//! agent never draws speculatively: it renders a [`DisplayState`] into a
//! deterministic content signature and only pushes a frame when the
//! signature differs from the one on glass. The wall clock participates
//! in the signature, which makes the minute boundary produce exactly one
//! redraw per minute with no extra timer.
//!
//! Provisioning screens (QR hint, connection progress) carry no content
//! signature; they redraw on a fixed cadence instead so a stuck panel
//! recovers on its own.

use core::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Items shown per panel. The layout fits three rows of each.
pub const MAX_ITEMS: usize = 3;

/// Which of the two content panels is on glass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Calendar,
    Email,
}

impl UiMode {
    pub const fn toggled(self) -> Self {
        match self {
            Self::Calendar => Self::Email,
            Self::Email => Self::Calendar,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Email => "email",
        }
    }
}

/// One upcoming calendar entry, as delivered by the backend poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarItem {
    /// RFC 3339 start timestamp.
    pub start: String,
    pub summary: String,
    #[serde(default)]
    pub location: String,
}

/// One unread email summary, as delivered by the backend poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailItem {
    pub from: String,
    pub subject: String,
    #[serde(default)]
    pub snippet: String,
}

/// Everything the content renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayState {
    pub mode: UiMode,
    /// Wall clock as `HH:MM`, already timezone-adjusted.
    pub clock_hhmm: heapless::String<5>,
    pub calendar: heapless::Vec<CalendarItem, MAX_ITEMS>,
    pub emails: heapless::Vec<EmailItem, MAX_ITEMS>,
}

impl DisplayState {
    /// Deterministic signature of the rendered content.
    ///
    /// Field order is fixed and every field is delimited, so two states
    /// produce the same signature iff they render identically. Only the
    /// visible panel's items contribute: flipping an email while the
    /// calendar panel is up must not flash the screen.
    pub fn signature(&self) -> String {
        let mut sig = String::new();
        let _ = write!(sig, "{}|{}", self.mode.as_str(), self.clock_hhmm);
        match self.mode {
            UiMode::Calendar => {
                for item in &self.calendar {
                    let _ = write!(
                        sig,
                        "|{}\x1f{}\x1f{}",
                        display_hhmm(&item.start),
                        item.summary,
                        item.location
                    );
                }
            }
            UiMode::Email => {
                for item in &self.emails {
                    let _ = write!(sig, "|{}\x1f{}\x1f{}", item.from, item.subject, item.snippet);
                }
            }
        }
        sig
    }
}

/// Extract `HH:MM` from an RFC 3339 timestamp (`2026-03-01T09:30:00+01:00`
/// → `09:30`). Falls back to `--:--` for anything too short; the backend
/// owns timestamp validity, the renderer just needs something printable.
pub fn display_hhmm(rfc3339: &str) -> heapless::String<5> {
    let mut out = heapless::String::new();
    match rfc3339.get(11..16) {
        Some(hhmm) => {
            let _ = out.push_str(hhmm);
        }
        None => {
            let _ = out.push_str("--:--");
        }
    }
    out
}

/// Gate between the renderer and the panel.
///
/// Tracks the signature currently on glass plus the timestamp of the
/// last provisioning-screen redraw. The two paths are independent:
/// switching from a provisioning screen to content always draws, because
/// no content signature is recorded while provisioning screens are up.
#[derive(Debug, Default)]
pub struct RedrawGate {
    on_glass: Option<String>,
    last_provisioning_ms: Option<u64>,
}

impl RedrawGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `state` needs a panel refresh, and if so record its
    /// signature as the new on-glass content.
    pub fn check_content(&mut self, state: &DisplayState) -> bool {
        let sig = state.signature();
        if self.on_glass.as_deref() == Some(sig.as_str()) {
            return false;
        }
        self.on_glass = Some(sig);
        self.last_provisioning_ms = None;
        true
    }

    /// Decide whether a provisioning screen is due for its cadence
    /// redraw. The first call after content (or after boot) always
    /// draws.
    pub fn check_provisioning(&mut self, now_ms: u64, cadence_secs: u32) -> bool {
        let due = match self.last_provisioning_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= u64::from(cadence_secs) * 1000,
        };
        if due {
            self.last_provisioning_ms = Some(now_ms);
            self.on_glass = None;
        }
        due
    }

    /// Forget the on-glass state, forcing the next check to draw.
    /// Used after a panel power cycle.
    pub fn invalidate(&mut self) {
        self.on_glass = None;
        self.last_provisioning_ms = None;
    }
}
