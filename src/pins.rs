//! GPIO pin assignments for the Zenboard rev C board.
//!
//! Kept in one place so hardware revisions only touch this file.

/// Mode-toggle button (active-low momentary, external pull-up).
pub const BUTTON_MODE_GPIO: i32 = 4;

/// Factory-reset button (active-low momentary, recessed).
pub const BUTTON_RESET_GPIO: i32 = 5;

/// E-ink panel BUSY line (high while the panel is refreshing).
pub const EPD_BUSY_GPIO: i32 = 18;

/// E-ink panel reset line.
pub const EPD_RST_GPIO: i32 = 19;
