//! Input drivers and peripheral helpers.

pub mod button;

pub use button::{ButtonDriver, ButtonEvent, ButtonId, button_isr_handler};
