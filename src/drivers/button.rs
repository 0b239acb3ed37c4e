//! ISR-debounced button driver.
//!
//! ## Hardware
//!
//! Active-low momentary switches with external pull-ups. GPIO fires on
//! falling edge; the ISR records the raw timestamp into an atomic, and
//! the `tick()` method (called from the main loop at control-tick rate)
//! runs the debounce + gesture state machine.
//!
//! Zenboard carries two buttons:
//!
//! | Button | Gesture          | Event        |
//! |--------|------------------|--------------|
//! | Mode   | Debounced press  | `ShortPress` |
//! | Reset  | Hold >= 3s       | `Hold`       |

use core::sync::atomic::{AtomicU32, Ordering};

pub const DEBOUNCE_MS: u32 = 50;

/// Raw ISR timestamps (milliseconds since boot, truncated to u32), one
/// slot per physical button. Written by the ISR, read by the main loop.
static ISR_TIMESTAMPS: [AtomicU32; 2] = [AtomicU32::new(0), AtomicU32::new(0)];

/// Which physical button a driver instance (and ISR registration)
/// belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ButtonId {
    Mode = 0,
    Reset = 1,
}

/// Button events emitted after gesture classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// Debounced press-and-release.
    ShortPress,
    /// Held past the driver's hold threshold.
    Hold,
}

/// Internal state machine for gesture detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    DebounceWait { since_ms: u32 },
    Pressed { since_ms: u32 },
}

pub struct ButtonDriver {
    id: ButtonId,
    gpio: i32,
    /// `Some(ms)`: emit `Hold` at the threshold instead of `ShortPress`
    /// on release.
    hold_threshold_ms: Option<u32>,
    state: GestureState,
    last_isr_ms: u32,
}

impl ButtonDriver {
    /// Short-press button (mode toggle).
    pub fn momentary(id: ButtonId, gpio: i32) -> Self {
        Self {
            id,
            gpio,
            hold_threshold_ms: None,
            state: GestureState::Idle,
            last_isr_ms: 0,
        }
    }

    /// Hold-to-activate button (factory reset).
    pub fn hold(id: ButtonId, gpio: i32, threshold_ms: u32) -> Self {
        Self {
            id,
            gpio,
            hold_threshold_ms: Some(threshold_ms),
            state: GestureState::Idle,
            last_isr_ms: 0,
        }
    }

    /// GPIO pin this button is attached to.
    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Call from the main loop at each control tick.
    /// `now_ms` is the current monotonic time in milliseconds.
    /// Returns a classified gesture event, if any.
    pub fn tick(&mut self, now_ms: u32) -> Option<ButtonEvent> {
        let isr_ms = ISR_TIMESTAMPS[self.id as usize].load(Ordering::Acquire);
        let new_press = isr_ms != self.last_isr_ms && isr_ms != 0;

        match self.state {
            GestureState::Idle => {
                if new_press {
                    self.last_isr_ms = isr_ms;
                    self.state = GestureState::DebounceWait { since_ms: now_ms };
                }
                None
            }

            GestureState::DebounceWait { since_ms } => {
                if now_ms.wrapping_sub(since_ms) >= DEBOUNCE_MS {
                    if self.is_pressed_hw() {
                        self.state = GestureState::Pressed { since_ms: now_ms };
                    } else {
                        // Released inside the debounce window: noise.
                        self.state = GestureState::Idle;
                    }
                }
                None
            }

            GestureState::Pressed { since_ms } => {
                let held_ms = now_ms.wrapping_sub(since_ms);

                if let Some(threshold) = self.hold_threshold_ms {
                    if held_ms >= threshold {
                        self.state = GestureState::Idle;
                        return Some(ButtonEvent::Hold);
                    }
                    if !self.is_pressed_hw() {
                        // Released before the threshold: not a reset.
                        self.state = GestureState::Idle;
                    }
                    return None;
                }

                if !self.is_pressed_hw() {
                    self.state = GestureState::Idle;
                    return Some(ButtonEvent::ShortPress);
                }
                None
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn is_pressed_hw(&self) -> bool {
        // Active low.
        !crate::adapters::gpio_read(self.gpio)
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_pressed_hw(&self) -> bool {
        sim::is_pressed(self.id)
    }
}

/// ISR handler — register this on each button GPIO's falling edge.
/// Safe to call from interrupt context (lock-free atomic store).
#[allow(unused)]
pub fn button_isr_handler(id: ButtonId, now_ms: u32) {
    ISR_TIMESTAMPS[id as usize].store(now_ms, Ordering::Release);
}

/// Host-side simulation of the raw GPIO level, so the gesture state
/// machine can be exercised without hardware.
#[cfg(not(target_os = "espidf"))]
pub mod sim {
    use super::ButtonId;
    use core::sync::atomic::{AtomicBool, Ordering};

    static PRESSED: [AtomicBool; 2] = [AtomicBool::new(false), AtomicBool::new(false)];

    pub fn set_pressed(id: ButtonId, pressed: bool) {
        PRESSED[id as usize].store(pressed, Ordering::Release);
    }

    pub fn is_pressed(id: ButtonId) -> bool {
        PRESSED[id as usize].load(Ordering::Acquire)
    }
}
