//! E-ink panel adapter.
//!
//! Implements [`DisplayPort`]. The panel is a 4.2" monochrome e-paper
//! module on SPI; every draw is a full refresh, and the domain's redraw
//! gate is the only thing deciding when draws happen.
//!
//! Rendering here is text-line composition only — glyph layout is the
//! panel library's job. On the host the composed frame goes to the log
//! and is kept for test inspection.

use core::fmt::Write as _;

use log::info;

use crate::agent::ports::{DisplayPort, ProvisioningScreen};
use crate::display::{DisplayState, UiMode, display_hhmm};
use crate::error::Error;

pub struct EinkPanel {
    /// Last frame composed, newline-separated (host inspection).
    #[cfg(not(target_os = "espidf"))]
    last_frame: String,
    /// Host fault injection: fail the next draw call.
    #[cfg(not(target_os = "espidf"))]
    sim_fail_next: bool,
}

impl EinkPanel {
    pub fn new() -> Result<Self, Error> {
        #[cfg(target_os = "espidf")]
        {
            // Panel bring-up (SPI bus + EPD_BUSY/EPD_RST from pins.rs)
            // goes through the vendor driver init sequence once the HAL
            // handles are threaded from main.rs.
            info!("EinkPanel: espidf init");
        }

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            last_frame: String::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_fail_next: false,
        })
    }

    // ── Host simulation hooks ─────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    pub fn last_frame(&self) -> &str {
        &self.last_frame
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_next_draw(&mut self) {
        self.sim_fail_next = true;
    }

    fn push_frame(&mut self, frame: String) -> Result<(), Error> {
        #[cfg(not(target_os = "espidf"))]
        {
            if self.sim_fail_next {
                self.sim_fail_next = false;
                return Err(Error::Init("panel busy"));
            }
            info!("EinkPanel(sim): refresh\n{frame}");
            self.last_frame = frame;
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            // Full-refresh sequence: wake, push framebuffer, wait on
            // EPD_BUSY, sleep. Deferred with the panel driver wiring.
            info!("EinkPanel: refresh ({} bytes)", frame.len());
            Ok(())
        }
    }
}

impl DisplayPort for EinkPanel {
    fn draw_content(&mut self, state: &DisplayState) -> Result<(), Error> {
        let mut frame = String::new();
        let _ = writeln!(frame, "{}  [{}]", state.clock_hhmm, state.mode.as_str());
        match state.mode {
            UiMode::Calendar => {
                if state.calendar.is_empty() {
                    let _ = writeln!(frame, "no upcoming events");
                }
                for item in &state.calendar {
                    let _ = write!(frame, "{} {}", display_hhmm(&item.start), item.summary);
                    if item.location.is_empty() {
                        let _ = writeln!(frame);
                    } else {
                        let _ = writeln!(frame, " ({})", item.location);
                    }
                }
            }
            UiMode::Email => {
                if state.emails.is_empty() {
                    let _ = writeln!(frame, "inbox zero");
                }
                for item in &state.emails {
                    let _ = writeln!(frame, "{}: {}", item.from, item.subject);
                    if !item.snippet.is_empty() {
                        let _ = writeln!(frame, "  {}", item.snippet);
                    }
                }
            }
        }
        self.push_frame(frame)
    }

    fn draw_provisioning(
        &mut self,
        screen: ProvisioningScreen,
        advertised_name: &str,
    ) -> Result<(), Error> {
        let mut frame = String::new();
        match screen {
            ProvisioningScreen::SetupHint => {
                let _ = writeln!(frame, "Welcome to Zenboard");
                let _ = writeln!(frame, "Open the app and look for '{advertised_name}'");
            }
            ProvisioningScreen::Connecting => {
                let _ = writeln!(frame, "Connecting to Wi-Fi...");
            }
            ProvisioningScreen::WifiFailed => {
                let _ = writeln!(frame, "Wi-Fi connection failed");
                let _ = writeln!(frame, "Check the network details in the app");
            }
            ProvisioningScreen::WaitingForClaim => {
                let _ = writeln!(frame, "Almost there");
                let _ = writeln!(frame, "Finish setup in the app ('{advertised_name}')");
            }
        }
        self.push_frame(frame)
    }
}
