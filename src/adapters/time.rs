//! Time adapter.
//!
//! Monotonic time for the agent's deadline bookkeeping plus the wall
//! clock feeding the display's minute-boundary rule.
//!
//! - **`target_os = "espidf"`** — `esp_timer_get_time()` for monotonic
//!   milliseconds; wall clock from the system clock once SNTP has synced.
//! - **`not(target_os = "espidf")`** — `std::time::Instant` and UTC from
//!   the host clock, for simulation.

/// Timestamps older than 2020-01-01 mean the wall clock was never
/// synced; the boot default is the Unix epoch.
const EPOCH_2020: i64 = 1_577_836_800;

pub struct Clock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(target_os = "espidf")]
    sync_started: core::sync::atomic::AtomicBool,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(target_os = "espidf")]
            sync_started: core::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Kick off SNTP synchronisation. Call once the station has an IP;
    /// the sync completes in the background and `wall_hhmm` starts
    /// returning values when it lands. Idempotent.
    #[cfg(target_os = "espidf")]
    pub fn start_sync(&self) {
        use core::sync::atomic::Ordering;
        if self.sync_started.swap(true, Ordering::AcqRel) {
            return;
        }
        match esp_idf_svc::sntp::EspSntp::new_default() {
            Ok(sntp) => {
                log::info!("time: SNTP sync started");
                // The service must outlive this call; the clock is a
                // process-lifetime singleton.
                core::mem::forget(sntp);
            }
            Err(e) => log::warn!("time: SNTP start failed: {e}"),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start_sync(&self) {}

    fn hhmm_from(secs_of_day: i64) -> heapless::String<5> {
        let mut out = heapless::String::new();
        use core::fmt::Write;
        let _ = write!(out, "{:02}:{:02}", secs_of_day / 3600, (secs_of_day % 3600) / 60);
        out
    }

    /// Wall clock as `HH:MM`, or `None` until the clock is synced.
    #[cfg(target_os = "espidf")]
    pub fn wall_hhmm(&self) -> Option<heapless::String<5>> {
        use core::ptr;
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, ptr::null_mut()) } != 0 {
            return None;
        }
        if i64::from(tv.tv_sec) < EPOCH_2020 {
            return None;
        }
        let secs = tv.tv_sec as esp_idf_svc::sys::time_t;
        let mut tm: esp_idf_svc::sys::tm = unsafe { core::mem::zeroed() };
        if unsafe { esp_idf_svc::sys::localtime_r(&secs, &mut tm) }.is_null() {
            return None;
        }
        Some(Self::hhmm_from(i64::from(tm.tm_hour) * 3600 + i64::from(tm.tm_min) * 60))
    }

    /// Wall clock as `HH:MM` (UTC on the host — timezone handling is a
    /// device concern).
    #[cfg(not(target_os = "espidf"))]
    pub fn wall_hhmm(&self) -> Option<heapless::String<5>> {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs() as i64;
        if secs < EPOCH_2020 {
            return None;
        }
        Some(Self::hhmm_from(secs % 86_400))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_never_decreases() {
        let clock = Clock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn wall_clock_is_well_formed() {
        let clock = Clock::new();
        let hhmm = clock.wall_hhmm().expect("host clock is always synced");
        assert_eq!(hhmm.len(), 5);
        assert_eq!(hhmm.as_bytes()[2], b':');
    }

    #[test]
    fn hhmm_formatting() {
        assert_eq!(Clock::hhmm_from(0).as_str(), "00:00");
        assert_eq!(Clock::hhmm_from(9 * 3600 + 5 * 60).as_str(), "09:05");
        assert_eq!(Clock::hhmm_from(23 * 3600 + 59 * 60 + 59).as_str(), "23:59");
    }
}
