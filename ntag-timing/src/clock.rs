use std::time::{Duration, Instant};

/// Clock for frame-locked stimulus presentation.
pub trait FrameClock: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration);
    /// Records the moment a frame was committed to the display; the
    /// interval to the previous commit feeds the refresh statistics.
    fn mark_flip(&mut self);
    fn flip_count(&self) -> usize;
    fn refresh_stats(&self) -> RefreshStats;
}

/// Statistics over recorded flip intervals.
#[derive(Debug, Clone)]
pub struct RefreshStats {
    pub mean_frame_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_ns: f64,
    pub max_frame_ns: f64,
    pub measured_hz: f64,
}

impl RefreshStats {
    /// Measured refresh rate rounded to whole hertz, as used for
    /// duration-to-frame-count conversion.
    pub fn rounded_hz(&self) -> u32 {
        self.measured_hz.round() as u32
    }
}

#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
    last_flip: Option<Instant>,
    flip_intervals: Vec<Duration>,
    max_samples: usize,
}

impl FrameClock for MonotonicClock {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }

    fn mark_flip(&mut self) {
        let now = Instant::now();
        if let Some(prev) = self.last_flip.replace(now) {
            if self.flip_intervals.len() >= self.max_samples {
                self.flip_intervals.remove(0);
            }
            self.flip_intervals.push(now - prev);
        }
    }

    fn flip_count(&self) -> usize {
        self.flip_intervals.len()
    }

    fn refresh_stats(&self) -> RefreshStats {
        let times: Vec<f64> = self
            .flip_intervals
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return RefreshStats {
                mean_frame_ns: 0.0,
                jitter_ns: 0.0,
                min_frame_ns: 0.0,
                max_frame_ns: 0.0,
                measured_hz: 0.0,
            };
        }
        let mean = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / times.len() as f64;
        let min = *times
            .iter()
            .min_by(|a, b| a.partial_cmp(b).unwrap())
            .unwrap();
        let max = *times
            .iter()
            .max_by(|a, b| a.partial_cmp(b).unwrap())
            .unwrap();
        RefreshStats {
            mean_frame_ns: mean,
            jitter_ns: var.sqrt(),
            min_frame_ns: min,
            max_frame_ns: max,
            measured_hz: if mean > 0.0 { 1e9 / mean } else { 0.0 },
        }
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last_flip: None,
            flip_intervals: Vec::with_capacity(1000),
            max_samples: 1000,
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "windows")]
        self.windows_sleep(duration);
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(target_os = "macos")]
        self.macos_sleep(duration);
        #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "windows")]
    fn windows_sleep(&self, duration: Duration) {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::Foundation::FILETIME;
        use windows::Win32::System::Threading::{
            CreateWaitableTimerW, SetWaitableTimer, WaitForSingleObject,
        };

        unsafe {
            let Ok(timer) = CreateWaitableTimerW(None, true, None) else {
                std::thread::sleep(duration);
                return;
            };

            let intervals = -(duration.as_nanos() as i64 / 100);
            let due_time = FILETIME {
                dwLowDateTime: intervals as u32,
                dwHighDateTime: (intervals >> 32) as u32,
            };

            if SetWaitableTimer(timer, &due_time, 0, None, None, false).is_ok() {
                WaitForSingleObject(timer, u32::MAX);
            }
            let _ = CloseHandle(timer);
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{CLOCK_MONOTONIC, clock_nanosleep, timespec};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }

    #[cfg(target_os = "macos")]
    fn macos_sleep(&self, duration: Duration) {
        use mach2::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};
        use std::thread;

        if duration.as_nanos() < 100_000 {
            unsafe {
                let start = mach_absolute_time();
                let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
                mach_timebase_info(&mut timebase);

                let target_ticks =
                    duration.as_nanos() as u64 * timebase.denom as u64 / timebase.numer as u64;

                while mach_absolute_time() - start < target_ticks {
                    std::hint::spin_loop();
                }
            }
        } else {
            thread::sleep(duration);
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_monotonic() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn first_flip_records_no_interval() {
        let mut clock = MonotonicClock::new();
        clock.mark_flip();
        assert_eq!(clock.flip_count(), 0);
        clock.mark_flip();
        assert_eq!(clock.flip_count(), 1);
    }

    #[test]
    fn refresh_stats_on_empty_clock_are_zero() {
        let clock = MonotonicClock::new();
        let stats = clock.refresh_stats();
        assert_eq!(stats.measured_hz, 0.0);
        assert_eq!(stats.rounded_hz(), 0);
    }

    #[test]
    fn refresh_stats_reflect_recorded_intervals() {
        let mut clock = MonotonicClock::new();
        clock.last_flip = Some(Instant::now());
        clock.flip_intervals = vec![Duration::from_millis(16); 10];
        let stats = clock.refresh_stats();
        assert!((stats.mean_frame_ns - 16_000_000.0).abs() < 1.0);
        assert_eq!(stats.jitter_ns, 0.0);
        assert_eq!(stats.rounded_hz(), 63);
    }
}
