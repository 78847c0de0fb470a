//! Time-windowed moving average of torque samples

use heapless::Deque;

/// Number of time bins one window is split into
pub const TORQUE_BIN_CAPACITY: usize = 64;

/// Samples that arrived within one bin period
#[derive(Debug, Clone, Copy)]
struct Bin {
    started_ms: u32,
    sum: f32,
    count: u32,
}

/// Moving average over the samples of the last `window_ms` milliseconds
///
/// Samples are summed into bins of `window_ms / TORQUE_BIN_CAPACITY + 1`
/// ms, so every sample in the window counts no matter how fast the
/// control loop ticks. A bin expires as a whole once its first sample
/// leaves the window.
#[derive(Debug, Clone)]
pub struct TorqueFilter {
    window_ms: u32,
    bin_ms: u32,
    bins: Deque<Bin, TORQUE_BIN_CAPACITY>,
}

impl TorqueFilter {
    pub fn new(window_ms: u32) -> Self {
        let window_ms = window_ms.max(1);
        Self {
            window_ms,
            bin_ms: window_ms / TORQUE_BIN_CAPACITY as u32 + 1,
            bins: Deque::new(),
        }
    }

    pub fn window_ms(&self) -> u32 {
        self.window_ms
    }

    /// Number of samples in the window
    pub fn len(&self) -> usize {
        self.bins.iter().map(|bin| bin.count as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Record a sample, clamped to 0-100%
    pub fn push(&mut self, now_ms: u32, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        match self.bins.back_mut() {
            Some(bin) if now_ms.wrapping_sub(bin.started_ms) < self.bin_ms => {
                bin.sum += percent;
                bin.count += 1;
            }
            _ => {
                // Bin spacing keeps a full window under capacity
                if self.bins.is_full() {
                    self.bins.pop_front();
                }
                let _ = self.bins.push_back(Bin {
                    started_ms: now_ms,
                    sum: percent,
                    count: 1,
                });
            }
        }
        self.expire(now_ms);
    }

    fn expire(&mut self, now_ms: u32) {
        while let Some(bin) = self.bins.front() {
            if now_ms.wrapping_sub(bin.started_ms) > self.window_ms {
                self.bins.pop_front();
            } else {
                break;
            }
        }
    }

    /// Mean of the samples in the window, 0 when empty
    pub fn average(&self) -> f32 {
        let (sum, count) = self
            .bins
            .iter()
            .fold((0.0f32, 0u32), |(sum, count), bin| (sum + bin.sum, count + bin.count));
        if count == 0 {
            return 0.0;
        }
        sum / count as f32
    }

    pub fn clear(&mut self) {
        self.bins.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_average_is_zero() {
        let filter = TorqueFilter::new(400);
        assert!(filter.is_empty());
        assert_eq!(filter.average(), 0.0);
    }

    #[test]
    fn test_average_within_window() {
        let mut filter = TorqueFilter::new(400);
        filter.push(0, 10.0);
        filter.push(100, 20.0);
        filter.push(200, 30.0);
        assert_eq!(filter.average(), 20.0);
    }

    #[test]
    fn test_old_samples_expire() {
        let mut filter = TorqueFilter::new(400);
        filter.push(0, 90.0);
        filter.push(300, 10.0);
        filter.push(500, 30.0);
        // Sample at 0 is older than 400ms at t=500
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.average(), 20.0);
    }

    #[test]
    fn test_whole_window_at_one_ms_ticks() {
        let mut filter = TorqueFilter::new(400);
        for t in 0..300 {
            filter.push(t, 0.0);
        }
        for t in 300..400 {
            filter.push(t, 100.0);
        }
        assert_eq!(filter.len(), 400);
        assert_eq!(filter.average(), 25.0);
    }

    #[test]
    fn test_one_ms_ticks_slide_the_window() {
        let mut filter = TorqueFilter::new(400);
        for t in 0..1_000 {
            filter.push(t, 80.0);
        }
        for t in 1_000..1_500 {
            filter.push(t, 20.0);
        }
        // Bins straddling the window edge keep at most one bin of extra samples
        let len = filter.len();
        assert!((400..=408).contains(&len));
        assert_eq!(filter.average(), 20.0);
    }

    #[test]
    fn test_samples_are_clamped() {
        let mut filter = TorqueFilter::new(400);
        filter.push(0, 150.0);
        filter.push(1, -20.0);
        assert_eq!(filter.average(), 50.0);
    }

    #[test]
    fn test_window_survives_clock_wrap() {
        let mut filter = TorqueFilter::new(400);
        filter.push(u32::MAX - 100, 40.0);
        filter.push(100, 60.0);
        assert_eq!(filter.len(), 2);
        filter.push(400, 80.0);
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.average(), 70.0);
    }

    #[test]
    fn test_clear_empties_window() {
        let mut filter = TorqueFilter::new(400);
        filter.push(0, 50.0);
        filter.clear();
        assert!(filter.is_empty());
        assert_eq!(filter.len(), 0);
    }
}
