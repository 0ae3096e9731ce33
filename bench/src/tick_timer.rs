//! Tick timing utilities.
//!
//! Criterion reports averages; schedulers are judged on their tails. These
//! helpers run a workload for many ticks and keep every per-tick duration,
//! so benchmarks can report percentiles and variance alongside the mean.

use std::time::{Duration, Instant};

/// Statistics over a run of recorded tick times.
#[derive(Debug, Clone)]
pub struct TickStats {
    /// Number of ticks measured.
    pub tick_count: usize,
    /// Sum of all tick durations.
    pub total_duration: Duration,
    /// Fastest tick observed.
    pub min_tick: Duration,
    /// Slowest tick observed.
    pub max_tick: Duration,
    /// Tick times sorted ascending, for percentile lookups.
    sorted: Vec<Duration>,
}

impl TickStats {
    /// Build stats from a collection of tick times.
    pub fn from_times(times: Vec<Duration>) -> Self {
        let tick_count = times.len();
        let total_duration: Duration = times.iter().sum();
        let min_tick = times.iter().min().copied().unwrap_or(Duration::ZERO);
        let max_tick = times.iter().max().copied().unwrap_or(Duration::ZERO);

        let mut sorted = times;
        sorted.sort();

        Self {
            tick_count,
            total_duration,
            min_tick,
            max_tick,
            sorted,
        }
    }

    /// Mean tick time.
    pub fn average(&self) -> Duration {
        if self.tick_count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.tick_count as u32
        }
    }

    /// Median tick time (50th percentile).
    pub fn median(&self) -> Duration {
        self.percentile(50)
    }

    /// The `p`-th percentile tick time, `p` in 0..=100.
    pub fn percentile(&self, p: usize) -> Duration {
        if self.sorted.is_empty() {
            return Duration::ZERO;
        }
        let p = p.min(100);
        let index = (self.sorted.len() * p / 100).min(self.sorted.len() - 1);
        self.sorted[index]
    }

    /// 95th percentile tick time.
    pub fn p95(&self) -> Duration {
        self.percentile(95)
    }

    /// 99th percentile (the worst 1% of ticks).
    pub fn p99(&self) -> Duration {
        self.percentile(99)
    }

    /// Sample standard deviation of tick times.
    pub fn std_dev(&self) -> Duration {
        if self.tick_count < 2 {
            return Duration::ZERO;
        }

        let mean_nanos = self.average().as_nanos() as f64;
        let variance: f64 = self
            .sorted
            .iter()
            .map(|t| {
                let diff = t.as_nanos() as f64 - mean_nanos;
                diff * diff
            })
            .sum::<f64>()
            / (self.tick_count - 1) as f64;

        Duration::from_nanos(variance.sqrt() as u64)
    }

    /// Ticks per second at the average tick time.
    pub fn ticks_per_second(&self) -> f64 {
        let avg = self.average();
        if avg.is_zero() {
            0.0
        } else {
            1.0 / avg.as_secs_f64()
        }
    }
}

impl std::fmt::Display for TickStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        write!(
            f,
            "{} ticks: avg {:.2}ms ({:.1}/s), p50 {:.2}ms, p99 {:.2}ms, worst {:.2}ms",
            self.tick_count,
            ms(self.average()),
            self.ticks_per_second(),
            ms(self.median()),
            ms(self.p99()),
            ms(self.max_tick),
        )
    }
}

/// Records individual tick durations in a loop.
pub struct TickTimer {
    times: Vec<Duration>,
    started: Option<Instant>,
}

impl TickTimer {
    /// A timer with capacity for the expected number of ticks.
    pub fn new(expected_ticks: usize) -> Self {
        Self {
            times: Vec::with_capacity(expected_ticks),
            started: None,
        }
    }

    /// Mark the start of a tick.
    pub fn begin_tick(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Mark the end of a tick and record its duration.
    pub fn end_tick(&mut self) {
        if let Some(start) = self.started.take() {
            self.times.push(start.elapsed());
        }
    }

    /// Finish and compute statistics over everything recorded.
    pub fn stats(self) -> TickStats {
        TickStats::from_times(self.times)
    }

    /// Ticks recorded so far.
    pub fn tick_count(&self) -> usize {
        self.times.len()
    }
}

/// Run `tick_fn` for `tick_count` ticks and gather statistics.
///
/// The closure receives the tick number, starting at zero.
pub fn measure_ticks<F>(tick_count: usize, mut tick_fn: F) -> TickStats
where
    F: FnMut(usize),
{
    let mut timer = TickTimer::new(tick_count);

    for tick in 0..tick_count {
        timer.begin_tick();
        tick_fn(tick);
        timer.end_tick();
    }

    timer.stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// One 30ms hitch in an otherwise single-digit run; 84ms over 7 ticks.
    fn spiky_run() -> TickStats {
        let millis = [9, 6, 30, 8, 14, 8, 9];
        TickStats::from_times(millis.iter().map(|&m| Duration::from_millis(m)).collect())
    }

    #[test]
    fn stats_summarize_a_spiky_run() {
        let stats = spiky_run();

        assert_eq!(stats.tick_count, 7);
        assert_eq!(stats.min_tick, Duration::from_millis(6));
        assert_eq!(stats.max_tick, Duration::from_millis(30));
        assert_eq!(stats.average(), Duration::from_millis(12));
        assert_eq!(stats.median(), Duration::from_millis(9));
        assert!((stats.ticks_per_second() - 1000.0 / 12.0).abs() < 1e-6);
        assert!(stats.to_string().starts_with("7 ticks:"));
    }

    #[test]
    fn percentiles_pick_up_the_tail() {
        let stats = spiky_run();

        assert_eq!(stats.p95(), Duration::from_millis(30));
        assert_eq!(stats.p99(), Duration::from_millis(30));
        assert!(stats.std_dev() > Duration::from_millis(8));
        assert!(stats.std_dev() < Duration::from_millis(9));
    }

    #[test]
    fn empty_run_reports_zeros() {
        let stats = TickStats::from_times(Vec::new());

        assert_eq!(stats.tick_count, 0);
        assert_eq!(stats.average(), Duration::ZERO);
        assert_eq!(stats.median(), Duration::ZERO);
        assert_eq!(stats.std_dev(), Duration::ZERO);
        assert_eq!(stats.ticks_per_second(), 0.0);
    }

    #[test]
    fn timer_records_real_durations() {
        let mut timer = TickTimer::new(4);
        // end_tick without a matching begin_tick records nothing.
        timer.end_tick();

        for _ in 0..4 {
            timer.begin_tick();
            thread::sleep(Duration::from_micros(250));
            timer.end_tick();
        }

        assert_eq!(timer.tick_count(), 4);
        let stats = timer.stats();
        assert!(stats.min_tick >= Duration::from_micros(250));
    }

    #[test]
    fn measure_ticks_passes_the_tick_number() {
        let mut seen = Vec::new();
        let stats = measure_ticks(6, |tick| seen.push(tick));

        assert_eq!(stats.tick_count, 6);
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }
}
