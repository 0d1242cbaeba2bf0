//! Cumulative CPU time counters from `/proc/stat`.
//!
//! All values are in jiffies since boot. A usage percentage can be derived
//! either against a previous snapshot (`usage_since`) or against a zero
//! baseline (`lifetime_usage`). The collector records the latter, which is
//! the average utilisation since boot rather than the current load.

use super::SourceError;

/// Aggregate CPU counters from the `cpu ` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuCounters {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
}

impl CpuCounters {
    /// Reads the aggregate counters from `/proc/stat`.
    pub fn read_from_proc() -> Result<Self, SourceError> {
        let content = std::fs::read_to_string("/proc/stat").map_err(|source| SourceError::Io {
            what: "/proc/stat",
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses `/proc/stat` content.
    ///
    /// Format: `cpu user nice system idle iowait irq softirq steal guest guest_nice`
    pub fn parse(content: &str) -> Result<Self, SourceError> {
        let line = content
            .lines()
            .find(|line| line.starts_with("cpu "))
            .ok_or_else(|| SourceError::Parse("no aggregate cpu line in /proc/stat".to_string()))?;

        let fields = line
            .split_whitespace()
            .skip(1)
            .take(7)
            .map(|field| {
                field
                    .parse::<u64>()
                    .map_err(|_| SourceError::Parse(format!("invalid cpu counter '{}'", field)))
            })
            .collect::<Result<Vec<u64>, _>>()?;

        // Kernels before 2.6 only report the first four fields.
        if fields.len() < 4 {
            return Err(SourceError::Parse(format!(
                "cpu line too short: expected at least 4 counters, got {}",
                fields.len()
            )));
        }
        let field = |idx: usize| fields.get(idx).copied().unwrap_or(0);

        Ok(Self {
            user: field(0),
            nice: field(1),
            system: field(2),
            idle: field(3),
            iowait: field(4),
            irq: field(5),
            softirq: field(6),
        })
    }

    /// user + nice + system + idle + iowait + irq + softirq
    pub fn total(&self) -> u64 {
        self.user
            .saturating_add(self.nice)
            .saturating_add(self.system)
            .saturating_add(self.idle)
            .saturating_add(self.iowait)
            .saturating_add(self.irq)
            .saturating_add(self.softirq)
    }

    /// Busy percentage between `previous` and `self`.
    ///
    /// Returns 0 when no time has elapsed or the counters went backwards.
    pub fn usage_since(&self, previous: &CpuCounters) -> f64 {
        let total = self.total().saturating_sub(previous.total());
        let idle = self.idle.saturating_sub(previous.idle);
        if total == 0 {
            return 0.0;
        }
        100.0 * total.saturating_sub(idle) as f64 / total as f64
    }

    /// Busy percentage since boot.
    pub fn lifetime_usage(&self) -> f64 {
        self.usage_since(&CpuCounters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_STAT: &str = "cpu  4705 356 584 3699 23 0 27 0 0 0\n\
                             cpu0 1393 280 290 1010 1 0 8 0 0 0\n\
                             intr 114930548 113199788 3 0 5 263 0 4 [...]\n";

    #[test]
    fn test_parse_aggregate_line() {
        let counters = CpuCounters::parse(PROC_STAT).unwrap();
        assert_eq!(counters.user, 4705);
        assert_eq!(counters.nice, 356);
        assert_eq!(counters.idle, 3699);
        assert_eq!(counters.softirq, 27);
        assert_eq!(counters.total(), 4705 + 356 + 584 + 3699 + 23 + 27);
    }

    #[test]
    fn test_parse_short_legacy_line() {
        let counters = CpuCounters::parse("cpu 10 0 10 80\n").unwrap();
        assert_eq!(counters.total(), 100);
        assert_eq!(counters.iowait, 0);
        assert!((counters.lifetime_usage() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_rejects_missing_cpu_line() {
        assert!(matches!(
            CpuCounters::parse("intr 1 2 3\n"),
            Err(SourceError::Parse(_))
        ));
        assert!(CpuCounters::parse("cpu 1 2 x 4\n").is_err());
    }

    #[test]
    fn test_zero_counters_yield_zero_usage() {
        assert_eq!(CpuCounters::default().lifetime_usage(), 0.0);
    }

    /// The recorded figure is the average since boot. A machine that idled
    /// for a long time and is now fully busy still reports low usage.
    #[test]
    fn test_lifetime_usage_differs_from_interval_usage() {
        let earlier = CpuCounters {
            user: 1_000,
            idle: 99_000,
            ..Default::default()
        };
        // One second later on a single core at 100% busy.
        let now = CpuCounters {
            user: 1_100,
            idle: 99_000,
            ..Default::default()
        };

        let interval = now.usage_since(&earlier);
        let lifetime = now.lifetime_usage();

        assert!((interval - 100.0).abs() < f64::EPSILON);
        assert!(lifetime < 2.0, "lifetime usage was {}", lifetime);
        assert!(interval - lifetime > 90.0);
    }

    #[test]
    fn test_counter_wraparound_does_not_panic() {
        let earlier = CpuCounters {
            user: 500,
            idle: 500,
            ..Default::default()
        };
        let later = CpuCounters {
            user: 10,
            idle: 10,
            ..Default::default()
        };
        assert_eq!(later.usage_since(&earlier), 0.0);
    }
}
