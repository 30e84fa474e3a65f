use crate::lru::Outcome;

/// Aggregate result of all accesses applied to a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Hit => self.hits += 1,
            Outcome::Miss { evicted } => {
                self.misses += 1;
                if evicted.is_some() {
                    self.evictions += 1;
                }
            }
        }
    }

    /// Counts gathered after `earlier` was taken from the same cache.
    pub fn since(&self, earlier: Stats) -> Stats {
        Stats {
            hits: self.hits - earlier.hits,
            misses: self.misses - earlier.misses,
            evictions: self.evictions - earlier.evictions,
        }
    }

    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn percent_hit(&self) -> f64 {
        if self.accesses() == 0 {
            return 0.0;
        }
        100.0 * self.hits as f64 / self.accesses() as f64
    }

    pub fn percent_miss(&self) -> f64 {
        if self.accesses() == 0 {
            return 0.0;
        }
        100.0 * self.misses as f64 / self.accesses() as f64
    }

    /// `<hits> <misses> <evictions>`, the format of a `.csim_results` file.
    pub fn format_results(&self) -> String {
        format!("{} {} {}\n", self.hits, self.misses, self.evictions)
    }
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "hits:{} misses:{} evictions:{}",
            self.hits, self.misses, self.evictions
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record() {
        let mut stats = Stats::new();
        stats.record(Outcome::Miss { evicted: None });
        stats.record(Outcome::Hit);
        stats.record(Outcome::Miss { evicted: Some(3) });
        stats.record(Outcome::Hit);

        assert_eq!(
            stats,
            Stats {
                hits: 2,
                misses: 2,
                evictions: 1
            }
        );
        assert_eq!(stats.accesses(), 4);
        assert_eq!(stats.percent_hit(), 50.0);
        assert_eq!(stats.percent_miss(), 50.0);
    }

    #[test]
    fn since() {
        let earlier = Stats {
            hits: 1,
            misses: 2,
            evictions: 1,
        };
        let now = Stats {
            hits: 4,
            misses: 3,
            evictions: 1,
        };
        assert_eq!(
            now.since(earlier),
            Stats {
                hits: 3,
                misses: 1,
                evictions: 0
            }
        );
        assert_eq!(now.since(now), Stats::new());
    }

    #[test]
    fn empty_has_no_ratio() {
        let stats = Stats::new();
        assert_eq!(stats.percent_hit(), 0.0);
        assert_eq!(stats.percent_miss(), 0.0);
    }

    #[test]
    fn format() {
        let stats = Stats {
            hits: 4,
            misses: 5,
            evictions: 3,
        };
        assert_eq!(stats.to_string(), "hits:4 misses:5 evictions:3");
        assert_eq!(stats.format_results(), "4 5 3\n");
    }
}
