use crate::geometry::Geometry;
use crate::stats::Stats;

/// Kind of a single physical memory access.
///
/// Both kinds are classified identically, a modify is applied by the caller
/// as a `Load` followed by a `Store` to the same address.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AccessKind {
    Load,
    Store,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    /// `evicted` holds the tag of the replaced line when the set was full.
    Miss { evicted: Option<u64> },
}

impl Outcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Outcome::Hit)
    }

    pub fn is_eviction(&self) -> bool {
        matches!(self, Outcome::Miss { evicted: Some(_) })
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Hit => f.write_str("hit"),
            Outcome::Miss { evicted: None } => f.write_str("miss"),
            Outcome::Miss { evicted: Some(_) } => f.write_str("miss eviction"),
        }
    }
}

/// Set-associative cache with least recently used replacement.
///
/// All sets live in one flat vector, set `i` owns the lines
/// `i * E..(i + 1) * E`. Recency is tracked with an access clock that is
/// advanced once per access, so the line with the smallest `last_used` stamp
/// in a set is its least recently used one.
#[derive(Debug, Clone)]
pub struct LruCache {
    geometry: Geometry,
    lines: Vec<CacheLine>,
    clock: u64,
    stats: Stats,
}

/// Bytes taken by one line of the arena.
pub(crate) const LINE_BYTES: usize = std::mem::size_of::<CacheLine>();

#[derive(Debug, Copy, Clone, Default)]
struct CacheLine {
    valid: bool,
    tag: u64,
    last_used: u64,
}

impl LruCache {
    pub fn new(geometry: Geometry) -> Self {
        tracing::debug!(
            sets = geometry.set_count(),
            lines_per_set = geometry.lines_per_set(),
            block_offset_bits = geometry.block_offset_bits(),
            "creating cache"
        );

        Self {
            geometry,
            lines: vec![CacheLine::default(); geometry.line_count()],
            clock: 0,
            stats: Stats::new(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Number of accesses applied since creation or the last reset.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn reset(&mut self) {
        self.lines.fill(CacheLine::default());
        self.clock = 0;
        self.stats = Stats::new();
    }

    pub fn access(&mut self, address: u64, kind: AccessKind) -> Outcome {
        let (set_index, tag) = self.geometry.decode(address);
        self.clock += 1;
        let now = self.clock;

        let set = self.set_mut(set_index);

        let outcome = match set.iter().position(|line| line.valid && line.tag == tag) {
            // Cache-Hit: only the accessed line becomes the most recently used
            Some(line_idx) => {
                set[line_idx].last_used = now;
                Outcome::Hit
            }
            // Cache-Miss: fill the first free line, or replace the least recently used one
            None => {
                let (line, evicted) = match set.iter().position(|line| !line.valid) {
                    Some(free) => (&mut set[free], None),
                    None => {
                        // min_by_key keeps the first of equal stamps, so ties go to the lowest index
                        let lru = set
                            .iter()
                            .enumerate()
                            .min_by_key(|(_, line)| line.last_used)
                            .map_or(0, |(line_idx, _)| line_idx);
                        let victim = &mut set[lru];
                        let evicted = victim.tag;
                        (victim, Some(evicted))
                    }
                };

                *line = CacheLine {
                    valid: true,
                    tag,
                    last_used: now,
                };

                Outcome::Miss { evicted }
            }
        };

        self.stats.record(outcome);
        tracing::trace!(address, ?kind, set_index, tag, %outcome, "access");

        outcome
    }

    /// Number of valid lines in set `set_index`.
    pub fn occupancy(&self, set_index: usize) -> usize {
        self.set(set_index).iter().filter(|line| line.valid).count()
    }

    /// Clock value of the last access to the line holding `address`, if it is cached.
    pub fn last_used(&self, address: u64) -> Option<u64> {
        let (set_index, tag) = self.geometry.decode(address);
        self.set(set_index)
            .iter()
            .find(|line| line.valid && line.tag == tag)
            .map(|line| line.last_used)
    }

    fn set(&self, set_index: usize) -> &[CacheLine] {
        let ways = self.geometry.lines_per_set();
        &self.lines[set_index * ways..(set_index + 1) * ways]
    }

    fn set_mut(&mut self, set_index: usize) -> &mut [CacheLine] {
        let ways = self.geometry.lines_per_set();
        &mut self.lines[set_index * ways..(set_index + 1) * ways]
    }
}
