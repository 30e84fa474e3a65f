use crate::lru::LINE_BYTES;

/// Width of a trace address in bits.
pub const ADDRESS_BITS: u32 = u64::BITS;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("lines per set (-E) must be at least 1")]
    NoLines,
    #[error(
        "{set_index_bits} set index bits + {block_offset_bits} block offset bits exceed the 64 bit address"
    )]
    AddressTooNarrow {
        set_index_bits: u32,
        block_offset_bits: u32,
    },
    #[error("a cache with 2^{set_index_bits} sets of {lines_per_set} lines can not be allocated")]
    TooLarge {
        set_index_bits: u32,
        lines_per_set: usize,
    },
}

/// Shape of the simulated cache.
///
/// - `set_index_bits` (`s`): the cache has `2^s` sets
/// - `lines_per_set` (`E`): number of cache-lines in a set
/// - `block_offset_bits` (`b`): a cache-line holds `2^b` bytes
///
/// An address is split as `| tag | s set bits | b offset bits |`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    set_index_bits: u32,
    lines_per_set: usize,
    block_offset_bits: u32,
    set_index_mask: u64,
}

impl Geometry {
    pub fn new(
        set_index_bits: u32,
        lines_per_set: usize,
        block_offset_bits: u32,
    ) -> Result<Self, GeometryError> {
        if lines_per_set == 0 {
            return Err(GeometryError::NoLines);
        }

        if set_index_bits
            .checked_add(block_offset_bits)
            .is_none_or(|bits| bits > ADDRESS_BITS)
        {
            return Err(GeometryError::AddressTooNarrow {
                set_index_bits,
                block_offset_bits,
            });
        }

        let too_large = GeometryError::TooLarge {
            set_index_bits,
            lines_per_set,
        };
        let set_count = 1usize
            .checked_shl(set_index_bits)
            .ok_or(too_large.clone())?;
        // the arena has to fit in a single allocation, which is capped at isize::MAX bytes
        set_count
            .checked_mul(lines_per_set)
            .and_then(|lines| lines.checked_mul(LINE_BYTES))
            .filter(|&bytes| bytes <= isize::MAX as usize)
            .ok_or(too_large)?;

        Ok(Self {
            set_index_bits,
            lines_per_set,
            block_offset_bits,
            // set_index_bits < usize::BITS <= 64 here, so the shift can not overflow
            set_index_mask: !(!0u64 << set_index_bits),
        })
    }

    pub fn set_index_bits(&self) -> u32 {
        self.set_index_bits
    }

    pub fn lines_per_set(&self) -> usize {
        self.lines_per_set
    }

    pub fn block_offset_bits(&self) -> u32 {
        self.block_offset_bits
    }

    pub fn set_count(&self) -> usize {
        1 << self.set_index_bits
    }

    pub fn line_size(&self) -> u128 {
        1 << self.block_offset_bits
    }

    /// Total number of cache-lines, `2^s * E`.
    pub fn line_count(&self) -> usize {
        self.set_count() * self.lines_per_set
    }

    pub fn tag_bits(&self) -> u32 {
        ADDRESS_BITS - (self.set_index_bits + self.block_offset_bits)
    }

    /// Splits `address` into `(set_index, tag)`.
    ///
    /// The block offset is dropped, the next `s` bits select the set and all
    /// remaining high bits form the tag. The returned set index is always
    /// smaller than [`Geometry::set_count`].
    pub fn decode(&self, address: u64) -> (usize, u64) {
        let set_index =
            address.checked_shr(self.block_offset_bits).unwrap_or(0) & self.set_index_mask;
        let tag = address
            .checked_shr(self.block_offset_bits + self.set_index_bits)
            .unwrap_or(0);

        (set_index as usize, tag)
    }

    pub fn format_info(&self) -> String {
        [
            "Cache:".to_string(),
            format!("\tTotal Size: {}B", self.line_size() * self.line_count() as u128),
            format!("\tSets: {}", self.set_count()),
            format!("\tLines per Set: {}", self.lines_per_set),
            format!("\tLine-Size: {}B", self.line_size()),
            format!(
                "\t| {} tag bits | {} set bits | {} offset bits |",
                self.tag_bits(),
                self.set_index_bits,
                self.block_offset_bits
            ),
        ]
        .join("\n")
    }
}
