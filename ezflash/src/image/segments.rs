//! Address-keyed memory segments.
//!
//! A [`SegmentMap`] describes target memory contents: each entry is a start
//! address and the bytes that belong there. Iteration is always in ascending
//! address order, which is the order segments are written and verified in.

use {
    crate::error::{Error, Result},
    std::collections::BTreeMap,
};

/// Default byte used to fill gaps in a flat image (erased flash).
pub const DEFAULT_FILL: u8 = 0xFF;

/// Largest flat image: the 20-bit MSP430X address space.
pub const MAX_FLAT_IMAGE_LEN: u64 = 0x10_0000;

/// Ordered mapping from start address to segment bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SegmentMap {
    segments: BTreeMap<u32, Vec<u8>>,
}

impl SegmentMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the segment starting at `address`.
    ///
    /// Segments are never merged. A segment already stored at the same
    /// address is replaced and returned; overlapping segments at other
    /// addresses are kept as they are.
    pub fn write(&mut self, address: u32, bytes: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.segments.insert(address, bytes.into())
    }

    /// Insert a segment, refusing any overlap with an existing one.
    pub fn insert_checked(&mut self, address: u32, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let bytes = bytes.into();
        let end = segment_end(address, bytes.len());

        // Closest segment starting at or below `address`.
        if let Some((&existing, data)) = self.segments.range(..=address).next_back() {
            if segment_end(existing, data.len()) > u64::from(address) || existing == address {
                return Err(Error::SegmentOverlap { address, existing });
            }
        }
        // Any segment starting inside the new range.
        if let Some((&existing, _)) = self
            .segments
            .range(address.saturating_add(1)..)
            .next()
            .filter(|(start, _)| u64::from(**start) < end)
        {
            return Err(Error::SegmentOverlap { address, existing });
        }

        self.segments.insert(address, bytes);
        Ok(())
    }

    /// Segment starting exactly at `address`.
    pub fn get(&self, address: u32) -> Option<&[u8]> {
        self.segments.get(&address).map(Vec::as_slice)
    }

    /// Start addresses in ascending order.
    pub fn ordered_addresses(&self) -> Vec<u32> {
        self.segments.keys().copied().collect()
    }

    /// Segments in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.segments
            .iter()
            .map(|(&address, data)| (address, data.as_slice()))
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the map holds no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total number of data bytes across all segments.
    pub fn total_bytes(&self) -> usize {
        self.segments.values().map(Vec::len).sum()
    }

    /// Lowest start address and one past the highest end address.
    pub fn span(&self) -> Option<(u32, u64)> {
        let start = *self.segments.keys().next()?;
        let end = self
            .segments
            .iter()
            .map(|(&address, data)| segment_end(address, data.len()))
            .max()?;
        Some((start, end))
    }

    /// First pair of segments whose ranges overlap, if any.
    pub fn find_overlap(&self) -> Option<(u32, u32)> {
        let mut previous: Option<(u32, u64)> = None;
        for (&address, data) in &self.segments {
            if let Some((prev_addr, prev_end)) = previous {
                if u64::from(address) < prev_end {
                    return Some((prev_addr, address));
                }
            }
            let end = segment_end(address, data.len());
            if previous.is_none_or(|(_, prev_end)| end > prev_end) {
                previous = Some((address, end));
            }
        }
        None
    }

    /// Lay the segments out on a contiguous buffer starting at address 0.
    ///
    /// Gaps are filled with `fill`. With `flip` set, the bit order of every
    /// data byte is reversed (MSB <-> LSB); fill bytes are left as they are.
    /// Where segments overlap, the one with the higher start address wins.
    ///
    /// Fails with [`Error::ImageTooLarge`] when the highest address lies
    /// beyond [`MAX_FLAT_IMAGE_LEN`].
    pub fn to_flat_image(&self, fill: u8, flip: bool) -> Result<Vec<u8>> {
        let Some((_, end)) = self.span() else {
            return Ok(Vec::new());
        };
        if end > MAX_FLAT_IMAGE_LEN {
            return Err(Error::ImageTooLarge {
                end,
                max: MAX_FLAT_IMAGE_LEN,
            });
        }

        #[allow(clippy::cast_possible_truncation)] // addresses are at most 32-bit
        let mut image = vec![fill; end as usize];
        for (address, data) in self.iter() {
            let start = address as usize;
            let target = &mut image[start..start + data.len()];
            if flip {
                for (dst, src) in target.iter_mut().zip(data) {
                    *dst = src.reverse_bits();
                }
            } else {
                target.copy_from_slice(data);
            }
        }
        Ok(image)
    }
}

impl FromIterator<(u32, Vec<u8>)> for SegmentMap {
    fn from_iter<I: IntoIterator<Item = (u32, Vec<u8>)>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

fn segment_end(address: u32, len: usize) -> u64 {
    u64::from(address) + len as u64
}
