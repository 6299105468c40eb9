//! Cross-reference table (§3, §4.D): maps object numbers to where an
//! indirect object's body lives, whether that's a byte offset in the file
//! or a slot inside a compressed object stream.

use indexmap::IndexMap;

use crate::object_id::ObjectId;

/// A single cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// `f` entry in a classical table, or a `Type 0` xref-stream entry.
    Free { generation: u16 },
    /// A free entry whose generation makes it unreusable (65535 in a
    /// classical table); tracked distinctly so repair does not try to
    /// resurrect it.
    UnusableFree,
    /// `n` entry in a classical table, or a `Type 1` xref-stream entry:
    /// the object body starts at this byte offset.
    Normal { offset: u64, generation: u16 },
    /// `Type 2` xref-stream entry: object is hosted inside the object
    /// stream numbered `container`, at slot `index`.
    Compressed { container: u32, index: u32 },
}

/// Maximum xref `Size` the reader will honor (§4.D); guards against a
/// corrupt or hostile trailer forcing an enormous table allocation.
pub const MAX_XREF_SIZE: i64 = 8_388_607;

/// The cross-reference table built up by merging one or more xref
/// sections, newest first, per the `/Prev` chain.
#[derive(Debug, Clone, Default)]
pub struct Xref {
    pub entries: IndexMap<u32, XrefEntry>,
    /// The trailer's declared `/Size`, corrected to `max_id + 1` if it
    /// disagrees (§7 recovery policy).
    pub size: i64,
}

impl Xref {
    pub fn new(size: i64) -> Self {
        Xref {
            entries: IndexMap::new(),
            size,
        }
    }

    /// Merges an older (`/Prev`-chained) section into this one. Entries
    /// already present in `self` win, since sections closer to the file
    /// trailer take precedence over earlier ones.
    pub fn merge(&mut self, prev: Xref) {
        for (object_number, entry) in prev.entries {
            self.entries.entry(object_number).or_insert(entry);
        }
    }

    pub fn get(&self, object_number: u32) -> Option<&XrefEntry> {
        self.entries.get(&object_number)
    }

    pub fn max_id(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, XrefEntry::Normal { .. } | XrefEntry::Compressed { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| matches!(e, XrefEntry::Normal { .. } | XrefEntry::Compressed { .. }))
            .map(|(n, _)| *n)
    }

    /// Replaces a single entry unconditionally; used by the repair path
    /// (§4.D) once a top-down scan has located an object's true offset.
    pub fn insert(&mut self, object_number: u32, entry: XrefEntry) {
        self.entries.insert(object_number, entry);
    }

    pub fn object_id_for(&self, object_number: u32) -> Option<ObjectId> {
        match self.get(object_number)? {
            XrefEntry::Normal { generation, .. } => Some((object_number, *generation)),
            XrefEntry::Compressed { .. } => Some((object_number, 0)),
            XrefEntry::Free { .. } | XrefEntry::UnusableFree => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_section_entries_win_over_prev_chain() {
        let mut xref = Xref::new(2);
        xref.entries.insert(1, XrefEntry::Normal { offset: 500, generation: 0 });

        let mut prev = Xref::new(3);
        prev.entries.insert(1, XrefEntry::Normal { offset: 10, generation: 0 });
        prev.entries.insert(2, XrefEntry::Normal { offset: 20, generation: 0 });

        xref.merge(prev);

        assert_eq!(xref.get(1), Some(&XrefEntry::Normal { offset: 500, generation: 0 }));
        assert_eq!(xref.get(2), Some(&XrefEntry::Normal { offset: 20, generation: 0 }));
    }

    #[test]
    fn free_entries_are_not_counted_as_live() {
        let mut xref = Xref::new(1);
        xref.entries.insert(3, XrefEntry::Free { generation: 0 });
        assert_eq!(xref.len(), 0);
        assert_eq!(xref.object_id_for(3), None);
    }

    #[test]
    fn object_id_for_compressed_entry_is_generation_zero() {
        let mut xref = Xref::new(1);
        xref.insert(7, XrefEntry::Compressed { container: 4, index: 2 });
        assert_eq!(xref.object_id_for(7), Some((7, 0)));
    }

    #[test]
    fn max_id_ignores_nothing_since_free_entries_still_occupy_a_number() {
        let mut xref = Xref::new(1);
        xref.entries.insert(0, XrefEntry::Free { generation: 65535 });
        xref.entries.insert(5, XrefEntry::Normal { offset: 9, generation: 0 });
        assert_eq!(xref.max_id(), 5);
    }
}
