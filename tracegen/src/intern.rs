use perfetto_format::{event_name_entry, source_location_entry, InternedData};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Call site attached to an event and interned on the track sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub function: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, function: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            function: function.into(),
            line,
        }
    }
}

/// Key to iid map. Ids are `len + 1` at insertion time and are never reused
/// or reassigned for the lifetime of the table.
#[derive(Debug)]
pub struct InternTable<K> {
    ids: HashMap<K, u64>,
}

impl<K> Default for InternTable<K> {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> InternTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the iid for `key` and whether it was assigned by this call.
    pub fn intern<Q>(&mut self, key: &Q) -> (u64, bool)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if let Some(&iid) = self.ids.get(key) {
            return (iid, false);
        }
        let iid = self.ids.len() as u64 + 1;
        self.ids.insert(key.to_owned(), iid);
        (iid, true)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<u64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ids.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Both interning tables of the track sequence. First use of a key appends
/// its definition to the interned data of the packet being built; later uses
/// only return the iid, even after the defining packet has been flushed.
#[derive(Debug, Default)]
pub struct SequenceInterner {
    event_names: InternTable<String>,
    source_locations: InternTable<SourceLocation>,
}

impl SequenceInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_name(&mut self, name: &str, pending: &mut Option<InternedData>) -> u64 {
        let (iid, fresh) = self.event_names.intern(name);
        if fresh {
            pending
                .get_or_insert_with(InternedData::default)
                .event_names
                .push(event_name_entry(iid, name));
        }
        iid
    }

    pub fn source_location(
        &mut self,
        location: &SourceLocation,
        pending: &mut Option<InternedData>,
    ) -> u64 {
        let (iid, fresh) = self.source_locations.intern(location);
        if fresh {
            pending
                .get_or_insert_with(InternedData::default)
                .source_locations
                .push(source_location_entry(
                    iid,
                    &location.file,
                    &location.function,
                    location.line,
                ));
        }
        iid
    }

    pub fn event_name_count(&self) -> usize {
        self.event_names.len()
    }

    pub fn source_location_count(&self) -> usize {
        self.source_locations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut table: InternTable<String> = InternTable::new();
        assert_eq!(table.intern("a"), (1, true));
        assert_eq!(table.intern("b"), (2, true));
        assert_eq!(table.intern("a"), (1, false));
        assert_eq!(table.get("b"), Some(2));
        assert_eq!(table.get("c"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn definitions_are_emitted_once() {
        let mut interner = SequenceInterner::new();

        let mut first = None;
        let iid = interner.event_name("work", &mut first);
        let defs = first.expect("first use defines the name");
        assert_eq!(defs.event_names.len(), 1);
        assert_eq!(defs.event_names[0].iid(), iid);
        assert_eq!(defs.event_names[0].name(), "work");

        let mut second = None;
        assert_eq!(interner.event_name("work", &mut second), iid);
        assert!(second.is_none());
    }

    #[test]
    fn tables_are_independent() {
        let mut interner = SequenceInterner::new();
        let mut pending = None;
        let name = interner.event_name("main", &mut pending);
        let location = SourceLocation::new("main.rs", "main", 3);
        let loc = interner.source_location(&location, &mut pending);
        assert_eq!(name, 1);
        assert_eq!(loc, 1);

        let defs = pending.unwrap();
        assert_eq!(defs.event_names.len(), 1);
        assert_eq!(defs.source_locations.len(), 1);
        assert_eq!(defs.source_locations[0].line_number(), 3);

        let mut pending = None;
        let location = SourceLocation::new("main.rs", "main", 4);
        let other = interner.source_location(&location, &mut pending);
        assert_eq!(other, 2);
        assert_eq!(interner.source_location_count(), 2);
        assert_eq!(interner.event_name_count(), 1);
    }
}
