use crate::packet::{CounterValue, Event, EventOptions};
use crate::session::{Scope, Session};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Process,
    Group,
    Normal,
    Counter,
}

#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub uuid: u64,
    pub kind: TrackKind,
    pub name: String,
    pub parent: Option<u64>,
    pub pid: Option<i32>,
    pub(crate) open_slices: u32,
    pub(crate) counter_value: i64,
}

impl TrackInfo {
    pub fn new(uuid: u64, kind: TrackKind, name: String, parent: Option<u64>) -> Self {
        Self {
            uuid,
            kind,
            name,
            parent,
            pid: None,
            open_slices: 0,
            counter_value: 0,
        }
    }
}

/// Every track created in a session, keyed by uuid. Tracks are never
/// removed; a child is only inserted after its parent.
#[derive(Debug, Default)]
pub struct TrackModel {
    tracks: HashMap<u64, TrackInfo>,
    order: Vec<u64>,
}

impl TrackModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: TrackInfo) {
        debug_assert!(
            info.parent.is_none_or(|parent| self.tracks.contains_key(&parent)),
            "parent of track {} must exist",
            info.uuid
        );
        self.order.push(info.uuid);
        self.tracks.insert(info.uuid, info);
    }

    pub fn get(&self, uuid: u64) -> Option<&TrackInfo> {
        self.tracks.get(&uuid)
    }

    pub(crate) fn get_mut(&mut self, uuid: u64) -> Option<&mut TrackInfo> {
        self.tracks.get_mut(&uuid)
    }

    /// Counter tracks never get children.
    pub fn accepts_children(&self, uuid: u64) -> bool {
        self.tracks
            .get(&uuid)
            .is_some_and(|track| track.kind != TrackKind::Counter)
    }

    /// Tracks in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackInfo> {
        self.order.iter().filter_map(|uuid| self.tracks.get(uuid))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Opaque reference to a track owned by a session.
#[derive(Clone)]
pub struct TrackHandle {
    session: Session,
    uuid: u64,
}

impl TrackHandle {
    pub(crate) fn new(session: Session, uuid: u64) -> Self {
        Self { session, uuid }
    }

    pub fn uuid(&self) -> u64 {
        self.uuid
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl fmt::Debug for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackHandle")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

/// Tracks that carry slices and instants.
pub trait SliceTrack {
    fn handle(&self) -> &TrackHandle;

    fn uuid(&self) -> u64 {
        self.handle().uuid()
    }

    fn open(&self, timestamp: u64, name: &str) -> &Self {
        self.open_with(timestamp, name, EventOptions::default())
    }

    fn open_with(&self, timestamp: u64, name: &str, options: EventOptions) -> &Self {
        let handle = self.handle();
        handle
            .session
            .emit(Event::slice_begin(handle.uuid, timestamp, name, options));
        self
    }

    /// Closes the most recent open slice on this track.
    fn close(&self, timestamp: u64) -> &Self {
        self.close_with_flows(timestamp, &[])
    }

    fn close_with_flows(&self, timestamp: u64, flows: &[u64]) -> &Self {
        let handle = self.handle();
        handle
            .session
            .emit(Event::slice_end(handle.uuid, timestamp, flows.to_vec()));
        self
    }

    fn instant(&self, timestamp: u64, name: &str) -> &Self {
        self.instant_with(timestamp, name, EventOptions::default())
    }

    fn instant_with(&self, timestamp: u64, name: &str, options: EventOptions) -> &Self {
        let handle = self.handle();
        handle
            .session
            .emit(Event::instant(handle.uuid, timestamp, name, options));
        self
    }

    /// Opens a slice stamped by the session clock, closed when the returned
    /// scope drops.
    fn scope(&self, name: &str, options: EventOptions) -> Scope {
        let handle = self.handle();
        handle.session.begin_scope(handle.uuid, name, options)
    }
}

/// Root of a process in the timeline. It doubles as the process's default
/// track, so slices can be recorded on it directly.
#[derive(Debug, Clone)]
pub struct ProcessTrack(pub(crate) TrackHandle);

/// Container track that only groups children.
#[derive(Debug, Clone)]
pub struct GroupTrack(pub(crate) TrackHandle);

#[derive(Debug, Clone)]
pub struct NormalTrack(pub(crate) TrackHandle);

#[derive(Debug, Clone)]
pub struct CounterTrack(pub(crate) TrackHandle);

impl SliceTrack for ProcessTrack {
    fn handle(&self) -> &TrackHandle {
        &self.0
    }
}

impl SliceTrack for NormalTrack {
    fn handle(&self) -> &TrackHandle {
        &self.0
    }
}

macro_rules! parent_track_methods {
    ($($ty:ident),*) => {
        $(impl $ty {
            pub fn uuid(&self) -> u64 {
                self.0.uuid()
            }

            pub fn create_track(&self, name: &str) -> NormalTrack {
                let uuid = self.0.session.create_child_track(
                    Some(self.0.uuid),
                    name,
                    TrackKind::Normal,
                    None,
                );
                NormalTrack(TrackHandle::new(self.0.session.clone(), uuid))
            }

            pub fn create_group(&self, name: &str) -> GroupTrack {
                let uuid = self.0.session.create_child_track(
                    Some(self.0.uuid),
                    name,
                    TrackKind::Group,
                    None,
                );
                GroupTrack(TrackHandle::new(self.0.session.clone(), uuid))
            }

            pub fn create_counter_track(&self, name: &str) -> CounterTrack {
                self.create_counter_track_with_unit(name, None)
            }

            pub fn create_counter_track_with_unit(
                &self,
                name: &str,
                unit_name: Option<&str>,
            ) -> CounterTrack {
                let uuid = self.0.session.create_child_track(
                    Some(self.0.uuid),
                    name,
                    TrackKind::Counter,
                    unit_name.map(str::to_string),
                );
                CounterTrack(TrackHandle::new(self.0.session.clone(), uuid))
            }
        })*
    };
}

parent_track_methods!(ProcessTrack, GroupTrack);

impl CounterTrack {
    pub fn uuid(&self) -> u64 {
        self.0.uuid()
    }

    pub fn count(&self, timestamp: u64, value: i64) -> &Self {
        self.0.session.emit(Event::counter(
            self.0.uuid,
            timestamp,
            CounterValue::Int(value),
        ));
        self
    }

    pub fn count_f64(&self, timestamp: u64, value: f64) -> &Self {
        self.0.session.emit(Event::counter(
            self.0.uuid,
            timestamp,
            CounterValue::Double(value),
        ));
        self
    }

    /// Records the last integer value of this track plus `delta`.
    pub fn increment(&self, timestamp: u64, delta: i64) -> &Self {
        self.0.session.increment_counter(self.0.uuid, timestamp, delta);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(uuid: u64, kind: TrackKind, parent: Option<u64>) -> TrackInfo {
        TrackInfo::new(uuid, kind, format!("t{}", uuid), parent)
    }

    #[test]
    fn iterates_in_creation_order() {
        let mut model = TrackModel::new();
        model.insert(info(10, TrackKind::Process, None));
        model.insert(info(12, TrackKind::Normal, Some(10)));
        model.insert(info(11, TrackKind::Counter, Some(10)));
        let order: Vec<u64> = model.iter().map(|t| t.uuid).collect();
        assert_eq!(order, vec![10, 12, 11]);
        assert_eq!(model.len(), 3);
    }

    #[test]
    fn counters_do_not_accept_children() {
        let mut model = TrackModel::new();
        model.insert(info(1, TrackKind::Process, None));
        model.insert(info(2, TrackKind::Counter, Some(1)));
        model.insert(info(3, TrackKind::Group, Some(1)));
        assert!(model.accepts_children(1));
        assert!(!model.accepts_children(2));
        assert!(model.accepts_children(3));
        assert!(!model.accepts_children(99));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "parent of track")]
    fn rejects_missing_parent_in_debug() {
        let mut model = TrackModel::new();
        model.insert(info(2, TrackKind::Normal, Some(1)));
    }
}
