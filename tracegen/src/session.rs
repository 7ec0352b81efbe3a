//! Trace session: the single owner of the output sink, interning tables,
//! identifier allocator and track model.
//!
//! A [`Session`] is a cheap handle that can be cloned into any number of
//! producer threads. All shared state sits behind one mutex that is held for
//! the construction and append of a single packet, never across a caller's
//! scope. Packets therefore appear in lock acquisition order; every event
//! carries its own timestamp and the UI reorders them for display.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::ids::IdAllocator;
use crate::intern::SequenceInterner;
use crate::packet::{self, CounterValue, Event, EventKind, EventOptions};
use crate::track::{
    CounterTrack, NormalTrack, ProcessTrack, TrackHandle, TrackInfo, TrackKind, TrackModel,
};
use crate::writer::{BufferedWriter, WriterStats};
use crate::{Args, Error, Result};
use bon::bon;
use parking_lot::Mutex;
use perfetto_format::{
    child_track_descriptor, clock_snapshot_packet, counter_descriptor, process_track_descriptor,
    sequence_defaults_packet, trace_config_packet, TracePacket,
};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub writer: WriterStats,
    pub pending_packets: usize,
    pub tracks: usize,
    pub interned_names: usize,
    pub interned_locations: usize,
    pub lost_packets: u64,
}

struct State {
    writer: Option<BufferedWriter>,
    ids: IdAllocator,
    interner: SequenceInterner,
    tracks: TrackModel,
    threads: HashMap<ThreadId, u64>,
    root: Option<u64>,
    deferred_error: Option<std::io::Error>,
    lost_packets: u64,
}

impl State {
    fn append(&mut self, packet: TracePacket) {
        let Some(writer) = self.writer.as_mut() else {
            debug!("session closed, dropping packet");
            return;
        };
        if let Err(e) = writer.append(packet) {
            error!(error = %e, "automatic trace flush failed");
            self.defer(e);
        }
    }

    fn defer(&mut self, e: Error) {
        match e {
            Error::SinkFailed { dropped, source } => {
                self.lost_packets += dropped;
                self.deferred_error.get_or_insert(source);
            }
            other => {
                self.deferred_error
                    .get_or_insert_with(|| std::io::Error::other(other.to_string()));
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        let flushed = match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        };
        if let Err(e) = flushed {
            self.defer(e);
        }
        match self.deferred_error.take() {
            Some(source) => Err(Error::SinkFailed {
                dropped: std::mem::take(&mut self.lost_packets),
                source,
            }),
            None => Ok(()),
        }
    }

    fn create_process_track(
        &mut self,
        pid: i32,
        process_name: String,
        track_name: Option<String>,
    ) -> u64 {
        let uuid = self.ids.next_track_uuid();
        let mut info = TrackInfo::new(
            uuid,
            TrackKind::Process,
            track_name.clone().unwrap_or_else(|| process_name.clone()),
            None,
        );
        info.pid = Some(pid);
        self.tracks.insert(info);
        debug!(uuid, pid, process_name = %process_name, "created process track");
        self.append(process_track_descriptor(uuid, pid, process_name, track_name));
        uuid
    }

    fn create_child_track(
        &mut self,
        parent: Option<u64>,
        name: &str,
        kind: TrackKind,
        unit_name: Option<String>,
    ) -> u64 {
        let parent = match parent {
            Some(parent) if self.tracks.accepts_children(parent) => Some(parent),
            Some(parent) => {
                debug_assert!(false, "track {} cannot parent {:?} track {}", parent, kind, name);
                warn!(parent, name, "invalid parent track, creating at root");
                None
            }
            None => None,
        };

        let uuid = self.ids.next_track_uuid();
        self.tracks
            .insert(TrackInfo::new(uuid, kind, name.to_string(), parent));
        let counter = (kind == TrackKind::Counter).then(|| counter_descriptor(unit_name));
        debug!(uuid, ?parent, ?kind, name, "created track");
        self.append(child_track_descriptor(uuid, parent, name.to_string(), counter));
        uuid
    }

    fn thread_track(&mut self, config: &Config) -> u64 {
        let thread = std::thread::current();
        if let Some(&uuid) = self.threads.get(&thread.id()) {
            return uuid;
        }

        let thread_name = thread
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", thread.id()));
        let uuid = match self.root {
            Some(root) => {
                self.create_child_track(Some(root), &thread_name, TrackKind::Normal, None)
            }
            None => {
                let process_name = config
                    .process_name
                    .clone()
                    .or_else(|| std::env::args().next())
                    .unwrap_or_else(|| "tracegen".to_string());
                let root = self.create_process_track(
                    std::process::id() as i32,
                    process_name,
                    Some(thread_name),
                );
                self.root = Some(root);
                root
            }
        };
        self.threads.insert(thread.id(), uuid);
        uuid
    }

    fn emit(&mut self, event: Event, config: &Config) {
        let Some(track) = self.tracks.get_mut(event.track_uuid) else {
            debug_assert!(false, "event on unknown track {}", event.track_uuid);
            warn!(track_uuid = event.track_uuid, "dropping event for unknown track");
            return;
        };

        if cfg!(debug_assertions) {
            match event.kind {
                EventKind::SliceBegin => track.open_slices += 1,
                EventKind::SliceEnd if track.open_slices == 0 => {
                    warn!(
                        track_uuid = track.uuid,
                        track = %track.name,
                        "slice end without matching begin"
                    );
                }
                EventKind::SliceEnd => track.open_slices -= 1,
                _ => {}
            }
        }
        if let Some(CounterValue::Int(value)) = event.counter {
            track.counter_value = value;
        }

        let packet = packet::event_packet(event, &mut self.interner, config.max_annotation_entries);
        self.append(packet);
    }
}

struct Inner {
    state: Mutex<State>,
    config: Config,
    clock: Arc<dyn Clock>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Err(e) = self.state.get_mut().flush() {
            error!(error = %e, "failed to flush trace on session drop");
        }
    }
}

/// Shared handle to one trace session. Clones refer to the same session; the
/// pending batch is flushed when [`Session::close`] is called or the last
/// handle is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[bon]
impl Session {
    #[builder]
    pub fn new(
        sink: Box<dyn Write + Send>,
        #[builder(default)] config: Config,
        clock: Option<Arc<dyn Clock>>,
    ) -> Self {
        let mut writer = BufferedWriter::new(sink, config.flush_threshold);
        let mut state = State {
            writer: None,
            ids: IdAllocator::new(),
            interner: SequenceInterner::new(),
            tracks: TrackModel::new(),
            threads: HashMap::new(),
            root: None,
            deferred_error: None,
            lost_packets: 0,
        };

        for packet in [
            clock_snapshot_packet(),
            trace_config_packet(config.buffer_size_kb, &config.data_source_name),
            sequence_defaults_packet(),
        ] {
            if let Err(e) = writer.append(packet) {
                state.defer(e);
            }
        }
        state.writer = Some(writer);

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                config,
                clock: clock.unwrap_or_else(|| Arc::new(SystemClock)),
            }),
        }
    }
}

impl Session {
    pub fn open(sink: impl Write + Send + 'static, config: Config) -> Self {
        Self::builder().sink(Box::new(sink)).config(config).build()
    }

    /// Creates (truncating) the trace file at `path`.
    pub fn create(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::open(BufWriter::new(file), config))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn same_session(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn now(&self) -> u64 {
        self.inner.clock.now_ns()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State, &Config) -> R) -> R {
        let mut state = self.inner.state.lock();
        f(&mut state, &self.inner.config)
    }

    pub fn create_process_track(
        &self,
        pid: i32,
        name: &str,
        default_track_name: Option<&str>,
    ) -> ProcessTrack {
        let uuid = self.with_state(|state, _| {
            state.create_process_track(
                pid,
                name.to_string(),
                default_track_name.map(str::to_string),
            )
        });
        ProcessTrack(TrackHandle::new(self.clone(), uuid))
    }

    /// Process track with a synthetic pid. `default_track_name` names the
    /// lane the group's own slices are drawn on.
    pub fn create_group(&self, name: &str, default_track_name: Option<&str>) -> ProcessTrack {
        let uuid = self.with_state(|state, _| {
            let pid = state.ids.next_pid();
            state.create_process_track(
                pid,
                name.to_string(),
                default_track_name.map(str::to_string),
            )
        });
        ProcessTrack(TrackHandle::new(self.clone(), uuid))
    }

    /// Counter track at the root of the hierarchy.
    pub fn create_counter_track(&self, name: &str) -> CounterTrack {
        let uuid = self.create_child_track(None, name, TrackKind::Counter, None);
        CounterTrack(TrackHandle::new(self.clone(), uuid))
    }

    pub(crate) fn create_child_track(
        &self,
        parent: Option<u64>,
        name: &str,
        kind: TrackKind,
        unit_name: Option<String>,
    ) -> u64 {
        self.with_state(|state, _| state.create_child_track(parent, name, kind, unit_name))
    }

    pub(crate) fn emit(&self, event: Event) {
        self.with_state(|state, config| state.emit(event, config));
    }

    pub(crate) fn increment_counter(&self, uuid: u64, timestamp: u64, delta: i64) {
        self.with_state(|state, config| {
            let value = state
                .tracks
                .get(uuid)
                .map_or(0, |track| track.counter_value)
                .saturating_add(delta);
            state.emit(Event::counter(uuid, timestamp, CounterValue::Int(value)), config);
        });
    }

    pub(crate) fn begin_scope(&self, uuid: u64, name: &str, options: EventOptions) -> Scope {
        let timestamp = self.now();
        self.emit(Event::slice_begin(uuid, timestamp, name, options));
        Scope::new(self.clone(), uuid)
    }

    /// The calling thread's track. The first thread to ask becomes the root
    /// process track; later threads get a child track of it.
    pub fn current_track(&self) -> NormalTrack {
        let uuid = self.with_state(|state, config| state.thread_track(config));
        NormalTrack(TrackHandle::new(self.clone(), uuid))
    }

    pub fn trace_scope(&self, name: &str, args: Args) -> Scope {
        self.trace_scope_with(name, EventOptions::with_args(args))
    }

    /// Opens a slice on the calling thread's track; it is closed when the
    /// returned scope drops, including during unwinding.
    pub fn trace_scope_with(&self, name: &str, options: EventOptions) -> Scope {
        let timestamp = self.now();
        let uuid = self.with_state(|state, config| {
            let uuid = state.thread_track(config);
            state.emit(Event::slice_begin(uuid, timestamp, name, options), config);
            uuid
        });
        Scope::new(self.clone(), uuid)
    }

    pub fn instant(&self, name: &str, args: Args) {
        self.instant_with(name, EventOptions::with_args(args));
    }

    pub fn instant_with(&self, name: &str, options: EventOptions) {
        let timestamp = self.now();
        self.with_state(|state, config| {
            let uuid = state.thread_track(config);
            state.emit(Event::instant(uuid, timestamp, name, options), config);
        });
    }

    pub fn allocate_flow_ids(&self, n: usize) -> Vec<u64> {
        self.with_state(|state, _| state.ids.next_flow_ids(n))
    }

    /// Writes the pending batch. Also reports sink failures from earlier
    /// automatic flushes, together with the number of packets they lost.
    pub fn flush(&self) -> Result<()> {
        self.with_state(|state, _| state.flush())
    }

    /// Flushes and releases the sink. Later events on any clone of this
    /// session are dropped.
    pub fn close(&self) -> Result<()> {
        self.with_state(|state, _| {
            let result = state.flush();
            if state.writer.take().is_some() {
                debug!("trace session closed");
            }
            result
        })
    }

    pub fn is_closed(&self) -> bool {
        self.with_state(|state, _| state.writer.is_none())
    }

    pub fn stats(&self) -> SessionStats {
        self.with_state(|state, _| SessionStats {
            writer: state
                .writer
                .as_ref()
                .map(BufferedWriter::stats)
                .unwrap_or_default(),
            pending_packets: state.writer.as_ref().map_or(0, BufferedWriter::pending),
            tracks: state.tracks.len(),
            interned_names: state.interner.event_name_count(),
            interned_locations: state.interner.source_location_count(),
            lost_packets: state.lost_packets,
        })
    }
}

/// Open slice on one track. Dropping it records the matching slice end,
/// carrying any flow ids attached to the scope.
#[must_use = "the slice ends as soon as the scope is dropped"]
pub struct Scope {
    session: Session,
    track_uuid: u64,
    flows: Vec<u64>,
}

impl Scope {
    fn new(session: Session, track_uuid: u64) -> Self {
        Self {
            session,
            track_uuid,
            flows: Vec::new(),
        }
    }

    pub fn track_uuid(&self) -> u64 {
        self.track_uuid
    }

    /// Reserves flow ids leaving this slice. Hand them to the receiving side,
    /// which attaches them to its own event.
    pub fn allocate_flow_ids(&mut self, n: usize) -> Vec<u64> {
        let ids = self.session.allocate_flow_ids(n);
        self.flows.extend_from_slice(&ids);
        ids
    }

    pub fn attach_incoming_flow_ids(&mut self, ids: &[u64]) {
        self.flows.extend_from_slice(ids);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("track_uuid", &self.track_uuid)
            .field("flows", &self.flows)
            .finish()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let timestamp = self.session.now();
        let flows = std::mem::take(&mut self.flows);
        self.session
            .emit(Event::slice_end(self.track_uuid, timestamp, flows));
    }
}
