//! Process-wide session slot for code that cannot thread a [`Session`]
//! handle through its call graph.
//!
//! At most one session is installed at a time. While nothing is installed
//! the free functions here are no-ops, so instrumented code can stay in
//! place when tracing is off.

use crate::session::{Scope, Session};
use crate::track::NormalTrack;
use crate::{Args, Error, Result};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::{debug, error};

static ACTIVE: ArcSwapOption<Session> = ArcSwapOption::const_empty();

/// Installs `session` as the process-wide session until the returned guard
/// is closed or dropped.
pub fn open(session: &Session) -> Result<GlobalGuard> {
    let previous = ACTIVE.compare_and_swap(&None::<Arc<Session>>, Some(Arc::new(session.clone())));
    if (*previous).is_some() {
        return Err(Error::SessionAlreadyOpen);
    }
    debug!("installed global trace session");
    Ok(GlobalGuard {
        session: Some(session.clone()),
    })
}

/// The installed session, if any.
pub fn session() -> Option<Session> {
    ACTIVE.load_full().map(|session| Session::clone(&session))
}

pub fn is_active() -> bool {
    ACTIVE.load().is_some()
}

/// Opens a slice on the calling thread's track of the installed session.
pub fn trace(name: &str, args: Args) -> Option<Scope> {
    session().map(|session| session.trace_scope(name, args))
}

/// Runs `f` inside a slice named `name`.
pub fn traced<R>(name: &str, f: impl FnOnce() -> R) -> R {
    let _scope = trace(name, Args::new());
    f()
}

pub fn instant(name: &str, args: Args) {
    if let Some(session) = session() {
        session.instant(name, args);
    }
}

pub fn current_track() -> Option<NormalTrack> {
    session().map(|session| session.current_track())
}

/// Keeps a session installed in the global slot.
#[must_use = "the session is uninstalled when the guard drops"]
#[derive(Debug)]
pub struct GlobalGuard {
    session: Option<Session>,
}

impl GlobalGuard {
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Uninstalls the session and flushes it. The session itself stays
    /// open for holders of other handles.
    pub fn close(mut self) -> Result<()> {
        self.uninstall()
    }

    fn uninstall(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        if ACTIVE
            .load_full()
            .is_some_and(|active| active.same_session(&session))
        {
            ACTIVE.store(None);
            debug!("uninstalled global trace session");
        }
        session.flush()
    }
}

impl Drop for GlobalGuard {
    fn drop(&mut self) {
        if let Err(e) = self.uninstall() {
            error!(error = %e, "failed to flush global trace session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader;
    use crate::{args, Config, EventKind, SharedBuffer};
    use serial_test::serial;

    fn session() -> (Session, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Session::open(buffer.clone(), Config::default()), buffer)
    }

    #[test]
    #[serial]
    fn free_functions_are_noops_without_session() {
        assert!(!is_active());
        assert!(trace("nothing", args! {}).is_none());
        instant("nothing", args! {});
        assert!(current_track().is_none());
        assert_eq!(traced("nothing", || 7), 7);
    }

    #[test]
    #[serial]
    fn nested_open_is_rejected() {
        let (first, _) = session();
        let (second, _) = session();
        let guard = open(&first).unwrap();
        assert!(matches!(open(&second), Err(Error::SessionAlreadyOpen)));
        guard.close().unwrap();

        let guard = open(&second).unwrap();
        drop(guard);
        assert!(!is_active());
    }

    #[test]
    #[serial]
    fn guard_close_flushes_recorded_events() {
        let (session, buffer) = session();
        let guard = open(&session).unwrap();
        {
            let _outer = trace("outer", args! { "n" => 1 });
            instant("mark", args! {});
            traced("inner", || ());
        }
        guard.close().unwrap();
        assert!(!session.is_closed());

        let view = reader::decode(&buffer.contents()).unwrap();
        let kinds: Vec<EventKind> = view.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::SliceBegin,
                EventKind::Instant,
                EventKind::SliceBegin,
                EventKind::SliceEnd,
                EventKind::SliceEnd
            ]
        );
    }
}
