use serial_test::serial;
use std::collections::HashSet;
use std::thread;
use tracegen::reader;
use tracegen::{args, global, Config, Error, EventKind, Session, SharedBuffer, SliceTrack};

#[test]
#[serial]
fn threads_trace_through_installed_session() {
    let buffer = SharedBuffer::default();
    let session = Session::open(buffer.clone(), Config::default());
    let guard = global::open(&session).unwrap();

    let main_track = global::current_track().expect("installed").uuid();
    let workers: Vec<_> = (0..4)
        .map(|n| {
            thread::Builder::new()
                .name(format!("sorter-{}", n))
                .spawn(move || {
                    global::traced("sort", || {
                        global::instant("INVOKE_THREAD", args! { "n" => n });
                    });
                    global::current_track().map(|t| t.uuid())
                })
                .unwrap()
        })
        .collect();
    let tracks: HashSet<u64> = workers
        .into_iter()
        .filter_map(|w| w.join().unwrap())
        .collect();
    assert_eq!(tracks.len(), 4);
    assert!(!tracks.contains(&main_track));

    guard.close().unwrap();
    assert!(global::session().is_none());

    let view = reader::decode(&buffer.contents()).unwrap();
    for uuid in &tracks {
        let kinds: Vec<EventKind> = view.events_on(*uuid).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::SliceBegin, EventKind::Instant, EventKind::SliceEnd]
        );
        let track = view.track(*uuid).unwrap();
        assert!(track.name.starts_with("sorter-"));
        assert_eq!(track.parent, Some(main_track));
    }
}

#[test]
#[serial]
fn second_session_cannot_be_installed() {
    let first = Session::open(SharedBuffer::default(), Config::default());
    let second = Session::open(SharedBuffer::default(), Config::default());
    let _guard = global::open(&first).unwrap();
    assert!(matches!(
        global::open(&second),
        Err(Error::SessionAlreadyOpen)
    ));
    assert!(global::session().is_some());
}
