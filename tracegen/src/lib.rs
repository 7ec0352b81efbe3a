use thiserror::Error;

pub mod annotation;
pub mod clock;
pub mod config;
pub mod global;
pub mod ids;
pub mod intern;
pub mod packet;
pub mod reader;
pub mod session;
pub mod sink;
pub mod track;
pub mod writer;

pub use annotation::{Args, DebugValue};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use intern::SourceLocation;
pub use packet::{CounterValue, Event, EventKind, EventOptions};
pub use session::{Scope, Session, SessionStats};
pub use sink::SharedBuffer;
pub use track::{
    CounterTrack, GroupTrack, NormalTrack, ProcessTrack, SliceTrack, TrackHandle, TrackKind,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("trace decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("trace sink failed, {dropped} packets lost: {source}")]
    SinkFailed {
        dropped: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("a trace session is already open")]
    SessionAlreadyOpen,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Builds an ordered annotation list: `args! { "key" => value, ... }`.
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<(::std::string::String, $crate::DebugValue)>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        ::std::vec![$((::std::string::String::from($key), $crate::DebugValue::from($value))),+]
    };
}

/// Source location of the invocation site, with the module path standing in
/// for the function name.
#[macro_export]
macro_rules! source_location {
    () => {
        $crate::SourceLocation::new(file!(), module_path!(), line!())
    };
}
