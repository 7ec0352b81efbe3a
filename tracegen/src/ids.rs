/// First uuid handed out to a track. Uuids below it are reserved for the
/// sequence defaults and clock bookkeeping.
pub const FIRST_TRACK_UUID: u64 = 1_234_567;

/// Monotonic identifier source for one session. Not synchronized on its own:
/// it lives inside the session state and is only touched under its lock.
#[derive(Debug)]
pub struct IdAllocator {
    next_track_uuid: u64,
    next_flow_id: u64,
    next_pid: i32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next_track_uuid: FIRST_TRACK_UUID,
            next_flow_id: 1,
            next_pid: 1,
        }
    }

    pub fn next_track_uuid(&mut self) -> u64 {
        let uuid = self.next_track_uuid;
        self.next_track_uuid += 1;
        uuid
    }

    pub fn next_flow_ids(&mut self, n: usize) -> Vec<u64> {
        let start = self.next_flow_id;
        self.next_flow_id += n as u64;
        (start..self.next_flow_id).collect()
    }

    /// Synthetic pid for groups that are not bound to a real process.
    pub fn next_pid(&mut self) -> i32 {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_uuids_start_above_reserved_ids() {
        let mut ids = IdAllocator::new();
        let first = ids.next_track_uuid();
        assert_eq!(first, FIRST_TRACK_UUID);
        assert!(first > perfetto_format::DEFAULT_TRACK_UUID);
        assert_eq!(ids.next_track_uuid(), first + 1);
    }

    #[test]
    fn flow_ids_never_repeat() {
        let mut ids = IdAllocator::new();
        let a = ids.next_flow_ids(3);
        let b = ids.next_flow_ids(0);
        let c = ids.next_flow_ids(2);
        assert_eq!(a, vec![1, 2, 3]);
        assert!(b.is_empty());
        assert_eq!(c, vec![4, 5]);
    }

    #[test]
    fn pids_count_from_one() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.next_pid(), 1);
        assert_eq!(ids.next_pid(), 2);
    }
}
