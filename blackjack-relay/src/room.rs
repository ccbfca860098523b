use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::debug;

use crate::frame::Frame;

pub type ParticipantId = u64;

/// Number of frames a room keeps for replay when nothing else is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Anything the room can hand frames to.
///
/// `deliver` runs while the room lock is held, so implementations must only
/// enqueue and never wait on I/O.
pub trait Participant: Send + Sync {
    fn id(&self) -> ParticipantId;
    fn deliver(&self, frame: &Frame);
}

/// Registry of connected participants plus a bounded replay history.
pub struct Room {
    state: Mutex<RoomState>,
    history_limit: usize,
    next_id: AtomicU64,
}

#[derive(Default)]
struct RoomState {
    participants: HashMap<ParticipantId, Arc<dyn Participant>>,
    history: VecDeque<Frame>,
}

impl RoomState {
    fn record(&mut self, frame: &Frame, limit: usize) {
        self.history.push_back(frame.clone());
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            state: Mutex::new(RoomState::default()),
            history_limit,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_participant_id(&self) -> ParticipantId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds `participant` and replays the retained history to it alone.
    ///
    /// Joining twice with the same id is a no-op.
    pub fn join(&self, participant: Arc<dyn Participant>) {
        let mut state = self.lock();
        let id = participant.id();
        if state.participants.contains_key(&id) {
            return;
        }

        for frame in &state.history {
            participant.deliver(frame);
        }
        debug!(participant = id, replayed = state.history.len(), "participant joined room");
        state.participants.insert(id, participant);
    }

    /// Removes the participant, returning whether it was a member.
    pub fn leave(&self, id: ParticipantId) -> bool {
        let removed = self.lock().participants.remove(&id).is_some();
        if removed {
            debug!(participant = id, "participant left room");
        }
        removed
    }

    /// Records `frame` and hands it to every member, the sender included.
    pub fn deliver(&self, frame: &Frame) {
        let mut state = self.lock();
        state.record(frame, self.history_limit);
        for participant in state.participants.values() {
            participant.deliver(frame);
        }
    }

    /// Records `frame` but hands it only to the member with `recipient` as id.
    ///
    /// Returns whether a matching member was found. The frame stays in the
    /// history either way.
    pub fn deliver_to(&self, frame: &Frame, recipient: ParticipantId) -> bool {
        let mut state = self.lock();
        state.record(frame, self.history_limit);
        match state.participants.get(&recipient) {
            Some(participant) => {
                participant.deliver(frame);
                true
            }
            None => false,
        }
    }

    /// Retained frames, oldest first.
    pub fn history(&self) -> Vec<Frame> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn participant_count(&self) -> usize {
        self.lock().participants.len()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.lock().participants.contains_key(&id)
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ActionRecord;

    struct Recorder {
        id: ParticipantId,
        received: Mutex<Vec<Frame>>,
    }

    impl Recorder {
        fn new(id: ParticipantId) -> Arc<Self> {
            Arc::new(Self {
                id,
                received: Mutex::new(Vec::new()),
            })
        }

        fn received(&self) -> Vec<Frame> {
            self.received.lock().expect("recorder lock").clone()
        }
    }

    impl Participant for Recorder {
        fn id(&self) -> ParticipantId {
            self.id
        }

        fn deliver(&self, frame: &Frame) {
            self.received.lock().expect("recorder lock").push(frame.clone());
        }
    }

    fn numbered_frame(n: usize) -> Frame {
        Frame::from_body(format!("frame {n}").into_bytes()).expect("frame")
    }

    #[test]
    fn deliver_reaches_every_member_once() {
        let room = Room::new();
        let members = [Recorder::new(1), Recorder::new(2), Recorder::new(3)];
        for member in &members {
            room.join(member.clone());
        }

        let frame = Frame::from_record(&ActionRecord::hit()).expect("frame");
        room.deliver(&frame);

        for member in &members {
            assert_eq!(member.received(), vec![frame.clone()]);
        }
    }

    #[test]
    fn history_keeps_most_recent_frames() {
        let room = Room::new();
        let total = DEFAULT_HISTORY_LIMIT + 25;
        for n in 0..total {
            room.deliver(&numbered_frame(n));
        }

        let history = room.history();
        assert_eq!(history.len(), DEFAULT_HISTORY_LIMIT);
        let expected: Vec<_> = (total - DEFAULT_HISTORY_LIMIT..total)
            .map(numbered_frame)
            .collect();
        assert_eq!(history, expected);
    }

    #[test]
    fn join_replays_history_in_order() {
        let room = Room::new();
        for n in 0..5 {
            room.deliver(&numbered_frame(n));
        }

        let late = Recorder::new(9);
        room.join(late.clone());
        room.deliver(&numbered_frame(5));

        let expected: Vec<_> = (0..6).map(numbered_frame).collect();
        assert_eq!(late.received(), expected);
    }

    #[test]
    fn joining_twice_does_not_replay_again() {
        let room = Room::new();
        room.deliver(&numbered_frame(0));

        let member = Recorder::new(1);
        room.join(member.clone());
        room.join(member.clone());

        assert_eq!(room.participant_count(), 1);
        assert_eq!(member.received().len(), 1);
    }

    #[test]
    fn leave_stops_delivery() {
        let room = Room::new();
        let stays = Recorder::new(1);
        let goes = Recorder::new(2);
        room.join(stays.clone());
        room.join(goes.clone());

        assert!(room.leave(goes.id));
        assert!(!room.leave(goes.id));
        room.deliver(&numbered_frame(0));

        assert_eq!(stays.received().len(), 1);
        assert!(goes.received().is_empty());
        assert!(!room.contains(goes.id));
    }

    #[test]
    fn deliver_to_targets_one_member() {
        let room = Room::new();
        let members = [Recorder::new(1), Recorder::new(2), Recorder::new(3)];
        for member in &members {
            room.join(member.clone());
        }

        let frame = numbered_frame(0);
        assert!(room.deliver_to(&frame, 2));

        assert!(members[0].received().is_empty());
        assert_eq!(members[1].received(), vec![frame.clone()]);
        assert!(members[2].received().is_empty());
        assert_eq!(room.history(), vec![frame.clone()]);

        let newcomer = Recorder::new(4);
        room.join(newcomer.clone());
        assert_eq!(newcomer.received(), vec![frame]);
    }

    #[test]
    fn deliver_to_missing_member_still_records() {
        let room = Room::new();
        let member = Recorder::new(1);
        room.join(member.clone());

        let frame = numbered_frame(0);
        assert!(!room.deliver_to(&frame, 42));
        assert!(member.received().is_empty());
        assert_eq!(room.history(), vec![frame]);
    }

    #[test]
    fn custom_history_limit_is_respected() {
        let room = Room::with_history_limit(3);
        for n in 0..10 {
            room.deliver(&numbered_frame(n));
        }
        assert_eq!(room.history(), (7..10).map(numbered_frame).collect::<Vec<_>>());
    }

    #[test]
    fn participant_ids_are_unique() {
        let room = Room::new();
        let first = room.next_participant_id();
        let second = room.next_participant_id();
        assert_ne!(first, second);
    }
}
