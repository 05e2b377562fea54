//! Termination of a sweep over the device's circular log.
//!
//! The log is exposed through one register. Each read returns the next record and the
//! device wraps around to the oldest record after the newest, so the reader has to detect
//! the wrap itself: the first record of a sweep is remembered and the sweep ends when a
//! record of the same type and day comes round again, or after a fixed number of frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::frame::{DecodedFrame, FrameKind};

/// Counts operations that rewind the log cursor on the device.
///
/// Any read or write of the clock endpoint moves the cursor back to its start, which
/// invalidates a sweep in progress. Readers on the same connection share one epoch.
#[derive(Debug, Clone, Default)]
pub struct CursorEpoch(Arc<AtomicU64>);

impl CursorEpoch {
    pub fn advance(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSweepState {
    pub first_type: Option<FrameKind>,
    pub first_day: Option<i64>,
    pub frames_seen: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStep {
    Continue,
    Complete,
}

#[derive(Debug)]
pub struct LogReadoutSession {
    state: LogSweepState,
    max_frames: u32,
    epoch: Option<u64>,
}

impl LogReadoutSession {
    pub fn new(max_frames: u32) -> Self {
        Self {
            state: LogSweepState::default(),
            max_frames,
            epoch: None,
        }
    }

    pub fn state(&self) -> &LogSweepState {
        &self.state
    }

    /// Forget the sentinel and the frame count.
    pub fn restart(&mut self) {
        self.state = LogSweepState::default();
    }

    /// Restart if the cursor has been rewound since the last call. Returns `true` on restart.
    pub fn sync_cursor(&mut self, epoch: u64) -> bool {
        let rewound = self.epoch.is_some_and(|seen| seen != epoch);
        self.epoch = Some(epoch);
        if rewound {
            self.restart();
        }
        rewound
    }

    pub fn observe(&mut self, frame: &DecodedFrame) -> SweepStep {
        let day = frame.get("day_counter").and_then(|value| value.as_int());
        self.observe_entry(frame.kind, day)
    }

    pub fn observe_entry(&mut self, kind: FrameKind, day: Option<i64>) -> SweepStep {
        self.state.frames_seen += 1;
        if self.state.frames_seen >= self.max_frames {
            return SweepStep::Complete;
        }

        let Some(first_type) = self.state.first_type else {
            self.state.first_type = Some(kind);
            self.state.first_day = day;
            return SweepStep::Continue;
        };

        if first_type == kind && self.state.first_day == day {
            SweepStep::Complete
        } else {
            SweepStep::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FrameKind::{LogDays, LogExtended};

    #[test]
    fn test_wrap_completes_on_repeat() {
        let mut session = LogReadoutSession::new(180);
        let entries = [(LogDays, 1), (LogExtended, 1), (LogDays, 2), (LogExtended, 2)];
        for (kind, day) in entries {
            assert_eq!(session.observe_entry(kind, Some(day)), SweepStep::Continue);
        }
        assert_eq!(session.observe_entry(LogDays, Some(1)), SweepStep::Complete);
        assert_eq!(session.state().frames_seen, 5);
    }

    #[test]
    fn test_same_type_other_day_continues() {
        let mut session = LogReadoutSession::new(180);
        session.observe_entry(LogDays, Some(4));
        assert_eq!(session.observe_entry(LogDays, Some(5)), SweepStep::Continue);
        assert_eq!(session.observe_entry(LogExtended, Some(4)), SweepStep::Continue);
    }

    #[test]
    fn test_cap_completes_without_repeat() {
        let mut session = LogReadoutSession::new(3);
        assert_eq!(session.observe_entry(LogDays, Some(1)), SweepStep::Continue);
        assert_eq!(session.observe_entry(LogDays, Some(2)), SweepStep::Continue);
        assert_eq!(session.observe_entry(LogDays, Some(3)), SweepStep::Complete);
    }

    #[test]
    fn test_restart_forgets_sentinel() {
        let mut session = LogReadoutSession::new(180);
        session.observe_entry(LogDays, Some(1));
        session.observe_entry(LogDays, Some(2));
        session.restart();
        assert_eq!(session.state(), &LogSweepState::default());
        assert_eq!(session.observe_entry(LogDays, Some(2)), SweepStep::Continue);
        assert_eq!(session.observe_entry(LogDays, Some(2)), SweepStep::Complete);
    }

    #[test]
    fn test_cursor_rewind_restarts() {
        let epoch = CursorEpoch::default();
        let mut session = LogReadoutSession::new(180);
        assert!(!session.sync_cursor(epoch.current()));
        session.observe_entry(LogDays, Some(1));

        assert!(!session.sync_cursor(epoch.current()));
        assert_eq!(session.state().frames_seen, 1);

        epoch.advance();
        assert!(session.sync_cursor(epoch.current()));
        assert_eq!(session.state().frames_seen, 0);
    }
}
