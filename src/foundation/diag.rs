use std::collections::VecDeque;

use crate::foundation::core::Vec2;

const INVALID_LOG_CAPACITY: usize = 64;

/// One invalid value observed while deforming, kept in a bounded log.
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidRecord {
    /// Stage tag, e.g. `"sanitize"` or `"pendulum:torqueNaN"`.
    pub context: String,
    /// Diagnostic frame in which the value was seen.
    pub frame: u64,
    /// Vertex / control point index (0 for whole-frame failures).
    pub index: usize,
    /// Offending value (zeroed if it was not representable).
    pub value: Vec2,
    /// Consecutive frames this index has been invalid, including this one.
    pub consecutive: u32,
    /// Total invalid observations for this index.
    pub total: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct IndexStats {
    total: u32,
    consecutive: u32,
    last_frame: u64,
    streak_start: u64,
    flagged: bool,
}

/// Per-deformer frame-scoped invalid-value bookkeeping.
#[derive(Clone, Debug)]
pub(crate) struct Diagnostics {
    frame: u64,
    frame_active: bool,
    invalid_this_frame: bool,
    invalid_frames: u64,
    consecutive_invalid_frames: u32,
    total_invalid: u64,
    per_index: Vec<IndexStats>,
    log: VecDeque<InvalidRecord>,
    last_context: Option<String>,
    debug_trace: bool,
}

impl Diagnostics {
    pub(crate) fn new(debug_trace: bool) -> Self {
        Self {
            frame: 0,
            frame_active: false,
            invalid_this_frame: false,
            invalid_frames: 0,
            consecutive_invalid_frames: 0,
            total_invalid: 0,
            per_index: Vec::new(),
            log: VecDeque::with_capacity(INVALID_LOG_CAPACITY),
            last_context: None,
            debug_trace,
        }
    }

    /// Open a diagnostic frame. Returns `false` if one is already open, in which case the caller
    /// must not close it.
    pub(crate) fn begin_frame(&mut self) -> bool {
        if self.frame_active {
            return false;
        }
        self.frame_active = true;
        self.frame += 1;
        self.invalid_this_frame = false;
        for s in &mut self.per_index {
            s.flagged = false;
        }
        true
    }

    pub(crate) fn end_frame(&mut self) {
        if !self.frame_active {
            return;
        }
        if self.invalid_this_frame {
            self.invalid_frames += 1;
            self.consecutive_invalid_frames += 1;
        } else {
            self.consecutive_invalid_frames = 0;
        }
        let frame = self.frame;
        for (index, s) in self.per_index.iter_mut().enumerate() {
            if !s.flagged && s.consecutive > 0 {
                tracing::debug!(
                    index,
                    frame,
                    lasted_frames = s.consecutive,
                    total = s.total,
                    first_frame = s.streak_start,
                    "invalid_recovered"
                );
                s.consecutive = 0;
                s.streak_start = 0;
            }
        }
        self.frame_active = false;
    }

    /// Record an invalid value at `index` in the current frame.
    pub(crate) fn record(&mut self, context: &str, index: usize, value: Vec2) {
        if self.per_index.len() <= index {
            self.per_index.resize(index + 1, IndexStats::default());
        }
        self.invalid_this_frame = true;
        self.total_invalid += 1;
        let frame = self.frame;
        let s = &mut self.per_index[index];
        if s.flagged {
            s.total += 1;
        } else {
            s.flagged = true;
            s.total += 1;
            if s.streak_start == 0 {
                s.streak_start = frame;
            }
            s.consecutive = if s.consecutive > 0 && frame == s.last_frame + 1 {
                s.consecutive + 1
            } else {
                1
            };
        }
        s.last_frame = frame;
        let (consecutive, total) = (s.consecutive, s.total);

        if consecutive == 1 {
            tracing::warn!(context, frame, index, consecutive, total, "invalid_deformation");
        } else if self.debug_trace {
            tracing::debug!(context, frame, index, consecutive, total, x = value.x, y = value.y, "invalid_deformation");
        }

        if self.log.len() == INVALID_LOG_CAPACITY {
            self.log.pop_front();
        }
        let value = if value.is_finite() { value } else { Vec2::ZERO };
        self.log.push_back(InvalidRecord {
            context: context.to_string(),
            frame,
            index,
            value,
            consecutive,
            total,
        });
        self.last_context = Some(context.to_string());
    }

    pub(crate) fn frame(&self) -> u64 {
        self.frame
    }

    pub(crate) fn invalid_this_frame(&self) -> bool {
        self.invalid_this_frame
    }

    pub(crate) fn invalid_frames(&self) -> u64 {
        self.invalid_frames
    }

    pub(crate) fn consecutive_invalid_frames(&self) -> u32 {
        self.consecutive_invalid_frames
    }

    pub(crate) fn total_invalid(&self) -> u64 {
        self.total_invalid
    }

    pub(crate) fn last_context(&self) -> Option<&str> {
        self.last_context.as_deref()
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &InvalidRecord> {
        self.log.iter()
    }

    /// Forget every counter and the log; the frame counter keeps running.
    pub(crate) fn reset(&mut self) {
        self.invalid_this_frame = false;
        self.invalid_frames = 0;
        self.consecutive_invalid_frames = 0;
        self.total_invalid = 0;
        self.per_index.clear();
        self.log.clear();
        self.last_context = None;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/diag.rs"]
mod tests;
