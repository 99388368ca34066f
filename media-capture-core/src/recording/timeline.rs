use crate::models::sample::MediaTime;

/// Maps source timestamps onto the file timeline.
///
/// Paused intervals are cut out: after a resume, the first appended sample
/// is pulled back so it starts where the last pre-pause sample ended, and
/// every later sample shifts by the same accumulated offset.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    offset: MediaTime,
    last_end: Option<MediaTime>,
    resume_pending: bool,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pause happened; the next mapped sample closes the gap.
    pub fn mark_pause(&mut self) {
        self.resume_pending = true;
    }

    /// Total time removed so far.
    pub fn offset(&self) -> MediaTime {
        self.offset
    }

    /// File-timeline timestamp for a sample at `pts` lasting `duration`.
    pub fn map(&mut self, pts: MediaTime, duration: MediaTime) -> MediaTime {
        if self.resume_pending {
            self.resume_pending = false;
            if let Some(last_end) = self.last_end {
                if pts > last_end {
                    self.offset = self.offset + (pts - last_end);
                }
            }
        }
        let end = pts + duration;
        self.last_end = Some(self.last_end.map_or(end, |last| last.max(end)));
        pts - self.offset
    }
}
