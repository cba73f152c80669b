//! Queue priority window.

use serde::{Deserialize, Serialize};

/// Inclusive priority bounds used by the scheduler.
///
/// Lower values are served first: `highest` is the most urgent priority a
/// submission may ask for and `lowest` the least urgent. The shutdown
/// sentinel is queued at `lowest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityWindow {
    pub highest: i32,
    pub default: i32,
    pub lowest: i32,
}

impl Default for PriorityWindow {
    fn default() -> Self {
        Self {
            highest: 1,
            default: 5,
            lowest: 10,
        }
    }
}

impl PriorityWindow {
    pub fn contains(&self, priority: i32) -> bool {
        (self.highest..=self.lowest).contains(&priority)
    }

    /// Map `priority` into the window.
    ///
    /// Out-of-window values are replaced by `default`, not clamped. The flag
    /// tells whether a correction happened.
    pub fn coerce(&self, priority: i32) -> (i32, bool) {
        if self.contains(priority) {
            (priority, false)
        } else {
            (self.default, true)
        }
    }

    /// `default` shifted by `offset`, kept inside the window.
    pub fn relative_to_default(&self, offset: i32) -> i32 {
        self.default
            .saturating_add(offset)
            .clamp(self.highest, self.lowest)
    }
}
