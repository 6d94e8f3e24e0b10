//! Daily streak calculator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Streak fields of an account as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreakState {
    pub current: i32,
    pub longest: i32,
    pub last_activity: Option<NaiveDate>,
    pub freezes_available: i32,
}

/// Result of advancing a streak to `today`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreakUpdate {
    pub current: i32,
    pub longest: i32,
    pub freezes_remaining: i32,
    pub freeze_consumed: bool,
}

/// Advance a streak for activity on `today`.
///
/// Rules:
/// - activity already credited today leaves the streak unchanged,
/// - activity on consecutive days increments,
/// - exactly one missed day is bridged by consuming a streak freeze,
/// - anything else resets the streak to 1.
///
/// `longest >= current` holds on the output whenever it held on the input.
pub fn advance(state: &StreakState, today: NaiveDate) -> StreakUpdate {
    let freezes = state.freezes_available.max(0);
    let (current, freeze_consumed) = match state.last_activity.map(|last| gap_days(last, today)) {
        // Zero covers repeat activity today; negative covers clock skew.
        Some(gap) if gap <= 0 => (state.current.max(1), false),
        Some(1) => (state.current + 1, false),
        Some(2) if freezes > 0 => (state.current + 1, true),
        _ => (1, false),
    };

    StreakUpdate {
        current,
        longest: state.longest.max(current),
        freezes_remaining: if freeze_consumed { freezes - 1 } else { freezes },
        freeze_consumed,
    }
}

fn gap_days(last: NaiveDate, today: NaiveDate) -> i64 {
    (today - last).num_days()
}
