//! Builtin input plugins.
//!
//! | Name | Sequence |
//! |------|----------|
//! | `static` | `count` timestamps at the moment generation starts |
//! | `timestamps` | explicit list of datetimes, sorted |
//! | `linspace` | `count` evenly spaced points between `start` and `end` |
//! | `timer` | `count` timestamps every `seconds`, optionally `repeat` times |
//! | `cron` | `count` timestamps at every tick of a cron `expression` |

pub mod cron;
pub mod linspace;
pub mod static_input;
pub mod timer;
pub mod timestamps;

use chrono::{DateTime, TimeDelta, Utc};

/// Offset a timestamp by a number of microseconds, saturating on overflow.
pub(crate) fn offset_micros(base: DateTime<Utc>, micros: i128) -> DateTime<Utc> {
    let micros = micros.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
    base.checked_add_signed(TimeDelta::microseconds(micros))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
