//! Time-window planning for windowed metric streams.
//!
//! The upstream insights endpoints reject queries older than a hard
//! history horizon and silently truncate overlong ranges, so windowed
//! streams walk forward in fixed-width slices. Planning is pure; the
//! caller advances the bookmark to `until` after each slice succeeds,
//! which is what guarantees the walk terminates.

use chrono::{DateTime, Duration, Utc};

use graphtap_types::cursor::Bookmark;
use graphtap_types::window::{Window, WindowSpec};

/// Plan the next query window, or `None` when the stream is caught up.
///
/// The start point is the bookmark clamped to the oldest instant the
/// upstream will serve; with no bookmark the whole allowed history is
/// replayed from that floor. The end point is capped at `now` so a
/// window never reaches into the future.
#[must_use]
pub fn plan_next_window(
    bookmark: Option<&Bookmark>,
    spec: &WindowSpec,
    now: DateTime<Utc>,
) -> Option<Window> {
    let floor = now - Duration::days(i64::from(spec.max_history_days));
    let since = match bookmark {
        Some(b) => b.replication_value.max(floor),
        None => floor,
    };
    if since >= now {
        return None;
    }
    let until = (since + Duration::days(i64::from(spec.max_window_days))).min(now);
    Some(Window { since, until })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn bookmark(y: i32, m: u32, d: u32) -> Bookmark {
        Bookmark {
            replication_value: at(y, m, d),
        }
    }

    #[test]
    fn bookmark_inside_horizon_starts_at_bookmark() {
        // now - 860d lands well before the 2024-01-01 cursor.
        let spec = WindowSpec {
            max_history_days: 860,
            max_window_days: 30,
        };
        let window =
            plan_next_window(Some(&bookmark(2024, 1, 1)), &spec, at(2024, 6, 1)).unwrap();
        assert_eq!(window.since, at(2024, 1, 1));
        assert_eq!(window.until, at(2024, 1, 31));
    }

    #[test]
    fn stale_bookmark_clamped_to_history_floor() {
        let spec = WindowSpec {
            max_history_days: 30,
            max_window_days: 30,
        };
        let window =
            plan_next_window(Some(&bookmark(2020, 1, 1)), &spec, at(2024, 6, 1)).unwrap();
        assert_eq!(window.since, at(2024, 5, 2));
        assert_eq!(window.until, at(2024, 6, 1));
    }

    #[test]
    fn missing_bookmark_replays_full_horizon() {
        let spec = WindowSpec {
            max_history_days: 30,
            max_window_days: 7,
        };
        let window = plan_next_window(None, &spec, at(2024, 6, 1)).unwrap();
        assert_eq!(window.since, at(2024, 5, 2));
        assert_eq!(window.until, at(2024, 5, 9));
    }

    #[test]
    fn window_capped_at_now() {
        let spec = WindowSpec {
            max_history_days: 30,
            max_window_days: 30,
        };
        let window =
            plan_next_window(Some(&bookmark(2024, 5, 30)), &spec, at(2024, 6, 1)).unwrap();
        assert_eq!(window.until, at(2024, 6, 1));
    }

    #[test]
    fn caught_up_yields_none() {
        let spec = WindowSpec {
            max_history_days: 30,
            max_window_days: 30,
        };
        let now = at(2024, 6, 1);
        assert!(plan_next_window(Some(&bookmark(2024, 6, 1)), &spec, now).is_none());
        assert!(plan_next_window(Some(&bookmark(2024, 7, 1)), &spec, now).is_none());
    }

    #[test]
    fn successive_windows_terminate() {
        let spec = WindowSpec {
            max_history_days: 90,
            max_window_days: 30,
        };
        let now = at(2024, 6, 1);
        let mut cursor: Option<Bookmark> = None;
        let mut slices = 0;
        while let Some(window) = plan_next_window(cursor.as_ref(), &spec, now) {
            assert!(window.since < window.until);
            cursor = Some(Bookmark {
                replication_value: window.until,
            });
            slices += 1;
            assert!(slices <= 10, "window walk failed to terminate");
        }
        assert_eq!(slices, 3);
        assert_eq!(cursor.unwrap().replication_value, now);
    }
}
