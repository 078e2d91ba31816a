/// Milliseconds in one UTC calendar day.
pub const DAY_MS: i64 = 86_400_000;

/// Truncate an epoch-millisecond timestamp to the start of its UTC day.
pub fn day_start(ms: i64) -> i64 {
    ms.div_euclid(DAY_MS) * DAY_MS
}

/// Day-aligned timestamps from `start` through `end`, both inclusive.
///
/// Both bounds are aligned first; an inverted range yields nothing.
pub fn days_between(start: i64, end: i64) -> impl Iterator<Item = i64> {
    let first = day_start(start);
    let last = day_start(end);
    let count = if last < first {
        0
    } else {
        (last - first) / DAY_MS + 1
    };
    (0..count).map(move |offset| first + offset * DAY_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_start_truncates() {
        assert_eq!(day_start(0), 0);
        assert_eq!(day_start(DAY_MS - 1), 0);
        assert_eq!(day_start(DAY_MS), DAY_MS);
        assert_eq!(day_start(1_733_529_600_123), 1_733_529_600_000);
    }

    #[test]
    fn day_start_floors_negative_timestamps() {
        assert_eq!(day_start(-1), -DAY_MS);
    }

    #[test]
    fn days_between_is_inclusive() {
        let days: Vec<i64> = days_between(DAY_MS * 10 + 5, DAY_MS * 12 + 99).collect();
        assert_eq!(days, vec![DAY_MS * 10, DAY_MS * 11, DAY_MS * 12]);
    }

    #[test]
    fn days_between_inverted_range_is_empty() {
        assert_eq!(days_between(DAY_MS * 3, DAY_MS).count(), 0);
    }
}
