//! Human-readable time strings.

/// `MM:SS`; minutes keep counting past 59
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// `"1h 5min"` or `"45min"`
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{}h {}min", hours, minutes)
    } else {
        format!("{}min", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(95), "01:35");
        assert_eq!(format_clock(3725), "62:05");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(59), "0min");
        assert_eq!(format_duration(2700), "45min");
        assert_eq!(format_duration(3900), "1h 5min");
    }
}
