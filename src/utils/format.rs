use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DisplayPrecision {
    /// `hh:mm:ss`
    Seconds,
    /// `hh:mm:ss.cc`
    Centiseconds,
}

impl Default for DisplayPrecision {
    fn default() -> Self {
        DisplayPrecision::Seconds
    }
}

/// Render an elapsed duration as a stopwatch string.
///
/// Truncates toward zero at the requested precision: 1999 ms is `00:00:01`
/// (or `00:00:01.99`), never `00:00:02`. Hours keep growing past 99.
pub fn format_elapsed(elapsed_ms: u64, precision: DisplayPrecision) -> String {
    let total_secs = elapsed_ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    match precision {
        DisplayPrecision::Seconds => format!("{hours:02}:{minutes:02}:{seconds:02}"),
        DisplayPrecision::Centiseconds => {
            let centis = (elapsed_ms % 1000) / 10;
            format!("{hours:02}:{minutes:02}:{seconds:02}.{centis:02}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_renders_as_zero_clock() {
        assert_eq!(format_elapsed(0, DisplayPrecision::Seconds), "00:00:00");
        assert_eq!(format_elapsed(0, DisplayPrecision::Centiseconds), "00:00:00.00");
    }

    #[test]
    fn truncates_instead_of_rounding() {
        assert_eq!(format_elapsed(1999, DisplayPrecision::Seconds), "00:00:01");
        assert_eq!(format_elapsed(1999, DisplayPrecision::Centiseconds), "00:00:01.99");
        assert_eq!(format_elapsed(1009, DisplayPrecision::Centiseconds), "00:00:01.00");
    }

    #[test]
    fn carries_into_minutes_and_hours() {
        assert_eq!(format_elapsed(61_000, DisplayPrecision::Seconds), "00:01:01");
        assert_eq!(format_elapsed(3_723_450, DisplayPrecision::Centiseconds), "01:02:03.45");
        assert_eq!(format_elapsed(360_000_000, DisplayPrecision::Seconds), "100:00:00");
    }
}
