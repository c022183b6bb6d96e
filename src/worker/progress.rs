//! Progress markers printed by the simulation executables.
//!
//! ```text
//! Trace ETA 7.2 [min] % 2 12 22 32 42
//! Trace ETA 1.55611 [h] % 0
//! Trace ETA 53 [s] % 20 30 40 50 60 70 80 90
//! 55
//! ```

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TRACE_ETA: Regex =
        Regex::new(r"^Trace ETA (?P<time>\d+\.?\d*) \[(?P<unit>\w+)\] %.* (?P<percent>\d+)\s*$")
            .unwrap();
    static ref BARE_PERCENT: Regex = Regex::new(r"^(?P<percent>\d+) $").unwrap();
}

/// Values extracted from a single output line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// Seconds remaining. `None` leaves the previous estimate in place.
    pub eta: Option<f64>,
    pub percent: u8,
}

/// Parses one complete line (without its terminator). Holds no state between calls.
pub fn parse_line(line: &str) -> Option<ProgressUpdate> {
    if let Some(caps) = TRACE_ETA.captures(line) {
        let time: f64 = caps["time"].parse().ok()?;
        // Unknown units still carry a percent; the estimate becomes unknown.
        let eta = match &caps["unit"] {
            "s" => time,
            "min" => time * 60.0,
            "h" => time * 3600.0,
            _ => 0.0,
        };
        return Some(ProgressUpdate {
            eta: Some(eta),
            percent: parse_percent(&caps["percent"])?,
        });
    }

    let caps = BARE_PERCENT.captures(line)?;
    Some(ProgressUpdate {
        eta: None,
        percent: parse_percent(&caps["percent"])?,
    })
}

fn parse_percent(digits: &str) -> Option<u8> {
    let value: u64 = digits.parse().ok()?;
    Some(value.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eta_of(line: &str) -> f64 {
        parse_line(line).and_then(|u| u.eta).unwrap()
    }

    #[test]
    fn test_trace_eta_minutes() {
        let update = parse_line("Trace ETA 7.2 [min] % 2 12 22 32 42").unwrap();
        assert_eq!(update.percent, 42);
        assert!((update.eta.unwrap() - 432.0).abs() < 1e-9);
    }

    #[test]
    fn test_trace_eta_hours_at_zero_percent() {
        let update = parse_line("Trace ETA 1.55611 [h] % 0").unwrap();
        assert_eq!(update.percent, 0);
        assert!((update.eta.unwrap() - 5601.996).abs() < 1e-6);
    }

    #[test]
    fn test_trace_eta_seconds() {
        assert_eq!(eta_of("Trace ETA 53 [s] % 20 30 40 50 60 70 80 90"), 53.0);
        assert_eq!(
            parse_line("Trace ETA 53 [s] % 20 30 40 50 60 70 80 90").unwrap().percent,
            90
        );
    }

    #[test]
    fn test_unknown_unit_clears_estimate() {
        let update = parse_line("Trace ETA 3 [d] % 10").unwrap();
        assert_eq!(update.eta, Some(0.0));
        assert_eq!(update.percent, 10);
    }

    #[test]
    fn test_bare_percent_leaves_eta_alone() {
        assert_eq!(
            parse_line("55 "),
            Some(ProgressUpdate {
                eta: None,
                percent: 55
            })
        );
    }

    #[test]
    fn test_non_matching_lines() {
        for line in [
            "",
            "55",
            " 55 ",
            "55 60 ",
            "Trace ETA [s] % 20",
            "Trace ETA 53 [s] 20",
            "Detector: sample_I=1.2e-05 sample_ERR=3e-07 sample_N=12",
            "Save [Single_Hexagonal_Channel]",
        ] {
            assert_eq!(parse_line(line), None, "line {:?}", line);
        }
    }

    #[test]
    fn test_percent_is_capped() {
        assert_eq!(parse_line("250 ").unwrap().percent, 100);
    }
}
