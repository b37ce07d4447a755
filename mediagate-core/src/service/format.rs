/// Units walked by `format_size`; anything past the last is rendered in TB
const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Render a byte count with base-1024 units and two decimals
///
/// `None` means the engine did not report a size and renders as "N/A",
/// never as a formatted zero.
#[must_use]
pub fn format_size(size: Option<u64>) -> String {
    let Some(bytes) = size else {
        return "N/A".to_string();
    };

    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} TB")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(rendered: &str) -> (f64, &str) {
        let (value, unit) = rendered.split_once(' ').unwrap();
        (value.parse().unwrap(), unit)
    }

    #[test]
    fn test_absent_size() {
        assert_eq!(format_size(None), "N/A");
    }

    #[test]
    fn test_unit_boundaries() {
        assert_eq!(format_size(Some(0)), "0.00 B");
        assert_eq!(format_size(Some(1023)), "1023.00 B");
        assert_eq!(format_size(Some(1024)), "1.00 KB");
        assert_eq!(format_size(Some(1_048_576)), "1.00 MB");
        assert_eq!(format_size(Some(1_073_741_824)), "1.00 GB");
        assert_eq!(format_size(Some(1_099_511_627_776)), "1.00 TB");
        assert_eq!(format_size(Some(1536)), "1.50 KB");
    }

    #[test]
    fn test_band_and_value_for_many_sizes() {
        let bands = ["B", "KB", "MB", "GB", "TB"];
        let mut size: u64 = 1;
        while size < u64::MAX / 3 {
            let formatted = format_size(Some(size));
            let (value, unit) = parse(&formatted);
            let k = bands.iter().position(|b| *b == unit).unwrap();
            #[allow(clippy::cast_precision_loss)]
            let expected = size as f64 / 1024f64.powi(k as i32);

            assert!((value - expected).abs() <= 0.005 + f64::EPSILON * expected, "{size} -> {value} {unit}");
            if k < 4 {
                assert!(expected < 1024.0, "{size} rendered in too small a unit");
            }
            if k > 0 {
                assert!(size >= 1024u64.pow(k as u32), "{size} rendered in too large a unit");
            }
            size = size * 3 + 1;
        }
    }
}
