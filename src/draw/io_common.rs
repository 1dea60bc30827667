use std::path::Path;

use crate::draw::*;

/// The roster file formats that can be both read and written back.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RosterFormat {
    Csv,
    Excel,
}

impl RosterFormat {
    pub fn from_path(path: &Path) -> DrawResult<RosterFormat> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(RosterFormat::Csv),
            Some("xlsx") => Ok(RosterFormat::Excel),
            _ => UnsupportedFormatSnafu {
                path: path.display().to_string(),
            }
            .fail(),
        }
    }
}

/// Counters that cannot be read are treated as 0. Fractions are truncated.
pub fn counter_from_float(x: f64) -> u32 {
    if !x.is_finite() || x <= 0.0 {
        0
    } else if x >= u32::MAX as f64 {
        u32::MAX
    } else {
        x as u32
    }
}

pub fn parse_counter(s: &str) -> u32 {
    let s = s.trim();
    if let Ok(x) = s.parse::<u32>() {
        return x;
    }
    s.parse::<f64>().map(counter_from_float).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_coerced() {
        assert_eq!(parse_counter(" 4 "), 4);
        assert_eq!(parse_counter("2.9"), 2);
        assert_eq!(parse_counter("-3"), 0);
        assert_eq!(parse_counter(""), 0);
        assert_eq!(parse_counter("abc"), 0);
        assert_eq!(parse_counter("NaN"), 0);
        assert_eq!(counter_from_float(1e12), u32::MAX);
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            RosterFormat::from_path(Path::new("a/names.CSV")).unwrap(),
            RosterFormat::Csv
        );
        assert_eq!(
            RosterFormat::from_path(Path::new("names.xlsx")).unwrap(),
            RosterFormat::Excel
        );
        assert!(RosterFormat::from_path(Path::new("names.ods")).is_err());
        assert!(RosterFormat::from_path(Path::new("names")).is_err());
    }
}
