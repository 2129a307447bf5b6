//! Human-readable duration and currency rendering

/// Render a stay length such as "1 hour 30 minutes".
///
/// Each unit is pluralized on its own and a zero-valued unit is omitted,
/// except that a zero-minute stay still reads "0 minutes".
pub fn humanize(minutes: u64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    match (hours, mins) {
        (0, m) => unit(m, "minute"),
        (h, 0) => unit(h, "hour"),
        (h, m) => format!("{} {}", unit(h, "hour"), unit(m, "minute")),
    }
}

fn unit(count: u64, name: &str) -> String {
    if count == 1 {
        format!("{count} {name}")
    } else {
        format!("{count} {name}s")
    }
}

/// Render a whole-currency amount, e.g. "KES 150"
pub fn format_amount(currency: &str, amount: u64) -> String {
    format!("{currency} {amount}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(0), "0 minutes");
        assert_eq!(humanize(1), "1 minute");
        assert_eq!(humanize(59), "59 minutes");
        assert_eq!(humanize(60), "1 hour");
        assert_eq!(humanize(61), "1 hour 1 minute");
        assert_eq!(humanize(90), "1 hour 30 minutes");
        assert_eq!(humanize(120), "2 hours");
        assert_eq!(humanize(121), "2 hours 1 minute");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount("KES", 150), "KES 150");
        assert_eq!(format_amount("KES", 0), "KES 0");
    }
}
