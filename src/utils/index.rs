pub fn format_duration(millis: i64) -> String {
    let millis = millis.max(0);
    let secs = millis / 1000;
    let ms = millis % 1000;
    if secs >= 60 {
        format!("{}m {}s {}ms", secs / 60, secs % 60, ms)
    } else if secs > 0 {
        format!("{}s {}ms", secs, ms)
    } else {
        format!("{}ms", ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_magnitude() {
        assert_eq!(format_duration(345), "345ms");
        assert_eq!(format_duration(2_345), "2s 345ms");
        assert_eq!(format_duration(72_345), "1m 12s 345ms");
        assert_eq!(format_duration(-5), "0ms");
    }
}
