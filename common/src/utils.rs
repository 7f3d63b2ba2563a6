/// 把字节数格式化为人类可读的 1024 进制字符串
pub fn format_bytes(bytes: i64) -> String {
    const UNIT: i64 = 1024;
    const UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!("{:.2} {}B", bytes as f64 / div as f64, UNITS[exp])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_stay_in_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
    }

    #[test]
    fn kilobytes() {
        assert_eq!(format_bytes(1536), "1.50 KB");
    }

    #[test]
    fn gigabytes() {
        assert_eq!(format_bytes(1_073_741_824), "1.00 GB");
    }

    #[test]
    fn megabytes() {
        assert_eq!(format_bytes(100 * 1024 * 1024), "100.00 MB");
    }
}
