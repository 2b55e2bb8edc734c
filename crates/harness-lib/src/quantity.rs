//! Kubernetes resource quantity parsing for usage samples

/// Parse a CPU quantity (`250m`, `1`, `1500000n`, `12u`) into millicores
pub fn cpu_millicores(quantity: &str) -> Option<u64> {
    let q = quantity.trim();
    if let Some(n) = q.strip_suffix('n') {
        return n.parse::<u64>().ok().map(|v| v / 1_000_000);
    }
    if let Some(u) = q.strip_suffix('u') {
        return u.parse::<u64>().ok().map(|v| v / 1_000);
    }
    if let Some(m) = q.strip_suffix('m') {
        return m.parse::<u64>().ok();
    }
    q.parse::<f64>().ok().map(|cores| (cores * 1000.0).round() as u64)
}

/// Parse a memory quantity (`128Mi`, `1Gi`, `500M`, `1024`) into bytes
pub fn memory_bytes(quantity: &str) -> Option<u64> {
    const SUFFIXES: &[(&str, u64)] = &[
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("k", 1_000),
        ("K", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];

    let q = quantity.trim();
    for (suffix, multiplier) in SUFFIXES {
        if let Some(value) = q.strip_suffix(suffix) {
            return value.parse::<u64>().ok().map(|v| v * multiplier);
        }
    }
    q.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_quantities() {
        assert_eq!(cpu_millicores("250m"), Some(250));
        assert_eq!(cpu_millicores("2"), Some(2000));
        assert_eq!(cpu_millicores("0.5"), Some(500));
        assert_eq!(cpu_millicores("1500000n"), Some(1));
        assert_eq!(cpu_millicores("25000u"), Some(25));
        assert_eq!(cpu_millicores("abc"), None);
    }

    #[test]
    fn test_memory_quantities() {
        assert_eq!(memory_bytes("128Mi"), Some(128 * 1024 * 1024));
        assert_eq!(memory_bytes("1Gi"), Some(1024 * 1024 * 1024));
        assert_eq!(memory_bytes("2048Ki"), Some(2048 * 1024));
        assert_eq!(memory_bytes("500M"), Some(500_000_000));
        assert_eq!(memory_bytes("1024"), Some(1024));
        assert_eq!(memory_bytes("lots"), None);
    }
}
