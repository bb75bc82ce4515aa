pub mod timer;
pub mod vec2;

/// Milliseconds since the Unix epoch (wire timestamps)
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
