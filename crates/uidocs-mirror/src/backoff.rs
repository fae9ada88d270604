use std::time::Duration;

/// Exponential backoff with jitter, one delay per retry.
pub fn backoff_durations(max_retries: usize, base_delay: Duration) -> impl Iterator<Item = Duration> {
    let base_ms = base_delay.as_millis().max(1) as u64;
    (0..max_retries).map(move |i| {
        let factor = 2u64.saturating_pow(i.min(6) as u32); // cap exponent
        let jitter = fastrand::u64(0..(base_ms * factor / 10 + 1));
        Duration::from_millis(base_ms * factor + jitter)
    })
}
