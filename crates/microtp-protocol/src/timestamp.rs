use std::time::Instant;

/// Microseconds elapsed between `epoch` and `time`, truncated to 32 bits.
///
/// Times before the epoch saturate to zero. The value wraps roughly every 71
/// minutes, which is fine for a field that is only ever compared by difference.
pub fn timestamp_micros(epoch: Instant, time: Instant) -> u32 {
    time.saturating_duration_since(epoch).as_micros() as u32
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_timestamp_counts_micros() {
        let epoch = Instant::now();
        assert_eq!(timestamp_micros(epoch, epoch), 0);
        assert_eq!(timestamp_micros(epoch, epoch + Duration::from_millis(3)), 3_000);
    }

    #[test]
    fn test_timestamp_wraps() {
        let epoch = Instant::now();
        let later = epoch + Duration::from_micros(u32::MAX as u64 + 6);
        assert_eq!(timestamp_micros(epoch, later), 5);
    }

    #[test]
    fn test_timestamp_before_epoch_is_zero() {
        let time = Instant::now();
        let epoch = time + Duration::from_secs(1);
        assert_eq!(timestamp_micros(epoch, time), 0);
    }
}
