use std::time::Duration;

/// Size of every chunk except possibly the last (64 KiB).
///
/// Both peers must agree on this value: the receiver trusts the
/// announced `totalChunks`, which the sender derives from it.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// How long the sender waits for a chunk acknowledgement on the direct
/// channel before moving on to the next chunk.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Pause between chunks on the relay path.
///
/// The relay has no acknowledgements, so this fixed delay is the only
/// rate limiting it gets.
pub const RELAY_PACING: Duration = Duration::from_millis(20);

/// Time to wait for a pong (or any incoming frame) from the signaling service.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to ping the signaling service.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(20);

/// Maximum signaling frame size in bytes (16 MB).
///
/// A base64-encoded relay chunk is roughly 88 KB, so this leaves ample room.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Number of chunks needed to carry `size` bytes in `chunk_size` slices.
///
/// Returns 0 for an empty file.
pub fn total_chunks(size: u64, chunk_size: usize) -> u32 {
    size.div_ceil(chunk_size as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_chunks_rounds_up() {
        assert_eq!(total_chunks(0, CHUNK_SIZE), 0);
        assert_eq!(total_chunks(1, CHUNK_SIZE), 1);
        assert_eq!(total_chunks(CHUNK_SIZE as u64, CHUNK_SIZE), 1);
        assert_eq!(total_chunks(CHUNK_SIZE as u64 + 1, CHUNK_SIZE), 2);
        assert_eq!(total_chunks(150_000, 65_536), 3);
    }

    #[test]
    fn relay_pacing_is_within_window() {
        assert!(RELAY_PACING >= Duration::from_millis(20));
        assert!(RELAY_PACING <= Duration::from_millis(30));
    }
}
