use std::{default::Default, time::Duration};

use crate::{
    constants::{
        DEFAULT_BUFFER_SIZE, DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_WINDOW_SIZE, HEADER_SIZE,
        MAX_DATAGRAM_SIZE,
    },
    error::{ErrorKind, Result},
};

#[derive(Clone, Debug)]
/// Configuration options to tune protocol and runtime behavior.
pub struct Config {
    /// Make the underlying UDP socket block when true, otherwise non-blocking.
    pub blocking_mode: bool,
    /// How long to sleep between polls when driving the host with `start_polling`.
    pub socket_polling_timeout: Option<Duration>,
    /// Size of the buffer datagrams are received into.
    pub receive_buffer_max_size: usize,
    /// Capacity of the incoming/outgoing slot buffers (power of two).
    pub buffer_size: u16,
    /// Receive window advertised to the peer; also the limit on inflight bytes.
    pub window_size: u32,
    /// Writes larger than this are split into several DATA packets.
    pub max_segment_size: usize,
    /// Inflight packets are capped at `buffer_size - inflight_margin`.
    pub inflight_margin: u16,
    /// Period of the retransmission timer.
    pub retransmit_interval: Duration,
    /// Age after which an unacknowledged packet is sent again.
    pub inflight_timeout: Duration,
    /// Delay between both directions finishing and the connection being destroyed.
    pub close_grace: Duration,
    /// Socket receive buffer size in bytes (None = use system default).
    /// Corresponds to SO_RCVBUF socket option.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = use system default).
    /// Corresponds to SO_SNDBUF socket option.
    pub socket_send_buffer_size: Option<usize>,
    /// Time-to-live for outgoing packets (None = use system default).
    pub socket_ttl: Option<u32>,
    /// Enable broadcast mode (default: false).
    pub socket_broadcast: bool,
}

impl Config {
    /// Checks the invariants the protocol engine relies on.
    pub fn validate(&self) -> Result<()> {
        if !self.buffer_size.is_power_of_two() {
            return Err(ErrorKind::InvalidConfig("buffer_size must be a power of two"));
        }
        if self.inflight_margin >= self.buffer_size {
            return Err(ErrorKind::InvalidConfig("inflight_margin must be below buffer_size"));
        }
        if self.max_segment_size == 0 || self.max_segment_size + HEADER_SIZE > MAX_DATAGRAM_SIZE {
            return Err(ErrorKind::InvalidConfig("max_segment_size does not fit a datagram"));
        }
        if self.receive_buffer_max_size < HEADER_SIZE + self.max_segment_size {
            return Err(ErrorKind::InvalidConfig("receive buffer cannot hold a full segment"));
        }
        Ok(())
    }

    /// Largest number of packets allowed in flight before writes are paused.
    pub fn max_inflight_packets(&self) -> u16 {
        self.buffer_size - self.inflight_margin
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blocking_mode: false,
            socket_polling_timeout: Some(Duration::from_millis(1)),
            receive_buffer_max_size: MAX_DATAGRAM_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            window_size: DEFAULT_WINDOW_SIZE,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            inflight_margin: 2,
            retransmit_interval: Duration::from_millis(500),
            inflight_timeout: Duration::from_millis(500),
            close_grace: Duration::from_secs(5),
            socket_recv_buffer_size: None, // Use system default
            socket_send_buffer_size: None, // Use system default
            socket_ttl: None,              // Use system default
            socket_broadcast: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.max_inflight_packets(), 510);
    }

    #[test]
    fn test_buffer_size_must_be_power_of_two() {
        let mut config = Config::default();
        config.buffer_size = 500;
        assert!(matches!(config.validate(), Err(ErrorKind::InvalidConfig(_))));
    }

    #[test]
    fn test_margin_must_leave_room() {
        let mut config = Config::default();
        config.buffer_size = 4;
        config.inflight_margin = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_receive_buffer_must_hold_segment() {
        let mut config = Config::default();
        config.receive_buffer_max_size = 512;
        assert!(config.validate().is_err());
    }
}
