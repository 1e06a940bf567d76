/// Connection lifecycle.
///
/// Initiators start in `Connecting`; responders are built from a SYN and start in
/// `Connected`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyState {
    /// Initiator: SYN sent, waiting for the first STATE.
    #[default]
    Connecting,

    /// Handshake complete, data flows both ways.
    Connected,

    /// The peer's FIN arrived in order; our write side may still be open.
    HalfOpen,

    /// Reset, or both sides finished and the grace delay elapsed.
    Closed,
}

impl ReadyState {
    /// Returns true once the handshake has completed and before close.
    pub fn is_established(&self) -> bool {
        matches!(self, ReadyState::Connected | ReadyState::HalfOpen)
    }

    /// Returns true while the handshake is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(self, ReadyState::Connecting)
    }

    /// Returns true in the terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self, ReadyState::Closed)
    }
}
