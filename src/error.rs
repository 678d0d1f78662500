/// Errors that can occur while talking to the inverter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying CAN transport failed to send a frame.
    #[error("Transmit error: {0}")]
    Transmit(#[from] std::io::Error),
}
