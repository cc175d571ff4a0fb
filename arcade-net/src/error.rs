#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid listen address: {0}")]
    ListenAddr(#[from] std::net::AddrParseError),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}
