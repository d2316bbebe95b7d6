mod error;
mod publish;
mod relay_conn;

pub use error::RelayError;

pub(crate) use relay_conn::RelayConn;
