pub mod client;
pub mod provision;
pub mod receiver;
pub mod statements;

#[cfg(test)]
pub(crate) mod test_utils;

pub use client::{BrokerClient, SqlServerClient, TextRows};
pub use provision::{configure, teardown};
pub use receiver::{ReceivedMessage, Receiver, ReceiverStats};
