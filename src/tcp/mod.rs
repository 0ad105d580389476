pub(crate) mod client;
pub(crate) mod frame;
pub(crate) mod server;

#[cfg(feature = "tls")]
pub(crate) mod tls;
