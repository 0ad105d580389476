//! A high-performance implementation of the [Modbus](http://modbus.org/) protocol
//! using [Tokio](https://docs.rs/tokio) and Rust's `async/await` syntax.
//!
//! # Features
//!
//! * Panic-free parsing
//! * Client and server on the same protocol core
//! * TCP, RTU (serial), and Modbus Security (TLS) with client-certificate
//!   role extraction
//! * Automatic connection management with configurable reconnect strategy
//! * Byte-order/word-order aware marshalling of 32 and 64-bit values
//! * Scalable performance using Tokio's multi-threaded executor
//!
//! # Supported functions
//!
//! * Read Coils (0x01) / Discrete Inputs (0x02)
//! * Read Holding (0x03) / Input Registers (0x04)
//! * Write Single Coil (0x05) / Register (0x06)
//! * Write Multiple Coils (0x0F) / Registers (0x10)
//! * Read (0x14) / Write (0x15) File Record (client)
//! * Mask Write Register (0x16)
//! * Read/Write Multiple Registers (0x17)
//! * Read FIFO Queue (0x18, client)
//!
//! # Example client
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use ferrobus::client::*;
//! use ferrobus::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut channel = spawn_tcp_client_task(
//!         HostAddr::ip("192.168.0.100".parse()?, 502),
//!         10,
//!         default_retry_strategy(),
//!         DecodeLevel::default(),
//!     );
//!     channel.enable().await?;
//!
//!     let param = RequestParam::new(UnitId::new(0x01), Duration::from_secs(1));
//!     let coils = channel
//!         .read_coils(param, AddressRange::try_from(0, 5)?)
//!         .await?;
//!     for coil in coils {
//!         println!("{coil}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Example server
//!
//! ```no_run
//! use ferrobus::server::*;
//! use ferrobus::*;
//!
//! struct Device {
//!     input_registers: [u16; 10],
//! }
//!
//! impl RequestHandler for Device {
//!     fn handle_coils(&mut self, _: &CoilsRequest) -> Result<Vec<bool>, ExceptionCode> {
//!         Err(ExceptionCode::IllegalFunction)
//!     }
//!
//!     fn handle_discrete_inputs(
//!         &mut self,
//!         _: &DiscreteInputsRequest,
//!     ) -> Result<Vec<bool>, ExceptionCode> {
//!         Err(ExceptionCode::IllegalFunction)
//!     }
//!
//!     fn handle_holding_registers(
//!         &mut self,
//!         _: &HoldingRegistersRequest,
//!     ) -> Result<Vec<u16>, ExceptionCode> {
//!         Err(ExceptionCode::IllegalFunction)
//!     }
//!
//!     fn handle_input_registers(
//!         &mut self,
//!         request: &InputRegistersRequest,
//!     ) -> Result<Vec<u16>, ExceptionCode> {
//!         request
//!             .range
//!             .to_std_range()
//!             .map(|i| {
//!                 self.input_registers
//!                     .get(i)
//!                     .copied()
//!                     .ok_or(ExceptionCode::IllegalDataAddress)
//!             })
//!             .collect()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handler = Device {
//!         input_registers: [0; 10],
//!     }
//!     .wrap();
//!
//!     let _server = spawn_tcp_server_task(
//!         ServerSettings::default(),
//!         "0.0.0.0:502".parse()?,
//!         handler,
//!         DecodeLevel::default(),
//!     )
//!     .await?;
//!
//!     // run until ctrl-c, dropping the handle stops the server
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```

#![deny(
    non_camel_case_types,
    non_shorthand_field_patterns,
    non_snake_case,
    non_upper_case_globals,
    trivial_casts,
    trivial_numeric_casts,
    unconditional_recursion,
    unused_comparisons,
    clippy::all
)]
#![forbid(unsafe_code, while_true, bare_trait_objects)]

/// client API
pub mod client;
/// public constant values related to the Modbus specification
pub mod constants;
/// serial RTU settings and types
#[cfg(feature = "serial")]
pub mod serial;
/// server API
pub mod server;
/// byte-order/word-order aware value conversions
pub mod value;

// internal modules
mod common;
mod decode;
mod error;
mod exception;
mod retry;
mod tcp;
mod types;
mod url;

pub use crate::decode::*;
pub use crate::error::*;
pub use crate::exception::*;
pub use crate::retry::*;
pub use crate::types::*;
pub use crate::url::*;
pub use crate::value::{Encoding, Endianness, WordOrder};

#[cfg(feature = "tls")]
pub use crate::tcp::tls::client::TlsClientConfig;
#[cfg(feature = "tls")]
pub use crate::tcp::tls::server::TlsServerConfig;
#[cfg(feature = "tls")]
pub use crate::tcp::tls::{MinTlsVersion, TlsError};
