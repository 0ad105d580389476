use std::sync::{Arc, Mutex};

use crate::exception::ExceptionCode;
use crate::types::{AddressRange, UnitId};

/// A read or write of the coil space received from a client
#[derive(Debug, Clone)]
pub struct CoilsRequest {
    /// Unit id addressed by the request
    pub unit_id: UnitId,
    /// Address range of the request
    pub range: AddressRange,
    /// True if the request writes coils, false if it reads them
    pub is_write: bool,
    /// Values to write, empty for reads
    pub values: Vec<bool>,
    /// Role extracted from the client certificate, present on TLS sessions
    /// only. An empty string means the certificate carried no role.
    pub client_role: Option<String>,
}

/// A read of the discrete input space received from a client
#[derive(Debug, Clone)]
pub struct DiscreteInputsRequest {
    /// Unit id addressed by the request
    pub unit_id: UnitId,
    /// Address range of the request
    pub range: AddressRange,
    /// Role extracted from the client certificate, present on TLS sessions only
    pub client_role: Option<String>,
}

/// A read or write of the holding register space received from a client
#[derive(Debug, Clone)]
pub struct HoldingRegistersRequest {
    /// Unit id addressed by the request
    pub unit_id: UnitId,
    /// Address range of the request
    pub range: AddressRange,
    /// True if the request writes registers, false if it reads them
    pub is_write: bool,
    /// Values to write, empty for reads
    pub values: Vec<u16>,
    /// Role extracted from the client certificate, present on TLS sessions only
    pub client_role: Option<String>,
}

/// A read of the input register space received from a client
#[derive(Debug, Clone)]
pub struct InputRegistersRequest {
    /// Unit id addressed by the request
    pub unit_id: UnitId,
    /// Address range of the request
    pub range: AddressRange,
    /// Role extracted from the client certificate, present on TLS sessions only
    pub client_role: Option<String>,
}

/// Trait implemented by the user to serve the four data object spaces
///
/// The library transports requests and responses; it does not store any
/// values. For reads the handler returns exactly `range.count` values. For
/// writes the returned values are unused and may be empty; the wire response
/// echoes the request. Returning an error maps it to a wire exception.
///
/// A handler is shared by every connection of a server and is locked for the
/// duration of a single invocation, so different connections invoke it
/// concurrently but never simultaneously.
pub trait RequestHandler: Send + 'static {
    /// Moves a request handler implementation into an `Arc<Mutex<_>>`
    /// suitable for passing to a server spawn function
    fn wrap(self) -> ServerHandlerType<Self>
    where
        Self: Sized,
    {
        Arc::new(Mutex::new(self))
    }

    /// Read or write the coil space
    fn handle_coils(&mut self, request: &CoilsRequest) -> Result<Vec<bool>, ExceptionCode>;

    /// Read the discrete input space
    fn handle_discrete_inputs(
        &mut self,
        request: &DiscreteInputsRequest,
    ) -> Result<Vec<bool>, ExceptionCode>;

    /// Read or write the holding register space
    fn handle_holding_registers(
        &mut self,
        request: &HoldingRegistersRequest,
    ) -> Result<Vec<u16>, ExceptionCode>;

    /// Read the input register space
    fn handle_input_registers(
        &mut self,
        request: &InputRegistersRequest,
    ) -> Result<Vec<u16>, ExceptionCode>;
}

/// Shareable handler reference passed to server spawn functions
pub type ServerHandlerType<T> = Arc<Mutex<T>>;
