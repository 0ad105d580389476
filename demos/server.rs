//! Server that exposes a small register and coil map on all four spaces.
//!
//! Run with e.g. `cargo run --example server -- tcp://127.0.0.1:1502`

use std::time::Duration;

use ferrobus::server::*;
use ferrobus::*;

struct Device {
    coils: [bool; 16],
    discrete_inputs: [bool; 16],
    holding_registers: [u16; 16],
    input_registers: [u16; 16],
}

impl Device {
    fn new() -> Self {
        Self {
            coils: [false; 16],
            discrete_inputs: [false; 16],
            holding_registers: [0; 16],
            input_registers: [0; 16],
        }
    }

    fn read<V: Copy>(slice: &[V], range: AddressRange) -> Result<Vec<V>, ExceptionCode> {
        slice
            .get(range.to_std_range())
            .map(|x| x.to_vec())
            .ok_or(ExceptionCode::IllegalDataAddress)
    }

    fn write<V: Copy>(
        slice: &mut [V],
        range: AddressRange,
        values: &[V],
    ) -> Result<Vec<V>, ExceptionCode> {
        let target = slice
            .get_mut(range.to_std_range())
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        target.copy_from_slice(values);
        Ok(Vec::new())
    }
}

impl RequestHandler for Device {
    fn handle_coils(&mut self, request: &CoilsRequest) -> Result<Vec<bool>, ExceptionCode> {
        if request.is_write {
            Self::write(&mut self.coils, request.range, &request.values)
        } else {
            Self::read(&self.coils, request.range)
        }
    }

    fn handle_discrete_inputs(
        &mut self,
        request: &DiscreteInputsRequest,
    ) -> Result<Vec<bool>, ExceptionCode> {
        Self::read(&self.discrete_inputs, request.range)
    }

    fn handle_holding_registers(
        &mut self,
        request: &HoldingRegistersRequest,
    ) -> Result<Vec<u16>, ExceptionCode> {
        if request.is_write {
            Self::write(&mut self.holding_registers, request.range, &request.values)
        } else {
            Self::read(&self.holding_registers, request.range)
        }
    }

    fn handle_input_registers(
        &mut self,
        request: &InputRegistersRequest,
    ) -> Result<Vec<u16>, ExceptionCode> {
        Self::read(&self.input_registers, request.range)
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let url: EndpointUrl = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tcp://127.0.0.1:1502".to_string())
        .parse()?;

    let handler = Device::new().wrap();

    let config = ServerConfig {
        settings: ServerSettings {
            max_sessions: 4,
            idle_timeout: Some(Duration::from_secs(60)),
            write_timeout: Some(Duration::from_secs(5)),
        },
        ..ServerConfig::default()
    };

    let _server = spawn_server(&url, handler.clone(), config).await?;

    // make the input registers tick so clients see something moving
    let mut counter: u16 = 0;
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        counter = counter.wrapping_add(1);
        let mut device = handler.lock().unwrap();
        for register in device.input_registers.iter_mut() {
            *register = counter;
        }
    }
}
