use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use ferrobus::client::*;
use ferrobus::server::*;
use ferrobus::*;

struct Handler {
    coils: [bool; 10],
    discrete_inputs: [bool; 10],
    holding_registers: [u16; 10],
    input_registers: [u16; 10],
}

impl Handler {
    fn new() -> Self {
        Self {
            coils: [false; 10],
            discrete_inputs: [false; 10],
            holding_registers: [0; 10],
            input_registers: [0; 10],
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
        if values.len() != target.len() {
            return Err(ExceptionCode::ServerDeviceFailure);
        }
        target.copy_from_slice(values);
        Ok(Vec::new())
    }
}

impl RequestHandler for Handler {
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

fn fast_retry() -> Box<dyn RetryStrategy> {
    doubling_retry_strategy(Duration::from_millis(20), Duration::from_millis(100))
}

async fn connected_channel(addr: SocketAddr) -> Channel {
    let mut channel = spawn_tcp_client_task(
        HostAddr::ip(addr.ip(), addr.port()),
        10,
        fast_retry(),
        DecodeLevel::default(),
    );
    channel.enable().await.unwrap();
    channel
}

async fn test_requests_and_responses() {
    let handler = Handler::new().wrap();
    let addr = SocketAddr::from_str("127.0.0.1:40010").unwrap();

    let _server = spawn_tcp_server_task(
        ServerSettings::default(),
        addr,
        handler.clone(),
        DecodeLevel::default(),
    )
    .await
    .unwrap();

    let mut channel = connected_channel(addr).await;
    let params = RequestParam::new(UnitId::new(0x01), Duration::from_secs(1));

    {
        let mut guard = handler.lock().unwrap();
        guard.discrete_inputs[0] = true;
        guard.input_registers[0] = 0xCAFE;
    }

    assert_eq!(
        channel
            .read_discrete_inputs(params, AddressRange::try_from(0, 2).unwrap())
            .await
            .unwrap(),
        vec![Indexed::new(0, true), Indexed::new(1, false)]
    );

    assert_eq!(
        channel
            .read_input_registers(params, AddressRange::try_from(0, 2).unwrap())
            .await
            .unwrap(),
        vec![Indexed::new(0, 0xCAFE), Indexed::new(1, 0x0000)]
    );

    // do a single coil write and verify that it was written by reading it
    assert_eq!(
        channel
            .write_single_coil(params, Indexed::new(1, true))
            .await
            .unwrap(),
        Indexed::new(1, true)
    );
    assert_eq!(
        channel
            .read_coils(params, AddressRange::try_from(0, 2).unwrap())
            .await
            .unwrap(),
        vec![Indexed::new(0, false), Indexed::new(1, true)]
    );

    // do a single register write and verify that it was written by reading it
    assert_eq!(
        channel
            .write_single_register(params, Indexed::new(1, 0xABCD))
            .await
            .unwrap(),
        Indexed::new(1, 0xABCD)
    );
    assert_eq!(
        channel
            .read_holding_registers(params, AddressRange::try_from(0, 2).unwrap())
            .await
            .unwrap(),
        vec![Indexed::new(0, 0x0000), Indexed::new(1, 0xABCD)]
    );

    // write multiple coils and verify that they were written
    assert_eq!(
        channel
            .write_multiple_coils(
                params,
                WriteMultiple::from(0, vec![true, true, true]).unwrap()
            )
            .await
            .unwrap(),
        AddressRange::try_from(0, 3).unwrap()
    );
    assert_eq!(
        channel
            .read_coils(params, AddressRange::try_from(0, 3).unwrap())
            .await
            .unwrap(),
        vec![
            Indexed::new(0, true),
            Indexed::new(1, true),
            Indexed::new(2, true)
        ]
    );

    // write registers and verify that they were written
    assert_eq!(
        channel
            .write_multiple_registers(
                params,
                WriteMultiple::from(0, vec![0x0102, 0x0304, 0x0506]).unwrap()
            )
            .await
            .unwrap(),
        AddressRange::try_from(0, 3).unwrap()
    );
    assert_eq!(
        channel
            .read_holding_registers(params, AddressRange::try_from(0, 3).unwrap())
            .await
            .unwrap(),
        vec![
            Indexed::new(0, 0x0102),
            Indexed::new(1, 0x0304),
            Indexed::new(2, 0x0506)
        ]
    );

    // mask write: set bit 0x0010, clear everything above 0x00FF
    assert_eq!(
        channel
            .mask_write_register(params, MaskWrite::new(1, 0x00EF, 0x0010))
            .await
            .unwrap(),
        MaskWrite::new(1, 0x00EF, 0x0010)
    );
    assert_eq!(
        channel
            .read_holding_registers(params, AddressRange::try_from(1, 1).unwrap())
            .await
            .unwrap(),
        // (0x0304 & 0x00EF) | (0x0010 & !0x00EF)
        vec![Indexed::new(1, 0x0014)]
    );

    // combined write-then-read in one transaction
    assert_eq!(
        channel
            .read_write_multiple_registers(
                params,
                ReadWriteMultiple::new(
                    AddressRange::try_from(4, 2).unwrap(),
                    4,
                    vec![0x1111, 0x2222]
                )
                .unwrap()
            )
            .await
            .unwrap(),
        vec![Indexed::new(4, 0x1111), Indexed::new(5, 0x2222)]
    );

    // 32-bit float across two holding registers
    channel.write_f32(params, 6, 12.5).await.unwrap();
    assert_eq!(
        channel
            .read_f32s(params, 6, 1, RegisterSpace::Holding)
            .await
            .unwrap(),
        vec![12.5]
    );

    // the register spaces are 10 slots, this goes past the end
    assert_eq!(
        channel
            .read_holding_registers(params, AddressRange::try_from(8, 4).unwrap())
            .await,
        Err(RequestError::Exception(ExceptionCode::IllegalDataAddress))
    );

    // the server does not expose a FIFO queue
    assert_eq!(
        channel.read_fifo_queue(params, 0x0000).await,
        Err(RequestError::Exception(ExceptionCode::IllegalFunction))
    );

    // neither does it expose file records
    assert_eq!(
        channel
            .read_file_record(params, vec![RecordReference::new(1, 0, 2)])
            .await,
        Err(RequestError::Exception(ExceptionCode::IllegalFunction))
    );
}

async fn test_idle_timeout_closes_connection() {
    let handler = Handler::new().wrap();
    let addr = SocketAddr::from_str("127.0.0.1:40011").unwrap();

    let settings = ServerSettings {
        idle_timeout: Some(Duration::from_millis(100)),
        ..ServerSettings::default()
    };

    let _server = spawn_tcp_server_task(settings, addr, handler, DecodeLevel::default())
        .await
        .unwrap();

    let mut channel = connected_channel(addr).await;
    let params = RequestParam::new(UnitId::new(0x01), Duration::from_secs(1));

    // one successful exchange
    channel
        .write_single_register(params, Indexed::new(0, 0x0042))
        .await
        .unwrap();

    // outlive the server's idle timeout
    tokio::time::sleep(Duration::from_millis(400)).await;

    // the server closed the connection, the next request fails
    let result = channel
        .read_holding_registers(params, AddressRange::try_from(0, 1).unwrap())
        .await;
    assert!(
        matches!(result, Err(RequestError::Io(_))),
        "expected an I/O error, got: {result:?}"
    );

    // the channel reconnects and the request eventually succeeds again
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match channel
            .read_holding_registers(params, AddressRange::try_from(0, 1).unwrap())
            .await
        {
            Ok(values) => {
                assert_eq!(values, vec![Indexed::new(0, 0x0042)]);
                break;
            }
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(err) => panic!("connection was not re-established: {err}"),
        }
    }
}

async fn test_max_sessions_rejects_new_connections() {
    let handler = Handler::new().wrap();
    let addr = SocketAddr::from_str("127.0.0.1:40012").unwrap();

    let settings = ServerSettings {
        max_sessions: 1,
        ..ServerSettings::default()
    };

    let _server = spawn_tcp_server_task(settings, addr, handler, DecodeLevel::default())
        .await
        .unwrap();

    let mut first = connected_channel(addr).await;
    let params = RequestParam::new(UnitId::new(0x01), Duration::from_millis(500));

    // occupy the single session
    first
        .read_coils(params, AddressRange::try_from(0, 1).unwrap())
        .await
        .unwrap();

    // the second connection is accepted and then closed immediately
    let mut second = connected_channel(addr).await;
    let result = second
        .read_coils(params, AddressRange::try_from(0, 1).unwrap())
        .await;
    assert!(
        matches!(
            result,
            Err(RequestError::Io(_))
                | Err(RequestError::NoConnection)
                | Err(RequestError::ResponseTimeout)
        ),
        "expected a connection error, got: {result:?}"
    );

    // the first session is unaffected
    first
        .read_coils(params, AddressRange::try_from(0, 1).unwrap())
        .await
        .unwrap();
}

#[test]
fn can_read_and_write_values() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(test_requests_and_responses())
}

#[test]
fn idle_connections_are_closed() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(test_idle_timeout_closes_connection())
}

#[test]
fn session_count_is_bounded() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(test_max_sessions_rejects_new_connections())
}
