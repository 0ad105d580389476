//! Command-line client that polls a device once per second.
//!
//! Run with e.g. `cargo run --example client -- tcp://127.0.0.1:1502`

use std::time::Duration;

use ferrobus::client::*;
use ferrobus::*;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let url: EndpointUrl = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tcp://127.0.0.1:1502".to_string())
        .parse()?;

    let mut channel = spawn_client(&url, ClientConfig::default())?;
    channel.enable().await?;

    let param = RequestParam::new(UnitId::new(0x01), Duration::from_secs(1));

    loop {
        match channel
            .read_holding_registers(param, AddressRange::try_from(0x1000, 4)?)
            .await
        {
            Ok(registers) => {
                for register in registers {
                    println!("{register}");
                }
            }
            Err(err) => eprintln!("error: {err}"),
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
