//! FP51 on-chip debugger console.
//!
//! Opens a serial link to the target, then hands control to an interactive
//! console that speaks the board's DEBUG command set and can toggle into a
//! raw UART passthrough mode.

use anyhow::Result;
use ocd8051::config::Config;
use ocd8051::console::Console;
use ocd8051::lineedit::TerminalLineEditor;
use ocd8051::link::OcdLink;
use ocd8051::transport::RealSerialPort;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ocd8051=debug")))
        .init();

    let mut config = Config::from_env();
    if let Some(port) = std::env::args().nth(1) {
        config.port_name = port;
    }

    info!(port = %config.port_name, baud = config.baud_rate, "opening serial link");
    let port = RealSerialPort::open(&config.port_name, config.baud_rate, config.reply_timeout)?;
    let link = OcdLink::new(Box::new(port), config.reply_timeout, config.scrub_on_retry);

    let editor = Box::new(TerminalLineEditor::new(
        "FP51_OCD>> ",
        ocd8051::console::COMMANDS.iter().map(|s| s.to_string()).collect(),
    ));

    let mut console = Console::new(link, editor).await?;
    console.run().await?;

    Ok(())
}
