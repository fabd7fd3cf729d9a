//! Console command dispatch and the DEBUG/RAW mode multiplexer.

use crate::addr_map::SFR_MAP;
use crate::code_mem;
use crate::disasm;
use crate::error::OcdError;
use crate::hex::IntelHexFile;
use crate::hex_loader;
use crate::lineedit::LineEditor;
use crate::link::OcdLink;
use anyhow::{Context, Result};
use std::io::Write;
use std::time::Duration;
use tracing::info;

pub const COMMANDS: &[&str] = &[
    "help",
    "reset",
    "pause",
    "resume",
    "status",
    "load_hex",
    "load_hex_and_switch",
    "write_code",
    "read_code",
    "counter_config",
    "break_on",
    "break_off",
    "next",
    "read_data",
    "write_direct_data",
    "write_indirect_data",
    "disassemble",
    "uart_switch",
    "exit",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Debug,
    Raw,
}

pub struct Console {
    link: OcdLink,
    editor: Box<dyn LineEditor>,
    mode: Mode,
}

fn string_to_data(s: &str) -> std::result::Result<u32, OcdError> {
    let parsed = if let Some(hex) = s.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    };
    parsed.map_err(|_| OcdError::MalformedArgument {
        arg: s.to_string(),
        reason: "expected a decimal or 0x-prefixed hex integer".into(),
    })
}

fn resolve_addr(token: &str) -> std::result::Result<u16, OcdError> {
    if let Some(&addr) = SFR_MAP.get(token.to_uppercase().as_str()) {
        Ok(addr as u16)
    } else {
        Ok(string_to_data(token)? as u16)
    }
}

impl Console {
    pub async fn new(link: OcdLink, editor: Box<dyn LineEditor>) -> Result<Self> {
        link.uart_select(false).await?;
        Ok(Self {
            link,
            editor,
            mode: Mode::Debug,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            let line = match self.mode {
                Mode::Debug => self.editor.read_line().await?,
                Mode::Raw => match self.editor.poll_key().await? {
                    Some(byte) => (byte as char).to_string(),
                    None => String::new(),
                },
            };

            if line == "exit" {
                println!("Goodbye!!!");
                return Ok(());
            }

            match self.mode {
                Mode::Debug => {
                    self.link.transport().flush_input().await.ok();
                    self.handle_line(&line).await;
                }
                Mode::Raw => {
                    if line == "uart_switch" {
                        self.do_uart_switch().await?;
                        self.link.transport().flush_input().await.ok();
                    } else if !line.is_empty() {
                        print!("{}", line);
                        let _ = std::io::stdout().flush();
                        self.link.transport().write_all(line.as_bytes()).await.ok();
                    }

                    if let Ok(n) = self.link.transport().bytes_available().await {
                        if n > 0 {
                            if let Ok(Some(bytes)) =
                                self.link.transport().read_exact(n, Duration::from_millis(10)).await
                            {
                                let text: String =
                                    bytes.into_iter().filter(|&b| b < 128).map(|b| b as char).collect();
                                print!("{}", text);
                                let _ = std::io::stdout().flush();
                            }
                        }
                    }
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str) {
        let args: Vec<&str> = line.split_whitespace().collect();
        if args.is_empty() {
            println!("empty line!");
            return;
        }
        if !COMMANDS.contains(&args[0]) {
            println!("{}", OcdError::UnknownCommand(args[0].to_string()));
            return;
        }
        if let Err(e) = self.execute(&args).await {
            println!("error: {}", e);
        }
    }

    async fn execute(&mut self, args: &[&str]) -> Result<()> {
        match args[0] {
            "help" => self.do_help(args),
            "reset" => self.do_reset().await?,
            "pause" => self.link.cpu_pause(true).await?,
            "resume" => self.link.cpu_pause(false).await?,
            "status" => {
                self.print_status().await?;
            }
            "load_hex" => self.do_load_hex(args).await?,
            "load_hex_and_switch" => {
                self.do_load_hex(args).await?;
                self.do_uart_switch().await?;
            }
            "write_code" => self.do_write_code(args).await?,
            "read_code" => self.do_read_code(args).await?,
            "counter_config" => self.do_counter_config(args).await?,
            "break_on" => self.do_break_on(args).await?,
            "break_off" => self.link.break_off().await?,
            "next" => self.do_next().await?,
            "read_data" => self.do_read_data(args).await?,
            "write_direct_data" => self.do_write_data(args, false).await?,
            "write_indirect_data" => self.do_write_data(args, true).await?,
            "disassemble" => self.do_disassemble(args).await?,
            "uart_switch" => self.do_uart_switch().await?,
            other => return Err(OcdError::UnknownCommand(other.to_string()).into()),
        }
        Ok(())
    }

    fn do_help(&self, args: &[&str]) {
        if args.len() > 1 {
            if COMMANDS.contains(&args[1]) {
                println!("Usage:\n       {}", args[1]);
            } else {
                println!("Unknown command");
            }
        } else {
            println!("available commands:");
            for c in COMMANDS {
                println!("  {}", c);
            }
        }
    }

    async fn do_reset(&self) -> Result<()> {
        self.link.transport().flush_output().await.ok();
        self.link.transport().flush_input().await.ok();
        self.link.cpu_reset().await?;
        self.link.transport().flush_output().await.ok();
        self.link.transport().flush_input().await.ok();
        Ok(())
    }

    /// Reads and prints CPU status once, returning it for callers (like
    /// `do_next`) that need to branch on it without a second round-trip.
    async fn print_status(&self) -> Result<crate::link::CpuStatus> {
        let status = self.link.read_status().await?;
        println!("===> PC: 0x{:x}", status.program_counter);
        println!("===> debug_stall_flag: {}", status.debug_stall_flag);
        println!("===> debug_counter: {}", status.debug_counter);
        println!("===> timer_counter: {}", status.timer_counter);

        if status.debug_stall_flag {
            let acc = self.link.data_read_byte(SFR_MAP["ACC"] as u16, false).await?;
            println!("===> A: 0x{:02x}", acc);
            let b = self.link.data_read_byte(SFR_MAP["B"] as u16, false).await?;
            println!("===> B: 0x{:02x}", b);
            let r0 = self.link.data_read_byte(0, false).await?;
            println!("===> R0 (bank0): 0x{:02x}", r0);
            let r1 = self.link.data_read_byte(1, false).await?;
            println!("===> R1 (bank0): 0x{:02x}", r1);
            let psw = self.link.data_read_byte(SFR_MAP["PSW"] as u16, false).await?;
            println!("===> PSW: 0x{:02x}", psw);
            println!("       P: {}", psw & 1);
            println!("      OV: {}", (psw >> 2) & 1);
            println!("Reg Bank: {}", (psw >> 3) & 3);
            println!("      AC: {}", (psw >> 6) & 1);
            println!("      CY: {}", (psw >> 7) & 1);
        }
        Ok(status)
    }

    async fn do_load_hex(&self, args: &[&str]) -> Result<()> {
        let path = args.get(1).context("load_hex requires a file path")?;
        let hex = IntelHexFile::load(path)?;
        info!(file = %path, "loading hex image");
        let total = hex_loader::load(&self.link, &hex, |p| {
            print!("\r{}% completed", p.percent);
            let _ = std::io::stdout().flush();
        })
        .await?;
        println!("\nDone: {} byte(s)", total);
        println!("CPU is running");
        Ok(())
    }

    async fn do_write_code(&self, args: &[&str]) -> Result<()> {
        let addr = string_to_data(args.get(1).context("write_code requires an address")?)? as u16;
        let mut data = Vec::new();
        for tok in &args[2..] {
            data.push(string_to_data(tok)? as u8);
        }
        code_mem::write(&self.link, addr, &data).await?;
        Ok(())
    }

    async fn do_read_code(&self, args: &[&str]) -> Result<()> {
        let status = self.link.read_status().await?;
        if !status.debug_stall_flag {
            return Err(OcdError::CpuNotPaused { action: "read code" }.into());
        }
        let addr = string_to_data(args.get(1).context("read_code requires an address")?)? as u16;
        let length = string_to_data(args.get(2).context("read_code requires a length")?)? as usize;
        let data = code_mem::read(&self.link, addr, length).await?;
        if let Some(path) = args.get(3) {
            let mut f = std::fs::File::create(path)?;
            for byte in &data {
                writeln!(f, "{}", byte)?;
            }
        }
        println!("==> addr: {}", addr);
        println!("==> data: {:?}", data.iter().map(|b| format!("0x{:x}", b)).collect::<Vec<_>>());
        Ok(())
    }

    async fn do_counter_config(&self, args: &[&str]) -> Result<()> {
        let config = string_to_data(args.get(1).context("counter_config requires a bitfield")?)?;
        let debug_reset = (config >> 1) & 1 != 0;
        let debug_enable = (config >> 2) & 1 != 0;
        let timer_reset = (config >> 3) & 1 != 0;
        let timer_enable = (config >> 4) & 1 != 0;
        self.link
            .counter_config(debug_reset, debug_enable, timer_reset, timer_enable)
            .await?;
        Ok(())
    }

    async fn do_break_on(&self, args: &[&str]) -> Result<()> {
        let a = string_to_data(args.get(1).context("break_on requires two addresses")?)? as u16;
        let b = string_to_data(args.get(2).context("break_on requires two addresses")?)? as u16;
        self.link.break_on(a, b).await?;
        Ok(())
    }

    async fn do_next(&self) -> Result<()> {
        self.link.run_pulse().await?;
        let status = self.print_status().await?;
        if status.debug_stall_flag {
            let data = code_mem::read(&self.link, status.program_counter, 8).await?;
            for line in disasm::disassemble(status.program_counter, &data) {
                println!("{}", line);
            }
        }
        Ok(())
    }

    async fn do_read_data(&self, args: &[&str]) -> Result<()> {
        let status = self.link.read_status().await?;
        if !status.debug_stall_flag {
            return Err(OcdError::CpuNotPaused { action: "read data" }.into());
        }
        let addr = resolve_addr(args.get(1).context("read_data requires an address")?)?;
        let length: usize = args
            .get(2)
            .map(|s| string_to_data(s))
            .transpose()?
            .unwrap_or(1) as usize;
        let indirect = args
            .get(3)
            .map(|s| string_to_data(s))
            .transpose()?
            .unwrap_or(0)
            != 0;

        let mut data = Vec::with_capacity(length);
        for _ in 0..length {
            data.push(self.link.data_read_byte(addr, indirect).await?);
        }
        if let Some(path) = args.get(4) {
            let mut f = std::fs::File::create(path)?;
            for byte in &data {
                writeln!(f, "{}", byte)?;
            }
        }
        println!("==> addr: {}", addr);
        println!("==> data: {:?}", data.iter().map(|b| format!("0x{:x}", b)).collect::<Vec<_>>());
        Ok(())
    }

    async fn do_write_data(&self, args: &[&str], indirect: bool) -> Result<()> {
        let status = self.link.read_status().await?;
        if !status.debug_stall_flag {
            return Err(OcdError::CpuNotPaused { action: "write data" }.into());
        }
        let addr = resolve_addr(args.get(1).context("write_data requires an address")?)?;
        let mut data = Vec::new();
        for tok in &args[2..] {
            let byte = string_to_data(tok)? as u8;
            self.link.data_write_byte(addr, byte, indirect).await?;
            data.push(byte);
        }
        println!("==> addr: {}", addr);
        println!("==> data: {:?}", data);
        Ok(())
    }

    async fn do_disassemble(&self, args: &[&str]) -> Result<()> {
        let status = self.link.read_status().await?;
        if !status.debug_stall_flag {
            return Err(OcdError::CpuNotPaused { action: "disassemble" }.into());
        }
        let addr = string_to_data(args.get(1).context("disassemble requires an address")?)? as u16;
        let length = string_to_data(args.get(2).context("disassemble requires a length")?)? as usize;
        let data = code_mem::read(&self.link, addr, length).await?;
        for line in disasm::disassemble(addr, &data) {
            println!("{}", line);
        }
        Ok(())
    }

    async fn do_uart_switch(&mut self) -> Result<()> {
        self.mode = match self.mode {
            Mode::Debug => Mode::Raw,
            Mode::Raw => Mode::Debug,
        };
        self.link.transport().flush_output().await.ok();
        self.link.transport().flush_input().await.ok();
        self.link.uart_select(self.mode == Mode::Raw).await?;
        println!("\n{}", "=".repeat(80));
        self.link.transport().flush_output().await.ok();
        self.link.transport().flush_input().await.ok();
        match self.mode {
            Mode::Raw => println!("UART Raw Mode"),
            Mode::Debug => println!("Debug Console Mode"),
        }
        println!("{}", "=".repeat(80));

        self.link.transport().write_all(b"\r").await.ok();
        tokio::time::sleep(Duration::from_millis(500)).await;
        if let Ok(n) = self.link.transport().bytes_available().await {
            if n > 0 {
                let _ = self
                    .link
                    .transport()
                    .read_exact(n, Duration::from_millis(10))
                    .await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_to_data_parses_hex_and_decimal() {
        assert_eq!(string_to_data("0x10").unwrap(), 16);
        assert_eq!(string_to_data("10").unwrap(), 10);
    }

    #[test]
    fn string_to_data_rejects_garbage() {
        assert!(string_to_data("not_a_number").is_err());
    }

    #[test]
    fn resolve_addr_prefers_sfr_name() {
        assert_eq!(resolve_addr("acc").unwrap(), 0xE0);
        assert_eq!(resolve_addr("0x10").unwrap(), 0x10);
    }
}
