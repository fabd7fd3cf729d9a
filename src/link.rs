//! `OcdLink`: the retry-until-valid request/reply contract and the typed
//! operations built on top of it.

use crate::error::{OcdError, Result};
use crate::frame::{self, OpCode, FRAME_LEN};
use crate::transport::SerialPort;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuStatus {
    pub program_counter: u16,
    pub debug_stall_flag: bool,
    pub debug_counter: u16,
    pub timer_counter: u16,
}

pub struct OcdLink {
    port: Box<dyn SerialPort>,
    toggle: AtomicU8,
    timeout: Duration,
    scrub_on_retry: bool,
    max_retries: Option<u32>,
}

impl OcdLink {
    pub fn new(port: Box<dyn SerialPort>, timeout: Duration, scrub_on_retry: bool) -> Self {
        Self {
            port,
            toggle: AtomicU8::new(0),
            timeout,
            scrub_on_retry,
            max_retries: None,
        }
    }

    /// Turns the unbounded retry loop (the reference behavior) into a bounded
    /// one that fails with `RetryBudgetExceeded` instead of looping forever.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    fn next_toggle(&self) -> u8 {
        self.toggle.fetch_xor(1, Ordering::SeqCst)
    }

    /// Sends a 12-byte request and retries until a CRC-valid 12-byte reply
    /// arrives. The toggle bit advances on every attempt, including retries.
    #[instrument(skip(self, payload), fields(op = ?op))]
    async fn request(&self, op: OpCode, payload: [u8; 6]) -> Result<[u8; FRAME_LEN]> {
        let op_name = op_name(op);
        let mut attempts: u32 = 0;
        loop {
            let toggle = self.next_toggle();
            let frame = frame::build(op, toggle, payload);
            self.port.write_all(&frame).await?;
            attempts += 1;

            let reply = self.port.read_exact(FRAME_LEN, self.timeout).await?;
            match reply {
                Some(bytes) if frame::validate(&bytes) => {
                    let mut out = [0u8; FRAME_LEN];
                    out.copy_from_slice(&bytes);
                    return Ok(out);
                }
                _ => {
                    warn!(op = op_name, attempts, "reply CRC invalid, retrying");
                    if let Some(max) = self.max_retries {
                        if attempts >= max {
                            return Err(OcdError::RetryBudgetExceeded {
                                op: op_name,
                                attempts,
                            });
                        }
                    }
                    if self.scrub_on_retry {
                        self.port.write_all(&frame::zero_fill_frame()).await?;
                    }
                }
            }
        }
    }

    /// Fire-and-forget variant: sends a single frame and does not wait for
    /// or validate a reply (used by `code_write_4_noack`).
    async fn send_no_reply(&self, op: OpCode, payload: [u8; 6]) -> Result<()> {
        let toggle = self.next_toggle();
        let frame = frame::build(op, toggle, payload);
        self.port.write_all(&frame).await?;
        Ok(())
    }

    fn addr_payload(addr: u16, tail: [u8; 4]) -> [u8; 6] {
        let mut p = [0u8; 6];
        p[0] = (addr >> 8) as u8;
        p[1] = (addr & 0xFF) as u8;
        p[2..6].copy_from_slice(&tail);
        p
    }

    // -- code memory -----------------------------------------------------

    #[instrument(skip(self, data))]
    pub async fn code_write_32(&self, addr: u16, data: u32, ack: bool) -> Result<()> {
        let bytes = data.to_be_bytes();
        let payload = Self::addr_payload(addr, bytes);
        if ack {
            self.request(OpCode::CodeWrite4Ack, payload).await?;
        } else {
            self.send_no_reply(OpCode::CodeWrite4NoAck, payload).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, data))]
    pub async fn code_write_128(&self, addr: u16, data: &[u8; 128]) -> Result<()> {
        let mut attempts: u32 = 0;
        loop {
            let toggle = self.next_toggle();
            let frame = frame::build_bulk128(addr, toggle, data);
            self.port.write_all(&frame).await?;
            attempts += 1;

            let reply = self.port.read_exact(FRAME_LEN, self.timeout).await?;
            match reply {
                Some(bytes) if frame::validate(&bytes) => return Ok(()),
                _ => {
                    warn!(op = "code_write_128", attempts, "reply CRC invalid, retrying");
                    if let Some(max) = self.max_retries {
                        if attempts >= max {
                            return Err(OcdError::RetryBudgetExceeded {
                                op: "code_write_128",
                                attempts,
                            });
                        }
                    }
                    if self.scrub_on_retry {
                        self.port.write_all(&frame::zero_fill_frame()).await?;
                    }
                }
            }
        }
    }

    pub async fn code_read_32(&self, addr: u16) -> Result<[u8; 4]> {
        let fill = 0x00FF00FFu32.to_be_bytes();
        let payload = Self::addr_payload(addr, fill);
        let reply = self.request(OpCode::CodeRead4, payload).await?;
        let mut data = [0u8; 4];
        data.copy_from_slice(&reply[FRAME_LEN - 6..FRAME_LEN - 2]);
        Ok(data)
    }

    pub async fn code_write_byte(&self, addr: u16, value: u8) -> Result<()> {
        let word_addr = (addr / 4) * 4;
        let mut word = self.code_read_32(word_addr).await?;
        word[(addr % 4) as usize] = value;
        let data = u32::from_be_bytes(word);
        self.code_write_32(addr, data, true).await
    }

    pub async fn code_read_byte(&self, addr: u16) -> Result<u8> {
        let word_addr = (addr / 4) * 4;
        let word = self.code_read_32(word_addr).await?;
        Ok(word[(addr % 4) as usize])
    }

    // -- data memory -------------------------------------------------------

    pub async fn data_read_byte(&self, addr: u16, indirect: bool) -> Result<u8> {
        let payload = Self::addr_payload(addr, [0xFF, 0x00, 0xFF, indirect as u8]);
        let reply = self.request(OpCode::DataRead, payload).await?;
        Ok(reply[FRAME_LEN - 3])
    }

    pub async fn data_write_byte(&self, addr: u16, value: u8, indirect: bool) -> Result<()> {
        let payload = Self::addr_payload(addr, [value, 0x12, 0x34, indirect as u8]);
        self.request(OpCode::DataWrite, payload).await?;
        Ok(())
    }

    // -- control -------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn cpu_reset(&self) -> Result<()> {
        self.request(OpCode::CpuReset, [0x12, 0x34, 0xab, 0xcd, 0xab, 0xcd])
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn cpu_pause(&self, on: bool) -> Result<()> {
        let op = if on { OpCode::PauseOn } else { OpCode::PauseOff };
        self.request(op, [0x12, 0x34, 0xab, 0xcd, 0xab, 0xcd]).await?;
        Ok(())
    }

    pub async fn read_status(&self) -> Result<CpuStatus> {
        let reply = self
            .request(OpCode::ReadStatus, [0x12, 0x34, 0xab, 0xcd, 0xab, 0xcd])
            .await?;
        let timer_counter =
            reply[FRAME_LEN - 5] as u16 + ((reply[FRAME_LEN - 6] as u16) << 8);
        let debug_counter =
            (reply[FRAME_LEN - 7] as u16 + ((reply[FRAME_LEN - 8] as u16) << 8)) / 2;
        let program_counter = reply[FRAME_LEN - 4] as u16 * 256 + reply[FRAME_LEN - 3] as u16;
        let debug_stall_flag = reply[FRAME_LEN - 7] & 1 != 0;
        debug!(?program_counter, debug_stall_flag, debug_counter, timer_counter, "cpu status");
        Ok(CpuStatus {
            program_counter,
            debug_stall_flag,
            debug_counter,
            timer_counter,
        })
    }

    pub async fn counter_config(
        &self,
        debug_counter_reset: bool,
        debug_counter_enable: bool,
        timer_counter_reset: bool,
        timer_counter_enable: bool,
    ) -> Result<()> {
        let tmp = ((debug_counter_reset as u8) << 1)
            + ((debug_counter_enable as u8) << 2)
            + ((timer_counter_reset as u8) << 3)
            + ((timer_counter_enable as u8) << 4);
        self.request(
            OpCode::CounterConfig,
            [0x12, 0x34, 0xab, 0xcd, 0xab, tmp],
        )
        .await?;
        Ok(())
    }

    pub async fn break_on(&self, addr_a: u16, addr_b: u16) -> Result<()> {
        let payload = [
            (addr_a >> 8) as u8,
            (addr_a & 0xFF) as u8,
            0xab,
            0xcd,
            (addr_b >> 8) as u8,
            (addr_b & 0xFF) as u8,
        ];
        self.request(OpCode::BreakOn, payload).await?;
        Ok(())
    }

    pub async fn break_off(&self) -> Result<()> {
        self.request(OpCode::BreakOff, [0x12, 0x34, 0xab, 0xcd, 0x33, 0x99])
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_pulse(&self) -> Result<()> {
        self.request(OpCode::RunPulse, [0x12, 0x34, 0xab, 0xcd, 0x33, 0x99])
            .await?;
        Ok(())
    }

    pub async fn uart_select(&self, cpu_uart: bool) -> Result<()> {
        self.send_no_reply(
            OpCode::UartSel,
            [0x12, 0x34, 0xab, 0xcd, 0xab, (cpu_uart as u8) * 2],
        )
        .await
    }

    pub fn transport(&self) -> &dyn SerialPort {
        self.port.as_ref()
    }
}

fn op_name(op: OpCode) -> &'static str {
    match op {
        OpCode::CodeWrite4NoAck => "code_write_4_noack",
        OpCode::CodeWrite4Ack => "code_write_4_ack",
        OpCode::CodeWrite128Ack => "code_write_128",
        OpCode::CodeRead4 => "code_read_4",
        OpCode::CpuReset => "cpu_reset",
        OpCode::PauseOn => "pause_on",
        OpCode::PauseOff => "pause_off",
        OpCode::ReadStatus => "read_status",
        OpCode::CounterConfig => "counter_config",
        OpCode::BreakOn => "break_on",
        OpCode::BreakOff => "break_off",
        OpCode::RunPulse => "run_pulse",
        OpCode::DataRead => "data_read",
        OpCode::DataWrite => "data_write",
        OpCode::UartSel => "uart_sel",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackPort;

    fn queue_valid_reply(port: &LoopbackPort, op: OpCode, toggle: u8, payload: [u8; 6]) {
        let reply = frame::build(op, toggle, payload);
        port.queue_reply(&reply);
    }

    #[tokio::test]
    async fn cpu_reset_sends_expected_payload_and_parses_reply() {
        let port = LoopbackPort::new();
        queue_valid_reply(&port, OpCode::CpuReset, 0, [0x12, 0x34, 0xab, 0xcd, 0xab, 0xcd]);
        let link = OcdLink::new(Box::new(port), Duration::from_millis(50), true);
        link.cpu_reset().await.unwrap();
    }

    #[tokio::test]
    async fn retries_on_invalid_crc_then_succeeds() {
        let port = LoopbackPort::new();
        // first reply corrupted
        port.queue_reply(&[0u8; 12]);
        queue_valid_reply(&port, OpCode::ReadStatus, 1, [0x12, 0x34, 0xab, 0xcd, 0xab, 0xcd]);
        let link = OcdLink::new(Box::new(port), Duration::from_millis(50), true);
        let status = link.read_status().await.unwrap();
        assert_eq!(status, CpuStatus::default());
    }

    #[tokio::test]
    async fn bounded_retries_give_up() {
        let port = LoopbackPort::new();
        let link = OcdLink::new(Box::new(port), Duration::from_millis(20), false)
            .with_max_retries(2);
        let err = link.cpu_reset().await.unwrap_err();
        assert!(matches!(err, OcdError::RetryBudgetExceeded { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn read_status_decodes_fields() {
        let port = LoopbackPort::new();
        // payload layout within the 12-byte reply: [4]=debug_counter_hi,
        // [5]=debug_counter_lo (bit0 = stall flag), [6]=timer_hi, [7]=timer_lo,
        // [8]=PC_hi, [9]=PC_lo.
        let toggle = 0;
        let op = OpCode::ReadStatus;
        let mut reply = frame::build(op, toggle, [0, 0, 0, 0, 0x01, 0x00]);
        reply[4] = 0x00; // debug_counter hi
        reply[5] = 0x05; // debug_counter lo, stall flag set (odd)
        reply[6] = 0x00; // timer hi
        reply[7] = 0x02; // timer lo
        reply[8] = 0x01; // PC hi
        reply[9] = 0x00; // PC lo
        let crc = crate::crc::crc16_ccitt_bytes(&reply[0..10]);
        reply[10..12].copy_from_slice(&crc);
        port.queue_reply(&reply);
        let link = OcdLink::new(Box::new(port), Duration::from_millis(50), true);
        let status = link.read_status().await.unwrap();
        assert_eq!(status.program_counter, 0x0100);
        assert_eq!(status.timer_counter, 2);
        assert_eq!(status.debug_counter, 2);
        assert!(status.debug_stall_flag);
    }
}
