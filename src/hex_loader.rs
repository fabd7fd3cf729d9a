//! Coalescing HEX-file load driver: pause, reset, write contiguous runs of
//! code memory, report progress, then resume.

use crate::code_mem;
use crate::error::Result;
use crate::hex::IntelHexFile;
use crate::link::OcdLink;
use std::time::Duration;
use tracing::info;

pub struct LoadProgress {
    pub bytes_written: usize,
    pub total_bytes: usize,
    pub percent: u32,
}

/// Loads `hex` into code memory, coalescing adjacent records into the
/// largest contiguous runs before handing them to [`code_mem::write`].
/// `on_progress` is called once per coalesced run.
pub async fn load(
    link: &OcdLink,
    hex: &IntelHexFile,
    mut on_progress: impl FnMut(LoadProgress),
) -> Result<usize> {
    if hex.records.is_empty() {
        return Ok(0);
    }

    link.cpu_pause(true).await?;
    info!("CPU paused");
    info!("CPU reset...");
    link.cpu_reset().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let last = &hex.records[hex.records.len() - 1];
    let total_bytes = last.address as usize + last.bytes.len();

    let mut written = 0usize;
    let mut run_addr: u32 = 0;
    let mut run_data: Vec<u8> = Vec::new();

    for record in &hex.records {
        if run_data.is_empty() {
            run_addr = record.address;
            run_data = record.bytes.clone();
        } else if run_addr as usize + run_data.len() == record.address as usize {
            run_data.extend_from_slice(&record.bytes);
        } else {
            flush_run(link, run_addr, &run_data, &mut written, total_bytes, &mut on_progress).await?;
            run_addr = record.address;
            run_data = record.bytes.clone();
        }
    }
    if !run_data.is_empty() {
        flush_run(link, run_addr, &run_data, &mut written, total_bytes, &mut on_progress).await?;
    }

    link.cpu_pause(false).await?;
    info!("CPU reset...");
    link.cpu_reset().await?;
    info!(total_bytes, "load complete, CPU running");

    Ok(total_bytes)
}

async fn flush_run(
    link: &OcdLink,
    addr: u32,
    data: &[u8],
    written: &mut usize,
    total_bytes: usize,
    on_progress: &mut impl FnMut(LoadProgress),
) -> Result<()> {
    code_mem::write(link, addr as u16, data).await?;
    *written += data.len();
    let percent = std::cmp::min(100, (*written * 100).div_ceil(total_bytes.max(1)) as u32);
    on_progress(LoadProgress {
        bytes_written: *written,
        total_bytes,
        percent,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{self, OpCode};
    use crate::transport::LoopbackPort;

    fn ack(op: OpCode, toggle: u8) -> [u8; 12] {
        frame::build(op, toggle, [0; 6])
    }

    #[tokio::test]
    async fn empty_hex_file_is_a_noop() {
        let port = LoopbackPort::new();
        let link = OcdLink::new(Box::new(port), Duration::from_millis(20), false);
        let hex = IntelHexFile { records: vec![] };
        let mut calls = 0;
        let written = load(&link, &hex, |_| calls += 1).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn adjacent_records_coalesce_into_one_run() {
        let port = LoopbackPort::new();
        // pause, reset, then one 4-byte aligned code write, then resume, then reset.
        let mut t: u8 = 0;
        for op in [OpCode::PauseOn, OpCode::CpuReset] {
            port.queue_reply(&ack(op, t));
            t ^= 1;
        }
        port.queue_reply(&ack(OpCode::CodeWrite4Ack, t));
        t ^= 1;
        for op in [OpCode::PauseOff, OpCode::CpuReset] {
            port.queue_reply(&ack(op, t));
            t ^= 1;
        }
        let link = OcdLink::new(Box::new(port), Duration::from_millis(50), false);
        let hex = IntelHexFile {
            records: vec![
                crate::hex::HexRecord { address: 0, bytes: vec![1, 2] },
                crate::hex::HexRecord { address: 2, bytes: vec![3, 4] },
            ],
        };
        let mut progress_calls = 0;
        let written = load(&link, &hex, |_| progress_calls += 1).await.unwrap();
        assert_eq!(written, 4);
        assert_eq!(progress_calls, 1);
    }
}
