//! Block-oriented code-memory I/O: decomposes an arbitrary `(addr, len)`
//! byte range into a leading unaligned head, 128-byte bulk frames, 4-byte
//! bulk frames, and a trailing unaligned tail.

use crate::error::Result;
use crate::link::OcdLink;

/// Writes `data` to code memory starting at `addr`, using the largest
/// possible frame size for each aligned chunk.
pub async fn write(link: &OcdLink, addr: u16, data: &[u8]) -> Result<()> {
    let mut offset: usize = 0;
    let length = data.len();
    let addr_end = addr as usize + length;

    if addr % 4 != 0 {
        let head_len = std::cmp::min(4 - (addr % 4) as usize, length);
        for _ in 0..head_len {
            link.code_write_byte(addr + offset as u16, data[offset]).await?;
            offset += 1;
        }
    }

    let total_words = (addr_end - addr as usize - offset) / 4;
    let total_128_frames = total_words / 32;

    for _ in 0..total_128_frames {
        let mut chunk = [0u8; 128];
        chunk.copy_from_slice(&data[offset..offset + 128]);
        link.code_write_128(addr + offset as u16, &chunk).await?;
        offset += 128;
    }

    for _ in 0..(total_words - total_128_frames * 32) {
        let word = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        link.code_write_32(addr + offset as u16, word, true).await?;
        offset += 4;
    }

    for _ in 0..(length - offset) {
        link.code_write_byte(addr + offset as u16, data[offset]).await?;
        offset += 1;
    }

    Ok(())
}

/// Reads `length` bytes of code memory starting at `addr`.
pub async fn read(link: &OcdLink, addr: u16, length: usize) -> Result<Vec<u8>> {
    let mut offset: usize = 0;
    let addr_end = addr as usize + length;
    let mut out = Vec::with_capacity(length);

    if addr % 4 != 0 {
        let head_len = std::cmp::min(4 - (addr % 4) as usize, length);
        for _ in 0..head_len {
            out.push(link.code_read_byte(addr + offset as u16).await?);
            offset += 1;
        }
    }

    let total_words = (addr_end - addr as usize - offset) / 4;
    for _ in 0..total_words {
        let word = link.code_read_32(addr + offset as u16).await?;
        out.extend_from_slice(&word);
        offset += 4;
    }

    for _ in 0..(length - offset) {
        out.push(link.code_read_byte(addr + offset as u16).await?);
        offset += 1;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{self, OpCode};
    use crate::transport::LoopbackPort;
    use std::time::Duration;

    fn ack_reply(op: OpCode, toggle: u8) -> [u8; 12] {
        frame::build(op, toggle, [0; 6])
    }

    #[tokio::test]
    async fn unaligned_six_byte_write_uses_head_then_tail_bytes() {
        // addr=2, length=6: head = 2 bytes (to reach word alignment at 4),
        // then 1 aligned word (4 bytes), no tail.
        let port = LoopbackPort::new();
        // code_write_byte does a read-modify-write: one 32-bit read + one 32-bit write, per head byte.
        for t in 0..8u8 {
            port.queue_reply(&ack_reply(
                if t % 2 == 0 { OpCode::CodeRead4 } else { OpCode::CodeWrite4Ack },
                t,
            ));
        }
        let link = OcdLink::new(Box::new(port), Duration::from_millis(50), false);
        let data = [1u8, 2, 3, 4, 5, 6];
        write(&link, 2, &data).await.unwrap();
    }

    #[tokio::test]
    async fn read_matches_written_length() {
        let port = LoopbackPort::new();
        for t in 0..4u8 {
            let mut reply = ack_reply(OpCode::CodeRead4, t);
            reply[6..10].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
            let crc = crate::crc::crc16_ccitt_bytes(&reply[0..10]);
            reply[10..12].copy_from_slice(&crc);
            port.queue_reply(&reply);
        }
        let link = OcdLink::new(Box::new(port), Duration::from_millis(50), false);
        let out = read(&link, 0, 4).await.unwrap();
        assert_eq!(out, vec![0xAA, 0xBB, 0xCC, 0xDD]);
    }
}
