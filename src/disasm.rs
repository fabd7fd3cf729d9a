//! 8051 instruction table and disassembler formatter.

use crate::addr_map::{BIT_MAP_REV, SFR_MAP_REV};

#[derive(Debug, Clone, Copy)]
pub struct InstrDesc {
    pub mnemonic: &'static str,
    pub size: u8,
    /// Space-separated operand template. For single-byte instructions this
    /// is printed verbatim; for multi-byte instructions each whitespace
    /// token is either a literal (starts uppercase) or an operand slot
    /// (starts lowercase: `data`, `bit`, `code`, `immediate`, and their
    /// `16`-suffixed/`i`-prefixed/`/`-suffixed variants).
    pub operands: &'static str,
}

const fn d(mnemonic: &'static str, size: u8, operands: &'static str) -> InstrDesc {
    InstrDesc { mnemonic, size, operands }
}

/// All 256 opcodes. The reference table carries a literal duplicate entry
/// for 0x7C/0x7D (`MOV R4/R5, immediate` declared twice with identical
/// values) — harmless here since both declarations agree, but preserved in
/// spirit: the table is built in opcode order and the last declaration for
/// a given index always wins.
pub static INSTRUCTIONS: [InstrDesc; 256] = [
    d("NOP", 1, ""), d("AJMP", 2, "code"), d("LJMP", 3, "code16"), d("RR", 1, "A"),
    d("INC", 1, "A"), d("INC", 2, "data"), d("INC", 1, "@R0"), d("INC", 1, "@R1"),
    d("INC", 1, "R0"), d("INC", 1, "R1"), d("INC", 1, "R2"), d("INC", 1, "R3"),
    d("INC", 1, "R4"), d("INC", 1, "R5"), d("INC", 1, "R6"), d("INC", 1, "R7"),
    d("JBC", 3, "bit code"), d("ACALL", 2, "code"), d("LCALL", 3, "code16"), d("RRC", 1, "A"),
    d("DEC", 1, "A"), d("DEC", 2, "data"), d("DEC", 1, "@R0"), d("DEC", 1, "@R1"),
    d("DEC", 1, "R0"), d("DEC", 1, "R1"), d("DEC", 1, "R2"), d("DEC", 1, "R3"),
    d("DEC", 1, "R4"), d("DEC", 1, "R5"), d("DEC", 1, "R6"), d("DEC", 1, "R7"),
    d("JB", 3, "bit code"), d("AJMP", 2, "code"), d("RET", 1, ""), d("RL", 1, "A"),
    d("ADD", 2, "A immediate"), d("ADD", 2, "A data"), d("ADD", 1, "A, @R0"), d("ADD", 1, "A, @R1"),
    d("ADD", 1, "A, R0"), d("ADD", 1, "A, R1"), d("ADD", 1, "A, R2"), d("ADD", 1, "A, R3"),
    d("ADD", 1, "A, R4"), d("ADD", 1, "A, R5"), d("ADD", 1, "A, R6"), d("ADD", 1, "A, R7"),
    d("JNB", 3, "bit code"), d("ACALL", 1, "code"), d("RETI", 1, ""), d("RLC", 1, "A"),
    d("ADDC", 2, "A immediate"), d("ADDC", 2, "A data"), d("ADDC", 1, "A, @R0"), d("ADDC", 1, "A, @R1"),
    d("ADDC", 1, "A, R0"), d("ADDC", 1, "A, R1"), d("ADDC", 1, "A, R2"), d("ADDC", 1, "A, R3"),
    d("ADDC", 1, "A, R4"), d("ADDC", 1, "A, R5"), d("ADDC", 1, "A, R6"), d("ADDC", 1, "A, R7"),
    d("JC", 2, "code"), d("AJMP", 2, "code"), d("ORL", 2, "data A"), d("ORL", 3, "data immediate"),
    d("ORL", 2, "A immediate"), d("ORL", 2, "A data"), d("ORL", 1, "A, @R0"), d("ORL", 1, "A, @R1"),
    d("ORL", 1, "A, R0"), d("ORL", 1, "A, R1"), d("ORL", 1, "A, R2"), d("ORL", 1, "A, R3"),
    d("ORL", 1, "A, R4"), d("ORL", 1, "A, R5"), d("ORL", 1, "A, R6"), d("ORL", 1, "A, R7"),
    d("JNC", 2, "code"), d("ACALL", 2, "code"), d("ANL", 2, "data A"), d("ANL", 3, "data immediate"),
    d("ANL", 2, "A immediate"), d("ANL", 2, "A data"), d("ANL", 1, "A, @R0"), d("ANL", 1, "A, @R1"),
    d("ANL", 1, "A, R0"), d("ANL", 1, "A, R1"), d("ANL", 1, "A, R2"), d("ANL", 1, "A, R3"),
    d("ANL", 1, "A, R4"), d("ANL", 1, "A, R5"), d("ANL", 1, "A, R6"), d("ANL", 1, "A, R7"),
    d("JZ", 2, "code"), d("AJMP", 2, "code"), d("XRL", 2, "data A"), d("XRL", 3, "data immediate"),
    d("XRL", 2, "A immediate"), d("XRL", 2, "A data"), d("XRL", 1, "A, @R0"), d("XRL", 1, "A, @R1"),
    d("XRL", 1, "A, R0"), d("XRL", 1, "A, R1"), d("XRL", 1, "A, R2"), d("XRL", 1, "A, R3"),
    d("XRL", 1, "A, R4"), d("XRL", 1, "A, R5"), d("XRL", 1, "A, R6"), d("XRL", 1, "A, R7"),
    d("JNZ", 2, "code"), d("ACALL", 2, "code"), d("ORL", 2, "C bit"), d("JMP", 1, "@A+DPTR"),
    d("MOV", 2, "A immediate"), d("MOV", 3, "data immediate"), d("MOV", 2, "@R0 immediate"), d("MOV", 2, "@R1 immediate"),
    d("MOV", 2, "R0 immediate"), d("MOV", 2, "R1 immediate"), d("MOV", 2, "R2 immediate"), d("MOV", 2, "R3 immediate"),
    d("MOV", 2, "R4 immediate"), d("MOV", 2, "R5 immediate"), d("MOV", 2, "R6 immediate"), d("MOV", 2, "R7 immediate"),
    d("SJMP", 2, "code"), d("AJMP", 2, "code"), d("ANL", 2, "C bit"), d("MOVC", 1, "A, @A+PC"),
    d("DIV", 1, "AB"), d("MOV", 3, "data data"), d("MOV", 2, "data @R0"), d("MOV", 2, "data @R1"),
    d("MOV", 2, "data R0"), d("MOV", 2, "data R1"), d("MOV", 2, "data R2"), d("MOV", 2, "data R3"),
    d("MOV", 2, "data R4"), d("MOV", 2, "data R5"), d("MOV", 2, "data R6"), d("MOV", 2, "data R7"),
    d("MOV", 3, "DPTR immediate16"), d("ACALL", 2, "code"), d("MOV", 2, "bit C"), d("MOVC", 1, "A, @A+DPTR"),
    d("SUBB", 2, "A immediate"), d("SUBB", 2, "A data"), d("SUBB", 1, "A, @R0"), d("SUBB", 1, "A, @R1"),
    d("SUBB", 1, "A, R0"), d("SUBB", 1, "A, R1"), d("SUBB", 1, "A, R2"), d("SUBB", 1, "A, R3"),
    d("SUBB", 1, "A, R4"), d("SUBB", 1, "A, R5"), d("SUBB", 1, "A, R6"), d("SUBB", 1, "A, R7"),
    d("ORL", 2, "C bit/"), d("AJMP", 2, "code"), d("MOV", 2, "C bit"), d("INC", 1, "DPTR"),
    d("MUL", 1, "AB"), d("INVALID", 1, ""), d("MOV", 2, "@R0 data"), d("MOV", 2, "@R1 data"),
    d("MOV", 2, "R0 data"), d("MOV", 2, "R1 data"), d("MOV", 2, "R2 data"), d("MOV", 2, "R3 data"),
    d("MOV", 2, "R4 data"), d("MOV", 2, "R5 data"), d("MOV", 2, "R6 data"), d("MOV", 2, "R7 data"),
    d("ANL", 2, "C bit/"), d("ACALL", 2, "code"), d("CPL", 2, "bit"), d("CPL", 2, "C"),
    d("CJNE", 3, "A immediate code"), d("CJNE", 3, "A data code"), d("CJNE", 3, "@R0 immediate code"), d("CJNE", 3, "@R1 immediate code"),
    d("CJNE", 3, "R0 immediate code"), d("CJNE", 3, "R1 immediate code"), d("CJNE", 3, "R2 immediate code"), d("CJNE", 3, "R3 immediate code"),
    d("CJNE", 3, "R4 immediate code"), d("CJNE", 3, "R5 immediate code"), d("CJNE", 3, "R6 immediate code"), d("CJNE", 3, "R7 immediate code"),
    d("PUSH", 2, "data"), d("AJMP", 2, "code"), d("CLR", 2, "bit"), d("CLR", 1, "C"),
    d("SWAP", 1, "A"), d("XCH", 2, "A data"), d("XCH", 1, "A, @R0"), d("XCH", 1, "A, @R1"),
    d("XCH", 1, "A, R0"), d("XCH", 1, "A, R1"), d("XCH", 1, "A, R2"), d("XCH", 1, "A, R3"),
    d("XCH", 1, "A, R4"), d("XCH", 1, "A, R5"), d("XCH", 1, "A, R6"), d("XCH", 1, "A, R7"),
    d("POP", 2, "data"), d("ACALL", 2, "code"), d("SETB", 2, "bit"), d("SETB", 1, "C"),
    d("DA", 1, "A"), d("DJNZ", 3, "data code"), d("XCHD", 1, "A, @R0"), d("XCHD", 1, "A, @R1"),
    d("DJNZ", 2, "R0 code"), d("DJNZ", 2, "R1 code"), d("DJNZ", 2, "R2 code"), d("DJNZ", 2, "R3 code"),
    d("DJNZ", 2, "R4 code"), d("DJNZ", 2, "R5 code"), d("DJNZ", 2, "R6 code"), d("DJNZ", 2, "R7 code"),
    d("MOVX", 1, "A, @DPTR"), d("AJMP", 2, "code"), d("MOVX", 1, "A, @R0"), d("MOVX", 1, "A, @R1"),
    d("CLR", 1, "A"), d("MOV", 2, "A data"), d("MOV", 1, "A, @R0"), d("MOV", 1, "A, @R1"),
    d("MOV", 1, "A, R0"), d("MOV", 1, "A, R1"), d("MOV", 1, "A, R2"), d("MOV", 1, "A, R3"),
    d("MOV", 1, "A, R4"), d("MOV", 1, "A, R5"), d("MOV", 1, "A, R6"), d("MOV", 1, "A, R7"),
    d("MOVX", 1, "@DPTR, A"), d("ACALL", 2, "code"), d("MOVX", 1, "@R0, A"), d("MOVX", 1, "@R1, A"),
    d("CPL", 1, "A"), d("MOV", 2, "data A"), d("MOV", 1, "@R0, A"), d("MOV", 1, "@R1, A"),
    d("MOV", 1, "R0, A"), d("MOV", 1, "R1, A"), d("MOV", 1, "R2, A"), d("MOV", 1, "R3, A"),
    d("MOV", 1, "R4, A"), d("MOV", 1, "R5, A"), d("MOV", 1, "R6, A"), d("MOV", 1, "R7, A"),
];

/// Disassembles `code` (already read from the device, starting at
/// `start_addr`) into one formatted line per instruction, dropping any
/// trailing instruction whose operand bytes run past the end of `code`
/// (matching the reference's `offset + cmd_size < len(code)` guard).
pub fn disassemble(start_addr: u16, code: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let instr = &INSTRUCTIONS[code[offset] as usize];
        let size = instr.size as usize;
        if offset + size < code.len() {
            lines.push(format_instruction(start_addr, code, offset, instr));
        }
        offset += size;
    }
    lines
}

fn format_instruction(start_addr: u16, code: &[u8], offset: usize, instr: &InstrDesc) -> String {
    let size = instr.size as usize;
    let mut line = format!("{:04X}\t", start_addr as usize + offset);

    for i in 0..size {
        line.push_str(&format!("{:02X} ", code[offset + i]));
    }
    for _ in 0..(3usize.saturating_sub(size)) {
        line.push_str("   ");
    }
    line.push_str("\t:   ");

    line.push_str(instr.mnemonic);
    for _ in 0..(6usize.saturating_sub(instr.mnemonic.len())) {
        line.push(' ');
    }

    if size == 1 {
        line.push_str(instr.operands);
    } else {
        let tokens: Vec<&str> = instr.operands.split_whitespace().collect();
        let mut j = 0usize;
        for (i, tok) in tokens.iter().enumerate() {
            if tok.is_empty() {
                continue;
            }
            let first = tok.as_bytes()[0];
            if first.is_ascii_lowercase() {
                j += 1;
                if first == b'i' {
                    line.push('#');
                }
                if tok.ends_with('/') {
                    line.push('/');
                }
                if tok.ends_with("16") {
                    line.push_str(&format!(
                        "0x{:02X}{:02X}",
                        code[offset + j],
                        code[offset + j + 1]
                    ));
                    j += 1;
                } else {
                    let byte = code[offset + j];
                    if first == b'd' {
                        if let Some(name) = SFR_MAP_REV.get(&byte) {
                            line.push_str(name);
                        } else {
                            line.push_str(&format!("0x{:02X}", byte));
                        }
                    } else if first == b'b' {
                        if let Some(name) = BIT_MAP_REV.get(&byte) {
                            line.push_str(name);
                        } else {
                            line.push_str(&format!("0x{:02X}", byte));
                        }
                    } else {
                        line.push_str(&format!("0x{:02X}", byte));
                    }
                }
            } else {
                line.push_str(tok);
            }
            if i + 1 < tokens.len() {
                line.push_str(", ");
            }
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nop_formats_with_empty_operands() {
        let lines = disassemble(0x0000, &[0x00, 0x00]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("0000\t00 "));
        assert!(lines[0].contains("NOP"));
    }

    #[test]
    fn ljmp_reads_16_bit_operand() {
        // LJMP 0x1234, plus one trailing byte so the guard lets it print.
        let lines = disassemble(0x0000, &[0x02, 0x12, 0x34, 0x00]);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("LJMP"));
        assert!(lines[0].contains("0x1234"));
    }

    #[test]
    fn data_operand_resolves_sfr_symbol() {
        // INC data, data=0xE0 (ACC)
        let lines = disassemble(0x0000, &[0x05, 0xE0, 0x00]);
        assert!(lines[0].contains("ACC"));
    }

    #[test]
    fn trailing_instruction_without_slack_byte_is_dropped() {
        // Single NOP with nothing after it: offset+size(1) is not < len(1).
        let lines = disassemble(0x0000, &[0x00]);
        assert!(lines.is_empty());
    }

    #[test]
    fn duplicate_opcode_entries_agree() {
        assert_eq!(INSTRUCTIONS[0x7C].mnemonic, "MOV");
        assert_eq!(INSTRUCTIONS[0x7D].mnemonic, "MOV");
    }
}
