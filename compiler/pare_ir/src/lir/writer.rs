//! Low-level byte writer for the LIR instruction stream.

use super::{opcodes, LirError};

/// Appends instructions to a byte stream.
///
/// Operand bytes are counted against the length declared in the header; a
/// new instruction may only start once the previous one is complete.
#[derive(Debug, Default)]
pub struct LirWriter {
    bytes: Vec<u8>,
    pending_operand_bytes: usize,
}

impl LirWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_one_byte_instruction(&mut self, opcode: u8) {
        debug_assert_eq!(self.pending_operand_bytes, 0, "previous instruction incomplete");
        debug_assert!(opcodes::is_one_byte(opcode));
        self.bytes.push(opcode);
    }

    /// Write an instruction header announcing `operand_len` operand bytes.
    pub fn write_instruction(&mut self, opcode: u8, operand_len: usize) -> Result<(), LirError> {
        debug_assert_eq!(self.pending_operand_bytes, 0, "previous instruction incomplete");
        debug_assert!(!opcodes::is_one_byte(opcode));
        let len = u8::try_from(operand_len).map_err(|_| LirError::OperandsTooLarge(operand_len))?;
        self.bytes.push(opcode);
        self.bytes.push(len);
        self.pending_operand_bytes = operand_len;
        Ok(())
    }

    pub fn write_operand(&mut self, byte: u8) {
        debug_assert!(self.pending_operand_bytes > 0, "operand exceeds declared length");
        self.pending_operand_bytes -= 1;
        self.bytes.push(byte);
    }

    pub fn write_operands(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_operand(b);
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        debug_assert_eq!(self.pending_operand_bytes, 0, "last instruction incomplete");
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut writer = LirWriter::new();
        writer.write_one_byte_instruction(opcodes::RETURN);
        assert_eq!(writer.write_instruction(opcodes::ICONST, 2), Ok(()));
        writer.write_operands(&[0x80, 0x01]);
        assert_eq!(
            writer.finish(),
            vec![opcodes::RETURN, opcodes::ICONST, 2, 0x80, 0x01]
        );
    }

    #[test]
    fn test_operand_limit() {
        let mut writer = LirWriter::new();
        assert_eq!(
            writer.write_instruction(opcodes::PHI, 256),
            Err(LirError::OperandsTooLarge(256))
        );
        assert!(writer.is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "previous instruction incomplete")]
    fn test_incomplete_instruction_is_caught() {
        let mut writer = LirWriter::new();
        let _ = writer.write_instruction(opcodes::ICONST, 1);
        writer.write_one_byte_instruction(opcodes::RETURN);
    }
}
