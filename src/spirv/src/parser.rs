use crate::ops::Op;
use crate::{ReflectError, Result};

pub(crate) const HEADER_LEN: usize = 5;
pub(crate) const MAGIC: u32 = 0x0723_0203;

/// Module version as a pair `(major, minor)`.
pub type Version = (u8, u8);

// Returns `(None, _)` upon encountering an unrecognized opcode.
fn decode_op(word: u32) -> (Option<Op>, u32, usize) {
    let size = (word >> 16) & 0xffff;
    let raw = word & 0xffff;
    (raw.try_into().ok(), raw, size as _)
}

pub(crate) fn parse_header(header: &[u32]) -> Result<(Version, u32)> {
    assert_eq!(header.len(), HEADER_LEN);

    if header[0] != MAGIC {
        return Err(ReflectError::InvalidModule("bad magic number"));
    }

    let byte = |word, n| ((word >> (8 * n)) & 0xffu32) as u8;
    let version = (byte(header[1], 2), byte(header[1], 1));
    let bound = header[3];

    Ok((version, bound))
}

/// A single decoded instruction borrowing the module's word stream.
#[derive(Clone, Copy, Debug)]
pub struct Instruction<'data> {
    op: Option<Op>,
    raw_op: u32,
    // Operand words, excluding the leading opcode word.
    operands: &'data [u32],
}

impl<'data> Instruction<'data> {
    /// The decoded opcode, or `None` for opcodes outside the supported set.
    pub fn op(&self) -> Option<Op> {
        self.op
    }

    /// The raw 16-bit opcode value, decodable or not.
    pub fn raw_op(&self) -> u32 {
        self.raw_op
    }

    pub fn operands(&self) -> &'data [u32] {
        self.operands
    }

    pub(crate) fn reader(&self) -> OperandReader<'data> {
        OperandReader { words: self.operands }
    }
}

/// Cursor over an instruction's operand words.
#[derive(Debug)]
pub(crate) struct OperandReader<'data> {
    words: &'data [u32],
}

impl<'data> OperandReader<'data> {
    fn bytes(&self) -> &'data [u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.words.as_ptr() as _,
                self.words.len() * std::mem::size_of::<u32>(),
            )
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub(crate) fn remaining(&self) -> &'data [u32] {
        self.words
    }

    pub(crate) fn consume(&mut self) -> Result<u32> {
        let (&first, rest) = self
            .words
            .split_first()
            .ok_or(ReflectError::InvalidModule("truncated instruction"))?;
        self.words = rest;
        Ok(first)
    }

    pub(crate) fn consume_option(&mut self) -> Option<u32> {
        let (&first, rest) = self.words.split_first()?;
        self.words = rest;
        Some(first)
    }

    pub(crate) fn parse_string(&mut self) -> Result<String> {
        assert!(cfg!(target_endian = "little"));
        let bytes = self.bytes();
        let len = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or(ReflectError::InvalidModule("unterminated string literal"))?;
        let s = std::str::from_utf8(&bytes[..len])?;

        let word_size = std::mem::size_of::<u32>();
        let word_count = (s.len() + word_size) / word_size;
        self.words = &self.words[word_count..];

        Ok(s.to_owned())
    }

    pub(crate) fn parse_enum<T>(&mut self) -> Result<T>
    where
        T: TryFrom<u32>,
        ReflectError: From<T::Error>,
    {
        Ok(self.consume()?.try_into()?)
    }
}

#[derive(Debug)]
struct InstIter<'data> {
    data: &'data [u32],
}

impl<'data> Iterator for InstIter<'data> {
    type Item = Result<Instruction<'data>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (op, raw_op, words) = decode_op(*self.data.first()?);
        if words == 0 || self.data.len() < words {
            self.data = &[];
            return Some(Err(ReflectError::InvalidModule("bad instruction length")));
        }

        let (operands, data) = self.data.split_at(words);
        self.data = data;
        Some(Ok(Instruction {
            op,
            raw_op,
            operands: &operands[1..],
        }))
    }
}

/// Iterates the instruction stream following the 5-word header.
///
/// The caller is expected to have validated the header; slices shorter than
/// a header yield nothing.
pub fn instructions(words: &[u32]) -> impl Iterator<Item = Result<Instruction<'_>>> {
    InstIter {
        data: words.get(HEADER_LEN..).unwrap_or(&[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ModuleBuilder;
    use crate::{ExecutionModel, StorageClass};

    #[test]
    fn header_magic_rejected() {
        let mut words = ModuleBuilder::new().finish();
        words[0] = 0xdead_beef;
        assert!(parse_header(&words[..HEADER_LEN]).is_err());
    }

    #[test]
    fn instruction_framing() {
        let mut b = ModuleBuilder::new();
        let float = b.type_float(32);
        let ptr = b.type_pointer(StorageClass::Input, float);
        let var = b.variable(ptr, StorageClass::Input);
        let main = b.id();
        b.entry_point(ExecutionModel::Vertex, main, "main", &[var]);
        let words = b.finish();

        let insts: Vec<_> = instructions(&words).collect::<Result<_>>().unwrap();
        assert_eq!(insts.len(), 4);
        assert_eq!(insts[0].op(), Some(Op::EntryPoint));
        assert_eq!(insts[1].op(), Some(Op::TypeFloat));
        assert_eq!(insts[3].op(), Some(Op::Variable));
    }

    #[test]
    fn truncated_instruction_reported() {
        let mut words = ModuleBuilder::new().finish();
        // Claims 4 words but the stream ends after 1.
        words.push((4 << 16) | u32::from(Op::Name));
        let res: Result<Vec<_>> = instructions(&words).collect();
        assert!(res.is_err());
    }
}
