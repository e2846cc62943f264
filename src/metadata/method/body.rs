//! Method bodies, the instructions they are assembled from and the ECMA-335 II.25.4 body
//! encoding.

use serde::{Deserialize, Serialize};

use crate::{
    metadata::{method::MethodBodyFlags, token::Token},
    Result,
};

/// A CIL opcode. Two-byte opcodes keep their `0xFE` prefix in the high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpCode(pub u16);

impl OpCode {
    /// `nop`
    pub const NOP: OpCode = OpCode(0x00);
    /// `ldarg.0`
    pub const LDARG_0: OpCode = OpCode(0x02);
    /// `ldarg.1`
    pub const LDARG_1: OpCode = OpCode(0x03);
    /// `ldnull`
    pub const LDNULL: OpCode = OpCode(0x14);
    /// `ldc.i4.0`
    pub const LDC_I4_0: OpCode = OpCode(0x16);
    /// `ldc.i4`
    pub const LDC_I4: OpCode = OpCode(0x20);
    /// `call`
    pub const CALL: OpCode = OpCode(0x28);
    /// `ret`
    pub const RET: OpCode = OpCode(0x2A);
    /// `br.s`
    pub const BR_S: OpCode = OpCode(0x2B);
    /// `ldstr`
    pub const LDSTR: OpCode = OpCode(0x72);
    /// `newobj`
    pub const NEWOBJ: OpCode = OpCode(0x73);
    /// `throw`
    pub const THROW: OpCode = OpCode(0x7A);
    /// `ldfld`
    pub const LDFLD: OpCode = OpCode(0x7B);
    /// `stfld`
    pub const STFLD: OpCode = OpCode(0x7D);
    /// `ldloc` (two-byte form)
    pub const LDLOC: OpCode = OpCode(0xFE0C);

    /// Returns true for opcodes in the `0xFE` two-byte space
    #[must_use]
    pub fn is_two_byte(self) -> bool {
        self.0 & 0xFF00 == 0xFE00
    }

    /// Number of bytes the opcode itself occupies
    #[must_use]
    pub fn size(self) -> usize {
        if self.is_two_byte() {
            2
        } else {
            1
        }
    }

    fn encode(self, out: &mut Vec<u8>) {
        if self.is_two_byte() {
            out.push(0xFE);
        }
        out.push((self.0 & 0xFF) as u8);
    }
}

/// The inline operand of an instruction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// No operand
    #[default]
    None,
    /// `int8` (short branches, `ldc.i4.s`)
    Int8(i8),
    /// `unsigned int8` (short argument / local indices)
    UInt8(u8),
    /// `unsigned int16` (long argument / local indices)
    UInt16(u16),
    /// `int32` (long branches, `ldc.i4`)
    Int32(i32),
    /// `int64`
    Int64(i64),
    /// `float32`
    Float32(f32),
    /// `float64`
    Float64(f64),
    /// A metadata token (methods, fields, types, signatures, user strings)
    Token(Token),
    /// `switch` jump table
    Switch(Vec<i32>),
}

impl Operand {
    /// Number of bytes the operand occupies
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Operand::None => 0,
            Operand::Int8(_) | Operand::UInt8(_) => 1,
            Operand::UInt16(_) => 2,
            Operand::Int32(_) | Operand::Float32(_) | Operand::Token(_) => 4,
            Operand::Int64(_) | Operand::Float64(_) => 8,
            Operand::Switch(targets) => 4 + targets.len() * 4,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Operand::None => {}
            Operand::Int8(value) => out.extend_from_slice(&value.to_le_bytes()),
            Operand::UInt8(value) => out.push(*value),
            Operand::UInt16(value) => out.extend_from_slice(&value.to_le_bytes()),
            Operand::Int32(value) => out.extend_from_slice(&value.to_le_bytes()),
            Operand::Int64(value) => out.extend_from_slice(&value.to_le_bytes()),
            Operand::Float32(value) => out.extend_from_slice(&value.to_le_bytes()),
            Operand::Float64(value) => out.extend_from_slice(&value.to_le_bytes()),
            Operand::Token(token) => out.extend_from_slice(&token.value().to_le_bytes()),
            Operand::Switch(targets) => {
                let count = u32::try_from(targets.len())
                    .map_err(|_| malformed_error!("switch with {} targets", targets.len()))?;
                out.extend_from_slice(&count.to_le_bytes());
                for target in targets {
                    out.extend_from_slice(&target.to_le_bytes());
                }
            }
        }
        Ok(())
    }
}

/// A single CIL instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The inline operand
    #[serde(default)]
    pub operand: Operand,
}

impl Instruction {
    /// Create an instruction with an operand
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    /// Create an instruction without operand
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.opcode.size() + self.operand.size()
    }
}

/// The executable body of a method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize locals
    #[serde(default)]
    pub init_locals: bool,
    /// `StandAloneSig` token of the local variable signature
    #[serde(default)]
    pub local_var_sig: Option<Token>,
    /// The encoded instruction stream, without header or exception sections
    #[serde(default)]
    pub code: Vec<u8>,
}

impl MethodBody {
    /// Tiny headers can describe at most 63 bytes of code
    pub const TINY_MAX_CODE_SIZE: usize = 63;
    /// Tiny headers imply a maximum stack depth of 8
    pub const TINY_MAX_STACK: u16 = 8;

    /// Assemble a body without locals from `instructions`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an operand cannot be encoded.
    pub fn from_instructions(max_stack: u16, instructions: &[Instruction]) -> Result<Self> {
        let mut code = Vec::with_capacity(instructions.iter().map(Instruction::size).sum());
        for instruction in instructions {
            instruction.opcode.encode(&mut code);
            instruction.operand.encode(&mut code)?;
        }

        Ok(MethodBody {
            max_stack,
            code,
            ..Default::default()
        })
    }

    /// The two-instruction body that allocates an exception via `constructor` and throws it.
    ///
    /// `constructor` must be a parameterless instance constructor, so exactly one value is on
    /// the stack when `throw` executes.
    #[must_use]
    pub fn stub(constructor: Token) -> Self {
        let mut code = Vec::with_capacity(6);
        OpCode::NEWOBJ.encode(&mut code);
        code.extend_from_slice(&constructor.value().to_le_bytes());
        OpCode::THROW.encode(&mut code);

        MethodBody {
            max_stack: 1,
            init_locals: false,
            local_var_sig: None,
            code,
        }
    }

    /// The constructor this body instantiates, if it is a stub
    #[must_use]
    pub fn stub_constructor(&self) -> Option<Token> {
        if self.local_var_sig.is_some() {
            return None;
        }
        match self.code.as_slice() {
            [0x73, a, b, c, d, 0x7A] => Some(Token(u32::from_le_bytes([*a, *b, *c, *d]))),
            _ => None,
        }
    }

    /// Returns true if this body is exactly the stub for `constructor`
    #[must_use]
    pub fn is_stub(&self, constructor: Token) -> bool {
        self.stub_constructor() == Some(constructor)
    }

    /// Size of the instruction stream in bytes
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.code.len()
    }

    /// Returns true if the body fits a tiny header
    #[must_use]
    pub fn is_tiny(&self) -> bool {
        self.code_size() <= Self::TINY_MAX_CODE_SIZE
            && self.max_stack <= Self::TINY_MAX_STACK
            && self.local_var_sig.is_none()
            && !self.init_locals
    }

    /// Encode header and code as they appear at the method's RVA.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the code does not fit a fat header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let code_size = self.code_size();
        let mut out = Vec::with_capacity(code_size + 12);

        if self.is_tiny() {
            // Fits in 6 bits, checked by is_tiny
            out.push(((code_size as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
        } else {
            let code_size = u32::try_from(code_size)
                .map_err(|_| malformed_error!("method body of {} bytes", code_size))?;

            let mut flags = MethodBodyFlags::FAT_FORMAT;
            if self.init_locals {
                flags |= MethodBodyFlags::INIT_LOCALS;
            }
            // Header size in 4-byte units lives in the top nibble
            let header = flags.bits() | (3 << 12);

            out.extend_from_slice(&header.to_le_bytes());
            out.extend_from_slice(&self.max_stack.to_le_bytes());
            out.extend_from_slice(&code_size.to_le_bytes());
            out.extend_from_slice(&self.local_var_sig.map_or(0, |t| t.value()).to_le_bytes());
        }

        out.extend_from_slice(&self.code);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_encodes_with_tiny_header() {
        let body = MethodBody::stub(Token(0x0A000001));

        assert!(body.is_tiny());
        assert_eq!(body.code_size(), 6);
        assert_eq!(
            body.encode().unwrap(),
            vec![0x1A, 0x73, 0x01, 0x00, 0x00, 0x0A, 0x7A]
        );
    }

    #[test]
    fn is_stub_checks_constructor() {
        let body = MethodBody::stub(Token(0x0A000001));

        assert!(body.is_stub(Token(0x0A000001)));
        assert!(!body.is_stub(Token(0x0A000002)));
        assert_eq!(body.stub_constructor(), Some(Token(0x0A000001)));

        let mut longer = body.clone();
        longer.code.push(0x2A);
        assert!(!longer.is_stub(Token(0x0A000001)));
        assert_eq!(longer.stub_constructor(), None);

        let mut with_locals = body;
        with_locals.local_var_sig = Some(Token(0x11000001));
        assert_eq!(with_locals.stub_constructor(), None);
    }

    #[test]
    fn assembled_stub_matches_stub() {
        let assembled = MethodBody::from_instructions(
            1,
            &[
                Instruction::new(OpCode::NEWOBJ, Operand::Token(Token(0x0A000003))),
                Instruction::simple(OpCode::THROW),
            ],
        )
        .unwrap();

        assert_eq!(assembled, MethodBody::stub(Token(0x0A000003)));
    }

    #[test]
    fn locals_force_fat_header() {
        let mut body = MethodBody::from_instructions(
            2,
            &[
                Instruction::new(OpCode::LDLOC, Operand::UInt16(0)),
                Instruction::simple(OpCode::RET),
            ],
        )
        .unwrap();
        body.init_locals = true;
        body.local_var_sig = Some(Token(0x11000003));

        let bytes = body.encode().unwrap();
        assert_eq!(bytes.len(), 12 + 5);
        // FAT_FORMAT | INIT_LOCALS, header size 3
        assert_eq!(&bytes[0..2], &[0x13, 0x30]);
        assert_eq!(&bytes[2..4], &[0x02, 0x00]);
        assert_eq!(&bytes[4..8], &[0x05, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[8..12], &[0x03, 0x00, 0x00, 0x11]);
        assert_eq!(&bytes[12..], &[0xFE, 0x0C, 0x00, 0x00, 0x2A]);
    }

    #[test]
    fn deep_stack_forces_fat_header() {
        let body =
            MethodBody::from_instructions(9, &[Instruction::simple(OpCode::RET)]).unwrap();

        assert!(!body.is_tiny());
        assert_eq!(body.encode().unwrap()[0] & 0x03, 0x03);
    }

    #[test]
    fn switch_operand_size() {
        let switch = Operand::Switch(vec![4, 8, -2]);
        assert_eq!(switch.size(), 16);

        let mut out = Vec::new();
        switch.encode(&mut out).unwrap();
        assert_eq!(&out[0..4], &[0x03, 0x00, 0x00, 0x00]);
        assert_eq!(&out[12..16], &[0xFE, 0xFF, 0xFF, 0xFF]);
    }
}
