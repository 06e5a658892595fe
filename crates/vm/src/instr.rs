//! Defines the [`Instruction`] type, responsible for representing a single decoded Cairo
//! bytecode instruction.

use crate::error::Error;

/// A register the destination part of an instruction can be relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DstRegister {
    /// The **Allocation Pointer**.
    AP = 0,
    /// The **Frame Pointer**.
    FP = 1,
}

/// A register the first operand of an instruction can be relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op0Register {
    /// The **Allocation Pointer**.
    AP = 0,
    /// The **Frame Pointer**.
    FP = 1,
}

/// A register/object the second operand of an instruction can be relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op1Source {
    /// The address resulting from the first operand of the instruction.
    Op0 = 0,
    /// The cell right after the instruction, holding an immediate value.
    Imm = 1,
    /// The **Frame Pointer**.
    FP = 2,
    /// The **Allocation Pointer**.
    AP = 4,
}

/// A possible result logic to be applied to the first and second operands of an
/// instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultLogic {
    /// The result is simply the value of the second operand.
    Op1 = 0,
    /// The result is the addition of the first and second operands.
    Add = 1,
    /// The result is the multiplication of the first and second operands.
    Mul = 2,
    /// The result is left unconstrained.
    ///
    /// This is the reading of the `Op1` bit pattern under a conditional jump, where the
    /// result cell does not participate in the instruction.
    Unconstrained = 3,
}

/// A possible way to update the **Program Counter** after the instruction has been
/// executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PcUpdate {
    /// The size of the instruction is added to the **Program Counter**.
    Regular = 0,
    /// The **Program Counter** is set to the result of the instruction.
    AbsoluteJump = 1,
    /// The result of the instruction is added to the **Program Counter**.
    RelativeJump = 2,
    /// If the destination part of the instruction is zero, then the **Program Counter**
    /// is simply updated according to the [`PcUpdate::Regular`] update rule. Otherwise,
    /// the second operand of the instruction is added to it.
    ConditionalJump = 4,
}

/// A possible way to update the **Allocation Pointer** after the instruction has been
/// executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ApUpdate {
    /// The **Allocation Pointer** remains unchanged.
    None = 0,
    /// The result of the instruction is added to the **Allocation Pointer**.
    AddResult = 1,
    /// The **Allocation Pointer** is incremented by one.
    Increment = 2,
    /// The **Allocation Pointer** is incremented by two.
    ///
    /// This is the reading of the `None` bit pattern under a `Call` instruction, which
    /// always pushes the return frame onto the stack.
    Increment2 = 3,
}

/// A possible way to update the **Frame Pointer** after the instruction has been
/// executed.
///
/// This field has no bits of its own in the instruction word; it is implied by the OP
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FpUpdate {
    /// The **Frame Pointer** remains unchanged.
    None = 0,
    /// The **Frame Pointer** is set to the slot right after the pushed return frame.
    ApPlusTwo = 1,
    /// The **Frame Pointer** is restored from the destination of the instruction.
    Dst = 2,
}

/// The OP code of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// The instruction does nothing specific.
    None = 0,
    /// The instruction is calling into a subroutine.
    Call = 1,
    /// The instruction is returning from a subroutine.
    Ret = 2,
    /// The instruction is asserting a specific memory cell to a specific value.
    AssertEq = 4,
}

/// A single decoded Cairo bytecode instruction.
///
/// An instruction is encoded as a 63-bit word: three 16-bit offsets biased by `2^15`,
/// followed by fifteen flag bits. The high bit of the word must be zero. The eventual
/// immediate value associated with the instruction is not part of this type; it lives in
/// the memory cell right after the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The offset applied to the destination register.
    pub off0: i16,
    /// The offset applied to the first operand register.
    pub off1: i16,
    /// The offset applied to the second operand base.
    pub off2: i16,
    /// The register that the destination of the instruction is relative to.
    pub dst_register: DstRegister,
    /// The register that the first operand of the instruction is relative to.
    pub op0_register: Op0Register,
    /// The source of the second operand of the instruction.
    pub op1_source: Op1Source,
    /// The result logic to be applied to the first and second operands.
    pub result_logic: ResultLogic,
    /// The update rule applied to the **Program Counter** after execution.
    pub pc_update: PcUpdate,
    /// The update rule applied to the **Allocation Pointer** after execution.
    pub ap_update: ApUpdate,
    /// The update rule applied to the **Frame Pointer** after execution.
    pub fp_update: FpUpdate,
    /// The OP code of the instruction.
    pub op_code: OpCode,
}

/// The bias applied to the three 16-bit offsets of an instruction word.
const OFFSET_BIAS: i32 = 1 << 15;

const DST_REG_BIT: u64 = 0x0001_0000_0000_0000;
const OP0_REG_BIT: u64 = 0x0002_0000_0000_0000;
const OP1_SRC_MASK: u64 = 0x001C_0000_0000_0000;
const OP1_SRC_SHIFT: u32 = 50;
const RES_LOGIC_MASK: u64 = 0x0060_0000_0000_0000;
const RES_LOGIC_SHIFT: u32 = 53;
const PC_UPDATE_MASK: u64 = 0x0380_0000_0000_0000;
const PC_UPDATE_SHIFT: u32 = 55;
const AP_UPDATE_MASK: u64 = 0x0C00_0000_0000_0000;
const AP_UPDATE_SHIFT: u32 = 58;
const OP_CODE_MASK: u64 = 0x7000_0000_0000_0000;
const OP_CODE_SHIFT: u32 = 60;
const HIGH_BIT: u64 = 0x8000_0000_0000_0000;

impl Instruction {
    /// Decodes a single 63-bit instruction word.
    pub fn decode(word: u64) -> Result<Self, Error> {
        if word & HIGH_BIT != 0 {
            return Err(Error::NonZeroHighBit);
        }

        let off0 = unbias(word);
        let off1 = unbias(word >> 16);
        let off2 = unbias(word >> 32);

        let dst_register = if word & DST_REG_BIT != 0 {
            DstRegister::FP
        } else {
            DstRegister::AP
        };

        let op0_register = if word & OP0_REG_BIT != 0 {
            Op0Register::FP
        } else {
            Op0Register::AP
        };

        let op1_source = match (word & OP1_SRC_MASK) >> OP1_SRC_SHIFT {
            0 => Op1Source::Op0,
            1 => Op1Source::Imm,
            2 => Op1Source::FP,
            4 => Op1Source::AP,
            _ => return Err(Error::InvalidOp1Source),
        };

        let pc_update = match (word & PC_UPDATE_MASK) >> PC_UPDATE_SHIFT {
            0 => PcUpdate::Regular,
            1 => PcUpdate::AbsoluteJump,
            2 => PcUpdate::RelativeJump,
            4 => PcUpdate::ConditionalJump,
            _ => return Err(Error::InvalidPcUpdate),
        };

        let result_logic = match (word & RES_LOGIC_MASK) >> RES_LOGIC_SHIFT {
            // Under a conditional jump the result cell does not participate in the
            // instruction, and the `Op1` pattern reads as "unconstrained".
            0 if pc_update == PcUpdate::ConditionalJump => ResultLogic::Unconstrained,
            0 => ResultLogic::Op1,
            1 => ResultLogic::Add,
            2 => ResultLogic::Mul,
            _ => return Err(Error::InvalidResLogic),
        };

        let op_code = match (word & OP_CODE_MASK) >> OP_CODE_SHIFT {
            0 => OpCode::None,
            1 => OpCode::Call,
            2 => OpCode::Ret,
            4 => OpCode::AssertEq,
            _ => return Err(Error::InvalidOpcode),
        };

        let ap_update = match (word & AP_UPDATE_MASK) >> AP_UPDATE_SHIFT {
            // A call always pushes the return frame, advancing ap by two.
            0 if op_code == OpCode::Call => ApUpdate::Increment2,
            0 => ApUpdate::None,
            1 => ApUpdate::AddResult,
            2 => ApUpdate::Increment,
            _ => return Err(Error::InvalidApUpdate),
        };

        let fp_update = match op_code {
            OpCode::Call => FpUpdate::ApPlusTwo,
            OpCode::Ret => FpUpdate::Dst,
            _ => FpUpdate::None,
        };

        Ok(Self {
            off0,
            off1,
            off2,
            dst_register,
            op0_register,
            op1_source,
            result_logic,
            pc_update,
            ap_update,
            fp_update,
            op_code,
        })
    }

    /// Re-encodes the instruction into its 63-bit word.
    ///
    /// This is the exact inverse of [`Instruction::decode`]: the implied readings
    /// ([`ResultLogic::Unconstrained`], [`ApUpdate::Increment2`]) map back onto the zero
    /// bit pattern they were decoded from, and [`Instruction::fp_update`] occupies no
    /// bits.
    pub fn encode(&self) -> u64 {
        let mut word = bias(self.off0) | bias(self.off1) << 16 | bias(self.off2) << 32;

        if self.dst_register == DstRegister::FP {
            word |= DST_REG_BIT;
        }
        if self.op0_register == Op0Register::FP {
            word |= OP0_REG_BIT;
        }

        word |= (self.op1_source as u64) << OP1_SRC_SHIFT;
        word |= match self.result_logic {
            ResultLogic::Unconstrained => 0,
            logic => logic as u64,
        } << RES_LOGIC_SHIFT;
        word |= (self.pc_update as u64) << PC_UPDATE_SHIFT;
        word |= match self.ap_update {
            ApUpdate::Increment2 => 0,
            update => update as u64,
        } << AP_UPDATE_SHIFT;
        word |= (self.op_code as u64) << OP_CODE_SHIFT;

        word
    }

    /// Returns the size of the instruction in memory cells.
    ///
    /// Instructions with an immediate second operand occupy two cells, all others one.
    #[inline(always)]
    pub const fn size(&self) -> usize {
        match self.op1_source {
            Op1Source::Imm => 2,
            _ => 1,
        }
    }
}

/// Extracts the low 16 bits of `word` and removes the offset bias.
#[inline(always)]
fn unbias(word: u64) -> i16 {
    (word as u16 as i32 - OFFSET_BIAS) as i16
}

/// Applies the offset bias to a signed offset, producing its 16-bit representation.
#[inline(always)]
fn bias(offset: i16) -> u64 {
    (offset as i32 + OFFSET_BIAS) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_assert_eq_imm() {
        // [ap] = imm; ap++
        let instr = Instruction::decode(0x480680017fff8000).unwrap();
        assert_eq!(instr.off0, 0);
        assert_eq!(instr.off1, -1);
        assert_eq!(instr.off2, 1);
        assert_eq!(instr.dst_register, DstRegister::AP);
        assert_eq!(instr.op0_register, Op0Register::FP);
        assert_eq!(instr.op1_source, Op1Source::Imm);
        assert_eq!(instr.result_logic, ResultLogic::Op1);
        assert_eq!(instr.pc_update, PcUpdate::Regular);
        assert_eq!(instr.ap_update, ApUpdate::Increment);
        assert_eq!(instr.fp_update, FpUpdate::None);
        assert_eq!(instr.op_code, OpCode::AssertEq);
        assert_eq!(instr.size(), 2);
    }

    #[test]
    fn decode_ret() {
        let instr = Instruction::decode(0x208b7fff7fff7ffe).unwrap();
        assert_eq!(instr.off0, -2);
        assert_eq!(instr.off1, -1);
        assert_eq!(instr.off2, -1);
        assert_eq!(instr.dst_register, DstRegister::FP);
        assert_eq!(instr.op0_register, Op0Register::FP);
        assert_eq!(instr.op1_source, Op1Source::FP);
        assert_eq!(instr.pc_update, PcUpdate::AbsoluteJump);
        assert_eq!(instr.ap_update, ApUpdate::None);
        assert_eq!(instr.fp_update, FpUpdate::Dst);
        assert_eq!(instr.op_code, OpCode::Ret);
        assert_eq!(instr.size(), 1);
    }

    #[test]
    fn decode_call_implies_ap_and_fp_updates() {
        // call rel imm
        let instr = Instruction::decode(0x1104800180018000).unwrap();
        assert_eq!(instr.op_code, OpCode::Call);
        assert_eq!(instr.ap_update, ApUpdate::Increment2);
        assert_eq!(instr.fp_update, FpUpdate::ApPlusTwo);
        assert_eq!(instr.pc_update, PcUpdate::RelativeJump);
        assert_eq!(instr.op1_source, Op1Source::Imm);
    }

    #[test]
    fn decode_jnz_reads_res_as_unconstrained() {
        // jmp rel imm if [ap] != 0
        let instr = Instruction::decode(0x020680017fff8000).unwrap();
        assert_eq!(instr.pc_update, PcUpdate::ConditionalJump);
        assert_eq!(instr.result_logic, ResultLogic::Unconstrained);
    }

    #[test]
    fn high_bit_is_rejected() {
        assert_eq!(
            Instruction::decode(0x8000_0000_0000_0000),
            Err(Error::NonZeroHighBit)
        );
    }

    #[test]
    fn invalid_flag_patterns_are_rejected() {
        // op1_src = 3
        assert_eq!(
            Instruction::decode(0x000C_0000_0000_0000),
            Err(Error::InvalidOp1Source)
        );
        // res_logic = 3
        assert_eq!(
            Instruction::decode(0x0060_0000_0000_0000),
            Err(Error::InvalidResLogic)
        );
        // pc_update = 3
        assert_eq!(
            Instruction::decode(0x0180_0000_0000_0000),
            Err(Error::InvalidPcUpdate)
        );
        // ap_update = 3
        assert_eq!(
            Instruction::decode(0x0C00_0000_0000_0000),
            Err(Error::InvalidApUpdate)
        );
        // opcode = 3
        assert_eq!(
            Instruction::decode(0x3000_0000_0000_0000),
            Err(Error::InvalidOpcode)
        );
    }

    #[test]
    fn encode_round_trips() {
        for word in [
            0x480680017fff8000u64, // [ap] = imm; ap++
            0x208b7fff7fff7ffe,    // ret
            0x1104800180018000,    // call rel imm
            0x020680017fff8000,    // jmp rel imm if [ap] != 0
            0x48327ffc7ffa8000,    // [ap] = [fp - 6] + [ap - 4]; ap++
            0x404b7ffe7fff8002,    // [fp + 2] = [fp - 1] * [fp - 2]
        ] {
            let decoded = Instruction::decode(word).unwrap();
            assert_eq!(decoded.encode(), word);
            assert_eq!(Instruction::decode(decoded.encode()).unwrap(), decoded);
        }
    }
}
