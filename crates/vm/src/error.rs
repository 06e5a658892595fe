//! Defines the error types of the crate.

use starknet_types_core::felt::Felt;
use thiserror::Error;

use crate::memory::{Pointer, Value};

/// An error raised by the memory subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// An insertion targeted a segment that was never allocated.
    #[error("segment {segment} has not been allocated ({num_segments} segments exist)")]
    UnallocatedSegment {
        /// The segment index of the faulty insertion.
        segment: isize,
        /// The number of segments currently allocated.
        num_segments: usize,
    },
    /// A memory cell was asserted to two different values.
    ///
    /// Cairo memory is write-once: re-asserting a cell to the value it already holds is a
    /// no-op, but asserting it to anything else is a contradiction.
    #[error("memory at {at} already holds {existing}, cannot assert it to {attempted}")]
    InconsistentMemory {
        /// The address of the cell.
        at: Pointer,
        /// The value the cell already holds.
        existing: Value,
        /// The value the insertion attempted to write.
        attempted: Value,
    },
    /// A felt was expected at the given address.
    #[error("expected a field element at {0}")]
    ExpectedFelt(Pointer),
    /// A pointer was expected at the given address.
    #[error("expected a relocatable value at {0}")]
    ExpectedRelocatable(Pointer),
    /// The cell at the given address has not been asserted to any value yet.
    #[error("unknown value at memory cell {0}")]
    UnknownMemoryCell(Pointer),
    /// A felt used as a pointer offset does not fit within the physical address space.
    #[error("felt {0} is too large to be used as a pointer offset")]
    PointerTooLarge(Felt),
    /// A pointer offset was moved below the base of its segment.
    #[error("pointer offset underflowed below its segment base")]
    NegativePointerOffset,
    /// The attempted operation is not part of the partial arithmetic defined on values.
    #[error("invalid arithmetic between pointers and field elements")]
    InvalidPointerArithmetic,
    /// Two pointers of different segments were subtracted.
    #[error("pointers into different segments cannot be subtracted")]
    IncoherentProvenance,
    /// Attempted to divide by zero.
    #[error("division by zero")]
    DivideByZero,
    /// A relocatable value pointing into a temporary segment survived until relocation.
    #[error("temporary segment {0} cannot be relocated")]
    TemporarySegmentInRelocation(isize),
    /// Relocation or hole accounting was attempted before effective sizes were computed.
    #[error("effective segment sizes have not been computed")]
    EffectiveSizesNotComputed,
    /// A validation rule rejected an inserted cell.
    #[error(transparent)]
    ValidationFailed(Box<BuiltinError>),
}

/// An error raised by a builtin runner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuiltinError {
    /// A cell validated by the range-check builtin was outside `[0, 2^128)`.
    #[error("range check value {0:#x} is outside of the bounds [0, 2^128)")]
    OutsideBounds(Felt),
    /// A cell validated or consumed by a builtin held a pointer instead of a felt.
    #[error("builtin {builtin} expected a field element at {at}")]
    NotAFelt {
        /// The builtin that rejected the cell.
        builtin: &'static str,
        /// The offending address.
        at: Pointer,
    },
    /// A bitwise operand exceeded the builtin's bit length limit.
    #[error("felt {value:#x} has more than {limit} bits")]
    FeltBiggerThanPowerOfTwo {
        /// The offending operand.
        value: Felt,
        /// The maximum admissible bit length.
        limit: u64,
    },
    /// Not enough cells were allocated to cover the proof layout's requirements.
    #[error("insufficient allocated cells: {have} available, {needed} needed")]
    InsufficientAllocatedCells {
        /// The number of cells still available.
        have: usize,
        /// The number of cells required.
        needed: usize,
    },
    /// A builtin segment used more cells than its ratio allocates.
    #[error("insufficient allocated cells for {builtin}: {used} used, {allocated} allocated")]
    InsufficientAllocatedCellsForBuiltin {
        /// The builtin whose segment overflowed its allocation.
        builtin: &'static str,
        /// The number of cells used.
        used: usize,
        /// The number of cells allocated.
        allocated: usize,
    },
    /// The proof layout requires more steps before the builtin's allocation exists at all.
    #[error("insufficient allocated cells: minimum step count {min_step} not reached for {builtin}")]
    MinStepNotReached {
        /// The builtin whose allocation is not yet defined.
        builtin: &'static str,
        /// The minimum step count required.
        min_step: usize,
    },
    /// The step count is not a multiple of the builtin's ratio.
    #[error("step count {steps} is not divisible by the ratio {ratio} of {builtin}")]
    StepsNotDivisibleByRatio {
        /// The builtin whose allocation was being computed.
        builtin: &'static str,
        /// The current step count.
        steps: usize,
        /// The builtin's ratio.
        ratio: usize,
    },
    /// No stop pointer was found on the return stack for the builtin.
    #[error("no stop pointer found for builtin {0}")]
    NoStopPointer(&'static str),
    /// The stop pointer of a builtin pointed into a foreign segment.
    #[error("stop pointer of {builtin} points to segment {found}, expected {expected}")]
    InvalidStopPointerIndex {
        /// The builtin whose stop pointer was inspected.
        builtin: &'static str,
        /// The segment the stop pointer referenced.
        found: isize,
        /// The builtin's own segment.
        expected: isize,
    },
    /// The stop pointer of a builtin did not match its used cell count.
    #[error("stop pointer of {builtin} is {found}, expected {expected} used cells")]
    InvalidStopPointer {
        /// The builtin whose stop pointer was inspected.
        builtin: &'static str,
        /// The offset the stop pointer held.
        found: usize,
        /// The number of cells actually used.
        expected: usize,
    },
    /// A memory error occurred while the builtin was reading its segment.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl BuiltinError {
    /// Returns whether this error belongs to the insufficient-allocated-cells family,
    /// which the proof-mode end-run loop recovers from by executing more steps.
    pub fn is_insufficient_allocated_cells(&self) -> bool {
        matches!(
            self,
            Self::InsufficientAllocatedCells { .. }
                | Self::InsufficientAllocatedCellsForBuiltin { .. }
                | Self::MinStepNotReached { .. }
        )
    }
}

/// An error that might occur while executing a single step of a Cairo program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The high bit of an instruction word was set.
    #[error("the high bit of the instruction word is not zero")]
    NonZeroHighBit,
    /// The source of the second operand of an instruction was invalid.
    #[error("invalid op1 source encoding")]
    InvalidOp1Source,
    /// The update logic of the **Program Counter** of an instruction was invalid.
    #[error("invalid pc update encoding")]
    InvalidPcUpdate,
    /// The result logic of an instruction was invalid.
    #[error("invalid result logic encoding")]
    InvalidResLogic,
    /// The OP code of an instruction was invalid.
    #[error("invalid opcode encoding")]
    InvalidOpcode,
    /// The update logic of the **Allocation Pointer** of an instruction was invalid.
    #[error("invalid ap update encoding")]
    InvalidApUpdate,
    /// The cell referenced by the program counter was missing, or held something that is
    /// not a field element representable in 64 bits.
    #[error("the cell at pc does not hold a valid instruction encoding")]
    InvalidInstructionEncoding,
    /// The address of an operand could not be computed.
    #[error("cannot compute the address of operand {0}")]
    CannotComputeAddress(&'static str),
    /// The value of an operand could not be deduced from builtins nor algebraically.
    #[error("failed to deduce operand {0}")]
    FailedToDeduceOperand(&'static str),
    /// `op0` was read as the base address of `op1` but did not hold a pointer.
    #[error("op0 must be a relocatable value to serve as the op1 base")]
    Op0NotRelocatable,
    /// An `ASSERT_EQ` instruction ran with an unconstrained result.
    #[error("assert-eq instruction ran with an unconstrained result")]
    UnconstrainedResForAssertEq,
    /// An `ASSERT_EQ` instruction failed its equality assertion.
    #[error("assert-eq failed: {dst} != {res}")]
    DiffAssertValues {
        /// The destination value.
        dst: Value,
        /// The computed result.
        res: Value,
    },
    /// A `CALL` instruction could not assert its return pc.
    #[error("call failed to write the return pc: {op0} != {ret_pc}")]
    CantWriteReturnPc {
        /// The value found for `op0`.
        op0: Value,
        /// The expected return pc.
        ret_pc: Value,
    },
    /// A `CALL` instruction could not assert its return fp.
    #[error("call failed to write the return fp: {dst} != {fp}")]
    CantWriteReturnFp {
        /// The value found for `dst`.
        dst: Value,
        /// The expected return fp.
        fp: Value,
    },
    /// An absolute jump targeted something that is not a pointer.
    #[error("jump target must be relocatable, got {0}")]
    JumpTargetNotRelocatable(Value),
    /// A relative jump was given a non-felt displacement.
    #[error("relative jump displacement must be a field element, got {0}")]
    RelJumpTargetNotFelt(Value),
    /// A jump instruction ran with an unconstrained result.
    #[error("jump instruction ran with an unconstrained result")]
    UnconstrainedResForJump,
    /// An `ap += res` update ran with an unconstrained result.
    #[error("ap update ran with an unconstrained result")]
    UnconstrainedResForApUpdate,
    /// A memory invariant was violated.
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// A builtin failed while deducing or validating a memory cell.
    #[error(transparent)]
    Builtin(#[from] BuiltinError),
}

/// An error raised while loading a compiled program.
#[derive(Debug, Error)]
pub enum ProgramError {
    /// The program file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The program JSON could not be parsed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The program was compiled for a different prime field.
    #[error("program prime {0} does not match the VM field")]
    PrimeMismatch(String),
    /// A bytecode word was not a valid hexadecimal felt.
    #[error("invalid felt literal in program data: {0}")]
    InvalidFelt(String),
}

/// An error raised by the runner while orchestrating a full execution.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The requested layout does not exist.
    #[error("unknown layout name: {0}")]
    InvalidLayoutName(String),
    /// The program requested a builtin the layout does not provide.
    #[error("builtin {builtin} is not present in layout {layout}")]
    BuiltinNotInLayout {
        /// The offending builtin.
        builtin: String,
        /// The selected layout.
        layout: &'static str,
    },
    /// The program's builtin list is not a subsequence of the layout's ordering.
    #[error("program builtins are not in the layout's order")]
    DisorderedBuiltins,
    /// The program has no `__main__.main` entrypoint.
    #[error("the program has no main entrypoint")]
    MissingMain,
    /// The program has no `__start__` identifier, required in proof mode.
    #[error("the program has no start label, required in proof mode")]
    NoProgramStart,
    /// The program has no `__end__` identifier, required in proof mode.
    #[error("the program has no end label, required in proof mode")]
    NoProgramEnd,
    /// The end of the program was reached with steps still remaining to run.
    #[error("reached the end of the program with {0} steps remaining")]
    EndOfProgram(usize),
    /// A phase ran before the segment bases it relies on were initialized.
    #[error("the runner's segments have not been initialized")]
    UninitializedBase,
    /// `end_run` was invoked a second time.
    #[error("the runner's end_run was called twice")]
    RunnerCalledTwice,
    /// Finalization was attempted before the run had ended.
    #[error("cannot finalize segments before the run has ended")]
    FinalizeBeforeEndRun,
    /// Return values were read before the run had ended.
    #[error("cannot read return values before the run has ended")]
    ReadReturnValuesBeforeEndRun,
    /// Return values were read after segments were finalized.
    #[error("cannot read return values once segments are finalized")]
    ReadReturnValuesAfterFinalize,
    /// Proof-mode finalization requires the execution public memory to be recorded.
    #[error("finalization requires an execution public memory")]
    NoExecutionPublicMemory,
    /// Proof-mode memory accounting requires the layout fractions to divide evenly.
    #[error("total memory units {total} are not divisible by the public memory fraction {fraction}")]
    MemoryUsageNotDivisible {
        /// The total number of memory units.
        total: usize,
        /// The layout's public memory fraction.
        fraction: usize,
    },
    /// A step failed during execution.
    #[error(transparent)]
    Vm(#[from] Error),
    /// A memory operation failed outside of the step loop.
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// A builtin failed outside of the step loop.
    #[error(transparent)]
    Builtin(#[from] BuiltinError),
}
