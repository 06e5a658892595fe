//! Proof-mode executions: bootstrapped entry, trace padding and public memory.

use zygarde::hint::NoopHintProcessor;
use zygarde::memory::{Pointer, Value};
use zygarde::program::Program;
use zygarde::runner::CairoRunner;

/// A proof-mode program: a bootstrapper calling `main`, followed by the canonical
/// infinite loop the trace is padded with.
///
/// ```text
/// 0: call rel 4        (__start__)
/// 2: jmp rel 0         (__end__)
/// 4: [ap] = 42; ap++   (main)
/// 6: ret
/// ```
fn bootstrapped_program() -> Program {
    let words = [
        0x1104800180018000u64,
        4,
        0x10780017fff7fff,
        0,
        0x480680017fff8000,
        42,
        0x208b7fff7fff7ffe,
    ];

    let mut program = Program::new(
        words.iter().map(|word| Value::from(*word)).collect(),
        Vec::new(),
        Some(4),
    );
    program.start = Some(0);
    program.end = Some(2);
    program
}

#[test]
fn proof_mode_bootstraps_from_the_start_label() {
    let mut runner = CairoRunner::new(bootstrapped_program(), "plain", true).unwrap();
    let end = runner.initialize().unwrap();

    // Execution begins at __start__ with the dummy return frame below fp.
    assert_eq!(runner.vm.cpu().pc, Pointer::new(0, 0));
    assert_eq!(runner.vm.cpu().ap, Pointer::new(1, 2));
    assert_eq!(runner.vm.cpu().fp, Pointer::new(1, 2));
    assert_eq!(end, Pointer::new(0, 2));

    // The dummy frame itself: [execution_base + 2, 0].
    assert_eq!(
        runner.vm.segments().memory.get(Pointer::new(1, 0)),
        Some(&Value::from(Pointer::new(1, 2)))
    );
    assert_eq!(
        runner.vm.segments().memory.get(Pointer::new(1, 1)),
        Some(&Value::from(0u64))
    );
}

#[test]
fn proof_mode_pads_the_trace_to_a_power_of_two() {
    let mut runner = CairoRunner::new(bootstrapped_program(), "plain", true).unwrap();
    let end = runner.initialize().unwrap();

    let mut hints = NoopHintProcessor;
    runner.run_until_pc(end, &mut hints).unwrap();

    // call + [ap] = 42 + ret.
    assert_eq!(runner.vm.current_step(), 3);

    runner.end_run(false, &mut hints).unwrap();

    // The end-run loop spins on `jmp rel 0` until the step count is a power of two
    // satisfying the layout accounting.
    assert!(runner.vm.current_step().is_power_of_two());
    assert_eq!(runner.vm.trace().len(), runner.vm.current_step());
    // Padding never moves the program counter off the end label.
    assert_eq!(runner.vm.cpu().pc, end);
}

#[test]
fn proof_mode_exposes_public_memory() {
    let mut runner = CairoRunner::new(bootstrapped_program(), "plain", true).unwrap();
    let end = runner.initialize().unwrap();

    let mut hints = NoopHintProcessor;
    runner.run_until_pc(end, &mut hints).unwrap();
    runner.end_run(false, &mut hints).unwrap();
    runner.read_return_values().unwrap();
    runner.finalize_segments().unwrap();

    let segments = runner.vm.segments();
    // The whole program is public.
    assert_eq!(
        segments.public_memory_offsets(0),
        Some(&(0..7).collect::<Vec<usize>>())
    );
    // The execution segment exposes the two dummy-frame cells.
    assert_eq!(segments.public_memory_offsets(1), Some(&vec![0, 1]));

    runner.relocate().unwrap();
    assert_eq!(runner.relocated_trace().len(), runner.vm.current_step());
}
