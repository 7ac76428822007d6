use std::cell::RefCell;
use std::rc::Rc;

use skc_vm::asm::assemble;
use skc_vm::cpu::opcode;
use skc_vm::{Display, Layout, LedSink, Machine, Noise, Rgb};

#[derive(Clone, Default)]
struct FlushLog(Rc<RefCell<usize>>);

impl LedSink for FlushLog {
    fn flush(&mut self, _frame: &[Rgb]) {
        *self.0.borrow_mut() += 1;
    }
}

fn machine(layout: Layout) -> (Machine, FlushLog) {
    let flushes = FlushLog::default();
    let display = Display::shared(layout.led_count, flushes.clone());
    (Machine::new(layout, display, Noise::from_seed(7)), flushes)
}

#[test]
fn three_instruction_program_lights_one_led_then_halts() {
    let layout = Layout::default();
    let (mut m, flushes) = machine(layout);
    let video = layout.led_addr(5).unwrap();

    let mut program = vec![opcode::PUSH_INT, 0, 0, 0, 1, opcode::PUSH_INT];
    program.extend_from_slice(&video.to_be_bytes());
    program.push(opcode::WRITE);
    // Zeroed RAM after the program decodes as `Halt`.
    assert_eq!(m.load_program(&program), program.len());

    let cycles = m.run(100);
    assert_eq!(cycles, 4);
    assert!(m.cpu.is_halted());
    assert_eq!(m.bus.read(video), [0, 0, 0, 1]);
    assert_eq!(*flushes.0.borrow(), 1);

    let before = m.cpu.snapshot();
    assert_eq!(m.step(), None);
    assert_eq!(m.cpu.snapshot(), before);
}

#[test]
fn video_words_read_back_through_the_bus() {
    let layout = Layout::default();
    let (mut m, flushes) = machine(layout);
    let addr = layout.video_base + (1 + 5) * 4;

    m.bus.write(addr, [0, 10, 20, 30]);
    assert_eq!(m.bus.read(addr), [0, 10, 20, 30]);
    assert_eq!(*flushes.0.borrow(), 1);
}

#[test]
fn assembled_loop_fills_the_display() {
    let layout = Layout {
        led_count: 8,
        ..Layout::default()
    };
    let (mut m, _) = machine(layout);

    let source = format!(
        "
        #name i i1
        #name addr i2
        push 0
        pop i
        #here loop
        // addr = video + (1 + i) * 4
        push i
        push 1
        add
        push 4
        mul
        push {video}
        add
        pop addr
        // color: 0x00_01_02_03 + i
        push 0x010203
        push i
        add
        push addr
        write
        push i
        push 1
        add
        pop i
        push i
        push {count}
        jl loop
        hlt
        ",
        video = layout.video_base,
        count = layout.led_count,
    );
    let program = assemble(&source).unwrap();
    m.load_program(&program.bytes);
    m.run(10_000);

    assert!(m.cpu.is_halted());
    for i in 0..layout.led_count {
        let expected = [0, 1, 2, 3 + i as u8];
        assert_eq!(m.bus.read(layout.led_addr(i).unwrap()), expected, "led {i}");
    }
}

#[test]
fn program_can_sample_noise() {
    let layout = Layout::default();
    let (mut m, _) = machine(layout);

    let source = format!(
        "push {noise} read pop i1 push {noise} read pop i2 hlt",
        noise = layout.noise_base
    );
    m.load_program(&assemble(&source).unwrap().bytes);
    m.run(100);

    let mut reference = Noise::from_seed(7);
    let first = skc_vm::Device::read(&mut reference, 0);
    let second = skc_vm::Device::read(&mut reference, 0);
    assert_eq!(m.cpu.register(1), i32::from_be_bytes(first));
    assert_eq!(m.cpu.register(2), i32::from_be_bytes(second));
}

#[test]
fn reset_restarts_the_loaded_program() {
    let (mut m, _) = machine(Layout::default());
    m.load_program(&assemble("push 3 pop i0 hlt").unwrap().bytes);
    m.run(100);
    assert_eq!(m.cpu.register(0), 3);

    m.cpu.reset();
    assert_eq!(m.cpu.register(0), 0);
    m.run(100);
    assert_eq!(m.cpu.register(0), 3);
}
