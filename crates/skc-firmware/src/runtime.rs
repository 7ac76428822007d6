use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context as _;
use skc_vm::asm::{assemble, disassemble};
use skc_vm::{Display, LedSink, Machine, Noise, Rgb, SharedDisplay, Snapshot};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::hal::Button;
use crate::server::{start_server, ServerHandle};
use crate::store::ProgramStore;

/// Everything a connection needs, created once at boot and shared by every session.
pub struct Context {
    pub display: SharedDisplay,
    pub store: ProgramStore,
    pub button: Rc<dyn Button>,
    pub index_html: PathBuf,
    pub ping_interval: Duration,
    pub button_poll: Duration,
}

/// Where the boot image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootImage {
    Default { path: PathBuf, bytes: usize },
    Store { bytes: usize },
    Empty,
}

/// The booted device: processor, bus and the shared context.
pub struct Firmware {
    pub machine: Rc<RefCell<Machine>>,
    pub ctx: Rc<Context>,
    pub boot_image: BootImage,
    config: Config,
}

impl Firmware {
    /// Wire the devices, blank the LEDs and load RAM.
    pub async fn boot(
        config: Config,
        leds: impl LedSink + 'static,
        button: Rc<dyn Button>,
        noise: Noise,
    ) -> Self {
        let display = Display::shared(config.layout.led_count, leds);
        {
            let mut display = display.borrow_mut();
            display.fill(Rgb::OFF);
            display.flush();
        }

        let mut machine = Machine::new(config.layout, display.clone(), noise);
        let store = ProgramStore::new(&config.program_store);
        let boot_image = load_ram(&mut machine, config.default_program.as_deref(), &store).await;
        tracing::info!(?boot_image, store = %store.path().display(), bus = ?machine.bus, "booted");

        let ctx = Rc::new(Context {
            display,
            store,
            button,
            index_html: config.index_html.clone(),
            ping_interval: config.ping_interval,
            button_poll: config.button_poll,
        });

        Self {
            machine: Rc::new(RefCell::new(machine)),
            ctx,
            boot_image,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the listener and start accepting. Must be called inside a `LocalSet`.
    pub async fn start_server(&self) -> std::io::Result<ServerHandle> {
        start_server(self.config.listen_addr, self.ctx.clone()).await
    }

    /// Spawn the processor step loop on the current `LocalSet`. Resolves to the cycle count at halt.
    pub fn spawn_processor(&self) -> JoinHandle<u64> {
        tokio::task::spawn_local(run_processor(
            self.machine.clone(),
            self.config.steps_per_yield,
            self.config.debug_every,
        ))
    }
}

/// Load the default program if one is configured and usable, otherwise the program store.
///
/// Failures are logged and never fatal; the processor then starts on zeroed RAM.
pub async fn load_ram(
    machine: &mut Machine,
    default_program: Option<&Path>,
    store: &ProgramStore,
) -> BootImage {
    if let Some(path) = default_program {
        match read_default_program(path).await {
            Ok(program) => {
                trace_listing(&program);
                let bytes = machine.load_program(&program);
                return BootImage::Default {
                    path: path.to_path_buf(),
                    bytes,
                };
            }
            Err(err) => tracing::warn!("default program unusable, using program store: {err:#}"),
        }
    }

    match store.load().await {
        Ok(program) => {
            trace_listing(&program);
            let bytes = machine.load_program(&program);
            if bytes < program.len() {
                tracing::warn!(stored = program.len(), bytes, "stored program truncated to RAM size");
            }
            BootImage::Store { bytes }
        }
        Err(err) => {
            tracing::warn!("no program loaded: {err}");
            BootImage::Empty
        }
    }
}

fn trace_listing(program: &[u8]) {
    if tracing::enabled!(target: "skc::boot", tracing::Level::TRACE) {
        for (addr, inst) in disassemble(program) {
            tracing::trace!(target: "skc::boot", addr, "{inst}");
        }
    }
}

async fn read_default_program(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path.extension().is_some_and(|ext| ext == "asm") {
        let source = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let program =
            assemble(&source).with_context(|| format!("failed to assemble {}", path.display()))?;
        Ok(program.bytes)
    } else {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
    }
}

/// Step the processor until it halts, yielding to the scheduler after every batch.
pub async fn run_processor(
    machine: Rc<RefCell<Machine>>,
    steps_per_yield: u32,
    debug_every: Option<u64>,
) -> u64 {
    loop {
        {
            let mut machine = machine.borrow_mut();
            for snapshot in run_batch(&mut machine, steps_per_yield, debug_every) {
                tracing::info!(target: "skc::cpu", "{snapshot}");
            }
            if machine.cpu.is_halted() {
                let cycles = machine.cpu.cycles();
                tracing::info!(cycles, ip = machine.cpu.ip(), "processor halted");
                return cycles;
            }
        }
        tokio::task::yield_now().await;
    }
}

/// Run up to `steps` cycles, stopping early on halt. Returns the debug snapshots taken, one for
/// every cycle count divisible by `debug_every`.
pub fn run_batch(machine: &mut Machine, steps: u32, debug_every: Option<u64>) -> Vec<Snapshot> {
    let mut snapshots = Vec::new();
    for _ in 0..steps.max(1) {
        if machine.step().is_none() {
            break;
        }
        if let Some(every) = debug_every {
            if machine.cpu.cycles() % every == 0 {
                machine.cpu.request_debug();
            }
        }
        snapshots.extend(machine.cpu.take_debug());
    }
    snapshots
}

#[cfg(test)]
mod tests {
    use skc_vm::{Layout, Rgb};

    use super::*;

    struct Discard;

    impl LedSink for Discard {
        fn flush(&mut self, _frame: &[Rgb]) {}
    }

    fn machine() -> Machine {
        let layout = Layout::default();
        Machine::new(layout, Display::shared(layout.led_count, Discard), Noise::from_seed(1))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn assembles_an_asm_default_program() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.asm");
        tokio::fs::write(&path, "push 9 pop i3 hlt").await.unwrap();
        let store = ProgramStore::new(dir.path().join("ram.bin"));

        let mut m = machine();
        let image = load_ram(&mut m, Some(&path), &store).await;
        assert!(matches!(image, BootImage::Default { bytes: 8, .. }), "{image:?}");
        m.run(10);
        assert_eq!(m.cpu.register(3), 9);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn falls_back_to_the_store_then_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgramStore::new(dir.path().join("ram.bin"));
        let broken = dir.path().join("broken.asm");
        tokio::fs::write(&broken, "push").await.unwrap();

        let mut m = machine();
        assert_eq!(load_ram(&mut m, Some(&broken), &store).await, BootImage::Empty);

        store.append(&[0x02, 0, 0, 0, 5, 0x03, 0x01]).await.unwrap();
        assert_eq!(
            load_ram(&mut m, Some(&broken), &store).await,
            BootImage::Store { bytes: 7 }
        );
        m.run(10);
        assert_eq!(m.cpu.register(1), 5);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn step_loop_yields_between_batches() {
        let mut m = machine();
        // Tight loop: push 0, push 1, jl back to start.
        let program = skc_vm::asm::assemble("#here top push 0 push 1 jl top").unwrap();
        m.load_program(&program.bytes);
        let machine = Rc::new(RefCell::new(m));

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let task = tokio::task::spawn_local(run_processor(machine.clone(), 3, None));
                for _ in 0..4 {
                    tokio::task::yield_now().await;
                }
                // The loop never halts, yet this task keeps getting scheduled.
                assert!(machine.borrow().cpu.cycles() >= 3);
                task.abort();
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn step_loop_reports_halt_cycles() {
        let mut m = machine();
        m.load_program(&skc_vm::asm::assemble("push 1 push 2 add hlt").unwrap().bytes);
        let cycles = run_processor(Rc::new(RefCell::new(m)), 2, None).await;
        assert_eq!(cycles, 4);
    }

    #[test]
    fn batches_snapshot_on_the_debug_period() {
        let mut m = machine();
        m.load_program(&skc_vm::asm::assemble("push 1 push 2 add hlt").unwrap().bytes);

        let first = run_batch(&mut m, 3, Some(2));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].cycles, 2);
        assert_eq!(first[0].stack, vec![2, 1]);

        // Stops at the halt even though the batch allows more steps.
        let second = run_batch(&mut m, 10, Some(2));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].cycles, 4);
        assert_eq!(second[0].stack, vec![3]);
        assert!(m.cpu.is_halted());
        assert!(run_batch(&mut m, 10, Some(1)).is_empty());
    }
}
