use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use skc_vm::Layout;
use thiserror::Error;

#[derive(Debug, Clone, Parser)]
#[command(name = "skc-firmware", version, about)]
pub struct Args {
    /// Address the HTTP/WebSocket server listens on.
    ///
    /// Environment variable: `SKC_LISTEN_ADDR`.
    #[arg(long, env = "SKC_LISTEN_ADDR", default_value = "0.0.0.0:80")]
    pub listen_addr: SocketAddr,

    /// Number of LEDs on the chain.
    ///
    /// Environment variable: `SKC_LED_COUNT`.
    #[arg(long, env = "SKC_LED_COUNT", default_value_t = skc_vm::layout::DEFAULT_LED_COUNT)]
    pub led_count: usize,

    /// RAM size in bytes. Accepts decimal or `0x` hex.
    ///
    /// Environment variable: `SKC_RAM_SIZE`.
    #[arg(long, env = "SKC_RAM_SIZE", default_value = "32000", value_parser = parse_number)]
    pub ram_size: u32,

    /// First bus address of the display window.
    ///
    /// Environment variable: `SKC_VIDEO_BASE`.
    #[arg(long, env = "SKC_VIDEO_BASE", default_value = "0x10000", value_parser = parse_number)]
    pub video_base: u32,

    /// Bus address of the random source.
    ///
    /// Environment variable: `SKC_NOISE_BASE`.
    #[arg(long, env = "SKC_NOISE_BASE", default_value = "0x50000", value_parser = parse_number)]
    pub noise_base: u32,

    /// File the uploaded program is persisted to and loaded from at boot.
    ///
    /// Environment variable: `SKC_PROGRAM_STORE`.
    #[arg(long, env = "SKC_PROGRAM_STORE", default_value = "ram.bin")]
    pub program_store: PathBuf,

    /// Program loaded at boot instead of the program store.
    ///
    /// Files ending in `.asm` are assembled first; anything else is loaded as raw bytes.
    ///
    /// Environment variable: `SKC_DEFAULT_PROGRAM`.
    #[arg(long, env = "SKC_DEFAULT_PROGRAM")]
    pub default_program: Option<PathBuf>,

    /// Page served for `GET /`.
    ///
    /// Environment variable: `SKC_INDEX_HTML`.
    #[arg(long, env = "SKC_INDEX_HTML", default_value = "index.html")]
    pub index_html: PathBuf,

    /// Keepalive period in milliseconds.
    ///
    /// Environment variable: `SKC_PING_INTERVAL_MS`.
    #[arg(long, env = "SKC_PING_INTERVAL_MS", default_value_t = 10_000)]
    pub ping_interval_ms: u64,

    /// Button sampling period in milliseconds.
    ///
    /// Environment variable: `SKC_BUTTON_POLL_MS`.
    #[arg(long, env = "SKC_BUTTON_POLL_MS", default_value_t = 10)]
    pub button_poll_ms: u64,

    /// Processor steps executed between scheduler yields.
    ///
    /// Environment variable: `SKC_STEPS_PER_YIELD`.
    #[arg(long, env = "SKC_STEPS_PER_YIELD", default_value_t = 1)]
    pub steps_per_yield: u32,

    /// Log a processor snapshot every N cycles.
    ///
    /// Environment variable: `SKC_DEBUG_EVERY`.
    #[arg(long, env = "SKC_DEBUG_EVERY")]
    pub debug_every: Option<u64>,

    /// Log filter (tracing-subscriber EnvFilter syntax), used when `RUST_LOG` is unset.
    ///
    /// Environment variable: `SKC_LOG_LEVEL`.
    #[arg(long, env = "SKC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("led count must be at least 1")]
    NoLeds,

    #[error("{name} must be at least 1")]
    Zero { name: &'static str },

    #[error("ram size {0} does not fit the address space")]
    RamTooLarge(u32),

    #[error("display window for {led_count} leds at {video_base:#x} runs past the end of the address space")]
    DisplayTooLarge { led_count: usize, video_base: u32 },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub layout: Layout,
    pub program_store: PathBuf,
    pub default_program: Option<PathBuf>,
    pub index_html: PathBuf,
    pub ping_interval: Duration,
    pub button_poll: Duration,
    pub steps_per_yield: u32,
    pub debug_every: Option<u64>,
    pub log_level: String,
}

impl Config {
    /// Parse the command line (and `SKC_*` environment) into a validated config.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        if args.led_count == 0 {
            return Err(ConfigError::NoLeds);
        }
        if args.steps_per_yield == 0 {
            return Err(ConfigError::Zero {
                name: "steps per yield",
            });
        }
        if args.ping_interval_ms == 0 {
            return Err(ConfigError::Zero {
                name: "ping interval",
            });
        }
        if args.button_poll_ms == 0 {
            return Err(ConfigError::Zero {
                name: "button poll interval",
            });
        }
        if args.debug_every == Some(0) {
            return Err(ConfigError::Zero {
                name: "debug interval",
            });
        }
        // Inclusive RAM range ends at `ram_size`, which must stay addressable.
        if args.ram_size == u32::MAX {
            return Err(ConfigError::RamTooLarge(args.ram_size));
        }

        let layout = Layout {
            ram_size: args.ram_size as usize,
            video_base: args.video_base,
            noise_base: args.noise_base,
            led_count: args.led_count,
        };
        if layout.video_end().is_none() {
            return Err(ConfigError::DisplayTooLarge {
                led_count: layout.led_count,
                video_base: layout.video_base,
            });
        }

        Ok(Self {
            listen_addr: args.listen_addr,
            layout,
            program_store: args.program_store,
            default_program: args.default_program,
            index_html: args.index_html,
            ping_interval: Duration::from_millis(args.ping_interval_ms),
            button_poll: Duration::from_millis(args.button_poll_ms),
            steps_per_yield: args.steps_per_yield,
            debug_every: args.debug_every,
            log_level: args.log_level,
        })
    }
}

/// Decimal, or hexadecimal with a `0x` prefix.
fn parse_number(value: &str) -> Result<u32, String> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => value.replace('_', "").parse(),
    };
    parsed.map_err(|err| format!("invalid number {value:?}: {err}"))
}
