//! `xmt` — demo and diagnostic CLI for the XMT endpoint function.
//!
//! ```text
//! USAGE:
//!   xmt demo [--size N] [--src OFF] [--dst OFF]   Run a loopback transfer
//!   xmt layout                                    Print the wire contract
//! ```
//!
//! The demo binds a software-controller-backed function and plays both
//! sides of the channel: host staging through the window, doorbell,
//! status polling, and read-back verification.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use xmt_endpoint::{FunctionConfig, SoftController, TransferRequest, XmtFunction};
use xmt_proto::bar::{BarNo, DEFAULT_BAR_SIZE};
use xmt_proto::regs::{offset, status, IrqKind, BLOCK_SIZE, XMT_MAGIC};

#[derive(Parser)]
#[command(name = "xmt", about = "XMT endpoint function demo CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Bind a software-backed function and run a loopback transfer.
    Demo {
        /// Transfer length in bytes.
        #[arg(long, default_value_t = 4096)]
        size: u32,
        /// Source offset within the data buffer.
        #[arg(long, default_value_t = 0)]
        src: u64,
        /// Destination offset within the data buffer.
        #[arg(long, default_value_t = 4096)]
        dst: u64,
    },
    /// Print the register-block layout and BAR defaults.
    Layout,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Demo { size, src, dst } => cmd_demo(size, src, dst),
        Cmd::Layout => cmd_layout(),
    }
}

fn cmd_demo(size: u32, src: u64, dst: u64) -> Result<()> {
    let controller = SoftController::default();
    let recorder = controller.recorder();

    let function = XmtFunction::bind(Box::new(controller), FunctionConfig::default())
        .context("binding the endpoint function")?;
    println!(
        "Bound function, register block on {}",
        function.plan().reg_bar()
    );

    // Host side: stage a pattern, ring the doorbell.
    let window = function.window();
    let pattern: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    window
        .write_at(src, &pattern)
        .context("staging the transfer source")?;

    let regs = function.registers();
    regs.enqueue_transfer(&TransferRequest {
        src_addr: src,
        dst_addr: dst,
        size,
        checksum: crc32fast::hash(&pattern),
        irq_kind: IrqKind::Msi,
        irq_number: 1,
    });
    println!("Doorbell rung: {src:#x} -> {dst:#x}, {size} bytes");

    // Poll the status field the way a host driver would.
    let mut outcome = status::NONE;
    for _ in 0..1000 {
        outcome = regs.status();
        if !matches!(outcome, status::NONE | status::IN_PROGRESS) {
            break;
        }
        std::thread::sleep(xmt_endpoint::POLL_INTERVAL);
    }

    if outcome != status::SUCCESS {
        bail!("transfer failed with status {outcome}");
    }

    let mut readback = vec![0u8; pattern.len()];
    window
        .read_at(dst, &mut readback)
        .context("reading the destination range")?;
    if readback != pattern {
        bail!("destination range does not match the staged pattern");
    }

    println!(
        "Transfer complete: status=success, {} completion IRQ(s) raised",
        recorder.irq_count()
    );

    regs.clear_command();
    function.unbind();
    println!("Function unbound");
    Ok(())
}

fn cmd_layout() -> Result<()> {
    println!("Register block (magic {XMT_MAGIC:#010x}, {BLOCK_SIZE} bytes):");
    for (name, at, width) in [
        ("magic", offset::MAGIC, 4),
        ("command", offset::COMMAND, 4),
        ("status", offset::STATUS, 4),
        ("src_addr", offset::SRC_ADDR, 8),
        ("dst_addr", offset::DST_ADDR, 8),
        ("size", offset::SIZE, 4),
        ("checksum", offset::CHECKSUM, 4),
        ("irq_type", offset::IRQ_TYPE, 4),
        ("irq_number", offset::IRQ_NUMBER, 4),
        ("flags", offset::FLAGS, 4),
    ] {
        println!("  {at:#04x}  u{:<2}  {name}", width * 8);
    }

    println!();
    println!("BAR size defaults:");
    for bar in BarNo::ALL {
        println!("  {bar}  {:>9} bytes", DEFAULT_BAR_SIZE[bar.index()]);
    }
    Ok(())
}
