//! Minimal loopback: bind a software-backed function, move 8 KiB through
//! the channel, verify the destination range.

use xmt_endpoint::{FunctionConfig, SoftController, TransferRequest, XmtFunction};
use xmt_proto::regs::{status, IrqKind};

fn main() -> xmt_endpoint::Result<()> {
    let function = XmtFunction::bind(
        Box::new(SoftController::default()),
        FunctionConfig::default(),
    )?;

    let window = function.window();
    let pattern = vec![0x42u8; 8192];
    window.write(&pattern)?;

    let regs = function.registers();
    regs.enqueue_transfer(&TransferRequest {
        src_addr: 0,
        dst_addr: 8192,
        size: 8192,
        checksum: crc32fast::hash(&pattern),
        irq_kind: IrqKind::Intx,
        irq_number: 0,
    });

    while matches!(regs.status(), status::NONE | status::IN_PROGRESS) {
        std::thread::sleep(xmt_endpoint::POLL_INTERVAL);
    }
    println!("status: {}", regs.status());

    let mut readback = vec![0u8; 8192];
    window.read_at(8192, &mut readback)?;
    assert_eq!(readback, pattern);
    println!("destination range verified");

    function.unbind();
    Ok(())
}
