//! The command loop.
//!
//! A strictly serial polling state machine: one recurring task per bound
//! function observes the command register, validates and executes at most
//! one command at a time, and signals completion through the controller.
//! The inbound side is polled rather than interrupt-driven — the endpoint
//! cannot assume the controller delivers a doorbell for every host write.
//!
//! [`tick`] is one deterministic iteration; [`Poller`] reschedules it at
//! [`POLL_INTERVAL`] on a dedicated thread for the lifetime of the bound
//! function. The tick path performs no heap allocation, so the loop keeps
//! making progress under memory pressure — it may be mediating the
//! transfers meant to relieve that pressure. Cancellation is synchronous —
//! [`Poller::shutdown`] joins the thread, so no iteration can touch
//! buffer memory after unbind proceeds to release.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use xmt_proto::regs::{status, Command, IrqKind, XMT_MAGIC};

use crate::function::FunctionShared;

/// Poll interval between loop iterations.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Observable state of the command loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for a command.
    Idle,
    /// A command was latched and is being validated.
    Pending,
    /// A validated transfer is copying.
    Transferring,
    /// The last command finished successfully; waiting for the host to
    /// acknowledge by clearing the command register.
    Complete,
    /// The last command was rejected or failed; waiting for the host
    /// acknowledgement.
    Error,
}

/// One iteration of the command loop.
///
/// Latches a pending command, runs the validation sequence, executes the
/// transfer, and leaves a terminal status behind. Terminal states return
/// to [`LoopState::Idle`] only once the host clears the command register.
pub(crate) fn tick(shared: &FunctionShared) {
    let regs = &shared.regs;
    let raw_cmd = regs.command();
    let mut state = shared.state.lock().expect("state lock poisoned");

    match *state {
        LoopState::Complete | LoopState::Error => {
            if raw_cmd == Command::Noop as u32 {
                *state = LoopState::Idle;
            }
            return;
        }
        // Pending/Transferring are transient within a single iteration;
        // the loop is serial, so a fresh tick only ever starts from Idle.
        LoopState::Pending | LoopState::Transferring => return,
        LoopState::Idle => {}
    }

    if raw_cmd == Command::Noop as u32 || regs.status() == status::IN_PROGRESS {
        return;
    }

    *state = LoopState::Pending;
    execute(shared, &mut state, raw_cmd);
}

fn execute(shared: &FunctionShared, state: &mut MutexGuard<'_, LoopState>, raw_cmd: u32) {
    let regs = &shared.regs;

    // Validation step 1: the magic gates everything. On a mismatch the
    // rest of the block is untrusted, so no completion signal either.
    let magic = regs.magic();
    if magic != XMT_MAGIC {
        tracing::warn!("Rejected command {raw_cmd:#x} with bad magic {magic:#x}");
        regs.set_status(status::INVALID_REQUEST);
        **state = LoopState::Error;
        return;
    }

    match Command::from_raw(raw_cmd) {
        None => {
            tracing::warn!("Rejected unknown command {raw_cmd:#x}");
            regs.set_status(status::INVALID_REQUEST);
            **state = LoopState::Error;
            raise_completion(shared);
        }
        Some(Command::Noop) => {
            // Unreachable in practice: the caller returns early on a
            // cleared command register.
            **state = LoopState::Idle;
        }
        Some(Command::QueryStatus) => {
            regs.set_status(status::SUCCESS);
            **state = LoopState::Complete;
            raise_completion(shared);
        }
        Some(Command::StartTransfer) => run_transfer(shared, state),
    }
}

fn run_transfer(shared: &FunctionShared, state: &mut MutexGuard<'_, LoopState>) {
    let regs = &shared.regs;
    let src = regs.src_addr();
    let dst = regs.dst_addr();
    let size = u64::from(regs.size());
    let capacity = shared.buffer.capacity() as u64;

    // Validation step 2: an unset (zero) length is an invalid request;
    // zero offsets are fine.
    if size == 0 {
        tracing::warn!("Rejected transfer with unset length");
        regs.set_status(status::INVALID_REQUEST);
        **state = LoopState::Error;
        raise_completion(shared);
        return;
    }

    // Validation step 3: both ranges must fit the buffer capacity.
    let src_fits = src.checked_add(size).is_some_and(|end| end <= capacity);
    let dst_fits = dst.checked_add(size).is_some_and(|end| end <= capacity);
    if !src_fits || !dst_fits {
        tracing::warn!(
            "Rejected transfer {src:#x}->{dst:#x} of {size:#x} bytes against {capacity:#x}-byte buffer"
        );
        regs.set_status(status::OVERFLOW);
        **state = LoopState::Error;
        raise_completion(shared);
        return;
    }

    // Accepted. The in-progress status lands before any buffer work so a
    // concurrent host poll never observes a stale terminal code.
    regs.set_status(status::IN_PROGRESS);
    **state = LoopState::Transferring;
    tracing::debug!("Transfer {src:#x} -> {dst:#x}, {size} bytes");

    let outcome = shared
        .buffer
        .copy_within(src, dst, size)
        .and_then(|()| shared.buffer.crc32(dst, size));

    match outcome {
        Ok(crc) if crc == regs.checksum() => {
            regs.set_status(status::SUCCESS);
            **state = LoopState::Complete;
        }
        Ok(crc) => {
            tracing::warn!(
                "Checksum mismatch: destination {crc:#010x}, host supplied {:#010x}",
                regs.checksum()
            );
            regs.set_status(status::CHECKSUM_MISMATCH);
            **state = LoopState::Error;
        }
        Err(err) => {
            tracing::error!("Transfer fault: {err}");
            regs.set_status(status::OVERFLOW);
            **state = LoopState::Error;
        }
    }
    raise_completion(shared);
}

/// Raise the completion signal selected by the `irq_type`/`irq_number`
/// fields. An unknown kind is logged and skipped; the host still sees the
/// terminal status by polling.
fn raise_completion(shared: &FunctionShared) {
    let regs = &shared.regs;
    let raw = regs.irq_type();
    let Some(kind) = IrqKind::from_raw(raw) else {
        tracing::warn!("Unknown irq_type {raw:#x}, completion signal skipped");
        return;
    };
    let number = regs.irq_number();
    let mut controller = shared.controller.lock().expect("controller lock poisoned");
    if let Err(err) = controller.raise_irq(kind, number) {
        tracing::warn!("Failed to raise {kind} #{number}: {err}");
    }
}

/// Handle to the recurring command-loop task.
#[derive(Debug)]
pub(crate) struct Poller {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start the loop at [`POLL_INTERVAL`].
    pub(crate) fn start(shared: Arc<FunctionShared>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("xmt-cmd".into())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    tick(&shared);
                    std::thread::sleep(POLL_INTERVAL);
                }
            })
            .expect("failed to spawn the command loop thread");
        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Stop the loop and wait for any in-flight iteration to finish.
    pub(crate) fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            tracing::debug!("Command loop cancelled");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use xmt_proto::regs::offset;

    use crate::buffer::SharedBuffer;
    use crate::regblock::{RegisterBlock, TransferRequest};
    use crate::soft::{SoftController, SoftRecorder};

    fn shared(capacity: usize) -> (Arc<FunctionShared>, SoftRecorder) {
        let controller = SoftController::default();
        let recorder = controller.recorder();
        let shared = Arc::new(FunctionShared {
            controller: Mutex::new(Box::new(controller)),
            regs: RegisterBlock::new(Arc::new(SharedBuffer::new(xmt_proto::regs::BLOCK_SIZE))),
            buffer: Arc::new(SharedBuffer::new(capacity)),
            state: Mutex::new(LoopState::Idle),
        });
        (shared, recorder)
    }

    fn state_of(shared: &FunctionShared) -> LoopState {
        *shared.state.lock().unwrap()
    }

    fn request(src: u64, dst: u64, size: u32, checksum: u32) -> TransferRequest {
        TransferRequest {
            src_addr: src,
            dst_addr: dst,
            size,
            checksum,
            irq_kind: IrqKind::Msi,
            irq_number: 1,
        }
    }

    #[test]
    fn successful_transfer_lands_success_and_raises_irq() {
        let (shared, recorder) = shared(8192);
        let payload = [0x5Au8; 256];
        shared.buffer.write_at(0, &payload).unwrap();

        shared
            .regs
            .enqueue_transfer(&request(0, 1024, 256, crc32fast::hash(&payload)));
        tick(&shared);

        assert_eq!(shared.regs.status(), status::SUCCESS);
        assert_eq!(state_of(&shared), LoopState::Complete);
        assert_eq!(recorder.irq_count(), 1);

        let mut copied = [0u8; 256];
        shared.buffer.read_at(1024, &mut copied).unwrap();
        assert_eq!(copied, payload);
    }

    #[test]
    fn terminal_state_returns_to_idle_after_host_ack() {
        let (shared, _recorder) = shared(4096);
        let payload = [1u8; 16];
        shared.buffer.write_at(0, &payload).unwrap();
        shared
            .regs
            .enqueue_transfer(&request(0, 64, 16, crc32fast::hash(&payload)));

        tick(&shared);
        assert_eq!(state_of(&shared), LoopState::Complete);

        // Command still latched: the loop must hold position.
        tick(&shared);
        assert_eq!(state_of(&shared), LoopState::Complete);

        shared.regs.clear_command();
        tick(&shared);
        assert_eq!(state_of(&shared), LoopState::Idle);
    }

    #[test]
    fn bad_magic_is_rejected_without_touching_the_buffer() {
        let (shared, recorder) = shared(4096);
        shared.buffer.write_at(0, &[7u8; 64]).unwrap();
        shared.regs.enqueue_transfer(&request(0, 128, 64, 0));
        shared.regs.write_raw_u32(offset::MAGIC, 0xBAD0_BAD0);

        tick(&shared);

        assert_eq!(shared.regs.status(), status::INVALID_REQUEST);
        assert_eq!(state_of(&shared), LoopState::Error);
        // Untrusted block: no completion signal.
        assert_eq!(recorder.irq_count(), 0);

        let mut dst = [0u8; 64];
        shared.buffer.read_at(128, &mut dst).unwrap();
        assert_eq!(dst, [0u8; 64]);
    }

    #[test]
    fn unknown_command_is_an_invalid_request() {
        let (shared, recorder) = shared(4096);
        shared.regs.enqueue_query(IrqKind::Intx, 0);
        shared.regs.write_raw_u32(offset::COMMAND, 0xFF);

        tick(&shared);

        assert_eq!(shared.regs.status(), status::INVALID_REQUEST);
        assert_eq!(recorder.irq_count(), 1);
    }

    #[test]
    fn oversize_transfer_is_rejected_without_copying() {
        let (shared, recorder) = shared(4096);
        shared.buffer.write_at(0, &[3u8; 64]).unwrap();
        shared.regs.enqueue_transfer(&request(0, 64, 4096, 0));

        tick(&shared);

        assert_eq!(shared.regs.status(), status::OVERFLOW);
        assert_eq!(state_of(&shared), LoopState::Error);
        assert_eq!(recorder.irq_count(), 1);

        let mut dst = [0u8; 64];
        shared.buffer.read_at(64, &mut dst).unwrap();
        assert_eq!(dst, [0u8; 64]);
    }

    #[test]
    fn zero_length_transfer_is_an_invalid_request() {
        let (shared, _recorder) = shared(4096);
        shared.regs.enqueue_transfer(&request(0, 64, 0, 0));
        tick(&shared);
        assert_eq!(shared.regs.status(), status::INVALID_REQUEST);
    }

    #[test]
    fn checksum_mismatch_is_not_a_silent_success() {
        let (shared, recorder) = shared(4096);
        shared.buffer.write_at(0, &[9u8; 32]).unwrap();
        shared.regs.enqueue_transfer(&request(0, 512, 32, 0x1234_5678));

        tick(&shared);

        assert_eq!(shared.regs.status(), status::CHECKSUM_MISMATCH);
        assert_eq!(state_of(&shared), LoopState::Error);
        // The host is still signalled so it does not poll forever.
        assert_eq!(recorder.irq_count(), 1);
    }

    #[test]
    fn in_progress_status_blocks_a_second_command() {
        let (shared, recorder) = shared(4096);
        shared.buffer.write_at(0, &[2u8; 16]).unwrap();
        shared
            .regs
            .enqueue_transfer(&request(0, 32, 16, crc32fast::hash(&[2u8; 16])));
        shared.regs.set_status(status::IN_PROGRESS);

        tick(&shared);

        // No second copy started: buffer untouched, no signal, still idle.
        assert_eq!(state_of(&shared), LoopState::Idle);
        assert_eq!(recorder.irq_count(), 0);
        let mut dst = [0u8; 16];
        shared.buffer.read_at(32, &mut dst).unwrap();
        assert_eq!(dst, [0u8; 16]);
    }

    #[test]
    fn query_status_reports_liveness() {
        let (shared, recorder) = shared(4096);
        shared.regs.enqueue_query(IrqKind::MsiX, 3);

        tick(&shared);

        assert_eq!(shared.regs.status(), status::SUCCESS);
        assert_eq!(state_of(&shared), LoopState::Complete);
        recorder.with(|r| assert_eq!(r.irqs.last(), Some(&(IrqKind::MsiX, 3))));
    }

    #[test]
    fn unknown_irq_kind_skips_the_signal() {
        let (shared, recorder) = shared(4096);
        shared.regs.enqueue_query(IrqKind::Intx, 0);
        shared.regs.write_raw_u32(offset::IRQ_TYPE, 9);

        tick(&shared);

        assert_eq!(shared.regs.status(), status::SUCCESS);
        assert_eq!(recorder.irq_count(), 0);
    }
}
