//! XMT PCIe endpoint function driver.
//!
//! The endpoint side of a host/device command and data-transfer channel:
//! a command register block and a shared data buffer exposed through PCI
//! BARs, a polling command loop that executes host-requested transfers
//! behind a checksum gate, and a host-facing window over the same buffer.
//!
//! # Architecture
//!
//! ```text
//! EpcFeatures ──► negotiate() ──► BarPlan ──► BarSpaces (backing memory)
//!                                               │
//!                              RegisterBlock ◄──┤ register BAR
//!                                    │          └─► SharedBuffer (data BAR)
//!                                    ▼                   ▲          ▲
//!                              command loop ─────────────┘          │
//!                           (tick @ 1 ms, IRQ on completion)   HostWindow
//! ```
//!
//! The controller behind the function is anything implementing
//! [`EndpointController`]; [`SoftController`] is the no-hardware
//! implementation used by CI and the demo binary.
//!
//! # Quick start
//!
//! ```
//! use xmt_endpoint::{FunctionConfig, SoftController, XmtFunction, TransferRequest};
//! use xmt_proto::regs::{status, IrqKind};
//!
//! # fn main() -> xmt_endpoint::Result<()> {
//! let function = XmtFunction::bind(
//!     Box::new(SoftController::default()),
//!     FunctionConfig::default(),
//! )?;
//!
//! // Host side: stage data, ring the doorbell, poll for the outcome.
//! let window = function.window();
//! let pattern = vec![0xC3u8; 4096];
//! window.write(&pattern)?;
//!
//! let regs = function.registers();
//! regs.enqueue_transfer(&TransferRequest {
//!     src_addr: 0,
//!     dst_addr: 4096,
//!     size: 4096,
//!     checksum: crc32fast::hash(&pattern),
//!     irq_kind: IrqKind::Msi,
//!     irq_number: 1,
//! });
//!
//! for _ in 0..100 {
//!     if !matches!(regs.status(), status::NONE | status::IN_PROGRESS) {
//!         break;
//!     }
//!     std::thread::sleep(xmt_endpoint::POLL_INTERVAL);
//! }
//! assert_eq!(regs.status(), status::SUCCESS);
//! function.unbind();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod buffer;
mod controller;
mod error;
mod features;
mod function;
mod handler;
mod lifecycle;
mod negotiate;
mod regblock;
mod soft;
mod space;
mod window;

pub use buffer::SharedBuffer;
pub use controller::{BarAssignment, EndpointController};
pub use error::{Result, XmtError};
pub use features::EpcFeatures;
pub use function::{FunctionConfig, XmtFunction};
pub use handler::{LoopState, POLL_INTERVAL};
pub use lifecycle::{ControllerEvent, CORE_INIT, LINK_UP};
pub use negotiate::{negotiate, BarEntry, BarPlan};
pub use regblock::{RegisterBlock, TransferRequest};
pub use soft::{SoftController, SoftRecorder, SoftRecording};
pub use space::BarSpaces;
pub use window::{HostWindow, MappedWindow, PAGE_SIZE};
