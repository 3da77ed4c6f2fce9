//! The bound endpoint function.
//!
//! [`XmtFunction`] is the context object tying everything together: it
//! negotiates a BAR layout against the controller's capability set,
//! allocates backing memory, wires the command register block, and runs
//! the command loop. One value per bound controller — there is no module
//! global anywhere.
//!
//! Bind-time sequencing follows the controller's notifier flags: BAR
//! programming happens at bind unless the controller requires the
//! core-init event, and the command loop starts at bind unless the
//! controller requires the link-up event. Unbind cancels the loop
//! synchronously before any backing memory is released.

use std::sync::{Arc, Mutex};

use xmt_proto::pcie::FunctionHeader;

use crate::buffer::SharedBuffer;
use crate::controller::EndpointController;
use crate::error::Result;
use crate::features::EpcFeatures;
use crate::handler::{tick, LoopState, Poller};
use crate::lifecycle::ControllerEvent;
use crate::negotiate::{negotiate, BarPlan};
use crate::regblock::RegisterBlock;
use crate::space::BarSpaces;
use crate::window::HostWindow;

/// Per-function identity handed to [`XmtFunction::bind`].
#[derive(Debug, Clone, Copy)]
pub struct FunctionConfig {
    /// Configuration-space header to present.
    pub header: FunctionHeader,
    /// Physical function number.
    pub func_no: u8,
    /// Virtual function number; headers are only written for the first
    /// two.
    pub vfunc_no: u8,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            header: FunctionHeader::xmt(),
            func_no: 0,
            vfunc_no: 0,
        }
    }
}

/// State shared between the function and its command loop.
pub(crate) struct FunctionShared {
    pub(crate) controller: Mutex<Box<dyn EndpointController>>,
    pub(crate) regs: RegisterBlock,
    pub(crate) buffer: Arc<SharedBuffer>,
    pub(crate) state: Mutex<LoopState>,
}

/// A bound endpoint function.
pub struct XmtFunction {
    shared: Arc<FunctionShared>,
    features: EpcFeatures,
    plan: BarPlan,
    spaces: Mutex<BarSpaces>,
    config: FunctionConfig,
    poller: Mutex<Option<Poller>>,
}

impl XmtFunction {
    /// Bind the function to a controller.
    ///
    /// Negotiates the BAR layout, allocates backing memory, and — unless
    /// the controller defers them to lifecycle events — programs the BARs
    /// and starts the command loop.
    ///
    /// # Errors
    ///
    /// Returns an error if negotiation finds no usable register BAR, the
    /// register backing memory cannot be allocated, or eager core
    /// initialization fails.
    pub fn bind(
        controller: Box<dyn EndpointController>,
        config: FunctionConfig,
    ) -> Result<Self> {
        let features = controller.features();
        let plan = negotiate(&features)?;
        let spaces = BarSpaces::allocate(&plan, &features)?;

        let regs = RegisterBlock::new(spaces.reg_region());
        let buffer = spaces
            .data_buffer()
            .unwrap_or_else(|| Arc::new(SharedBuffer::new(0)));
        if buffer.capacity() == 0 {
            tracing::warn!("No bulk window survived allocation; transfers will be rejected");
        }

        let function = Self {
            shared: Arc::new(FunctionShared {
                controller: Mutex::new(controller),
                regs,
                buffer,
                state: Mutex::new(LoopState::Idle),
            }),
            features,
            plan,
            spaces: Mutex::new(spaces),
            config,
            poller: Mutex::new(None),
        };

        if !function.features.core_init_notifier {
            function.core_init()?;
        }
        if !function.features.linkup_notifier {
            function.start_loop();
        }

        tracing::info!(
            "Bound endpoint function {:04x}:{:04x}, registers on {}",
            config.header.vendor_id,
            config.header.device_id,
            function.plan.reg_bar()
        );
        Ok(function)
    }

    /// Deliver a raw controller lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns [`crate::XmtError::InvalidEvent`] for an unknown value, or
    /// the core-init failure; either aborts this notification path only.
    pub fn notify(&self, raw: u32) -> Result<()> {
        match ControllerEvent::from_raw(raw)? {
            ControllerEvent::CoreInit => self.core_init(),
            ControllerEvent::LinkUp => {
                self.start_loop();
                Ok(())
            }
        }
    }

    /// Write the header and program the negotiated BAR windows.
    fn core_init(&self) -> Result<()> {
        let mut controller = self.shared.controller.lock().expect("controller lock poisoned");
        if self.config.vfunc_no <= 1 {
            controller.write_header(&self.config.header)?;
        }
        self.spaces
            .lock()
            .expect("spaces lock poisoned")
            .program(&mut **controller, &self.plan)
    }

    /// Start the command loop if it is not already running.
    fn start_loop(&self) {
        let mut poller = self.poller.lock().expect("poller lock poisoned");
        if poller.is_none() {
            *poller = Some(Poller::start(Arc::clone(&self.shared)));
            tracing::info!("Command loop scheduled");
        }
    }

    /// Run one command-loop iteration synchronously.
    ///
    /// The loop thread does exactly this once per [`crate::POLL_INTERVAL`];
    /// tests drive it directly for determinism.
    pub fn poll_once(&self) {
        tick(&self.shared);
    }

    /// Current command-loop state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        *self.shared.state.lock().expect("state lock poisoned")
    }

    /// Host-side handle to the command register block.
    #[must_use]
    pub fn registers(&self) -> RegisterBlock {
        self.shared.regs.clone()
    }

    /// Open a host window over the shared data buffer.
    #[must_use]
    pub fn window(&self) -> HostWindow {
        HostWindow::open(Arc::clone(&self.shared.buffer))
    }

    /// The negotiated BAR layout.
    #[must_use]
    pub const fn plan(&self) -> &BarPlan {
        &self.plan
    }

    /// The controller capability set the function bound against.
    #[must_use]
    pub const fn features(&self) -> &EpcFeatures {
        &self.features
    }

    /// Unbind: cancel the command loop, then unprogram and release every
    /// BAR.
    pub fn unbind(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        // The loop touches buffer memory; it must be fully stopped before
        // release. Shutdown joins the thread.
        if let Some(mut poller) = self.poller.lock().expect("poller lock poisoned").take() {
            poller.shutdown();
        }
        let mut controller = self.shared.controller.lock().expect("controller lock poisoned");
        self.spaces
            .lock()
            .expect("spaces lock poisoned")
            .release(&mut **controller);
    }
}

impl Drop for XmtFunction {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for XmtFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmtFunction")
            .field("reg_bar", &self.plan.reg_bar())
            .field("state", &self.state())
            .field("capacity", &self.shared.buffer.capacity())
            .finish_non_exhaustive()
    }
}
