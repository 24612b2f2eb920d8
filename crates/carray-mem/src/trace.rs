//! Reclaim tracing.
//!
//! Resolved once from `GcConfig` and passed through the store, so the free
//! path never reads the environment. `Log` forwards to `tracing`; `Capture`
//! keeps the rendered lines for the host to inspect.

use std::cell::RefCell;
use std::fmt;

use carray_core::config::GcConfig;
use carray_core::id::ArrayHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    DescriptorFreed { handle: ArrayHandle, view: bool },
    MetadataFreed { handle: ArrayHandle, view: bool },
    DataFreed { handle: ArrayHandle, view: bool },
    SlotRemoved { handle: ArrayHandle, view: bool },
}

impl TraceEvent {
    pub fn handle(&self) -> ArrayHandle {
        match *self {
            TraceEvent::DescriptorFreed { handle, .. }
            | TraceEvent::MetadataFreed { handle, .. }
            | TraceEvent::DataFreed { handle, .. }
            | TraceEvent::SlotRemoved { handle, .. } => handle,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = |view: bool| if view { "[VIEW]" } else { "" };
        match *self {
            TraceEvent::DescriptorFreed { handle, view } => write!(
                f,
                "[CARRAY_GC_DEBUG][DESCR]{} Freeing Descriptor from CArray ID {}",
                tag(view),
                handle.get()
            ),
            TraceEvent::MetadataFreed { handle, view } => write!(
                f,
                "[CARRAY_GC_DEBUG]{} Freeing Dimensions and Strides from CArray ID {}",
                tag(view),
                handle.get()
            ),
            TraceEvent::DataFreed { handle, view } => write!(
                f,
                "[CARRAY_GC_DEBUG]{} Freeing DATA from CArray ID {}",
                tag(view),
                handle.get()
            ),
            TraceEvent::SlotRemoved { handle, view } => write!(
                f,
                "[CARRAY_GC_DEBUG]{} Freeing CArray ID {}",
                tag(view),
                handle.get()
            ),
        }
    }
}

#[derive(Debug, Default)]
pub enum GcTrace {
    #[default]
    Off,
    Log,
    Capture(RefCell<Vec<String>>),
}

impl GcTrace {
    pub fn from_config(cfg: &GcConfig) -> Self {
        if cfg.debug {
            GcTrace::Log
        } else {
            GcTrace::Off
        }
    }

    pub fn capture() -> Self {
        GcTrace::Capture(RefCell::new(Vec::new()))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, GcTrace::Off)
    }

    pub fn emit(&self, event: TraceEvent) {
        match self {
            GcTrace::Off => {}
            GcTrace::Log => log_event(&event),
            GcTrace::Capture(lines) => lines.borrow_mut().push(event.to_string()),
        }
    }

    /// Captured lines; empty for the other modes.
    pub fn lines(&self) -> Vec<String> {
        match self {
            GcTrace::Capture(lines) => lines.borrow().clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(feature = "tracing")]
fn log_event(event: &TraceEvent) {
    tracing::debug!(handle = event.handle().get(), "{}", event);
}

#[cfg(not(feature = "tracing"))]
fn log_event(_event: &TraceEvent) { /* no-op */
}
