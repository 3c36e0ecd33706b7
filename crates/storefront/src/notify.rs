//! Optional UI capabilities: toasts and cart re-render hooks.
//!
//! The storefront works without either. Front-ends that can show toasts or
//! re-render the cart drawer register an implementation.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::cart::CartSnapshot;

/// Toast severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Info,
    Warning,
    Error,
}

impl ToastKind {
    /// CSS modifier / label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A short message for the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            message: message.into(),
        }
    }
}

/// Shows toasts.
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Re-renders cart UI when the cart changes.
pub trait CartObserver: Send + Sync {
    fn cart_changed(&self, snapshot: &CartSnapshot);
}

/// Notifier that keeps toasts until drained. Used by the CLI, which prints
/// them after each command, and by tests.
#[derive(Debug, Default)]
pub struct ToastLog {
    toasts: Mutex<Vec<Toast>>,
}

impl ToastLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every toast collected so far.
    pub fn drain(&self) -> Vec<Toast> {
        std::mem::take(&mut *self.toasts.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for ToastLog {
    fn notify(&self, toast: Toast) {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(toast);
    }
}
