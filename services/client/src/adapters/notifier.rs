//! services/client/src/adapters/notifier.rs
//!
//! Renders user-facing notifications as log lines for the headless client.

use campus_swap_core::ports::{Notifier, Toast, ToastVariant};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        match toast.variant {
            ToastVariant::Destructive => {
                warn!(title = %toast.title, "{}", toast.description)
            }
            ToastVariant::Success | ToastVariant::Default => {
                info!(title = %toast.title, "{}", toast.description)
            }
        }
    }
}
