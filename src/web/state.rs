//! Shared state handed to every request handler.

use crate::control::ProcessControl;
use crate::core::RendezvousQueue;

#[derive(Clone)]
pub struct AppState {
    pub queue: RendezvousQueue,
    pub control: ProcessControl,
}

impl AppState {
    pub fn new(queue: RendezvousQueue, control: ProcessControl) -> Self {
        Self { queue, control }
    }
}
