use hsm::{Handled, Message, MachineHandle, State};

use super::light_hsm_data::LightHsmDataRef;

/// Root of the hierarchy. Absorbs anything no descendant claimed, so nothing
/// ever reaches `unhandled_message`.
pub struct LightStateTop {
    shared_data: LightHsmDataRef,
}

impl LightStateTop {
    pub fn new(shared_data: LightHsmDataRef) -> Box<Self> {
        Box::new(Self { shared_data })
    }
}

impl State for LightStateTop {
    fn name(&self) -> Option<&str> {
        Some("Top")
    }

    fn enter(&self, _handle: &MachineHandle) {
        self.shared_data.lock().unwrap().top_enter_called += 1;
    }

    fn exit(&self, _handle: &MachineHandle) {
        self.shared_data.lock().unwrap().top_exit_called += 1;
    }

    fn process_message(&self, _msg: &Message, _handle: &MachineHandle) -> Handled {
        Handled::Yes
    }
}
