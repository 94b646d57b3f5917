use hsm::{Handled, MachineHandle, Message, State};

use super::{light_events::LightEvent, light_hsm_data::LightHsmDataRef, light_states::LightState};

pub struct LightStateOff {
    shared_data: LightHsmDataRef,
}

impl LightStateOff {
    pub fn new(shared_data: LightHsmDataRef) -> Box<Self> {
        Box::new(Self { shared_data })
    }
}

impl State for LightStateOff {
    fn name(&self) -> Option<&str> {
        Some("Off")
    }

    fn enter(&self, _handle: &MachineHandle) {
        let mut data = self.shared_data.lock().unwrap();
        data.turn_off();
        data.off_enter_called += 1;
    }

    fn exit(&self, _handle: &MachineHandle) {
        self.shared_data.lock().unwrap().off_exit_called += 1;
    }

    fn process_message(&self, msg: &Message, handle: &MachineHandle) -> Handled {
        match msg.what {
            w if w == LightEvent::Toggle as i32 || w == LightEvent::TurnOn as i32 => {
                handle
                    .transition_to(LightState::On.into())
                    .expect("On is always registered");
                Handled::Yes
            }
            _ => Handled::No,
        }
    }
}
