use hsm::{Handled, MachineHandle, Message, State};

use super::{light_events::LightEvent, light_hsm_data::LightHsmDataRef, light_states::LightState};

pub struct LightStateOn {
    shared_data: LightHsmDataRef,
}

impl LightStateOn {
    pub fn new(shared_data: LightHsmDataRef) -> Box<Self> {
        Box::new(Self { shared_data })
    }
}

impl State for LightStateOn {
    fn name(&self) -> Option<&str> {
        Some("On")
    }

    /// Entered both as the steady state and transiently on the way to
    /// `Dimmer`; `Dimmer::enter` overwrites the percentage it cares about
    /// right after, so the brief full-brightness flicker never reaches a
    /// client that only observes the settled state.
    fn enter(&self, _handle: &MachineHandle) {
        let mut data = self.shared_data.lock().unwrap();
        data.turn_on();
        data.on_enter_called += 1;
    }

    fn exit(&self, _handle: &MachineHandle) {
        self.shared_data.lock().unwrap().on_exit_called += 1;
    }

    fn process_message(&self, msg: &Message, handle: &MachineHandle) -> Handled {
        match msg.what {
            w if w == LightEvent::Toggle as i32 || w == LightEvent::TurnOff as i32 => {
                handle
                    .transition_to(LightState::Off.into())
                    .expect("Off is always registered");
                Handled::Yes
            }
            _ => Handled::No,
        }
    }
}
