use hsm::{Handled, MachineHandle, Message, State};

use super::{
    light_events::LightEvent,
    light_hsm_data::{LightAdjustment, LightHsmDataRef},
    light_states::LightState,
};

/// Child of `On`: dimming only matters while the light is on, and inherits
/// `On`'s Toggle/TurnOff handling for free by returning `Handled::No` and
/// letting the message bubble.
pub struct LightStateDimmer {
    shared_data: LightHsmDataRef,
}

impl LightStateDimmer {
    pub fn new(shared_data: LightHsmDataRef) -> Box<Self> {
        Box::new(Self { shared_data })
    }

    fn set_to_percentage(&self, handle: &MachineHandle, percentage: u8) {
        if percentage == 0 {
            handle
                .transition_to(LightState::Off.into())
                .expect("Off is always registered");
        } else if percentage >= 100 {
            handle
                .transition_to(LightState::On.into())
                .expect("On is always registered");
        } else {
            self.shared_data.lock().unwrap().set_lighting(percentage);
        }
    }
}

impl State for LightStateDimmer {
    fn name(&self) -> Option<&str> {
        Some("Dimmer")
    }

    fn enter(&self, _handle: &MachineHandle) {
        self.shared_data.lock().unwrap().dimmer_enter_called += 1;
    }

    fn exit(&self, _handle: &MachineHandle) {
        self.shared_data.lock().unwrap().dimmer_exit_called += 1;
    }

    fn process_message(&self, msg: &Message, handle: &MachineHandle) -> Handled {
        let percentage = || msg.arg1.unwrap_or(0).clamp(0, 100) as u8;
        match msg.what {
            w if w == LightEvent::Set as i32 => {
                self.set_to_percentage(handle, percentage());
                Handled::Yes
            }
            w if w == LightEvent::ReduceByPercent as i32 => {
                self.shared_data
                    .lock()
                    .unwrap()
                    .adjust_lighting_by_percentage(percentage(), LightAdjustment::Decrease);
                Handled::Yes
            }
            w if w == LightEvent::IncreaseByPercent as i32 => {
                self.shared_data
                    .lock()
                    .unwrap()
                    .adjust_lighting_by_percentage(percentage(), LightAdjustment::Increase);
                Handled::Yes
            }
            _ => Handled::No,
        }
    }
}
