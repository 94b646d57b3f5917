use std::thread;
use std::time::Duration;

use hsm::{HsmResult, Machine, MachineBuilder, Message};

use super::{
    light_events::LightEvent,
    light_hsm_data::{LightHsmData, LightHsmDataRef},
    light_state_dimmer::LightStateDimmer,
    light_state_off::LightStateOff,
    light_state_on::LightStateOn,
    light_state_top::LightStateTop,
    light_states::LightState,
};

pub struct LightControllerHsm {
    machine: Machine,
    /// Exposed only so the demo binary can assert on internal counters;
    /// a real client has no business reaching into this.
    pub shared_data: LightHsmDataRef,
}

impl LightControllerHsm {
    pub fn new() -> HsmResult<Self> {
        let shared_data = LightHsmData::new(0);

        let machine = MachineBuilder::new("LightControllerHsm")
            .add_state(LightState::Top.into(), None, LightStateTop::new(shared_data.clone()))?
            .add_state(
                LightState::On.into(),
                Some(LightState::Top.into()),
                LightStateOn::new(shared_data.clone()),
            )?
            .add_state(
                LightState::Off.into(),
                Some(LightState::Top.into()),
                LightStateOff::new(shared_data.clone()),
            )?
            .add_state(
                LightState::Dimmer.into(),
                Some(LightState::On.into()),
                LightStateDimmer::new(shared_data.clone()),
            )?
            .set_initial_state(LightState::Dimmer.into())?
            .start()?;

        // The initial entry chain (Top -> On -> Dimmer) runs on the
        // machine's own worker thread and hasn't necessarily completed by
        // the time `start` returns; wait for it so the constructor hands
        // back a controller whose shared counters are already settled.
        while shared_data.lock().unwrap().dimmer_enter_called == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        Ok(LightControllerHsm {
            machine,
            shared_data,
        })
    }

    /// Sends `event` and blocks until its `LogRec` has been appended. The
    /// engine has no synchronous dispatch call (dispatch only ever happens
    /// on the machine's own worker thread), so a client that needs to
    /// observe the effect of one specific message has to wait for the ring
    /// to grow; this demo polls it rather than adding a bespoke ack channel.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn dispatch(&self, event: LightEvent) {
        self.dispatch_message(Message::new(event as i32));
    }

    pub fn dispatch_with_percentage(&self, event: LightEvent, percentage: u8) {
        self.dispatch_message(Message::new(event as i32).with_arg1(percentage as i32));
    }

    fn dispatch_message(&self, message: Message) {
        let before = self.machine.get_log_rec_count();
        self.machine.send(message);
        while self.machine.get_log_rec_count() == before {
            thread::sleep(Duration::from_millis(1));
        }
    }
}
