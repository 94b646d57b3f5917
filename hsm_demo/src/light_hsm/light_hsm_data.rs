use std::sync::{Arc, Mutex};

pub type LightHsmDataRef = Arc<Mutex<LightHsmData>>;

pub enum LightAdjustment {
    Increase,
    Decrease,
}

/// Data shared between the controller and the states. `State` requires
/// `Send + Sync`, so this lives behind a `Mutex` rather than a `RefCell`.
#[derive(Default)]
pub struct LightHsmData {
    /// 0 = off, 100 = on.
    pub light_percentage: u8,
    pub top_enter_called: u16,
    pub top_exit_called: u16,
    pub on_enter_called: u16,
    pub on_exit_called: u16,
    pub off_enter_called: u16,
    pub off_exit_called: u16,
    pub dimmer_enter_called: u16,
    pub dimmer_exit_called: u16,
}

impl LightHsmData {
    pub fn new(percentage: u8) -> LightHsmDataRef {
        Arc::new(Mutex::new(LightHsmData {
            light_percentage: percentage,
            ..Default::default()
        }))
    }

    pub fn turn_off(&mut self) {
        self.set_lighting(0);
    }

    pub fn turn_on(&mut self) {
        self.set_lighting(100);
    }

    /// True on success. 0-100 is the only valid range.
    pub fn set_lighting(&mut self, percentage: u8) -> bool {
        if percentage <= 100 {
            self.light_percentage = percentage;
            true
        } else {
            false
        }
    }

    pub fn adjust_lighting_by_percentage(&mut self, modifier: u8, adjustment: LightAdjustment) {
        let delta = self.light_percentage.saturating_mul(modifier) / 100;
        let new_percentage = match adjustment {
            LightAdjustment::Decrease => self.light_percentage.saturating_sub(delta),
            LightAdjustment::Increase => self.light_percentage.saturating_add(delta),
        };
        self.set_lighting(new_percentage.min(100));
    }

    pub fn clear_counts(&mut self) {
        *self = LightHsmData {
            light_percentage: self.light_percentage,
            ..Default::default()
        };
    }
}
