use hsm::StateId;
use strum::{AsRefStr, Display, FromRepr};

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, FromRepr)]
pub enum LightState {
    Top = 1,
    On = 2,
    Off = 3,
    Dimmer = 4,
}

impl From<LightState> for StateId {
    fn from(s: LightState) -> Self {
        StateId::new(s as u32)
    }
}
