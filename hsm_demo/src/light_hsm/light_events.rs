use strum::Display;

/// `what` codes this HSM dispatches on. `Set`/`ReduceByPercent`/
/// `IncreaseByPercent` carry their percentage in `Message::arg1`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LightEvent {
    Toggle = 0,
    Set = 1,
    TurnOff = 2,
    TurnOn = 3,
    ReduceByPercent = 4,
    IncreaseByPercent = 5,
}
