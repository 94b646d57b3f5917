mod light_hsm;

use light_hsm::{light_events::LightEvent, light_hsm_controller::LightControllerHsm, light_states::LightState};

fn main() {
    env_logger::init();

    let light_hsm = LightControllerHsm::new().expect("failed to build LightControllerHsm");

    // Start-up chain: Top -> On -> Dimmer, each entered exactly once.
    {
        let data = light_hsm.shared_data.lock().unwrap();
        assert_eq!(data.top_enter_called, 1);
        assert_eq!(data.on_enter_called, 1);
        assert_eq!(data.dimmer_enter_called, 1);
        assert_eq!(data.off_enter_called, 0);
    }
    light_hsm.shared_data.lock().unwrap().clear_counts();

    println!("Dimming to 0 turns the light off");
    light_hsm.dispatch_with_percentage(LightEvent::Set, 0);
    {
        let data = light_hsm.shared_data.lock().unwrap();
        assert_eq!(data.light_percentage, 0);
        assert_eq!(data.dimmer_exit_called, 1);
        assert_eq!(data.on_exit_called, 1);
        assert_eq!(data.off_enter_called, 1);
    }
    light_hsm.shared_data.lock().unwrap().clear_counts();

    println!("Turning back on lands in On, not Dimmer");
    light_hsm.dispatch(LightEvent::TurnOn);
    {
        let data = light_hsm.shared_data.lock().unwrap();
        assert_eq!(data.off_exit_called, 1);
        assert_eq!(data.on_enter_called, 1);
        assert_eq!(data.dimmer_enter_called, 0);
        assert_eq!(data.light_percentage, 100);
    }
    light_hsm.shared_data.lock().unwrap().clear_counts();

    println!("TurnOn while already on is a no-op, absorbed by Top");
    light_hsm.dispatch(LightEvent::TurnOn);
    {
        let data = light_hsm.shared_data.lock().unwrap();
        assert_eq!(data.on_enter_called, 0);
        assert_eq!(data.on_exit_called, 0);
        assert_eq!(data.off_enter_called, 0);
    }

    println!("Toggle from On falls through to Off");
    light_hsm.dispatch(LightEvent::Toggle);
    {
        let data = light_hsm.shared_data.lock().unwrap();
        assert_eq!(data.on_exit_called, 1);
        assert_eq!(data.off_enter_called, 1);
        assert_eq!(data.light_percentage, 0);
    }

    for rec in light_hsm.machine().copy_log_recs() {
        println!("{rec}");
    }

    println!("Reached {:?} via {} dispatches", LightState::Off, light_hsm.machine().get_log_rec_count());
}
