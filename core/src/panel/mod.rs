//! The overlay panel: render state, height bookkeeping and the controller
//! that drives both.

mod controller;
pub mod layout;
pub mod state;

pub use controller::PanelController;
pub use state::PanelMode;
pub use state::PanelState;
