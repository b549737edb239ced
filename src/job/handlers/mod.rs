//! Job bodies, one file per action group

mod capture;
mod power;
mod secure;
mod status;

pub use capture::{capture_images, sweep_room, take_three};
pub use power::{go_to_sleep, reboot};
pub use secure::{go_secure, stop_secure, SecureWatch};
pub use status::{are_you_there, ip, temperature};
