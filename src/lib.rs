pub mod ai;
pub mod config;
pub mod console;
pub mod context;
pub mod kiosk;
pub mod types;
#[cfg(any(feature = "desktop", feature = "web", feature = "mobile"))]
pub mod ui;
pub mod view;

pub use config::KioskConfig;
pub use kiosk::{Kiosk, KioskInput, PhysicalKey};
pub use view::KioskView;
