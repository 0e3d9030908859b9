pub mod device;
pub mod forecast;
pub mod schedule;
pub mod system;
pub mod types;

pub use device::*;
pub use forecast::*;
pub use schedule::*;
pub use system::*;
pub use types::*;
