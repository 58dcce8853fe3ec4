pub mod design;
pub mod events;
pub mod hrf;
pub mod io;
pub mod plot;

pub use events::*;
pub use hrf::*;
