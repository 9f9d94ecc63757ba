pub mod fits;
pub mod fits_writer;
pub mod image_io;
pub mod store;

pub use fits::{load_fits, FitsReader};
pub use fits_writer::{write_fits, FitsBitpix};
pub use store::{load_frame, FrameStore};
