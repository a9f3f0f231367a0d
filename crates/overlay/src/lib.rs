pub mod display_list;
pub mod raster;
pub mod renderer;
pub mod style;
pub mod surface;

pub use display_list::{DisplayList, DrawOp};
pub use raster::{load_font, RasterError, RasterSurface};
pub use renderer::OverlayRenderer;
pub use style::OverlayStyle;
pub use surface::{Color, FontSpec, Surface};
