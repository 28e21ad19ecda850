pub mod defs;
pub mod fallback;
pub mod null;

pub use defs::{Frame, InputStream, OutputStream, PixelFormat, RenderOptions, VideoInput, VideoOutput};
pub use fallback::black_frame;
pub use null::NullOutput;
