pub mod curve_fitting;
pub use curve_fitting::linear_interpolation;

pub mod linear_algebra;
pub mod ring_buffer;
pub use ring_buffer::RingBuffer;
