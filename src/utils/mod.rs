pub mod linear_algebra;
pub mod masks;
