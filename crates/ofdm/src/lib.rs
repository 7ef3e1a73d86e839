pub mod linear_bucket;
pub mod circular_bucket;
pub mod fft_engine;
pub mod soft_bits;
