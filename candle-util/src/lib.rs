pub mod candle_linalg;
pub mod candle_loss_functions;
pub mod candle_random;
pub mod sgvb;

pub use candle_core;
pub use candle_nn;
