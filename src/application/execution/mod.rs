//! Execution router and its building blocks.

mod calldata;
mod gas;
mod nonce;
mod router;
mod slippage;
mod units;

#[cfg(any(test, feature = "testkit"))]
pub use calldata::decode_swap;
pub use calldata::{encode_approve, encode_swap, SwapParams};
pub use gas::{gwei_to_wei, GasPolicy, GasSpike};
pub use nonce::{NonceManager, NonceSlot};
pub use router::{ExecutionConfig, ExecutionRouter, Route};
pub use slippage::{effective_slippage, min_output};
pub use units::{from_units, to_units};
