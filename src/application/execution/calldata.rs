//! Swap and approval calldata.
//!
//! Swaps go through a UniswapV2-style router. Tokens that take a fee on
//! transfer use the `SupportingFeeOnTransferTokens` variant, which checks
//! the recipient's balance delta instead of the computed amount. A builder
//! code, when configured, is appended after the ABI-encoded arguments.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

sol! {
    interface IUniswapV2Router02 {
        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);

        function swapExactTokensForTokensSupportingFeeOnTransferTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external;
    }

    interface IERC20Approve {
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

/// Arguments for one exact-input swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    pub amount_in: U256,
    pub min_out: U256,
    pub path: Vec<Address>,
    pub recipient: Address,
    /// Unix timestamp after which the router reverts.
    pub deadline: u64,
    pub fee_on_transfer: bool,
}

/// Encode the router call for `params`, followed by `builder_code`.
#[must_use]
pub fn encode_swap(params: &SwapParams, builder_code: &[u8]) -> Bytes {
    let mut data = if params.fee_on_transfer {
        IUniswapV2Router02::swapExactTokensForTokensSupportingFeeOnTransferTokensCall {
            amountIn: params.amount_in,
            amountOutMin: params.min_out,
            path: params.path.clone(),
            to: params.recipient,
            deadline: U256::from(params.deadline),
        }
        .abi_encode()
    } else {
        IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: params.amount_in,
            amountOutMin: params.min_out,
            path: params.path.clone(),
            to: params.recipient,
            deadline: U256::from(params.deadline),
        }
        .abi_encode()
    };
    data.extend_from_slice(builder_code);
    Bytes::from(data)
}

/// Encode an unlimited ERC-20 approval for `spender`.
#[must_use]
pub fn encode_approve(spender: Address) -> Bytes {
    Bytes::from(
        IERC20Approve::approveCall {
            spender,
            amount: U256::MAX,
        }
        .abi_encode(),
    )
}

/// Decode router calldata built by [`encode_swap`], ignoring any builder
/// code after the arguments.
#[cfg(any(test, feature = "testkit"))]
#[must_use]
pub fn decode_swap(data: &[u8]) -> Option<SwapParams> {
    // selector, five head words, then the path length word
    const PATH_LEN_AT: usize = 4 + 5 * 32;
    let len_word = data.get(PATH_LEN_AT..PATH_LEN_AT + 32)?;
    let path_len = usize::try_from(U256::from_be_slice(len_word)).ok()?;
    let end = PATH_LEN_AT + 32 + path_len.checked_mul(32)?;
    let args = data.get(..end)?;

    if let Ok(call) = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(args) {
        return Some(SwapParams {
            amount_in: call.amountIn,
            min_out: call.amountOutMin,
            path: call.path,
            recipient: call.to,
            deadline: u64::try_from(call.deadline).ok()?,
            fee_on_transfer: false,
        });
    }
    let call =
        IUniswapV2Router02::swapExactTokensForTokensSupportingFeeOnTransferTokensCall::abi_decode(args).ok()?;
    Some(SwapParams {
        amount_in: call.amountIn,
        min_out: call.amountOutMin,
        path: call.path,
        recipient: call.to,
        deadline: u64::try_from(call.deadline).ok()?,
        fee_on_transfer: true,
    })
}
