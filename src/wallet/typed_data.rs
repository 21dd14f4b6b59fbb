//! EIP-712 `WalletTx` schema
//!
//! The transaction builder returns the body as JSON; numeric fields may come
//! back as JSON numbers, decimal or hex strings, or ethers' `{ "type":
//! "BigNumber", "hex": "0x.." }` objects.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::Eip712Domain;
use serde::{Deserialize, Serialize};

sol! {
    /// Smart-contract wallet transaction, as signed by the wallet key
    #[derive(Debug, PartialEq)]
    struct WalletTx {
        address to;
        uint256 value;
        bytes data;
        uint8 operation;
        uint256 targetTxGas;
        uint256 baseGas;
        uint256 gasPrice;
        address gasToken;
        address refundReceiver;
        uint256 nonce;
    }
}

/// `WalletTx` as exchanged with the wallet server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTxBody {
    pub to: Address,
    #[serde(with = "quantity")]
    pub value: U256,
    pub data: Bytes,
    pub operation: u8,
    #[serde(with = "quantity")]
    pub target_tx_gas: U256,
    #[serde(with = "quantity")]
    pub base_gas: U256,
    #[serde(with = "quantity")]
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    #[serde(with = "quantity")]
    pub nonce: U256,
}

impl From<&WalletTxBody> for WalletTx {
    fn from(body: &WalletTxBody) -> Self {
        WalletTx {
            to: body.to,
            value: body.value,
            data: body.data.clone(),
            operation: body.operation,
            targetTxGas: body.target_tx_gas,
            baseGas: body.base_gas,
            gasPrice: body.gas_price,
            gasToken: body.gas_token,
            refundReceiver: body.refund_receiver,
            nonce: body.nonce,
        }
    }
}

/// Domain `{ verifyingContract: scw, chainId }`
pub fn wallet_tx_domain(scw_address: Address, chain_id: u64) -> Eip712Domain {
    Eip712Domain::new(
        None,
        None,
        Some(U256::from(chain_id)),
        Some(scw_address),
        None,
    )
}

mod quantity {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
        BigNumber { hex: String },
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(U256::from(n)),
            Raw::Text(s) | Raw::BigNumber { hex: s } => {
                U256::from_str(s.trim()).map_err(serde::de::Error::custom)
            }
        }
    }
}
