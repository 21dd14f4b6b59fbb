//! Wallet key and account signer
//!
//! The private key only exists inside `WalletKey`. The signer holds a working
//! copy for the session; the store record is the owning copy.

mod key;
mod signer;
mod typed_data;

pub use key::{signature_hex, WalletKey};
pub use signer::{PipelineStage, RelayedTransaction, ZeroWalletSigner};
pub use typed_data::{wallet_tx_domain, WalletTx, WalletTxBody};
