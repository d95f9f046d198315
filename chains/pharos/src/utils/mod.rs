pub mod abi;
pub mod gas;
pub mod nonce_manager;
pub mod rpc_manager;
pub mod signer;
pub mod tx_sender;

pub use gas::GasManager;
pub use nonce_manager::{NonceLease, NonceTracker};
pub use rpc_manager::{ChainRpc, EthersRpc, HttpRpcConnector, ReceiptSummary, RpcConnector};
pub use signer::{wallet_from_secret, TxSigner};
pub use tx_sender::{PreparedCall, TransactionSubmitter, UnsignedTransaction};
