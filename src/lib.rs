pub mod config;
pub mod decoder;
pub mod error;
pub mod exchange;
pub mod instruments;
pub mod keystore;
pub mod order;
pub mod pipeline;
pub mod proxy;
pub mod session;
pub mod signature;
pub mod tracing_init;
pub mod wire;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use exchange::ExchangeId;
pub use instruments::{InstrumentsStore, PairWithCount};
pub use keystore::{Credential, FileStorage, KeyStore, MemoryStorage, SharedKeyStore, Storage};
pub use order::{PostOrderRequest, infer_trade_modes};
pub use pipeline::RequestPipeline;
pub use proxy::{HttpProxy, ProxyRpc};
pub use session::{IdentityProvider, TokenIdentity, Wallet};

// 重新导出 tracing 相关功能
pub use tracing_init::{LogFormat, init_default_if_none, init_tracing};
