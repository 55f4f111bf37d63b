pub mod config;
pub mod data;
pub mod error;
pub mod utils;

pub use config::{CachePolicy, PipelineSettings};
pub use data::address::{AddressField, TronAddress, to_canonical_form, to_display_form};
pub use data::amount::{TokenAmount, normalize};
pub use data::decoder::decode;
pub use data::types::{
    Cursor, FeedState, NormalizedTransfer, RawTransactionRecord, TokenMetadata, TransferType,
};
pub use data::{History, HistoryOptions, LedgerService};
pub use error::{
    AddressError, AmountError, ClassifyError, DecodeError, FetchError, IndexError,
    MetadataLookupError, TransactionError,
};
