//! Kata RPC client.
//!
//! [`Transport`] sends calls; [`QueryCache`] sits on top of one and keeps
//! query results until a mutation declares them stale.

pub mod cache;
pub mod key;
pub mod toast;
pub mod transport;

pub use cache::{EntryState, Query, QueryCache, QueryOptions};
pub use key::{KeyPrefix, QueryKey};
pub use toast::{toast_for_envelope, toast_message};
pub use transport::{ClientError, HttpTransport, Result, Transport, TransportError};
