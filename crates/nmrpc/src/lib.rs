//! # NMRPC
//!
//! The wire protocol spoken between a page and the native-messaging signing plugin.
//!
//! ## Architecture
//!
//! Every message is a JSON object posted on a broadcast channel. Requests name a
//! remote object by id and an operation on it (call a method, read or write a
//! property), plus the `init` and `reset` lifecycle operations. Responses carry
//! the request id they answer and either a typed return value or an error message.
//!
//! This crate only describes and (de)serializes frames. Correlation, transport and
//! object proxies live in `nmrun`.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::Arg;
pub use codec::Decoded;
pub use codec::ObjectDescriptor;
pub use codec::ObjectId;
pub use codec::Param;
pub use codec::ParamKind;
pub use codec::WireValue;
pub use codec::decode_value;
pub use codec::encode_arg;
pub use codec::format_date;
pub use codec::parse_date;
pub use error::Error;
pub use error::Failure;
pub use error::Result;
pub use frame::CallbackInvocation;
pub use frame::Frame;
pub use frame::Operation;
pub use frame::Reply;
pub use frame::Request;
pub use frame::Response;
pub use frame::peek_request_id;
