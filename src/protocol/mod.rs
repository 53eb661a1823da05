//! Protocol module - call header and body encodings.
//!
//! A connection carries one handshake option followed by any number of
//! header/body pairs:
//!
//! ```text
//! | Option | Header1 | Body1 | Header2 | Body2 | ...
//! | JSON   | <- encoding chosen by Option.MsgType -> |
//! ```

mod body;
mod header;

pub use body::{Body, Format, InvalidRequest, JSON_TYPE, MSGPACK_TYPE};
pub use header::Header;
