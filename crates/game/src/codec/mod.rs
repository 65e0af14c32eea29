pub mod quantize;
pub mod stream;
pub mod varint;

pub use quantize::{Interval, PackedFloat, PackedFloat2, PackedFloat3, pack_float, unpack_float};
pub use stream::{ByteReader, ByteWriter, CodecError};
pub use varint::{PACKED_UINT_MAX, PACKED_UINT_SENTINEL};
