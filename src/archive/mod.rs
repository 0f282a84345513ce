mod codec;

pub use codec::{ArchiveCodec, Compression, NewEntry, UnpackedDirectory};
