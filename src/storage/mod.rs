//! Record I/O between the epoch core and its execution engine.

pub mod records;

pub use records::{
    decode_emission, decode_update, encode_emission, encode_update, read_partitions, read_updates,
    write_updates,
};
