//! Response head serialization.

mod head_writer;

pub use head_writer::HeadWriter;
