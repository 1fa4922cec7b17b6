//! CSV adapters used by the command line: seed orders in, status report out.

pub mod order_reader;
pub mod order_writer;
