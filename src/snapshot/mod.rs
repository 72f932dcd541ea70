pub mod convert;
pub mod join;
pub mod pipeline;
pub mod writer;
