pub mod currency;
pub mod decode;
pub mod keys;
pub mod rpc;
pub mod scale;
pub mod ss58;
