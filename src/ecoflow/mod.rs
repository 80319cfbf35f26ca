pub mod cloud;
pub mod packet;
pub mod report;
pub mod wire;
pub mod xor;
