pub mod client;
pub mod contract;
pub mod form;
pub mod recommendation;
