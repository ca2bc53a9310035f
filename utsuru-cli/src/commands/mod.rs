pub mod compare;
pub mod hash;
pub mod search;
