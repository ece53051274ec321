pub mod broadcast;
pub mod cancel;
