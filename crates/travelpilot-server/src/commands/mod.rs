pub mod ask;
pub mod diagnose;
pub mod serve;
