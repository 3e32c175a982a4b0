pub mod account;
pub mod machine;
pub mod progression;
pub mod queue;
pub mod subscription;
