pub mod start;
pub mod status;
pub mod stop;
pub mod upgrade;
